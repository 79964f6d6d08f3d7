//! In-process fake runtime for tests that exercise the contract without a
//! container engine or helper process.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::isolation::error::{IsolationError, Result};
use crate::isolation::profile::{IsolationProfile, ProfilePatch, ProfileUpdate};
use crate::isolation::runtime::{
    ExecOptions, ExecuteResult, FileInfo, IsolationRuntime, OutputSink, RuntimeEvent,
    RuntimeStatus, StreamChannel,
};

/// A fake backend with an in-memory filesystem and a tiny command
/// interpreter (`echo ...` and `sleep <secs>`).
pub struct FakeRuntime {
    running: AtomicBool,
    files: StdMutex<HashMap<String, Vec<u8>>>,
    started_at: StdMutex<Option<Instant>>,
    events: broadcast::Sender<RuntimeEvent>,
    pub executed: StdMutex<Vec<String>>,
}

impl FakeRuntime {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            running: AtomicBool::new(false),
            files: StdMutex::new(HashMap::new()),
            started_at: StdMutex::new(None),
            events,
            executed: StdMutex::new(Vec::new()),
        }
    }

    fn require_running(&self) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(IsolationError::NotRunning)
        }
    }

    fn emit(&self, event: RuntimeEvent) {
        let _ = self.events.send(event);
    }

    async fn interpret(&self, cmd: &str) -> ExecuteResult {
        self.executed.lock().unwrap().push(cmd.to_string());

        if let Some(rest) = cmd.strip_prefix("echo ") {
            return ExecuteResult {
                stdout: format!("{}\n", rest),
                stderr: String::new(),
                exit_code: 0,
            };
        }
        if let Some(secs) = cmd
            .strip_prefix("sleep ")
            .and_then(|s| s.trim().parse::<u64>().ok())
        {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            return ExecuteResult {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
            };
        }
        ExecuteResult {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
        }
    }
}

#[async_trait]
impl IsolationRuntime for FakeRuntime {
    async fn start(&self, _session_id: &str, _profile: &IsolationProfile) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(IsolationError::AlreadyRunning);
        }
        self.emit(RuntimeEvent::Starting);
        self.running.store(true, Ordering::SeqCst);
        *self.started_at.lock().unwrap() = Some(Instant::now());
        self.emit(RuntimeEvent::Started);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.require_running()?;
        self.emit(RuntimeEvent::Stopping);
        self.running.store(false, Ordering::SeqCst);
        self.emit(RuntimeEvent::Stopped);
        Ok(())
    }

    async fn force_stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.emit(RuntimeEvent::Stopped);
        Ok(())
    }

    async fn execute(&self, cmd: &str, opts: ExecOptions) -> Result<ExecuteResult> {
        self.require_running()?;
        match tokio::time::timeout(opts.timeout, self.interpret(cmd)).await {
            Ok(result) => Ok(result),
            Err(_) => Err(IsolationError::CommandTimeout(opts.timeout)),
        }
    }

    async fn execute_stream(&self, cmd: &str, on_output: OutputSink) -> Result<i64> {
        self.require_running()?;
        let result = self.interpret(cmd).await;
        if !result.stdout.is_empty() {
            on_output(StreamChannel::Stdout, &result.stdout);
        }
        if !result.stderr.is_empty() {
            on_output(StreamChannel::Stderr, &result.stderr);
        }
        Ok(result.exit_code)
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.require_running()?;
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let files = self.files.lock().unwrap();
        let mut entries: Vec<FileInfo> = files
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix))
            .map(|(p, data)| FileInfo {
                name: p.rsplit('/').next().unwrap_or(p).to_string(),
                path: p.clone(),
                size: data.len() as u64,
                is_dir: false,
                modified: None,
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.require_running()?;
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| IsolationError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.require_running()?;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn copy_in(&self, host_path: &Path, guest_path: &str) -> Result<()> {
        let data = tokio::fs::read(host_path).await.map_err(IsolationError::Io)?;
        self.write_file(guest_path, &data).await
    }

    async fn copy_out(&self, guest_path: &str, host_path: &Path) -> Result<()> {
        let data = self.read_file(guest_path).await?;
        tokio::fs::write(host_path, data)
            .await
            .map_err(IsolationError::Io)
    }

    async fn status(&self) -> Result<RuntimeStatus> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(RuntimeStatus::stopped());
        }
        Ok(RuntimeStatus {
            running: true,
            cpu_percent: 1.0,
            mem_percent: 5.0,
            uptime: self
                .started_at
                .lock()
                .unwrap()
                .map(|t| t.elapsed())
                .unwrap_or_default(),
        })
    }

    async fn update_profile(&self, patch: ProfilePatch) -> Result<ProfileUpdate> {
        self.require_running()?;
        let mut update = ProfileUpdate::default();
        if patch.resources.is_some() {
            update.applied.push("resources".to_string());
        }
        if patch.network_enabled.is_some() {
            update.requires_restart.push("network".to_string());
        }
        Ok(update)
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_start_then_running_then_stop() {
        let runtime = FakeRuntime::new();
        runtime
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();
        assert!(runtime.is_running());
        runtime.stop().await.unwrap();
        assert!(!runtime.is_running());
    }

    #[tokio::test]
    async fn test_balanced_session_echo_scenario() {
        let runtime = FakeRuntime::new();
        runtime
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();

        let result = runtime
            .execute("echo hi", ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.exit_code, 0);

        runtime.stop().await.unwrap();
        let err = runtime
            .execute("echo hi", ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::NotRunning));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_at_deadline_not_completion() {
        let runtime = Arc::new(FakeRuntime::new());
        runtime
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        let err = runtime
            .execute(
                "sleep 5",
                ExecOptions::default().with_timeout(Duration::from_secs(1)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, IsolationError::CommandTimeout(_)));
        // Paused clock: elapsed virtual time is exactly the deadline.
        assert_eq!(started.elapsed(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_write_read_roundtrip_preserves_nul_bytes() {
        let runtime = FakeRuntime::new();
        runtime
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();

        let bytes = vec![0u8, 159, 146, 150, 0, 65];
        runtime.write_file("/workspace/blob", &bytes).await.unwrap();
        assert_eq!(runtime.read_file("/workspace/blob").await.unwrap(), bytes);
    }
}
