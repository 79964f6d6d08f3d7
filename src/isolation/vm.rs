//! VM-backed isolation runtime.
//!
//! The VM itself is managed by a privileged out-of-process helper. This
//! backend spawns the helper once and speaks newline-delimited JSON over
//! its standard streams:
//!
//! ```text
//! ┌─────────────┐  {"id":1,"command":"execute","params":{..}}  ┌──────────┐
//! │  VmBackend  │ ───────────────────────────────────────────▶ │  helper  │
//! │             │ ◀─────────────────────────────────────────── │ (priv.)  │
//! └─────────────┘  {"type":"response","id":1,"result":{..}}    └──────────┘
//!                  {"type":"stream","streamId":7,...}   (out-of-band)
//!                  {"type":"ready"}                      (handshake)
//! ```
//!
//! Requests are resolved through a pending-request table keyed by id,
//! owned by this backend instance. When the helper exits, every
//! outstanding request is rejected with one synthetic error and the
//! session moves to stopped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{Mutex, RwLock, broadcast, mpsc, oneshot};

use crate::isolation::error::{IsolationError, Result};
use crate::isolation::profile::{IsolationProfile, ProfilePatch, ProfileUpdate};
use crate::isolation::runtime::{
    ExecOptions, ExecuteResult, FileInfo, IsolationRuntime, OutputSink, RuntimeEvent,
    RuntimeStatus, StreamChannel,
};

const BACKEND_NAME: &str = "vm";

/// One-time bound on waiting for the helper's ready handshake.
const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-command bound on waiting for a helper response.
const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(60);

/// Bounded wait for a graceful stop before the helper is killed.
const STOP_GRACE: Duration = Duration::from_secs(10);

/// A request sent to the helper.
#[derive(Debug, Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    command: &'a str,
    params: Value,
}

/// Frames arriving from the helper.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum BridgeFrame {
    Ready,
    Response {
        id: u64,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Stream {
        #[serde(rename = "streamId")]
        stream_id: u64,
        #[serde(rename = "streamType")]
        stream_type: StreamChannel,
        data: String,
    },
    Event {
        event: String,
        #[serde(default)]
        data: Option<Value>,
    },
}

/// Outstanding requests awaiting helper responses.
///
/// Owned by the backend instance and passed by reference; there is no
/// process-wide table.
#[derive(Default)]
struct PendingRequests {
    next_id: u64,
    waiting: HashMap<u64, oneshot::Sender<Result<Value>>>,
}

impl PendingRequests {
    fn register(&mut self) -> (u64, oneshot::Receiver<Result<Value>>) {
        self.next_id += 1;
        let id = self.next_id;
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(id, tx);
        (id, rx)
    }

    fn resolve(&mut self, id: u64, outcome: Result<Value>) {
        if let Some(tx) = self.waiting.remove(&id) {
            let _ = tx.send(outcome);
        } else {
            tracing::warn!(id, "response for unknown request id");
        }
    }

    fn forget(&mut self, id: u64) {
        self.waiting.remove(&id);
    }

    /// Reject every outstanding request with one synthetic error.
    fn fail_all(&mut self, reason: &str) {
        for (_, tx) in self.waiting.drain() {
            let _ = tx.send(Err(IsolationError::BridgeClosed {
                reason: reason.to_string(),
            }));
        }
    }
}

type StreamRegistry = HashMap<u64, mpsc::UnboundedSender<(StreamChannel, String)>>;

/// Isolation runtime reached through the helper process.
pub struct VmBackend {
    helper_path: PathBuf,
    startup_timeout: Duration,
    bridge_timeout: Duration,
    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    pending: Arc<Mutex<PendingRequests>>,
    streams: Arc<Mutex<StreamRegistry>>,
    next_stream_id: AtomicU64,
    running: Arc<AtomicBool>,
    started_at: RwLock<Option<Instant>>,
    events: broadcast::Sender<RuntimeEvent>,
}

impl VmBackend {
    /// Create a backend that will spawn the helper at `helper_path`.
    pub fn new(helper_path: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            helper_path: helper_path.into(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            bridge_timeout: DEFAULT_BRIDGE_TIMEOUT,
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            pending: Arc::new(Mutex::new(PendingRequests::default())),
            streams: Arc::new(Mutex::new(HashMap::new())),
            next_stream_id: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(false)),
            started_at: RwLock::new(None),
            events,
        }
    }

    /// Override the handshake timeout.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override the per-command bridge timeout.
    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    /// Spawn the helper and wait for its ready handshake.
    async fn spawn_helper(&self) -> Result<()> {
        let mut child = Command::new(&self.helper_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                IsolationError::backend(BACKEND_NAME, format!("failed to spawn helper: {}", e))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            IsolationError::backend(BACKEND_NAME, "failed to capture helper stdout")
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            IsolationError::backend(BACKEND_NAME, "failed to capture helper stdin")
        })?;

        let (ready_tx, ready_rx) = oneshot::channel();
        self.spawn_reader(stdout, ready_tx);

        *self.child.lock().await = Some(child);
        *self.stdin.lock().await = Some(stdin);

        match tokio::time::timeout(self.startup_timeout, ready_rx).await {
            Ok(Ok(())) => Ok(()),
            // Reader dropped the sender: helper exited during startup.
            Ok(Err(_)) => Err(IsolationError::BridgeClosed {
                reason: "helper exited before ready handshake".to_string(),
            }),
            Err(_) => Err(IsolationError::StartupTimeout(self.startup_timeout)),
        }
    }

    /// Read helper frames until the stream closes.
    fn spawn_reader(
        &self,
        stdout: tokio::process::ChildStdout,
        ready_tx: oneshot::Sender<()>,
    ) {
        let pending = Arc::clone(&self.pending);
        let streams = Arc::clone(&self.streams);
        let running = Arc::clone(&self.running);
        let events = self.events.clone();

        tokio::spawn(async move {
            let mut ready_tx = Some(ready_tx);
            let mut lines = BufReader::new(stdout).lines();

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<BridgeFrame>(line) {
                            Ok(BridgeFrame::Ready) => {
                                if let Some(tx) = ready_tx.take() {
                                    let _ = tx.send(());
                                }
                            }
                            Ok(BridgeFrame::Response { id, result, error }) => {
                                let outcome = match error {
                                    Some(reason) => Err(map_helper_error(reason)),
                                    None => Ok(result.unwrap_or(Value::Null)),
                                };
                                pending.lock().await.resolve(id, outcome);
                            }
                            Ok(BridgeFrame::Stream {
                                stream_id,
                                stream_type,
                                data,
                            }) => {
                                let registry = streams.lock().await;
                                match registry.get(&stream_id) {
                                    Some(tx) => {
                                        let _ = tx.send((stream_type, data));
                                    }
                                    None => {
                                        tracing::warn!(stream_id, "frame for unknown stream");
                                    }
                                }
                            }
                            Ok(BridgeFrame::Event { event, data }) => {
                                tracing::debug!(event, ?data, "helper event");
                            }
                            Err(e) => {
                                tracing::warn!("unparseable helper frame: {} ({})", line, e);
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            // Helper is gone: reject everything still in flight, once.
            pending.lock().await.fail_all("helper process exited");
            streams.lock().await.clear();
            if running.swap(false, Ordering::SeqCst) {
                let _ = events.send(RuntimeEvent::Stopped);
            }
            tracing::info!("helper stream closed");
        });
    }

    /// Send one command and wait for its response under the bridge timeout.
    async fn send_command(&self, command: &str, params: Value) -> Result<Value> {
        let (id, rx) = self.pending.lock().await.register();

        let request = BridgeRequest {
            id,
            command,
            params,
        };
        let mut line = serde_json::to_string(&request)
            .map_err(|e| IsolationError::backend(BACKEND_NAME, e.to_string()))?;
        line.push('\n');

        {
            let mut stdin = self.stdin.lock().await;
            let Some(stdin) = stdin.as_mut() else {
                self.pending.lock().await.forget(id);
                return Err(IsolationError::NotRunning);
            };
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                self.pending.lock().await.forget(id);
                return Err(IsolationError::BridgeClosed {
                    reason: format!("write failed: {}", e),
                });
            }
        }

        match tokio::time::timeout(self.bridge_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(IsolationError::BridgeClosed {
                reason: "helper process exited".to_string(),
            }),
            Err(_) => {
                self.pending.lock().await.forget(id);
                Err(IsolationError::BridgeTimeout(self.bridge_timeout))
            }
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

    async fn kill_helper(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
        *self.stdin.lock().await = None;
        self.pending.lock().await.fail_all("helper process killed");
    }
}

#[async_trait]
impl IsolationRuntime for VmBackend {
    async fn start(&self, session_id: &str, profile: &IsolationProfile) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(IsolationError::AlreadyRunning);
        }

        self.emit(RuntimeEvent::Starting);
        if let Err(e) = self.spawn_helper().await {
            self.emit(RuntimeEvent::Error(e.to_string()));
            return Err(e);
        }

        // The handshake only proves the helper is alive; the VM itself
        // boots on the start command.
        let params = json!({
            "sessionId": session_id,
            "profile": serde_json::to_value(profile)
                .map_err(|e| IsolationError::backend(BACKEND_NAME, e.to_string()))?,
        });
        if let Err(e) = self.send_command("start", params).await {
            self.emit(RuntimeEvent::Error(e.to_string()));
            self.kill_helper().await;
            return Err(e);
        }

        self.running.store(true, Ordering::SeqCst);
        *self.started_at.write().await = Some(Instant::now());
        self.emit(RuntimeEvent::Started);

        tracing::info!(session_id, profile = %profile.name, "vm session started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.require_running()?;
        self.emit(RuntimeEvent::Stopping);

        let graceful =
            tokio::time::timeout(STOP_GRACE, self.send_command("stop", json!({}))).await;
        match graceful {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::warn!("graceful vm stop failed: {}", e),
            Err(_) => tracing::warn!("graceful vm stop timed out"),
        }

        self.kill_helper().await;
        self.running.store(false, Ordering::SeqCst);
        *self.started_at.write().await = None;
        self.emit(RuntimeEvent::Stopped);

        tracing::info!("vm session stopped");
        Ok(())
    }

    async fn force_stop(&self) -> Result<()> {
        self.kill_helper().await;
        self.running.store(false, Ordering::SeqCst);
        *self.started_at.write().await = None;
        self.emit(RuntimeEvent::Stopped);
        Ok(())
    }

    async fn execute(&self, cmd: &str, opts: ExecOptions) -> Result<ExecuteResult> {
        self.require_running()?;

        let params = json!({
            "command": cmd,
            "timeoutMs": opts.timeout.as_millis() as u64,
            "cwd": opts.cwd,
            "env": opts.env,
        });

        let result = match tokio::time::timeout(
            opts.timeout,
            self.send_command("execute", params),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => return Err(IsolationError::CommandTimeout(opts.timeout)),
        };

        parse_execute_result(&result)
    }

    async fn execute_stream(&self, cmd: &str, on_output: OutputSink) -> Result<i64> {
        self.require_running()?;

        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Register before issuing the command so no frame can race past us.
        self.streams.lock().await.insert(stream_id, tx);

        let forwarder = tokio::spawn(async move {
            while let Some((channel, data)) = rx.recv().await {
                on_output(channel, &data);
            }
        });

        let params = json!({ "command": cmd, "streamId": stream_id });
        let result = self.send_command("executeStream", params).await;

        self.streams.lock().await.remove(&stream_id);
        let _ = forwarder.await;

        let value = result?;
        Ok(value.get("exitCode").and_then(Value::as_i64).unwrap_or(-1))
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>> {
        self.require_running()?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Entry {
            name: String,
            path: String,
            size: u64,
            is_dir: bool,
            #[serde(default)]
            modified: Option<chrono::DateTime<chrono::Utc>>,
        }

        let result = self
            .send_command("listFiles", json!({ "path": path }))
            .await?;
        let entries: Vec<Entry> = serde_json::from_value(
            result.get("entries").cloned().unwrap_or(Value::Null),
        )
        .map_err(|e| {
            IsolationError::backend(BACKEND_NAME, format!("bad listFiles payload: {}", e))
        })?;

        Ok(entries
            .into_iter()
            .map(|e| FileInfo {
                name: e.name,
                path: e.path,
                size: e.size,
                is_dir: e.is_dir,
                modified: e.modified,
            })
            .collect())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.require_running()?;

        let result = self
            .send_command("readFile", json!({ "path": path }))
            .await?;
        let data = result
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| IsolationError::backend(BACKEND_NAME, "readFile missing data"))?;

        base64::engine::general_purpose::STANDARD
            .decode(data)
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("bad base64: {}", e)))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        self.require_running()?;

        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        self.send_command("writeFile", json!({ "path": path, "data": encoded }))
            .await?;
        Ok(())
    }

    async fn copy_in(&self, host_path: &Path, guest_path: &str) -> Result<()> {
        let data = tokio::fs::read(host_path).await.map_err(IsolationError::Io)?;
        self.write_file(guest_path, &data).await
    }

    async fn copy_out(&self, guest_path: &str, host_path: &Path) -> Result<()> {
        let data = self.read_file(guest_path).await?;
        if let Some(parent) = host_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(IsolationError::Io)?;
        }
        tokio::fs::write(host_path, data)
            .await
            .map_err(IsolationError::Io)
    }

    async fn status(&self) -> Result<RuntimeStatus> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(RuntimeStatus::stopped());
        }

        let result = self.send_command("status", json!({})).await?;
        let uptime = self
            .started_at
            .read()
            .await
            .map(|t| t.elapsed())
            .unwrap_or_default();

        Ok(RuntimeStatus {
            running: true,
            cpu_percent: result
                .get("cpuPercent")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            mem_percent: result
                .get("memPercent")
                .and_then(Value::as_f64)
                .unwrap_or(0.0),
            uptime,
        })
    }

    async fn update_profile(&self, patch: ProfilePatch) -> Result<ProfileUpdate> {
        self.require_running()?;

        let params = serde_json::to_value(&patch)
            .map_err(|e| IsolationError::backend(BACKEND_NAME, e.to_string()))?;
        let result = self
            .send_command("updateProfile", json!({ "patch": params }))
            .await?;

        serde_json::from_value(result).map_err(|e| {
            IsolationError::backend(BACKEND_NAME, format!("bad updateProfile payload: {}", e))
        })
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.events.subscribe()
    }
}

fn parse_execute_result(value: &Value) -> Result<ExecuteResult> {
    Ok(ExecuteResult {
        stdout: value
            .get("stdout")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        stderr: value
            .get("stderr")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        exit_code: value.get("exitCode").and_then(Value::as_i64).unwrap_or(-1),
    })
}

fn map_helper_error(reason: String) -> IsolationError {
    let lower = reason.to_lowercase();
    if lower.contains("enoent") || lower.contains("not found") {
        IsolationError::NotFound(reason)
    } else {
        IsolationError::Backend {
            backend: BACKEND_NAME,
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::fs::PermissionsExt;

    /// Write a shell script that speaks just enough of the bridge
    /// protocol: ready handshake, then a canned response per request.
    fn fake_helper(body: &str) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().expect("temp helper");
        writeln!(file, "#!/bin/sh").unwrap();
        writeln!(file, "{}", body).unwrap();
        let path = file.into_temp_path();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    fn echo_helper() -> tempfile::TempPath {
        fake_helper(
            r#"printf '{"type":"ready"}\n'
while read line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  printf '{"type":"response","id":%s,"result":{"stdout":"hi\\n","stderr":"","exitCode":0}}\n' "$id"
done"#,
        )
    }

    #[test]
    fn test_pending_requests_lifecycle() {
        let mut pending = PendingRequests::default();
        let (id1, mut rx1) = pending.register();
        let (id2, mut rx2) = pending.register();
        assert_ne!(id1, id2);

        pending.resolve(id1, Ok(json!({"ok": true})));
        assert!(rx1.try_recv().unwrap().is_ok());

        pending.fail_all("helper process exited");
        let err = rx2.try_recv().unwrap().unwrap_err();
        assert!(matches!(err, IsolationError::BridgeClosed { .. }));
        assert!(pending.waiting.is_empty());
    }

    #[test]
    fn test_frame_parsing() {
        let ready: BridgeFrame = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(matches!(ready, BridgeFrame::Ready));

        let response: BridgeFrame =
            serde_json::from_str(r#"{"type":"response","id":3,"result":{"exitCode":0}}"#)
                .unwrap();
        assert!(matches!(response, BridgeFrame::Response { id: 3, .. }));

        let stream: BridgeFrame = serde_json::from_str(
            r#"{"type":"stream","streamId":7,"streamType":"stderr","data":"oops"}"#,
        )
        .unwrap();
        match stream {
            BridgeFrame::Stream {
                stream_id,
                stream_type,
                data,
            } => {
                assert_eq!(stream_id, 7);
                assert_eq!(stream_type, StreamChannel::Stderr);
                assert_eq!(data, "oops");
            }
            other => panic!("expected stream frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_start_execute_stop_roundtrip() {
        let helper = echo_helper();
        let backend = VmBackend::new(helper.to_path_buf());

        backend
            .start("test-session", &IsolationProfile::balanced())
            .await
            .unwrap();
        assert!(backend.is_running());

        let result = backend
            .execute("echo hi", ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(result.stdout, "hi\n");
        assert_eq!(result.exit_code, 0);

        backend.stop().await.unwrap();
        assert!(!backend.is_running());

        let err = backend
            .execute("echo hi", ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::NotRunning));
    }

    #[tokio::test]
    async fn test_start_when_running_fails_fast() {
        let helper = echo_helper();
        let backend = VmBackend::new(helper.to_path_buf());
        let profile = IsolationProfile::balanced();

        backend.start("s1", &profile).await.unwrap();
        let err = backend.start("s2", &profile).await.unwrap_err();
        assert!(matches!(err, IsolationError::AlreadyRunning));

        backend.force_stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_silent_helper_times_out_startup() {
        let helper = fake_helper("sleep 60");
        let backend = VmBackend::new(helper.to_path_buf())
            .with_startup_timeout(Duration::from_millis(200));

        let err = backend
            .start("s", &IsolationProfile::isolated())
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::StartupTimeout(_)));
        assert!(!backend.is_running());
    }

    #[tokio::test]
    async fn test_helper_exit_rejects_outstanding_requests() {
        // Responds to the start command, then exits without answering
        // anything else.
        let helper = fake_helper(
            r#"printf '{"type":"ready"}\n'
read line
id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
printf '{"type":"response","id":%s,"result":{}}\n' "$id"
read line
exit 0"#,
        );
        let backend = VmBackend::new(helper.to_path_buf());

        backend
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();

        let err = backend
            .execute("echo hi", ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::BridgeClosed { .. }));
    }

    #[tokio::test]
    async fn test_stream_frames_reach_sink() {
        // Emits two stream frames before answering the executeStream
        // request, using the streamId from the request.
        let helper = fake_helper(
            r#"printf '{"type":"ready"}\n'
while read line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":\([0-9]*\).*/\1/p')
  sid=$(printf '%s' "$line" | sed -n 's/.*"streamId":\([0-9]*\).*/\1/p')
  if [ -n "$sid" ]; then
    printf '{"type":"stream","streamId":%s,"streamType":"stdout","data":"line one\\n"}\n' "$sid"
    printf '{"type":"stream","streamId":%s,"streamType":"stderr","data":"warn\\n"}\n' "$sid"
    printf '{"type":"response","id":%s,"result":{"exitCode":0}}\n' "$id"
  else
    printf '{"type":"response","id":%s,"result":{}}\n' "$id"
  fi
done"#,
        );
        let backend = VmBackend::new(helper.to_path_buf());
        backend
            .start("s", &IsolationProfile::balanced())
            .await
            .unwrap();

        let chunks = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink_chunks = Arc::clone(&chunks);
        let exit_code = backend
            .execute_stream(
                "build",
                Box::new(move |channel, data| {
                    sink_chunks.lock().unwrap().push((channel, data.to_string()));
                }),
            )
            .await
            .unwrap();

        assert_eq!(exit_code, 0);
        let chunks = chunks.lock().unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].0, StreamChannel::Stdout);
        assert_eq!(chunks[1].0, StreamChannel::Stderr);

        backend.force_stop().await.unwrap();
    }
}
