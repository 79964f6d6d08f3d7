//! Container-backed isolation runtime.
//!
//! One container per session: a read-only shared-skills mount, a
//! read-write per-session data mount, resource caps translated from the
//! profile, and a minimum-privilege posture (all capabilities dropped,
//! ownership-related ones added back, no-new-privileges).
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                     Session Container                       │
//! │                                                             │
//! │  Mounts:                                                    │
//! │    /opt/skills ─▶ shared skills directory (ro)             │
//! │    /workspace  ─▶ per-session data directory (rw)          │
//! │                                                             │
//! │  Limits (from profile):                                     │
//! │    memory, nano_cpus, network mode bridge/none              │
//! │    cap_drop ALL, no-new-privileges, non-root user           │
//! └────────────────────────────────────────────────────────────┘
//! ```

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use base64::Engine;
use bytes::Bytes;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, DownloadFromContainerOptions, KillContainerOptions,
    RemoveContainerOptions, StartContainerOptions, StatsOptions, StopContainerOptions,
    UpdateContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::HostConfig;
use bollard::container::LogOutput;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::{RwLock, broadcast};

use crate::isolation::error::{IsolationError, Result};
use crate::isolation::profile::{IsolationProfile, ProfilePatch, ProfileUpdate};
use crate::isolation::runtime::{
    ExecOptions, ExecuteResult, FileInfo, IsolationRuntime, OutputSink, RuntimeEvent,
    RuntimeStatus, StreamChannel,
};

const BACKEND_NAME: &str = "container";

/// Writes above this size go through the archive upload path instead of
/// the base64-through-exec fallback.
const MAX_EXEC_WRITE: usize = 256 * 1024;

/// Graceful stop window before the engine kills the container.
const STOP_GRACE_SECS: i64 = 10;

/// Default image built for session containers.
const DEFAULT_DOCKERFILE: &str = r#"FROM debian:bookworm-slim
RUN apt-get update && apt-get install -y --no-install-recommends \
    python3 python3-pip nodejs npm coreutils findutils \
    && rm -rf /var/lib/apt/lists/* \
    && useradd -m -u 1000 sandbox
USER sandbox
WORKDIR /workspace
"#;

/// Isolation runtime realized as a Docker container, via bollard.
pub struct ContainerBackend {
    docker: Docker,
    image: String,
    /// Host directory mounted read-only at /opt/skills.
    skills_dir: Option<String>,
    /// Host directory whose per-session subdirectory mounts at /workspace.
    data_dir: String,
    container_id: RwLock<Option<String>>,
    profile: RwLock<Option<IsolationProfile>>,
    started_at: RwLock<Option<Instant>>,
    running: AtomicBool,
    events: broadcast::Sender<RuntimeEvent>,
}

impl ContainerBackend {
    /// Create a backend against an already-connected Docker client.
    pub fn new(docker: Docker, image: impl Into<String>, data_dir: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            docker,
            image: image.into(),
            skills_dir: None,
            data_dir: data_dir.into(),
            container_id: RwLock::new(None),
            profile: RwLock::new(None),
            started_at: RwLock::new(None),
            running: AtomicBool::new(false),
            events,
        }
    }

    /// Mount this host directory read-only at /opt/skills in every session.
    pub fn with_skills_dir(mut self, dir: impl Into<String>) -> Self {
        self.skills_dir = Some(dir.into());
        self
    }

    /// Check if the Docker daemon is reachable.
    pub async fn is_available(&self) -> bool {
        self.docker.ping().await.is_ok()
    }

    /// The profile snapshot of the live session, if one is running.
    pub async fn active_profile(&self) -> Option<IsolationProfile> {
        self.profile.read().await.clone()
    }

    /// Make sure the session image exists, building it if missing.
    ///
    /// Presence is checked by tag first, so repeated calls are idempotent.
    pub async fn ensure_image(&self) -> Result<()> {
        if self.docker.inspect_image(&self.image).await.is_ok() {
            return Ok(());
        }

        tracing::info!(image = %self.image, "building session image");

        let context = dockerfile_context(DEFAULT_DOCKERFILE)?;
        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: self.image.clone(),
            rm: true,
            ..Default::default()
        };

        let mut stream = self.docker.build_image(
            options,
            None,
            Some(Bytes::from(context)),
        );

        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| IsolationError::backend(BACKEND_NAME, e.to_string()))?;
            if let Some(msg) = info.stream {
                tracing::debug!(target: "solace::image_build", "{}", msg.trim_end());
            }
            if let Some(detail) = info.error {
                return Err(IsolationError::backend(
                    BACKEND_NAME,
                    format!("image build failed: {}", detail),
                ));
            }
        }

        tracing::info!(image = %self.image, "session image ready");
        Ok(())
    }

    fn emit(&self, event: RuntimeEvent) {
        let _ = self.events.send(event);
    }

    async fn require_container(&self) -> Result<String> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(IsolationError::NotRunning);
        }
        self.container_id
            .read()
            .await
            .clone()
            .ok_or(IsolationError::NotRunning)
    }

    /// Translate a profile into engine-level host configuration.
    fn host_config(&self, session_id: &str, profile: &IsolationProfile) -> HostConfig {
        let mut binds = vec![format!("{}/{}:/workspace:rw", self.data_dir, session_id)];
        if let Some(skills) = &self.skills_dir {
            binds.push(format!("{}:/opt/skills:ro", skills));
        }
        for path in &profile.filesystem.readonly_paths {
            let p = path.display();
            binds.push(format!("{}:{}:ro", p, p));
        }

        HostConfig {
            binds: Some(binds),
            memory: Some((profile.resources.memory_gb * 1024 * 1024 * 1024) as i64),
            nano_cpus: Some((profile.resources.cpu_cores * 1_000_000_000.0) as i64),
            network_mode: Some(if profile.network.enabled {
                "bridge".to_string()
            } else {
                "none".to_string()
            }),
            cap_drop: Some(vec!["ALL".to_string()]),
            cap_add: Some(vec![
                "CHOWN".to_string(),
                "SETUID".to_string(),
                "SETGID".to_string(),
            ]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            ..Default::default()
        }
    }

    async fn run_exec(
        &self,
        container_id: &str,
        cmd: &str,
        opts: &ExecOptions,
    ) -> Result<ExecuteResult> {
        let env: Vec<String> = opts
            .env
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();

        let exec = self
            .docker
            .create_exec(
                container_id,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    working_dir: opts.cwd.clone(),
                    env: if env.is_empty() { None } else { Some(env) },
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("exec create: {}", e)))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("exec start: {}", e)))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        // The engine multiplexes both channels onto one stream; bollard
        // decodes the stdcopy framing into typed LogOutput frames.
        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        stdout.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        stderr.push_str(&String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("error reading exec output: {}", e);
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("exec inspect: {}", e)))?;

        Ok(ExecuteResult {
            stdout,
            stderr,
            exit_code: inspect.exit_code.unwrap_or(-1),
        })
    }

    /// Upload bytes as a single-entry tar archive to the parent directory.
    async fn upload_bytes(&self, container_id: &str, guest_path: &str, data: &[u8]) -> Result<()> {
        let (dir, name) = split_guest_path(guest_path)?;

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, data)
            .map_err(IsolationError::Io)?;
        let archive = builder.into_inner().map_err(IsolationError::Io)?;

        // Parent must exist before the archive lands.
        self.run_exec(
            container_id,
            &format!("mkdir -p {}", shell_quote(dir)),
            &ExecOptions::default(),
        )
        .await?;

        self.docker
            .upload_to_container(
                container_id,
                Some(UploadToContainerOptions {
                    path: dir.to_string(),
                    ..Default::default()
                }),
                Bytes::from(archive),
            )
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("upload: {}", e)))?;

        Ok(())
    }

    /// Download a path as a tar archive and return the raw archive bytes.
    async fn download_archive(&self, container_id: &str, guest_path: &str) -> Result<Vec<u8>> {
        let mut stream = self.docker.download_from_container(
            container_id,
            Some(DownloadFromContainerOptions {
                path: guest_path.to_string(),
            }),
        );

        let mut archive = Vec::new();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| match e {
                bollard::errors::Error::DockerResponseServerError {
                    status_code: 404, ..
                } => IsolationError::NotFound(guest_path.to_string()),
                other => IsolationError::backend(BACKEND_NAME, format!("download: {}", other)),
            })?;
            archive.extend_from_slice(&bytes);
        }
        Ok(archive)
    }
}

#[async_trait]
impl IsolationRuntime for ContainerBackend {
    async fn start(&self, session_id: &str, profile: &IsolationProfile) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(IsolationError::AlreadyRunning);
        }

        self.emit(RuntimeEvent::Starting);
        self.ensure_image().await?;

        let config = Config {
            image: Some(self.image.clone()),
            // Keep the container alive for the session's lifetime.
            cmd: Some(vec![
                "sh".to_string(),
                "-c".to_string(),
                "sleep infinity".to_string(),
            ]),
            working_dir: Some("/workspace".to_string()),
            user: Some("1000:1000".to_string()),
            host_config: Some(self.host_config(session_id, profile)),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: format!("solace-session-{}", session_id),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| {
                self.emit(RuntimeEvent::Error(e.to_string()));
                IsolationError::backend(BACKEND_NAME, format!("create: {}", e))
            })?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| {
                self.emit(RuntimeEvent::Error(e.to_string()));
                IsolationError::backend(BACKEND_NAME, format!("start: {}", e))
            })?;

        *self.container_id.write().await = Some(created.id);
        *self.profile.write().await = Some(profile.clone());
        *self.started_at.write().await = Some(Instant::now());
        self.running.store(true, Ordering::SeqCst);
        self.emit(RuntimeEvent::Started);

        tracing::info!(session_id, profile = %profile.name, "container session started");
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let container_id = self.require_container().await?;
        self.emit(RuntimeEvent::Stopping);

        let stopped = self
            .docker
            .stop_container(
                &container_id,
                Some(StopContainerOptions { t: STOP_GRACE_SECS }),
            )
            .await;

        if let Err(e) = stopped {
            tracing::warn!("graceful stop failed, forcing: {}", e);
            return self.force_stop().await;
        }

        let _ = self
            .docker
            .remove_container(
                &container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await;

        self.running.store(false, Ordering::SeqCst);
        *self.container_id.write().await = None;
        *self.started_at.write().await = None;
        self.emit(RuntimeEvent::Stopped);

        tracing::info!("container session stopped");
        Ok(())
    }

    async fn force_stop(&self) -> Result<()> {
        let container_id = {
            let guard = self.container_id.read().await;
            guard.clone()
        };

        if let Some(id) = container_id {
            let _ = self
                .docker
                .kill_container(&id, None::<KillContainerOptions<String>>)
                .await;
            let _ = self
                .docker
                .remove_container(
                    &id,
                    Some(RemoveContainerOptions {
                        force: true,
                        ..Default::default()
                    }),
                )
                .await;
        }

        self.running.store(false, Ordering::SeqCst);
        *self.container_id.write().await = None;
        *self.started_at.write().await = None;
        self.emit(RuntimeEvent::Stopped);
        Ok(())
    }

    async fn execute(&self, cmd: &str, opts: ExecOptions) -> Result<ExecuteResult> {
        let container_id = self.require_container().await?;

        match tokio::time::timeout(opts.timeout, self.run_exec(&container_id, cmd, &opts)).await {
            Ok(result) => result,
            Err(_) => Err(IsolationError::CommandTimeout(opts.timeout)),
        }
    }

    async fn execute_stream(&self, cmd: &str, on_output: OutputSink) -> Result<i64> {
        let container_id = self.require_container().await?;

        let exec = self
            .docker
            .create_exec(
                &container_id,
                CreateExecOptions {
                    cmd: Some(vec!["sh".to_string(), "-c".to_string(), cmd.to_string()]),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("exec create: {}", e)))?;

        let start_result = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("exec start: {}", e)))?;

        if let StartExecResults::Attached { mut output, .. } = start_result {
            while let Some(chunk) = output.next().await {
                match chunk {
                    Ok(LogOutput::StdOut { message }) => {
                        on_output(StreamChannel::Stdout, &String::from_utf8_lossy(&message));
                    }
                    Ok(LogOutput::StdErr { message }) => {
                        on_output(StreamChannel::Stderr, &String::from_utf8_lossy(&message));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!("error reading streamed output: {}", e);
                    }
                }
            }
        }

        let inspect = self
            .docker
            .inspect_exec(&exec.id)
            .await
            .map_err(|e| IsolationError::backend(BACKEND_NAME, format!("exec inspect: {}", e)))?;

        Ok(inspect.exit_code.unwrap_or(-1))
    }

    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>> {
        let container_id = self.require_container().await?;

        // One stat format string covers name, size, kind, and mtime.
        let cmd = format!(
            "find {} -mindepth 1 -maxdepth 1 -exec stat -c '%n|%s|%F|%Y' {{}} +",
            shell_quote(path)
        );
        let result = self.run_exec(&container_id, &cmd, &ExecOptions::default()).await?;

        if result.exit_code != 0 {
            return Err(IsolationError::NotFound(path.to_string()));
        }

        let mut entries = Vec::new();
        for line in result.stdout.lines() {
            let mut parts = line.splitn(4, '|');
            let (Some(full), Some(size), Some(kind), Some(mtime)) =
                (parts.next(), parts.next(), parts.next(), parts.next())
            else {
                continue;
            };

            let name = full.rsplit('/').next().unwrap_or(full).to_string();
            let is_dir = kind == "directory";
            let modified = mtime
                .parse::<i64>()
                .ok()
                .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

            entries.push(FileInfo {
                name,
                path: full.to_string(),
                size: if is_dir { 0 } else { size.parse().unwrap_or(0) },
                is_dir,
                modified,
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let container_id = self.require_container().await?;

        // The engine only exposes arbitrary binary content through its
        // archive endpoint, so reads come back tar-framed.
        let archive = self.download_archive(&container_id, path).await?;
        let mut tar = tar::Archive::new(Cursor::new(archive));

        for entry in tar.entries().map_err(IsolationError::Io)? {
            let mut entry = entry.map_err(IsolationError::Io)?;
            if entry.header().entry_type().is_file() {
                let mut content = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut content).map_err(IsolationError::Io)?;
                return Ok(content);
            }
        }

        Err(IsolationError::NotFound(path.to_string()))
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let container_id = self.require_container().await?;

        if content.len() > MAX_EXEC_WRITE {
            return self.upload_bytes(&container_id, path, content).await;
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(content);
        let (dir, _) = split_guest_path(path)?;
        let cmd = format!(
            "mkdir -p {} && printf '%s' {} | base64 -d > {}",
            shell_quote(dir),
            shell_quote(&encoded),
            shell_quote(path)
        );

        let result = self.run_exec(&container_id, &cmd, &ExecOptions::default()).await?;
        if result.exit_code != 0 {
            return Err(IsolationError::backend(
                BACKEND_NAME,
                format!("write failed: {}", result.stderr.trim()),
            ));
        }
        Ok(())
    }

    async fn copy_in(&self, host_path: &Path, guest_path: &str) -> Result<()> {
        let container_id = self.require_container().await?;
        let data = tokio::fs::read(host_path).await.map_err(IsolationError::Io)?;
        self.upload_bytes(&container_id, guest_path, &data).await
    }

    async fn copy_out(&self, guest_path: &str, host_path: &Path) -> Result<()> {
        let container_id = self.require_container().await?;
        let archive = self.download_archive(&container_id, guest_path).await?;

        tokio::fs::create_dir_all(host_path)
            .await
            .map_err(IsolationError::Io)?;

        let mut tar = tar::Archive::new(Cursor::new(archive));
        for entry in tar.entries().map_err(IsolationError::Io)? {
            // One bad entry must not abort the rest of the export.
            let mut entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("skipping unreadable archive entry: {}", e);
                    continue;
                }
            };
            if let Err(e) = entry.unpack_in(host_path) {
                tracing::warn!("skipping entry that failed to unpack: {}", e);
            }
        }
        Ok(())
    }

    async fn status(&self) -> Result<RuntimeStatus> {
        if !self.running.load(Ordering::SeqCst) {
            return Ok(RuntimeStatus::stopped());
        }
        let container_id = self.require_container().await?;

        let mut stream = self.docker.stats(
            &container_id,
            Some(StatsOptions {
                stream: false,
                one_shot: true,
            }),
        );

        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => {
                return Err(IsolationError::backend(
                    BACKEND_NAME,
                    format!("stats: {}", e),
                ));
            }
            None => return Ok(RuntimeStatus::stopped()),
        };

        let cpu_delta = stats.cpu_stats.cpu_usage.total_usage as f64
            - stats.precpu_stats.cpu_usage.total_usage as f64;
        let system_delta = stats.cpu_stats.system_cpu_usage.unwrap_or(0) as f64
            - stats.precpu_stats.system_cpu_usage.unwrap_or(0) as f64;
        let online_cpus = stats.cpu_stats.online_cpus.unwrap_or(1).max(1) as f64;
        let cpu_percent = if system_delta > 0.0 {
            (cpu_delta / system_delta) * online_cpus * 100.0
        } else {
            0.0
        };

        let mem_usage = stats.memory_stats.usage.unwrap_or(0) as f64;
        let mem_limit = stats.memory_stats.limit.unwrap_or(1).max(1) as f64;

        let uptime = self
            .started_at
            .read()
            .await
            .map(|t| t.elapsed())
            .unwrap_or_default();

        Ok(RuntimeStatus {
            running: true,
            cpu_percent,
            mem_percent: mem_usage / mem_limit * 100.0,
            uptime,
        })
    }

    async fn update_profile(&self, patch: ProfilePatch) -> Result<ProfileUpdate> {
        let container_id = self.require_container().await?;
        let mut update = ProfileUpdate::default();

        if let Some(resources) = &patch.resources {
            self.docker
                .update_container(
                    &container_id,
                    UpdateContainerOptions::<String> {
                        memory: Some((resources.memory_gb * 1024 * 1024 * 1024) as i64),
                        nano_cpus: Some((resources.cpu_cores * 1_000_000_000.0) as i64),
                        ..Default::default()
                    },
                )
                .await
                .map_err(|e| {
                    IsolationError::backend(BACKEND_NAME, format!("update: {}", e))
                })?;
            update.applied.push("resources".to_string());
        }

        // The engine fixes network mode and device access at creation time.
        if patch.network_enabled.is_some() || patch.allowed_hosts.is_some() {
            update.requires_restart.push("network".to_string());
        }
        if patch.gpu.is_some() {
            update.requires_restart.push("gpu".to_string());
        }

        if let Some(clipboard) = patch.clipboard {
            if let Some(profile) = self.profile.write().await.as_mut() {
                profile.clipboard = clipboard;
            }
            update.applied.push("clipboard".to_string());
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

/// Connect to the Docker daemon.
///
/// Tries `DOCKER_HOST` / the platform default socket first, then the
/// Docker Desktop socket under the user's home directory.
pub async fn connect_docker() -> Result<Docker> {
    if let Ok(docker) = Docker::connect_with_local_defaults() {
        if docker.ping().await.is_ok() {
            return Ok(docker);
        }
    }

    if let Some(home) = std::env::var_os("HOME") {
        let desktop_sock = Path::new(&home).join(".docker/run/docker.sock");
        if desktop_sock.exists() {
            let sock_str = desktop_sock.to_string_lossy();
            if let Ok(docker) =
                Docker::connect_with_socket(&sock_str, 120, bollard::API_DEFAULT_VERSION)
            {
                if docker.ping().await.is_ok() {
                    return Ok(docker);
                }
            }
        }
    }

    Err(IsolationError::backend(
        BACKEND_NAME,
        "docker daemon not reachable",
    ))
}

/// Quote a string for a POSIX shell.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Split a guest path into (parent directory, base name).
fn split_guest_path(path: &str) -> Result<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rsplit_once('/') {
        Some(("", name)) => Ok(("/", name)),
        Some((dir, name)) if !name.is_empty() => Ok((dir, name)),
        _ => Err(IsolationError::backend(
            BACKEND_NAME,
            format!("invalid guest path: {}", path),
        )),
    }
}

/// Build an in-memory tar context holding a single Dockerfile.
fn dockerfile_context(dockerfile: &str) -> Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    let mut header = tar::Header::new_gnu();
    header.set_size(dockerfile.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, "Dockerfile", dockerfile.as_bytes())
        .map_err(IsolationError::Io)?;
    builder.into_inner().map_err(IsolationError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("plain"), "'plain'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn test_split_guest_path() {
        assert_eq!(split_guest_path("/tmp/out.txt").unwrap(), ("/tmp", "out.txt"));
        assert_eq!(split_guest_path("/top.txt").unwrap(), ("/", "top.txt"));
        assert!(split_guest_path("relative").is_err());
    }

    #[test]
    fn test_dockerfile_context_is_valid_tar() {
        let context = dockerfile_context("FROM scratch\n").unwrap();
        let mut archive = tar::Archive::new(Cursor::new(context));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().display().to_string())
            .collect();
        assert_eq!(names, vec!["Dockerfile".to_string()]);
    }

    #[tokio::test]
    async fn test_operations_require_running_session() {
        // Connection config alone never touches the daemon.
        let Ok(docker) = Docker::connect_with_local_defaults() else {
            return;
        };
        let backend = ContainerBackend::new(docker, "solace-session:latest", "/tmp/solace");

        assert!(!backend.is_running());
        let err = backend
            .execute("echo hi", ExecOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, IsolationError::NotRunning));

        let err = backend.read_file("/etc/hostname").await.unwrap_err();
        assert!(matches!(err, IsolationError::NotRunning));
    }
}
