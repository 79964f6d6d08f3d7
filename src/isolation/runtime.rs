//! The `IsolationRuntime` contract: one interface for lifecycle, command
//! execution, file operations, and status inspection of an isolated
//! compute environment, whether it is realized as a Docker container or a
//! full VM reached through a helper process.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::isolation::error::Result;
use crate::isolation::profile::{IsolationProfile, ProfilePatch, ProfileUpdate};

/// Default per-command execution timeout.
pub const DEFAULT_EXEC_TIMEOUT: Duration = Duration::from_secs(30);

/// Output of a command executed inside the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
    /// Process exit code.
    pub exit_code: i64,
}

impl ExecuteResult {
    /// True when the command exited zero.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Metadata for a file or directory inside the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Base name.
    pub name: String,
    /// Full path inside the environment.
    pub path: String,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this entry is a directory.
    pub is_dir: bool,
    /// Last modification time, when the backend reports one.
    pub modified: Option<DateTime<Utc>>,
}

/// A point-in-time snapshot of the environment's health.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
    /// Whether the environment is up.
    pub running: bool,
    /// CPU utilization as a percentage of the profile's cap.
    pub cpu_percent: f64,
    /// Memory utilization as a percentage of the profile's cap.
    pub mem_percent: f64,
    /// Time since the session started.
    pub uptime: Duration,
}

impl RuntimeStatus {
    /// A stopped environment reports zeros across the board.
    pub fn stopped() -> Self {
        Self {
            running: false,
            cpu_percent: 0.0,
            mem_percent: 0.0,
            uptime: Duration::ZERO,
        }
    }
}

/// Options for a single command execution.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Deadline for the command.
    pub timeout: Duration,
    /// Working directory inside the environment.
    pub cwd: Option<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_EXEC_TIMEOUT,
            cwd: None,
            env: HashMap::new(),
        }
    }
}

impl ExecOptions {
    /// Set the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }
}

/// Which output channel a streamed chunk belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamChannel {
    Stdout,
    Stderr,
}

/// Callback receiving streamed command output, chunk by chunk.
pub type OutputSink = Box<dyn Fn(StreamChannel, &str) + Send + Sync>;

/// Lifecycle notifications emitted by a runtime.
///
/// Delivered over a broadcast channel so callers react to transitions
/// without polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    Starting,
    Started,
    Stopping,
    Stopped,
    Error(String),
}

/// The isolation runtime contract.
///
/// Implementations hold at most one live environment. `start` on a running
/// runtime fails fast with `IsolationError::AlreadyRunning`; every other
/// operation except `is_running` and `subscribe` requires a running
/// environment.
#[async_trait]
pub trait IsolationRuntime: Send + Sync {
    /// Start an environment for `session_id` under `profile`.
    async fn start(&self, session_id: &str, profile: &IsolationProfile) -> Result<()>;

    /// Stop the environment, waiting a bounded time for graceful shutdown.
    async fn stop(&self) -> Result<()>;

    /// Tear the environment down immediately.
    async fn force_stop(&self) -> Result<()>;

    /// Run a command to completion, enforcing `opts.timeout`.
    async fn execute(&self, cmd: &str, opts: ExecOptions) -> Result<ExecuteResult>;

    /// Run a command, streaming stdout/stderr chunks to `on_output` as they
    /// arrive. Returns the exit code.
    async fn execute_stream(&self, cmd: &str, on_output: OutputSink) -> Result<i64>;

    /// List directory entries at `path` inside the environment.
    async fn list_files(&self, path: &str) -> Result<Vec<FileInfo>>;

    /// Read a file's full contents. Binary-safe.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `content` to `path`, creating parent directories. Binary-safe.
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Copy a host file into the environment.
    async fn copy_in(&self, host_path: &Path, guest_path: &str) -> Result<()>;

    /// Copy a file or directory out of the environment to the host.
    async fn copy_out(&self, guest_path: &str, host_path: &Path) -> Result<()>;

    /// Snapshot the environment's health.
    async fn status(&self) -> Result<RuntimeStatus>;

    /// Apply a partial profile change, best-effort.
    ///
    /// Fields that need a restart are reported in
    /// `ProfileUpdate::requires_restart`, never silently dropped.
    async fn update_profile(&self, patch: ProfilePatch) -> Result<ProfileUpdate>;

    /// Whether an environment is currently live. Purely in-memory: never a
    /// backend round-trip.
    fn is_running(&self) -> bool;

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent>;
}
