//! Error types for the isolation runtime.

use std::time::Duration;

/// Errors that can occur in an isolation backend or session.
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    /// A session is already running on this runtime.
    #[error("session already running")]
    AlreadyRunning,

    /// The runtime is not running.
    #[error("runtime is not running")]
    NotRunning,

    /// A command exceeded its execution timeout.
    #[error("command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// A bridge command exceeded the per-command bridge timeout.
    #[error("bridge command timed out after {0:?}")]
    BridgeTimeout(Duration),

    /// The helper process did not complete its ready handshake in time.
    #[error("bridge startup timed out after {0:?}")]
    StartupTimeout(Duration),

    /// The helper process exited while requests were outstanding.
    #[error("bridge closed: {reason}")]
    BridgeClosed { reason: String },

    /// A backend-level failure, wrapped with backend identity.
    #[error("{backend} backend error: {reason}")]
    Backend {
        backend: &'static str,
        reason: String,
    },

    /// A requested path or resource does not exist in the environment.
    #[error("not found: {0}")]
    NotFound(String),

    /// Docker API error.
    #[error("docker api error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl IsolationError {
    /// Wrap a backend failure with backend identity.
    pub fn backend(backend: &'static str, reason: impl Into<String>) -> Self {
        Self::Backend {
            backend,
            reason: reason.into(),
        }
    }
}

/// Result type for isolation operations.
pub type Result<T> = std::result::Result<T, IsolationError>;
