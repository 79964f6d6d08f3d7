//! Crate-level error types.
//!
//! Each subsystem owns its error enum; `SolaceError` unifies them at the
//! binary edge. Isolation errors live in `isolation::error`.

use crate::isolation::IsolationError;

/// Errors from the remote language-model service.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// No API credential configured.
    #[error("no model credential configured")]
    MissingCredential,

    /// Credential was rejected.
    #[error("model authentication failed")]
    AuthFailed,

    /// The service asked us to back off.
    #[error("model rate limited")]
    RateLimited,

    /// Transport-level failure.
    #[error("model request failed: {reason}")]
    RequestFailed { reason: String },

    /// The service returned something we could not interpret.
    #[error("invalid model response: {reason}")]
    InvalidResponse { reason: String },

    /// The in-flight request was cancelled by the caller.
    #[error("model request aborted")]
    Aborted,
}

/// Errors from the durable memory store.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// A referenced record does not exist.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Input that cannot be recorded as-is.
    #[error("invalid input: {0}")]
    Invalid(String),

    /// Persistence I/O failure.
    #[error("memory i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted database could not be decoded.
    #[error("memory decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

impl MemoryError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

/// Errors from tool-call dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The model asked for a tool we never declared.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// A required field was missing from the tool input.
    #[error("tool '{tool}' missing required field '{field}'")]
    MissingField { tool: &'static str, field: &'static str },

    /// A field was present but unusable.
    #[error("tool '{tool}' field '{field}' is invalid: {reason}")]
    InvalidField {
        tool: &'static str,
        field: &'static str,
        reason: String,
    },

    /// The isolation runtime rejected the operation.
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    /// The memory store rejected the operation.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// Anything else that stopped this one call.
    #[error("tool execution failed: {0}")]
    Failed(String),
}

/// Top-level error unifying the subsystems.
#[derive(Debug, thiserror::Error)]
pub enum SolaceError {
    #[error(transparent)]
    Isolation(#[from] IsolationError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// Crate-level result type.
pub type Result<T> = std::result::Result<T, SolaceError>;
