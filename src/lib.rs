//! Solace: a personal companion agent runtime.
//!
//! Two halves, joined at the [`isolation::IsolationRuntime`] contract:
//!
//! - **Isolation runtime**: one interface for an isolated compute
//!   environment, realized as a Docker container or a VM behind an
//!   out-of-process helper speaking newline-delimited JSON.
//! - **Task router**: keyword intent classification into a specialist
//!   worker pool, a tool-execution loop against the remote model
//!   service, and a durable memory store for contacts, deadlines, and
//!   journal history.

pub mod agents;
pub mod config;
pub mod error;
pub mod isolation;
pub mod llm;
pub mod memory;
pub mod orchestrator;

pub use config::Config;
pub use error::{Result, SolaceError};
