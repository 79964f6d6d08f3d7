//! Backend-agnostic isolation runtime.
//!
//! One contract ([`IsolationRuntime`]) for starting, executing commands
//! in, inspecting, and tearing down an isolated compute environment,
//! realized either as a Docker container ([`ContainerBackend`]) or a full
//! VM reached through an out-of-process helper ([`VmBackend`]).

pub mod container;
pub mod error;
pub mod profile;
pub mod runtime;
pub mod session;
pub mod vm;

#[cfg(test)]
pub(crate) mod testing;

pub use container::{ContainerBackend, connect_docker};
pub use error::{IsolationError, Result};
pub use profile::{
    FilesystemPolicy, IsolationProfile, NetworkPolicy, ProfilePatch, ProfileTier, ProfileUpdate,
    ResourceCaps,
};
pub use runtime::{
    DEFAULT_EXEC_TIMEOUT, ExecOptions, ExecuteResult, FileInfo, IsolationRuntime, OutputSink,
    RuntimeEvent, RuntimeStatus, StreamChannel,
};
pub use session::{BackendKind, SessionController, SessionStatus};
pub use vm::VmBackend;
