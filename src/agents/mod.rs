//! The worker contract and the specialist pool.
//!
//! A worker accepts a typed task and returns a typed result; the
//! companion worker delegates to the specialists and owns the global
//! deadline-mode flag.

pub mod code;
pub mod companion;
pub mod reporting;
pub mod research;

pub use code::CodeWorker;
pub use companion::{AgentEvent, Cadence, CompanionWorker, DelegationOutcome};
pub use reporting::ReportingWorker;
pub use research::{ResearchWorker, SearchStrategy};

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use crate::memory::Priority;

/// Closed set of task tags, produced by intent classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Code,
    Research,
    Email,
    Deadline,
    Journal,
    Questionnaire,
    Digest,
    Conversation,
}

/// The specialist roster.
///
/// Resolved from a task tag once, through a static table; never
/// re-dispatched by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Companion,
    Code,
    Research,
    Reporting,
}

/// What a worker is doing right now. Only an idle worker accepts new
/// work; a busy worker causes the delegator to queue, not drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerStatus {
    #[default]
    Idle,
    Thinking,
    Executing,
    Waiting,
    Error,
}

/// A unit of work handed to a worker.
#[derive(Debug, Clone)]
pub struct AgentTask {
    pub id: Uuid,
    pub kind: TaskKind,
    pub input: String,
    pub priority: Priority,
    pub deadline: Option<DateTime<Utc>>,
    /// Which worker first delegated this task. Set once; forwarding
    /// another hop keeps the original provenance.
    pub delegated_by: Option<String>,
}

impl AgentTask {
    pub fn new(kind: TaskKind, input: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            input: input.into(),
            priority: Priority::Normal,
            deadline: None,
            delegated_by: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Record delegation provenance. The first hop wins.
    pub fn forwarded_by(mut self, worker: &str) -> Self {
        if self.delegated_by.is_none() {
            self.delegated_by = Some(worker.to_string());
        }
        self
    }
}

/// What came back from a worker.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub success: bool,
    pub output: String,
    pub artifacts: Vec<String>,
    pub next_steps: Option<String>,
    pub error: Option<String>,
    pub duration: Duration,
}

impl AgentResult {
    pub fn ok(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            artifacts: Vec::new(),
            next_steps: None,
            error: None,
            duration,
        }
    }

    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        let error = error.into();
        Self {
            success: false,
            output: String::new(),
            artifacts: Vec::new(),
            next_steps: None,
            error: Some(error),
            duration,
        }
    }

    pub fn with_next_steps(mut self, next_steps: impl Into<String>) -> Self {
        self.next_steps = Some(next_steps.into());
        self
    }

    pub fn with_artifact(mut self, artifact: impl Into<String>) -> Self {
        self.artifacts.push(artifact.into());
        self
    }
}

/// A specialist accepting typed tasks.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Which roster slot this worker fills.
    fn kind(&self) -> WorkerKind;

    /// Current status. Idle is the only state that accepts new work.
    fn status(&self) -> WorkerStatus;

    /// Run one task to completion.
    async fn execute(&self, task: AgentTask) -> AgentResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_provenance_is_never_overwritten() {
        let task = AgentTask::new(TaskKind::Code, "run tests")
            .forwarded_by("companion")
            .forwarded_by("reporting");
        assert_eq!(task.delegated_by.as_deref(), Some("companion"));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_result_constructors() {
        let ok = AgentResult::ok("done", Duration::from_millis(5));
        assert!(ok.success && ok.error.is_none());

        let failed = AgentResult::failure("no such file", Duration::ZERO)
            .with_next_steps("check the path");
        assert!(!failed.success);
        assert_eq!(failed.next_steps.as_deref(), Some("check the path"));
    }
}
