//! Code-execution worker.
//!
//! Maps a script or command plus a target language to a shell
//! invocation, runs it through the isolation runtime, and classifies
//! caught error text to suggest remediation. Execution itself is always
//! deferred to the runtime; this worker never touches the host.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Instant;

use async_trait::async_trait;

use crate::agents::{AgentResult, AgentTask, Worker, WorkerKind, WorkerStatus};
use crate::isolation::{ExecOptions, IsolationRuntime};

/// Broad classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A module or package could not be resolved.
    Import,
    /// A type-level mistake in the script.
    Type,
    /// Permission or access denial.
    Access,
    Unknown,
}

impl ErrorKind {
    /// Classify raw error text.
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("modulenotfounderror")
            || lower.contains("importerror")
            || lower.contains("cannot find module")
            || lower.contains("no module named")
            || lower.contains("unresolved import")
        {
            ErrorKind::Import
        } else if lower.contains("typeerror") || lower.contains("type mismatch") {
            ErrorKind::Type
        } else if lower.contains("permission denied")
            || lower.contains("permissionerror")
            || lower.contains("eacces")
            || lower.contains("access denied")
        {
            ErrorKind::Access
        } else {
            ErrorKind::Unknown
        }
    }

    /// A remediation hint for the classified failure.
    pub fn remediation(self) -> &'static str {
        match self {
            ErrorKind::Import => {
                "a dependency is missing; install it inside the session before rerunning"
            }
            ErrorKind::Type => "the script has a type error; inspect the values being passed",
            ErrorKind::Access => {
                "the session lacks permission for that path; write under /workspace instead"
            }
            ErrorKind::Unknown => "inspect the full error output and adjust the script",
        }
    }
}

/// Build the shell invocation for a script in the given language.
///
/// Plain commands (`shell`, or no language) run as-is.
pub fn build_invocation(language: Option<&str>, script: &str) -> String {
    match language.map(str::to_lowercase).as_deref() {
        Some("python") | Some("python3") => format!("python3 -c {}", quote(script)),
        Some("javascript") | Some("node") => format!("node -e {}", quote(script)),
        _ => script.to_string(),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Split an optional `lang:` prefix off a task payload.
fn split_language(input: &str) -> (Option<&str>, &str) {
    for lang in ["python", "python3", "javascript", "node", "shell"] {
        if let Some(rest) = input.strip_prefix(&format!("{lang}:")) {
            return (Some(lang), rest.trim_start());
        }
    }
    (None, input)
}

/// Worker executing code inside the isolation runtime.
pub struct CodeWorker {
    runtime: Arc<dyn IsolationRuntime>,
    status: StdMutex<WorkerStatus>,
}

impl CodeWorker {
    pub fn new(runtime: Arc<dyn IsolationRuntime>) -> Self {
        Self {
            runtime,
            status: StdMutex::new(WorkerStatus::Idle),
        }
    }

    fn set_status(&self, status: WorkerStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl Worker for CodeWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Code
    }

    fn status(&self) -> WorkerStatus {
        *self.status.lock().unwrap()
    }

    async fn execute(&self, task: AgentTask) -> AgentResult {
        self.set_status(WorkerStatus::Executing);
        let started = Instant::now();

        let (language, script) = split_language(&task.input);
        let invocation = build_invocation(language, script);

        let outcome = self
            .runtime
            .execute(&invocation, ExecOptions::default())
            .await;
        let duration = started.elapsed();
        self.set_status(WorkerStatus::Idle);

        match outcome {
            Ok(result) if result.succeeded() => AgentResult::ok(result.stdout, duration),
            Ok(result) => {
                let kind = ErrorKind::classify(&result.stderr);
                tracing::debug!(?kind, exit_code = result.exit_code, "script failed");
                AgentResult::failure(
                    format!("exit code {}: {}", result.exit_code, result.stderr.trim()),
                    duration,
                )
                .with_next_steps(kind.remediation())
            }
            Err(e) => {
                let kind = ErrorKind::classify(&e.to_string());
                AgentResult::failure(e.to_string(), duration).with_next_steps(kind.remediation())
            }
        }
    }
}
