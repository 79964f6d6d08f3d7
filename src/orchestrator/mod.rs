//! The orchestrator: intent classification, conversation history, and
//! the tool-execution loop against the remote model service.
//!
//! Per inbound message:
//!
//! ```text
//! message ─▶ classify ─▶ route ─▶ worker ─▶ model call ─┐
//!                                              ▲        │ blocks
//!                                              │        ▼
//!                                              │   text: append
//!                                              │   tool_use: run locally
//!                                              └── loop while stop_reason
//!                                                  is tool_use
//! ```
//!
//! Tool calls within one turn run sequentially in emission order. A turn
//! that ends on tool use is still recorded in history so ordering holds
//! for the next turn. Cancellation aborts only the wait on the model
//! call; a dispatched isolation command may still complete behind it.

pub mod intent;
pub mod tools;

pub use intent::{classify, worker_for};
pub use tools::{ToolDispatcher, tool_schema};

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use futures::future::{AbortHandle, Abortable};
use tokio::sync::Mutex;

use crate::agents::{AgentTask, CompanionWorker, DelegationOutcome, Worker, WorkerKind};
use crate::error::{LlmError, Result, SolaceError, ToolError};
use crate::isolation::{IsolationError, IsolationRuntime};
use crate::llm::{ChatMessage, ContentBlock, LlmProvider, StopReason, ToolServer};
use crate::memory::{ActionRecord, MemoryStore};

/// Upper bound on model round-trips within one turn.
const MAX_TOOL_ROUNDS: usize = 8;

/// Drives turns end to end.
pub struct Orchestrator {
    llm: Arc<dyn LlmProvider>,
    memory: Arc<MemoryStore>,
    companion: Arc<CompanionWorker>,
    dispatcher: ToolDispatcher,
    history: Mutex<Vec<ChatMessage>>,
    tool_servers: Vec<ToolServer>,
    abort: StdMutex<Option<AbortHandle>>,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        runtime: Arc<dyn IsolationRuntime>,
        memory: Arc<MemoryStore>,
        companion: Arc<CompanionWorker>,
    ) -> Self {
        let dispatcher = ToolDispatcher::new(runtime, Arc::clone(&memory));
        Self {
            llm,
            memory,
            companion,
            dispatcher,
            history: Mutex::new(Vec::new()),
            tool_servers: Vec::new(),
            abort: StdMutex::new(None),
        }
    }

    /// Attach external tool servers, passed to the model call opaquely.
    pub fn with_tool_servers(mut self, servers: Vec<ToolServer>) -> Self {
        self.tool_servers = servers;
        self
    }

    /// Abort the in-flight model wait, if any. An isolation command that
    /// was already dispatched may still complete in the background.
    pub fn cancel(&self) {
        if let Some(handle) = self.abort.lock().unwrap().take() {
            tracing::info!("cancelling in-flight model call");
            handle.abort();
        }
    }

    /// Messages recorded so far.
    pub async fn history_len(&self) -> usize {
        self.history.lock().await.len()
    }

    /// Handle one inbound message and return the assistant's final text.
    pub async fn handle_message(&self, text: &str) -> Result<String> {
        self.memory.push_message("user", text).await;
        self.history.lock().await.push(ChatMessage::user(text));

        // Route through the static table; the companion may delegate
        // further on its own.
        let kind = intent::classify(text);
        let target = intent::worker_for(kind);
        self.companion.check_deadlines().await;

        let task = AgentTask::new(kind, text).with_priority(self.companion.default_priority());
        tracing::debug!(?kind, ?target, priority = ?task.priority, "routing message");

        let worker_note = if target == WorkerKind::Companion {
            let result = self.companion.execute(task).await;
            worker_note(target, result.success, &result.output, result.next_steps.as_deref())
        } else {
            match self.companion.delegate(target, task).await {
                DelegationOutcome::Executed(result) => worker_note(
                    target,
                    result.success,
                    &result.output,
                    result.next_steps.as_deref(),
                ),
                DelegationOutcome::Queued => {
                    format!("[{:?} worker busy; task queued for later]", target)
                }
            }
        };

        let system = self.build_system_prompt(&worker_note).await;
        let reply = self.drive_model_loop(system).await?;

        self.memory.push_message("assistant", &reply).await;
        Ok(reply)
    }

    /// System prompt: user profile, upcoming deadlines, recent key
    /// facts, and the active worker's note for this turn.
    async fn build_system_prompt(&self, worker_note: &str) -> String {
        let mut prompt = String::from(
            "You are Solace, a personal companion agent. You have an isolated \
             compute session and durable memory available through tools.\n",
        );

        let profile = self.memory.user_profile().await;
        if let Some(name) = &profile.name {
            prompt.push_str(&format!("\nUser: {}", name));
            if let Some(occupation) = &profile.occupation {
                prompt.push_str(&format!(" ({})", occupation));
            }
            prompt.push('\n');
        }

        let deadlines = self.memory.upcoming_deadlines(3).await;
        if !deadlines.is_empty() {
            prompt.push_str("\nUpcoming deadlines:\n");
            for d in &deadlines {
                prompt.push_str(&format!(
                    "- {} due {} ({:?} phase, {}% done)\n",
                    d.title,
                    d.due_date.format("%Y-%m-%d"),
                    d.phase,
                    d.progress_percent
                ));
            }
        }

        let facts = self.memory.key_facts(5).await;
        if !facts.is_empty() {
            prompt.push_str("\nKey facts:\n");
            for fact in &facts {
                prompt.push_str(&format!("- {}\n", fact));
            }
        }

        if !worker_note.is_empty() {
            prompt.push_str(&format!("\nWorker context: {}\n", worker_note));
        }

        prompt
    }

    /// The block-processing loop: call the model, run tool_use blocks
    /// sequentially, feed results back, repeat until end of turn.
    async fn drive_model_loop(&self, system: String) -> Result<String> {
        let mut reply = String::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let messages = self.history.lock().await.clone();

            let (handle, registration) = AbortHandle::new_pair();
            *self.abort.lock().unwrap() = Some(handle);
            let call = self.llm.complete(
                Some(system.clone()),
                messages,
                tools::tool_schema(),
                self.tool_servers.clone(),
            );
            let response = match Abortable::new(call, registration).await {
                Ok(outcome) => outcome.map_err(SolaceError::Llm)?,
                Err(_) => return Err(SolaceError::Llm(LlmError::Aborted)),
            };
            self.abort.lock().unwrap().take();

            let mut tool_results = Vec::new();
            for block in &response.content {
                match block {
                    ContentBlock::Text { text } => {
                        if !reply.is_empty() {
                            reply.push('\n');
                        }
                        reply.push_str(text);
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        tool_results.push(self.run_tool(id, name, input).await?);
                    }
                    ContentBlock::ToolResult { .. } => {
                        tracing::warn!("unexpected tool_result block in model output");
                    }
                }
            }

            // Even a turn that stops for tool use is recorded, so the
            // next round sees the full ordering.
            self.history
                .lock()
                .await
                .push(ChatMessage::assistant(response.content.clone()));

            if response.stop_reason != StopReason::ToolUse {
                return Ok(reply);
            }
            if tool_results.is_empty() {
                tracing::warn!("stop_reason tool_use without tool_use blocks");
                return Ok(reply);
            }
            self.history
                .lock()
                .await
                .push(ChatMessage::tool_results(tool_results));
            tracing::debug!(round, "continuing tool loop");
        }

        tracing::warn!("turn hit the tool-round ceiling");
        Ok(reply)
    }

    /// Run one tool call. Per-call failures become failed results for
    /// the model; a dead runtime aborts the turn.
    async fn run_tool(
        &self,
        id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<ContentBlock> {
        tracing::debug!(tool = name, "executing tool call");

        match self.dispatcher.dispatch(name, input).await {
            Ok(output) => {
                self.memory
                    .record_action(ActionRecord::new(name, summarize(input), true))
                    .await;
                Ok(ContentBlock::tool_result(id, output))
            }
            Err(ToolError::Isolation(e @ IsolationError::NotRunning)) => {
                // No session to run against: nothing else in this turn
                // can succeed either.
                Err(SolaceError::Isolation(e))
            }
            Err(e) => {
                self.memory
                    .record_action(ActionRecord::new(name, summarize(input), false))
                    .await;
                Ok(ContentBlock::tool_error(id, e.to_string()))
            }
        }
    }
}

fn worker_note(
    target: WorkerKind,
    success: bool,
    output: &str,
    next_steps: Option<&str>,
) -> String {
    let mut note = format!(
        "[{:?} worker {}] {}",
        target,
        if success { "ok" } else { "failed" },
        output.trim()
    );
    if let Some(steps) = next_steps {
        note.push_str(&format!(" (next: {})", steps));
    }
    note
}

fn summarize(input: &serde_json::Value) -> String {
    let raw = input.to_string();
    if raw.len() <= 120 {
        return raw;
    }
    let mut end = 120;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &raw[..end])
}
