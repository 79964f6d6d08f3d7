//! Companion worker: the primary delegator.
//!
//! Owns the specialist pool and the global deadline-mode flag. Tasks for
//! a busy specialist are queued, never dropped; queued work drains when
//! the target goes idle. While deadline mode is active the default task
//! priority is critical and the reminder cadence tracks the most urgent
//! deadline's phase.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::agents::{
    AgentResult, AgentTask, Priority, TaskKind, Worker, WorkerKind, WorkerStatus,
};
use crate::memory::{DeadlinePhase, MemoryStore};

/// Notifications emitted by the companion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    DeadlineModeChanged(bool),
    TaskDelegated { worker: WorkerKind, task_id: Uuid },
    TaskQueued { worker: WorkerKind, task_id: Uuid },
}

/// Reminder cadence, escalating with deadline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Cadence {
    Weekly,
    TwiceWeekly,
    Daily,
    TwiceDaily,
    Continuous,
}

impl Cadence {
    pub fn for_phase(phase: DeadlinePhase) -> Self {
        match phase {
            DeadlinePhase::Planning => Cadence::Weekly,
            DeadlinePhase::Building => Cadence::TwiceWeekly,
            DeadlinePhase::Accelerating => Cadence::Daily,
            DeadlinePhase::Focusing => Cadence::TwiceDaily,
            DeadlinePhase::Taskforce => Cadence::Continuous,
        }
    }
}

/// What happened when a task was handed to a specialist.
#[derive(Debug)]
pub enum DelegationOutcome {
    Executed(AgentResult),
    /// The target was busy; the task waits in the queue.
    Queued,
}

/// The primary worker: handles conversational tasks itself and delegates
/// the rest.
pub struct CompanionWorker {
    specialists: HashMap<WorkerKind, Arc<dyn Worker>>,
    queue: StdMutex<VecDeque<(WorkerKind, AgentTask)>>,
    deadline_mode: AtomicBool,
    status: StdMutex<WorkerStatus>,
    memory: Arc<MemoryStore>,
    events: broadcast::Sender<AgentEvent>,
}

impl CompanionWorker {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            specialists: HashMap::new(),
            queue: StdMutex::new(VecDeque::new()),
            deadline_mode: AtomicBool::new(false),
            status: StdMutex::new(WorkerStatus::Idle),
            memory,
            events,
        }
    }

    /// Register a specialist in the pool.
    pub fn with_specialist(mut self, worker: Arc<dyn Worker>) -> Self {
        self.specialists.insert(worker.kind(), worker);
        self
    }

    /// Subscribe to companion notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    /// Whether deadline mode is active.
    pub fn deadline_mode(&self) -> bool {
        self.deadline_mode.load(Ordering::SeqCst)
    }

    /// Flip deadline mode, broadcasting on change.
    ///
    /// Simultaneous activations from independent deadlines do not
    /// compose; the latest call wins.
    pub fn set_deadline_mode(&self, active: bool) {
        if self.deadline_mode.swap(active, Ordering::SeqCst) != active {
            tracing::info!(active, "deadline mode changed");
            let _ = self.events.send(AgentEvent::DeadlineModeChanged(active));
        }
    }

    /// Default priority for new tasks under the current mode.
    pub fn default_priority(&self) -> Priority {
        if self.deadline_mode() {
            Priority::Critical
        } else {
            Priority::Normal
        }
    }

    /// Scan upcoming deadlines: activate deadline mode when one has
    /// arrived at its final weeks, and report the reminder cadence for
    /// the most urgent phase.
    pub async fn check_deadlines(&self) -> Option<Cadence> {
        let deadlines = self.memory.upcoming_deadlines(10).await;
        let most_urgent = deadlines.iter().map(|d| d.phase).max()?;

        self.set_deadline_mode(most_urgent >= DeadlinePhase::Focusing);
        Some(Cadence::for_phase(most_urgent))
    }

    /// Hand a task to a specialist, queueing if it is busy.
    pub async fn delegate(&self, kind: WorkerKind, task: AgentTask) -> DelegationOutcome {
        let Some(worker) = self.specialists.get(&kind) else {
            return DelegationOutcome::Executed(AgentResult::failure(
                format!("no {:?} worker registered", kind),
                std::time::Duration::ZERO,
            ));
        };

        if worker.status() != WorkerStatus::Idle {
            let _ = self.events.send(AgentEvent::TaskQueued {
                worker: kind,
                task_id: task.id,
            });
            self.queue.lock().unwrap().push_back((kind, task));
            return DelegationOutcome::Queued;
        }

        let _ = self.events.send(AgentEvent::TaskDelegated {
            worker: kind,
            task_id: task.id,
        });
        let task = task.forwarded_by("companion");
        DelegationOutcome::Executed(worker.execute(task).await)
    }

    /// Drain queued tasks whose target is now idle, in arrival order.
    pub async fn pump_queue(&self) -> Vec<(Uuid, AgentResult)> {
        let mut completed = Vec::new();

        loop {
            let next = {
                let mut queue = self.queue.lock().unwrap();
                let ready = queue.iter().position(|(kind, _)| {
                    self.specialists
                        .get(kind)
                        .is_some_and(|w| w.status() == WorkerStatus::Idle)
                });
                match ready {
                    Some(index) => queue.remove(index),
                    None => None,
                }
            };

            let Some((kind, task)) = next else { break };
            let task_id = task.id;
            if let DelegationOutcome::Executed(result) = self.delegate(kind, task).await {
                completed.push((task_id, result));
            }
        }

        completed
    }

    /// Queued tasks waiting for a specialist.
    pub fn queued_tasks(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Compose an email briefing from the contact database.
    async fn handle_email(&self, task: &AgentTask) -> String {
        let input_lower = task.input.to_lowercase();
        let contacts = self.memory.contacts().await;
        let recipient = contacts
            .iter()
            .find(|c| input_lower.contains(&c.name.to_lowercase()));

        match recipient {
            Some(contact) => {
                let mut brief = format!("Drafting for {}", contact.name);
                if let Some(style) = &contact.conversation_style {
                    brief.push_str(&format!(" ({} tone)", style));
                }
                if let Some(sample) = &contact.style_sample {
                    brief.push_str(&format!("; match their style: \"{}\"", sample));
                }
                brief
            }
            None => "No matching contact on file; drafting with a neutral tone".to_string(),
        }
    }
}

#[async_trait]
impl Worker for CompanionWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Companion
    }

    fn status(&self) -> WorkerStatus {
        *self.status.lock().unwrap()
    }

    async fn execute(&self, task: AgentTask) -> AgentResult {
        *self.status.lock().unwrap() = WorkerStatus::Executing;
        let started = Instant::now();

        let result = match task.kind {
            TaskKind::Code => match self.delegate(WorkerKind::Code, task).await {
                DelegationOutcome::Executed(result) => result,
                DelegationOutcome::Queued => AgentResult::ok(
                    "code worker is busy; task queued",
                    started.elapsed(),
                ),
            },
            TaskKind::Research => match self.delegate(WorkerKind::Research, task).await {
                DelegationOutcome::Executed(result) => result,
                DelegationOutcome::Queued => AgentResult::ok(
                    "research worker is busy; task queued",
                    started.elapsed(),
                ),
            },
            TaskKind::Deadline => match self.delegate(WorkerKind::Reporting, task).await {
                DelegationOutcome::Executed(result) => result,
                DelegationOutcome::Queued => AgentResult::ok(
                    "reporting worker is busy; task queued",
                    started.elapsed(),
                ),
            },
            TaskKind::Digest => {
                let digest = self.memory.build_digest().await;
                AgentResult::ok(digest, started.elapsed())
            }
            TaskKind::Email => {
                let brief = self.handle_email(&task).await;
                AgentResult::ok(brief, started.elapsed())
            }
            TaskKind::Journal | TaskKind::Questionnaire | TaskKind::Conversation => {
                // Conversational turns are driven by the model loop; the
                // companion contributes mode context.
                let mut output = String::new();
                if self.deadline_mode() {
                    output.push_str("deadline mode active; keep replies focused. ");
                }
                output.push_str("ready");
                AgentResult::ok(output, started.elapsed())
            }
        };

        *self.status.lock().unwrap() = WorkerStatus::Idle;
        result
    }
}
