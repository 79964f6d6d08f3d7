//! Durable cross-session memory: shared state, persisted databases, and
//! the validated questionnaire registry.

pub mod questionnaire;
pub mod store;
pub mod types;

pub use questionnaire::Questionnaire;
pub use store::{DEFAULT_FLUSH_INTERVAL, MemoryStore};
pub use types::{
    ACTION_RING_CAPACITY, ActionRecord, AgentContribution, AssessmentResult, Assignee, Contact,
    ConversationBuffer, Deadline, DeadlinePhase, DeadlineStatus, JournalDb, JournalEntry,
    MessageRecord, Microtask, MicrotaskStatus, Priority, ProjectContext, SharedMemory, Trend,
    UserProfile, WorkingMemory, compute_trend, weeks_until,
};
