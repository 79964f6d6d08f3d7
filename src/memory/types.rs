//! Value types for cross-session memory: working scratch, conversation
//! buffer, and the durable contact/deadline/journal databases.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How many recent actions the working scratch keeps.
pub const ACTION_RING_CAPACITY: usize = 50;

/// Priority attached to tasks and deadlines.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A record of one action taken while driving a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub tool_name: String,
    pub summary: String,
    pub success: bool,
    pub executed_at: DateTime<Utc>,
}

impl ActionRecord {
    pub fn new(tool_name: impl Into<String>, summary: impl Into<String>, success: bool) -> Self {
        Self {
            tool_name: tool_name.into(),
            summary: summary.into(),
            success,
            executed_at: Utc::now(),
        }
    }
}

/// Task-scoped scratch state, not persisted.
#[derive(Debug, Clone, Default)]
pub struct WorkingMemory {
    pub current_task: Option<String>,
    pub active_files: Vec<String>,
    /// Ring buffer of the most recent actions.
    pub recent_actions: VecDeque<ActionRecord>,
}

impl WorkingMemory {
    /// Push an action, evicting the oldest once the ring is full.
    pub fn record_action(&mut self, action: ActionRecord) {
        if self.recent_actions.len() == ACTION_RING_CAPACITY {
            self.recent_actions.pop_front();
        }
        self.recent_actions.push_back(action);
    }
}

/// One remembered conversation message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub role: String,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// Conversation state carried across turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationBuffer {
    pub messages: Vec<MessageRecord>,
    pub key_facts: Vec<String>,
    pub summary: Option<String>,
}

/// Who the assistant is working for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub occupation: Option<String>,
    pub preferences: Vec<String>,
}

/// What the assistant is working on.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectContext {
    pub name: Option<String>,
    pub description: Option<String>,
    pub paths: Vec<String>,
}

/// A person the user communicates with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub channels: Vec<String>,
    /// How this person writes (formal, terse, emoji-heavy, ...).
    pub conversation_style: Option<String>,
    /// A representative message used as a style fingerprint.
    pub style_sample: Option<String>,
    pub relationship: Option<String>,
    pub notes: Option<String>,
}

impl Contact {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: None,
            channels: Vec::new(),
            conversation_style: None,
            style_sample: None,
            relationship: None,
            notes: None,
        }
    }
}

/// Coarse urgency bucket, derived purely from weeks remaining.
///
/// Ordered by urgency: `Planning < Building < ... < Taskforce`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlinePhase {
    Planning,
    Building,
    Accelerating,
    Focusing,
    Taskforce,
}

impl DeadlinePhase {
    /// Bucket weeks-remaining into a phase. Thresholds sit at 10, 6, 3,
    /// and 1 weeks out.
    pub fn from_weeks_out(weeks_out: i64) -> Self {
        if weeks_out >= 10 {
            DeadlinePhase::Planning
        } else if weeks_out >= 6 {
            DeadlinePhase::Building
        } else if weeks_out >= 3 {
            DeadlinePhase::Accelerating
        } else if weeks_out >= 1 {
            DeadlinePhase::Focusing
        } else {
            DeadlinePhase::Taskforce
        }
    }
}

/// Weeks between now and `due`, rounded up to whole weeks; zero or
/// negative when the final week has arrived.
pub fn weeks_until(due: DateTime<Utc>) -> i64 {
    let days = (due - Utc::now()).num_days();
    (days + 6).div_euclid(7)
}

/// Who a microtask is assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assignee {
    User,
    Agent,
    Both,
}

/// State of a microtask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicrotaskStatus {
    #[default]
    Pending,
    InProgress,
    Done,
}

/// The smallest schedulable unit contributing to a deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Microtask {
    pub id: Uuid,
    pub title: String,
    pub estimate_minutes: u32,
    pub assignee: Assignee,
    pub status: MicrotaskStatus,
    /// Week of the plan this task belongs to (1-based).
    pub due_week: u32,
    /// Which stage of the plan this task contributes to.
    pub contributes_to: String,
    pub depends_on: Vec<Uuid>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<String>,
}

/// Work a worker has planned toward a deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContribution {
    pub description: String,
    pub worker: String,
}

/// State of a deadline as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeadlineStatus {
    #[default]
    Active,
    Done,
    Abandoned,
}

/// A tracked due date with its decomposed plan.
///
/// `weeks_out`, `phase`, `completed_microtasks`, and `progress_percent`
/// are derived: [`Deadline::recompute`] refreshes them together so they
/// cannot diverge. They are never set directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deadline {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub priority: Priority,
    pub weeks_out: i64,
    pub phase: DeadlinePhase,
    pub microtasks: Vec<Microtask>,
    pub completed_microtasks: usize,
    pub progress_percent: u8,
    pub contributions: Vec<AgentContribution>,
    pub status: DeadlineStatus,
    pub tags: Vec<String>,
}

impl Deadline {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        due_date: DateTime<Utc>,
    ) -> Self {
        let mut deadline = Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            due_date,
            created_at: Utc::now(),
            priority: Priority::Normal,
            weeks_out: 0,
            phase: DeadlinePhase::Planning,
            microtasks: Vec::new(),
            completed_microtasks: 0,
            progress_percent: 0,
            contributions: Vec::new(),
            status: DeadlineStatus::Active,
            tags: Vec::new(),
        };
        deadline.recompute();
        deadline
    }

    /// Refresh every derived field from the ground truth.
    pub fn recompute(&mut self) {
        self.weeks_out = weeks_until(self.due_date);
        self.phase = DeadlinePhase::from_weeks_out(self.weeks_out);

        let total = self.microtasks.len();
        self.completed_microtasks = self
            .microtasks
            .iter()
            .filter(|t| t.status == MicrotaskStatus::Done)
            .count();
        self.progress_percent = if total == 0 {
            0
        } else {
            (self.completed_microtasks * 100 / total) as u8
        };

        if total > 0 && self.completed_microtasks == total {
            self.status = DeadlineStatus::Done;
        }
    }
}

/// One journal entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub text: String,
    /// 1..=10 when the user reported one.
    pub mood: Option<u8>,
    /// 1..=10 when the user reported one.
    pub energy: Option<u8>,
}

impl JournalEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            at: Utc::now(),
            text: text.into(),
            mood: None,
            energy: None,
        }
    }
}

/// Direction of an assessment score relative to recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// A completed validated questionnaire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentResult {
    pub id: Uuid,
    pub questionnaire_id: String,
    pub at: DateTime<Utc>,
    pub score: u32,
    pub severity: String,
    pub trend: Trend,
}

/// Compare a new score against the mean of the most recent prior scores.
///
/// Symptom scales score downward: a drop of more than 2 points against
/// the prior mean reads as improvement. Fewer than one prior score reads
/// as stable.
pub fn compute_trend(prior_scores: &[u32], new_score: u32) -> Trend {
    let recent: Vec<u32> = prior_scores.iter().rev().take(3).copied().collect();
    if recent.is_empty() {
        return Trend::Stable;
    }
    let mean = recent.iter().sum::<u32>() as f64 / recent.len() as f64;
    let diff = new_score as f64 - mean;
    if diff < -2.0 {
        Trend::Improving
    } else if diff > 2.0 {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// The journal database: free-form entries plus assessment history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalDb {
    pub entries: Vec<JournalEntry>,
    pub assessments: Vec<AssessmentResult>,
}

/// Everything the agents share across a session.
#[derive(Debug, Clone, Default)]
pub struct SharedMemory {
    pub working: WorkingMemory,
    pub conversation: ConversationBuffer,
    pub user_profile: UserProfile,
    pub project: ProjectContext,
    pub contacts: Vec<Contact>,
    pub deadlines: Vec<Deadline>,
    pub journal: JournalDb,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_phase_thresholds() {
        assert_eq!(DeadlinePhase::from_weeks_out(12), DeadlinePhase::Planning);
        assert_eq!(DeadlinePhase::from_weeks_out(10), DeadlinePhase::Planning);
        assert_eq!(DeadlinePhase::from_weeks_out(9), DeadlinePhase::Building);
        assert_eq!(DeadlinePhase::from_weeks_out(6), DeadlinePhase::Building);
        assert_eq!(DeadlinePhase::from_weeks_out(5), DeadlinePhase::Accelerating);
        assert_eq!(DeadlinePhase::from_weeks_out(3), DeadlinePhase::Accelerating);
        assert_eq!(DeadlinePhase::from_weeks_out(2), DeadlinePhase::Focusing);
        assert_eq!(DeadlinePhase::from_weeks_out(1), DeadlinePhase::Focusing);
        assert_eq!(DeadlinePhase::from_weeks_out(0), DeadlinePhase::Taskforce);
        assert_eq!(DeadlinePhase::from_weeks_out(-2), DeadlinePhase::Taskforce);
    }

    #[test]
    fn test_phase_monotonic_in_urgency() {
        let mut last = DeadlinePhase::from_weeks_out(20);
        for weeks in (0..20).rev() {
            let phase = DeadlinePhase::from_weeks_out(weeks);
            assert!(phase >= last, "phase regressed at {weeks}");
            last = phase;
        }
    }

    #[test]
    fn test_deadline_two_weeks_out_is_focusing() {
        let deadline = Deadline::new("paper", "", Utc::now() + TimeDelta::weeks(2));
        assert_eq!(deadline.phase, DeadlinePhase::Focusing);
        assert_eq!(deadline.weeks_out, 2);
    }

    #[test]
    fn test_progress_derivation() {
        let mut deadline = Deadline::new("thing", "", Utc::now() + TimeDelta::weeks(4));
        for i in 0..4 {
            deadline.microtasks.push(Microtask {
                id: Uuid::new_v4(),
                title: format!("task {i}"),
                estimate_minutes: 30,
                assignee: Assignee::User,
                status: MicrotaskStatus::Pending,
                due_week: 1,
                contributes_to: "planning".to_string(),
                depends_on: Vec::new(),
                completed_at: None,
                result: None,
            });
        }
        deadline.recompute();
        assert_eq!(deadline.progress_percent, 0);
        assert_eq!(deadline.status, DeadlineStatus::Active);

        deadline.microtasks[0].status = MicrotaskStatus::Done;
        deadline.recompute();
        assert_eq!(deadline.progress_percent, 25);
        assert_eq!(deadline.status, DeadlineStatus::Active);

        for task in &mut deadline.microtasks {
            task.status = MicrotaskStatus::Done;
        }
        deadline.recompute();
        assert_eq!(deadline.progress_percent, 100);
        assert_eq!(deadline.status, DeadlineStatus::Done);
    }

    #[test]
    fn test_trend_bands() {
        assert_eq!(compute_trend(&[], 10), Trend::Stable);
        // Prior mean 12: within the ±2 band.
        assert_eq!(compute_trend(&[12, 12, 12], 13), Trend::Stable);
        assert_eq!(compute_trend(&[12, 12, 12], 9), Trend::Improving);
        assert_eq!(compute_trend(&[12, 12, 12], 15), Trend::Declining);
        // Only the 3 most recent priors count: mean of [10,10,10] = 10.
        assert_eq!(compute_trend(&[30, 30, 10, 10, 10], 10), Trend::Stable);
    }

    #[test]
    fn test_action_ring_caps_at_fifty() {
        let mut working = WorkingMemory::default();
        for i in 0..60 {
            working.record_action(ActionRecord::new("bash", format!("cmd {i}"), true));
        }
        assert_eq!(working.recent_actions.len(), ACTION_RING_CAPACITY);
        assert_eq!(working.recent_actions.front().unwrap().summary, "cmd 10");
    }
}
