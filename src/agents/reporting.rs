//! Reporting worker: deadline decomposition.
//!
//! Given a title, description, and due date, the worker computes weeks
//! remaining, buckets the urgency phase, and generates an ordered
//! microtask list from four fixed stage templates. Each stage lands on a
//! plan week derived from its position in the timeline, clipped to >= 1.

use std::sync::Mutex as StdMutex;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::agents::{AgentResult, AgentTask, Worker, WorkerKind, WorkerStatus};
use crate::memory::{
    AgentContribution, Assignee, Deadline, Microtask, MicrotaskStatus, weeks_until,
};

/// One fixed planning stage.
struct StageTemplate {
    name: &'static str,
    /// Position along the timeline, 0.0 = start, 1.0 = due date.
    position: f64,
    task_title: &'static str,
    estimate_minutes: u32,
    assignee: Assignee,
}

const STAGES: &[StageTemplate] = &[
    StageTemplate {
        name: "planning",
        position: 0.0,
        task_title: "Outline scope, success criteria, and required material",
        estimate_minutes: 60,
        assignee: Assignee::Both,
    },
    StageTemplate {
        name: "building",
        position: 0.4,
        task_title: "Produce a complete first draft",
        estimate_minutes: 180,
        assignee: Assignee::User,
    },
    StageTemplate {
        name: "refining",
        position: 0.7,
        task_title: "Revise the draft against the success criteria",
        estimate_minutes: 90,
        assignee: Assignee::Both,
    },
    StageTemplate {
        name: "finalizing",
        position: 0.9,
        task_title: "Final review, formatting, and submission prep",
        estimate_minutes: 45,
        assignee: Assignee::User,
    },
];

/// Decompose a deadline into the four-stage plan.
pub fn decompose(
    title: impl Into<String>,
    description: impl Into<String>,
    due_date: DateTime<Utc>,
) -> Deadline {
    let mut deadline = Deadline::new(title, description, due_date);
    let weeks_out = weeks_until(due_date).max(1);

    let mut previous: Option<Uuid> = None;
    for stage in STAGES {
        // Week offset clipped to >= 1 so short runways still get a plan.
        let due_week = ((weeks_out as f64 * stage.position).round() as u32).max(1);
        let task = Microtask {
            id: Uuid::new_v4(),
            title: format!("{}: {}", stage.task_title, deadline.title),
            estimate_minutes: stage.estimate_minutes,
            assignee: stage.assignee,
            status: MicrotaskStatus::Pending,
            due_week,
            contributes_to: stage.name.to_string(),
            depends_on: previous.into_iter().collect(),
            completed_at: None,
            result: None,
        };
        previous = Some(task.id);
        deadline.microtasks.push(task);
    }

    deadline.contributions.push(AgentContribution {
        description: "gather supporting material and prior art".to_string(),
        worker: "research".to_string(),
    });
    deadline.contributions.push(AgentContribution {
        description: "track progress and escalate reminder cadence by phase".to_string(),
        worker: "companion".to_string(),
    });

    deadline.recompute();
    deadline
}

/// Worker decomposing deadlines into plans.
pub struct ReportingWorker {
    status: StdMutex<WorkerStatus>,
}

impl ReportingWorker {
    pub fn new() -> Self {
        Self {
            status: StdMutex::new(WorkerStatus::Idle),
        }
    }

    /// Parse `title | description | ISO date` out of a task payload,
    /// falling back to the whole payload as title, due in four weeks.
    fn parse_input(input: &str) -> (String, String, DateTime<Utc>) {
        let parts: Vec<&str> = input.splitn(3, '|').map(str::trim).collect();
        let title = parts.first().copied().unwrap_or("untitled").to_string();
        let description = parts.get(1).copied().unwrap_or("").to_string();
        let due = parts
            .get(2)
            .and_then(|raw| raw.parse::<DateTime<Utc>>().ok())
            .unwrap_or_else(|| Utc::now() + chrono::TimeDelta::weeks(4));
        (title, description, due)
    }
}

impl Default for ReportingWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Worker for ReportingWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Reporting
    }

    fn status(&self) -> WorkerStatus {
        *self.status.lock().unwrap()
    }

    async fn execute(&self, task: AgentTask) -> AgentResult {
        *self.status.lock().unwrap() = WorkerStatus::Thinking;
        let started = Instant::now();

        let (title, description, due) = Self::parse_input(&task.input);
        let deadline = decompose(title, description, due);

        let mut output = format!(
            "Plan for '{}' (due {}, {:?} phase, {} weeks out):\n",
            deadline.title,
            deadline.due_date.format("%Y-%m-%d"),
            deadline.phase,
            deadline.weeks_out
        );
        for task in &deadline.microtasks {
            output.push_str(&format!(
                "- week {}: [{}] {} ({} min, {:?})\n",
                task.due_week, task.contributes_to, task.title, task.estimate_minutes, task.assignee
            ));
        }

        *self.status.lock().unwrap() = WorkerStatus::Idle;
        AgentResult::ok(output, started.elapsed())
            .with_artifact(serde_json::to_string(&deadline).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::TaskKind;
    use crate::memory::DeadlinePhase;
    use chrono::TimeDelta;

    #[test]
    fn test_decompose_generates_four_ordered_stages() {
        let deadline = decompose("thesis chapter", "chapter 3", Utc::now() + TimeDelta::weeks(10));

        assert_eq!(deadline.microtasks.len(), 4);
        assert_eq!(deadline.phase, DeadlinePhase::Planning);
        let stages: Vec<&str> = deadline
            .microtasks
            .iter()
            .map(|t| t.contributes_to.as_str())
            .collect();
        assert_eq!(stages, ["planning", "building", "refining", "finalizing"]);

        // Weeks are ordered and each later task depends on the previous.
        let weeks: Vec<u32> = deadline.microtasks.iter().map(|t| t.due_week).collect();
        assert!(weeks.windows(2).all(|w| w[0] <= w[1]));
        for pair in deadline.microtasks.windows(2) {
            assert_eq!(pair[1].depends_on, vec![pair[0].id]);
        }
    }

    #[test]
    fn test_short_runway_clips_weeks_to_one() {
        let deadline = decompose("overdue thing", "", Utc::now() - TimeDelta::days(3));
        assert!(deadline.microtasks.iter().all(|t| t.due_week >= 1));
        assert_eq!(deadline.phase, DeadlinePhase::Taskforce);
    }

    #[test]
    fn test_two_week_deadline_first_completion_is_quarter() {
        let mut deadline = decompose("paper", "", Utc::now() + TimeDelta::weeks(2));
        assert_eq!(deadline.phase, DeadlinePhase::Focusing);

        deadline.microtasks[0].status = MicrotaskStatus::Done;
        deadline.recompute();
        assert_eq!(deadline.progress_percent, 25);
    }

    #[tokio::test]
    async fn test_worker_parses_structured_payload() {
        let worker = ReportingWorker::new();
        let due = (Utc::now() + TimeDelta::weeks(6)).to_rfc3339();
        let result = worker
            .execute(AgentTask::new(
                TaskKind::Deadline,
                format!("grant application | NSF round | {due}"),
            ))
            .await;

        assert!(result.success);
        assert!(result.output.contains("grant application"));
        assert_eq!(result.artifacts.len(), 1);
        let deadline: Deadline = serde_json::from_str(&result.artifacts[0]).unwrap();
        assert_eq!(deadline.microtasks.len(), 4);
    }
}
