//! Keyword intent classification and the task routing table.
//!
//! Classification matches normalized text against an ordered rule set;
//! the first rule with a hit wins. The keyword sets overlap by
//! construction, so order is part of the contract. Text matching nothing
//! falls through to plain conversation, which the companion handles.

use crate::agents::{TaskKind, WorkerKind};

/// Ordered keyword rules. First match wins.
const RULES: &[(TaskKind, &[&str])] = &[
    (
        TaskKind::Code,
        &[
            "debug",
            "run this",
            "run the script",
            "execute",
            "compile",
            "stack trace",
            "write a script",
            "fix this code",
            "python",
            "javascript",
        ],
    ),
    (
        TaskKind::Research,
        &[
            "pubmed",
            "research",
            "literature",
            "find papers",
            "find studies",
            "search for articles",
            "citation",
        ],
    ),
    (
        TaskKind::Email,
        &["email", "write to", "reply to", "draft a message"],
    ),
    (
        TaskKind::Deadline,
        &[
            "deadline",
            "due date",
            "due on",
            "submission",
            "microtask",
            "exam on",
        ],
    ),
    (
        TaskKind::Questionnaire,
        &["questionnaire", "phq", "gad-7", "assessment", "screening"],
    ),
    (
        TaskKind::Journal,
        &["journal", "diary", "log my day", "today i felt", "my mood"],
    ),
    (
        TaskKind::Digest,
        &["digest", "daily summary", "what's on my plate", "overview of my week"],
    ),
];

/// Classify a message into a task tag.
pub fn classify(text: &str) -> TaskKind {
    let normalized = text.to_lowercase();
    for (kind, keywords) in RULES {
        if keywords.iter().any(|k| normalized.contains(k)) {
            return *kind;
        }
    }
    TaskKind::Conversation
}

/// Static routing table from task tag to target worker.
///
/// Anything without a specialist goes to the companion.
pub fn worker_for(kind: TaskKind) -> WorkerKind {
    match kind {
        TaskKind::Code => WorkerKind::Code,
        TaskKind::Research => WorkerKind::Research,
        TaskKind::Deadline => WorkerKind::Reporting,
        TaskKind::Email
        | TaskKind::Journal
        | TaskKind::Questionnaire
        | TaskKind::Digest
        | TaskKind::Conversation => WorkerKind::Companion,
    }
}
