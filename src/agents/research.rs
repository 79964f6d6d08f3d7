//! Research worker.
//!
//! Expands a natural-language query into a search strategy: domain-term
//! lookup expansion, controlled-vocabulary terms, and date/type filters.
//! The worker performs no network I/O itself; executing the strategy is
//! left to an external collaborator.

use std::sync::Mutex as StdMutex;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agents::{AgentResult, AgentTask, Worker, WorkerKind, WorkerStatus};

/// Lay phrasing mapped to controlled-vocabulary terms.
const DOMAIN_TERMS: &[(&str, &[&str])] = &[
    ("heart attack", &["myocardial infarction"]),
    ("high blood pressure", &["hypertension"]),
    ("stroke", &["cerebrovascular accident"]),
    ("cancer", &["neoplasms", "oncology"]),
    ("depression", &["depressive disorder", "major depressive disorder"]),
    ("anxiety", &["anxiety disorders", "generalized anxiety"]),
    ("sleep problems", &["sleep wake disorders", "insomnia"]),
    ("memory loss", &["cognitive dysfunction", "amnesia"]),
    ("machine learning", &["artificial intelligence", "deep learning"]),
];

/// Date/type filters attached to a strategy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Publication window, e.g. "last 5 years".
    pub date_range: Option<String>,
    /// Document types to prefer.
    pub doc_types: Vec<String>,
}

/// An expanded search plan for one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub original_query: String,
    /// Query variants, original first.
    pub queries: Vec<String>,
    /// Controlled-vocabulary terms matched from the query.
    pub vocabulary_terms: Vec<String>,
    pub filters: SearchFilters,
}

impl SearchStrategy {
    /// Expand a query through the fixed domain-term table.
    pub fn expand(query: &str) -> Self {
        let lower = query.to_lowercase();

        let mut vocabulary_terms = Vec::new();
        for (lay, terms) in DOMAIN_TERMS {
            if lower.contains(lay) {
                for term in *terms {
                    vocabulary_terms.push((*term).to_string());
                }
            }
        }

        let mut queries = vec![query.to_string()];
        for term in &vocabulary_terms {
            let mut variant = lower.clone();
            for (lay, terms) in DOMAIN_TERMS {
                if terms.contains(&term.as_str()) {
                    variant = variant.replace(lay, term);
                }
            }
            if variant != lower && !queries.contains(&variant) {
                queries.push(variant);
            }
        }

        let mut filters = SearchFilters::default();
        if lower.contains("recent") || lower.contains("latest") || lower.contains("new ") {
            filters.date_range = Some("last 5 years".to_string());
        }
        if lower.contains("review") || lower.contains("overview") {
            filters.doc_types.push("review".to_string());
        }
        if lower.contains("trial") || lower.contains("study") {
            filters.doc_types.push("clinical trial".to_string());
        }

        Self {
            original_query: query.to_string(),
            queries,
            vocabulary_terms,
            filters,
        }
    }
}

/// Worker turning queries into search strategies.
pub struct ResearchWorker {
    status: StdMutex<WorkerStatus>,
}

impl ResearchWorker {
    pub fn new() -> Self {
        Self {
            status: StdMutex::new(WorkerStatus::Idle),
        }
    }
}

impl Default for ResearchWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Worker for ResearchWorker {
    fn kind(&self) -> WorkerKind {
        WorkerKind::Research
    }

    fn status(&self) -> WorkerStatus {
        *self.status.lock().unwrap()
    }

    async fn execute(&self, task: AgentTask) -> AgentResult {
        *self.status.lock().unwrap() = WorkerStatus::Thinking;
        let started = Instant::now();

        let strategy = SearchStrategy::expand(&task.input);
        let output = match serde_json::to_string_pretty(&strategy) {
            Ok(json) => json,
            Err(e) => {
                *self.status.lock().unwrap() = WorkerStatus::Idle;
                return AgentResult::failure(e.to_string(), started.elapsed());
            }
        };

        *self.status.lock().unwrap() = WorkerStatus::Idle;
        AgentResult::ok(output, started.elapsed())
            .with_next_steps("hand the strategy to the search collaborator")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::TaskKind;

    #[test]
    fn test_expansion_adds_vocabulary_terms() {
        let strategy = SearchStrategy::expand("recent studies on heart attack recovery");
        assert_eq!(strategy.queries[0], "recent studies on heart attack recovery");
        assert!(strategy
            .vocabulary_terms
            .contains(&"myocardial infarction".to_string()));
        assert!(strategy
            .queries
            .iter()
            .any(|q| q.contains("myocardial infarction")));
        assert_eq!(strategy.filters.date_range.as_deref(), Some("last 5 years"));
        assert!(strategy
            .filters
            .doc_types
            .contains(&"clinical trial".to_string()));
    }

    #[test]
    fn test_unmatched_query_passes_through() {
        let strategy = SearchStrategy::expand("rust async runtimes");
        assert_eq!(strategy.queries, vec!["rust async runtimes".to_string()]);
        assert!(strategy.vocabulary_terms.is_empty());
        assert!(strategy.filters.date_range.is_none());
    }

    #[tokio::test]
    async fn test_worker_returns_strategy_without_network() {
        let worker = ResearchWorker::new();
        let result = worker
            .execute(AgentTask::new(
                TaskKind::Research,
                "pubmed review of depression treatments",
            ))
            .await;

        assert!(result.success);
        let strategy: SearchStrategy = serde_json::from_str(&result.output).unwrap();
        assert!(strategy
            .vocabulary_terms
            .contains(&"depressive disorder".to_string()));
        assert_eq!(worker.status(), WorkerStatus::Idle);
    }
}
