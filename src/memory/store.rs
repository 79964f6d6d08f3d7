//! The durable memory store.
//!
//! Owns the single [`SharedMemory`] value. The contact, deadline, and
//! journal databases persist as one JSON document each under the data
//! directory; missing files are tolerated at startup. A background task
//! flushes on a fixed interval, but only when a mutating accessor has set
//! the dirty flag since the last flush. Disposal forces one final flush.

use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::MemoryError;
use crate::memory::questionnaire;
use crate::memory::types::{
    ActionRecord, AssessmentResult, Contact, Deadline, DeadlinePhase, JournalDb, JournalEntry,
    MessageRecord, MicrotaskStatus, SharedMemory, UserProfile, compute_trend,
};

const CONTACTS_FILE: &str = "contacts.json";
const DEADLINES_FILE: &str = "deadlines.json";
const JOURNAL_FILE: &str = "journal.json";

/// Default interval between dirty-flag flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Durable cross-session state with periodic dirty-flag persistence.
pub struct MemoryStore {
    data_dir: PathBuf,
    inner: RwLock<SharedMemory>,
    dirty: AtomicBool,
    autosave: StdMutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    /// Load persisted databases from `data_dir`, tolerating missing files.
    pub async fn load(data_dir: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let data_dir = data_dir.into();

        let mut memory = SharedMemory {
            contacts: read_db(&data_dir.join(CONTACTS_FILE)).await?,
            deadlines: read_db(&data_dir.join(DEADLINES_FILE)).await?,
            journal: read_db::<JournalDb>(&data_dir.join(JOURNAL_FILE))
                .await?,
            ..Default::default()
        };

        // Derived deadline fields age while the process is down.
        for deadline in &mut memory.deadlines {
            deadline.recompute();
        }

        tracing::info!(
            contacts = memory.contacts.len(),
            deadlines = memory.deadlines.len(),
            journal_entries = memory.journal.entries.len(),
            "memory store loaded"
        );

        Ok(Self {
            data_dir,
            inner: RwLock::new(memory),
            dirty: AtomicBool::new(false),
            autosave: StdMutex::new(None),
        })
    }

    /// Start the background flush task. The task ticks independently of
    /// request handling and writes only when the store is dirty.
    pub fn spawn_autosave(self: &std::sync::Arc<Self>, interval: Duration) {
        let store = std::sync::Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = store.flush_if_dirty().await {
                    tracing::warn!("autosave flush failed: {}", e);
                }
            }
        });

        if let Some(old) = self.autosave.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    /// Stop autosaving and force one final flush, dirty or not.
    pub async fn dispose(&self) -> Result<(), MemoryError> {
        if let Some(handle) = self.autosave.lock().unwrap().take() {
            handle.abort();
        }
        self.dirty.store(false, Ordering::SeqCst);
        self.flush().await
    }

    /// Whether unpersisted mutations exist.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Flush when dirty; clears the flag on success.
    pub async fn flush_if_dirty(&self) -> Result<(), MemoryError> {
        if !self.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.flush().await {
            self.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Write all three databases unconditionally.
    pub async fn flush(&self) -> Result<(), MemoryError> {
        tokio::fs::create_dir_all(&self.data_dir).await?;

        let (contacts, deadlines, journal) = {
            let memory = self.inner.read().await;
            (
                memory.contacts.clone(),
                memory.deadlines.clone(),
                memory.journal.clone(),
            )
        };

        write_db(&self.data_dir.join(CONTACTS_FILE), &contacts).await?;
        write_db(&self.data_dir.join(DEADLINES_FILE), &deadlines).await?;
        write_db(&self.data_dir.join(JOURNAL_FILE), &journal).await?;

        tracing::debug!("memory store flushed");
        Ok(())
    }

    // ---- contacts ----

    pub async fn add_contact(&self, contact: Contact) -> Uuid {
        let id = contact.id;
        self.inner.write().await.contacts.push(contact);
        self.mark_dirty();
        id
    }

    pub async fn find_contact(&self, name: &str) -> Option<Contact> {
        let needle = name.to_lowercase();
        self.inner
            .read()
            .await
            .contacts
            .iter()
            .find(|c| c.name.to_lowercase() == needle)
            .cloned()
    }

    pub async fn contacts(&self) -> Vec<Contact> {
        self.inner.read().await.contacts.clone()
    }

    // ---- deadlines ----

    pub async fn add_deadline(&self, mut deadline: Deadline) -> Uuid {
        deadline.recompute();
        let id = deadline.id;
        self.inner.write().await.deadlines.push(deadline);
        self.mark_dirty();
        id
    }

    pub async fn deadlines(&self) -> Vec<Deadline> {
        let mut memory = self.inner.write().await;
        for deadline in &mut memory.deadlines {
            deadline.recompute();
        }
        memory.deadlines.clone()
    }

    /// Active deadlines sorted by due date, nearest first.
    pub async fn upcoming_deadlines(&self, limit: usize) -> Vec<Deadline> {
        let mut deadlines: Vec<Deadline> = self
            .deadlines()
            .await
            .into_iter()
            .filter(|d| d.status == crate::memory::types::DeadlineStatus::Active)
            .collect();
        deadlines.sort_by_key(|d| d.due_date);
        deadlines.truncate(limit);
        deadlines
    }

    pub async fn find_deadline(&self, id: Uuid) -> Result<Deadline, MemoryError> {
        self.inner
            .read()
            .await
            .deadlines
            .iter()
            .find(|d| d.id == id)
            .cloned()
            .ok_or_else(|| MemoryError::not_found("deadline", id.to_string()))
    }

    /// Mark a microtask done. Progress percent and phase are recomputed
    /// together so they cannot diverge.
    pub async fn complete_microtask(
        &self,
        deadline_id: Uuid,
        microtask_id: Uuid,
        result: Option<String>,
    ) -> Result<(u8, DeadlinePhase), MemoryError> {
        let mut memory = self.inner.write().await;
        let deadline = memory
            .deadlines
            .iter_mut()
            .find(|d| d.id == deadline_id)
            .ok_or_else(|| MemoryError::not_found("deadline", deadline_id.to_string()))?;

        let microtask = deadline
            .microtasks
            .iter_mut()
            .find(|t| t.id == microtask_id)
            .ok_or_else(|| MemoryError::not_found("microtask", microtask_id.to_string()))?;

        microtask.status = MicrotaskStatus::Done;
        microtask.completed_at = Some(Utc::now());
        microtask.result = result;

        deadline.recompute();
        let outcome = (deadline.progress_percent, deadline.phase);
        drop(memory);

        self.mark_dirty();
        Ok(outcome)
    }

    // ---- journal ----

    pub async fn add_journal_entry(&self, entry: JournalEntry) -> Uuid {
        let id = entry.id;
        self.inner.write().await.journal.entries.push(entry);
        self.mark_dirty();
        id
    }

    pub async fn journal_entries(&self) -> Vec<JournalEntry> {
        self.inner.read().await.journal.entries.clone()
    }

    /// Score a questionnaire and append the result with its trend against
    /// the three most recent prior scores of the same instrument.
    pub async fn record_assessment(
        &self,
        questionnaire_id: &str,
        answers: &[u8],
    ) -> Result<AssessmentResult, MemoryError> {
        let instrument = questionnaire::get(questionnaire_id)?;
        let score = instrument.score(answers)?;

        let mut memory = self.inner.write().await;
        let prior_scores: Vec<u32> = memory
            .journal
            .assessments
            .iter()
            .filter(|a| a.questionnaire_id == questionnaire_id)
            .map(|a| a.score)
            .collect();

        let assessment = AssessmentResult {
            id: Uuid::new_v4(),
            questionnaire_id: questionnaire_id.to_string(),
            at: Utc::now(),
            score,
            severity: instrument.severity(score).to_string(),
            trend: compute_trend(&prior_scores, score),
        };
        memory.journal.assessments.push(assessment.clone());
        drop(memory);

        self.mark_dirty();
        Ok(assessment)
    }

    pub async fn assessments(&self) -> Vec<AssessmentResult> {
        self.inner.read().await.journal.assessments.clone()
    }

    // ---- working / conversation state ----

    pub async fn push_message(&self, role: impl Into<String>, text: impl Into<String>) {
        self.inner
            .write()
            .await
            .conversation
            .messages
            .push(MessageRecord {
                role: role.into(),
                text: text.into(),
                at: Utc::now(),
            });
    }

    pub async fn recent_messages(&self, n: usize) -> Vec<MessageRecord> {
        let memory = self.inner.read().await;
        let messages = &memory.conversation.messages;
        messages[messages.len().saturating_sub(n)..].to_vec()
    }

    pub async fn add_key_fact(&self, fact: impl Into<String>) {
        let fact = fact.into();
        let mut memory = self.inner.write().await;
        if !memory.conversation.key_facts.contains(&fact) {
            memory.conversation.key_facts.push(fact);
        }
    }

    pub async fn key_facts(&self, n: usize) -> Vec<String> {
        let memory = self.inner.read().await;
        let facts = &memory.conversation.key_facts;
        facts[facts.len().saturating_sub(n)..].to_vec()
    }

    pub async fn record_action(&self, action: ActionRecord) {
        self.inner.write().await.working.record_action(action);
    }

    pub async fn set_current_task(&self, task: Option<String>) {
        self.inner.write().await.working.current_task = task;
    }

    pub async fn user_profile(&self) -> UserProfile {
        self.inner.read().await.user_profile.clone()
    }

    pub async fn set_user_profile(&self, profile: UserProfile) {
        self.inner.write().await.user_profile = profile;
        self.mark_dirty();
    }

    // ---- digest ----

    /// Summarize upcoming deadlines and recent journal mood.
    pub async fn build_digest(&self) -> String {
        let deadlines = self.upcoming_deadlines(5).await;
        let entries = self.journal_entries().await;

        let mut digest = String::from("## Daily digest\n\n");

        if deadlines.is_empty() {
            digest.push_str("No active deadlines.\n");
        } else {
            digest.push_str("Upcoming deadlines:\n");
            for d in &deadlines {
                digest.push_str(&format!(
                    "- {} (due {}, {:?} phase, {}% done)\n",
                    d.title,
                    d.due_date.format("%Y-%m-%d"),
                    d.phase,
                    d.progress_percent
                ));
            }
        }

        let recent_moods: Vec<u8> = entries.iter().rev().take(7).filter_map(|e| e.mood).collect();
        if !recent_moods.is_empty() {
            let avg = recent_moods.iter().map(|&m| m as f64).sum::<f64>()
                / recent_moods.len() as f64;
            digest.push_str(&format!("\nAverage mood over recent entries: {:.1}/10\n", avg));
        }

        digest
    }
}

async fn read_db<T: DeserializeOwned + Default>(path: &Path) -> Result<T, MemoryError> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => Ok(serde_json::from_str(&raw)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(MemoryError::Io(e)),
    }
}

async fn write_db<T: Serialize>(path: &Path, value: &T) -> Result<(), MemoryError> {
    let raw = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, raw).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Assignee, Microtask, Trend};
    use chrono::TimeDelta;
    use std::sync::Arc;

    async fn store_in(dir: &tempfile::TempDir) -> MemoryStore {
        MemoryStore::load(dir.path()).await.unwrap()
    }

    fn microtask(title: &str) -> Microtask {
        Microtask {
            id: Uuid::new_v4(),
            title: title.to_string(),
            estimate_minutes: 30,
            assignee: Assignee::User,
            status: MicrotaskStatus::Pending,
            due_week: 1,
            contributes_to: "planning".to_string(),
            depends_on: Vec::new(),
            completed_at: None,
            result: None,
        }
    }

    #[tokio::test]
    async fn test_load_tolerates_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;
        assert!(store.contacts().await.is_empty());
        assert!(store.deadlines().await.is_empty());
        assert!(!store.is_dirty());
    }

    #[tokio::test]
    async fn test_mutation_sets_dirty_and_flush_clears_it() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        store.add_contact(Contact::new("Ada")).await;
        assert!(store.is_dirty());

        store.flush_if_dirty().await.unwrap();
        assert!(!store.is_dirty());
        assert!(dir.path().join("contacts.json").exists());
    }

    #[tokio::test]
    async fn test_persistence_roundtrip_rehydrates_dates() {
        let dir = tempfile::tempdir().unwrap();
        let due = Utc::now() + TimeDelta::weeks(4);
        {
            let store = store_in(&dir).await;
            store
                .add_deadline(Deadline::new("conference talk", "slides", due))
                .await;
            store
                .add_journal_entry(JournalEntry::new("good day"))
                .await;
            store.dispose().await.unwrap();
        }

        let store = store_in(&dir).await;
        let deadlines = store.deadlines().await;
        assert_eq!(deadlines.len(), 1);
        assert_eq!(deadlines[0].title, "conference talk");
        // Dates come back as real timestamps, not strings.
        assert_eq!(deadlines[0].due_date.timestamp(), due.timestamp());
        assert_eq!(store.journal_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_complete_microtask_recomputes_progress_and_phase() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        let mut deadline = Deadline::new("report", "", Utc::now() + TimeDelta::weeks(2));
        for i in 0..4 {
            deadline.microtasks.push(microtask(&format!("step {i}")));
        }
        let first_task = deadline.microtasks[0].id;
        let deadline_id = store.add_deadline(deadline).await;

        let (progress, phase) = store
            .complete_microtask(deadline_id, first_task, None)
            .await
            .unwrap();
        assert_eq!(progress, 25);
        assert_eq!(phase, DeadlinePhase::Focusing);

        let err = store
            .complete_microtask(deadline_id, Uuid::new_v4(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound { kind: "microtask", .. }));
    }

    #[tokio::test]
    async fn test_assessment_trend_over_history() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        // Three moderate scores, then a clear drop.
        for _ in 0..3 {
            let result = store
                .record_assessment("phq-9", &[2, 2, 2, 2, 2, 2, 0, 0, 0])
                .await
                .unwrap();
            assert_eq!(result.score, 12);
        }
        let improved = store
            .record_assessment("phq-9", &[1, 1, 1, 1, 1, 0, 0, 0, 0])
            .await
            .unwrap();
        assert_eq!(improved.score, 5);
        assert_eq!(improved.trend, Trend::Improving);
        assert_eq!(improved.severity, "mild");

        assert!(store.record_assessment("big-5", &[1]).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_only_writes_when_dirty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir).await);
        store.spawn_autosave(Duration::from_secs(60));

        // No mutation: nothing lands on disk.
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        assert!(!dir.path().join("contacts.json").exists());

        store.add_contact(Contact::new("Grace")).await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        // Let the autosave task run its flush to completion.
        for _ in 0..50 {
            tokio::task::yield_now().await;
            if !store.is_dirty() {
                break;
            }
        }
        assert!(!store.is_dirty());

        store.dispose().await.unwrap();
        assert!(dir.path().join("contacts.json").exists());
    }

    #[tokio::test]
    async fn test_action_ring_and_key_facts() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir).await;

        store.record_action(ActionRecord::new("bash", "ls", true)).await;
        store.add_key_fact("prefers short answers").await;
        store.add_key_fact("prefers short answers").await;

        assert_eq!(store.key_facts(10).await.len(), 1);
    }
}
