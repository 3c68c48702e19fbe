use async_trait::async_trait;
use chrono::{DateTime, Utc};
use edu_core::model::{Badge, BadgeError, ProgressEntry, ProgressEntryError, StudentId};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters and remote collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Durable string key-value storage.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the backing store cannot be read.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the value cannot be written.
    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Remote read access to a student's badges and subject progress.
#[async_trait]
pub trait ProgressSource: Send + Sync {
    /// Badges earned by the student, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn get_badges(&self, student_id: &StudentId) -> Result<Vec<Badge>, StorageError>;

    /// Per-subject progress for the student.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on transport or decoding failures.
    async fn get_subject_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ProgressEntry>, StorageError>;
}

/// Raw badge row as the backend returns it.
///
/// Converted into the domain `Badge` at the collaborator boundary so
/// malformed rows never reach a snapshot.
#[derive(Debug, Clone, Deserialize)]
pub struct BadgeRecord {
    pub id: String,
    pub name: String,
    pub earned_at: DateTime<Utc>,
}

impl BadgeRecord {
    /// Convert the row into a domain `Badge`.
    ///
    /// # Errors
    ///
    /// Returns `BadgeError` if the id or name is blank.
    pub fn into_badge(self) -> Result<Badge, BadgeError> {
        Badge::new(self.id, self.name, self.earned_at)
    }
}

/// Raw subject-progress row as the backend returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRecord {
    pub subject: String,
    pub completed_lessons: i64,
    pub total_lessons: i64,
    #[serde(default)]
    pub quiz_score: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// Convert the row into a domain `ProgressEntry`.
    ///
    /// Negative counts are rejected as serialization errors, domain rule
    /// violations as `ProgressEntryError`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` when a column is out of range.
    pub fn into_entry(self) -> Result<ProgressEntry, StorageError> {
        let completed = u32::try_from(self.completed_lessons)
            .map_err(|_| out_of_range("completed_lessons", self.completed_lessons))?;
        let total = u32::try_from(self.total_lessons)
            .map_err(|_| out_of_range("total_lessons", self.total_lessons))?;
        let quiz_score = self
            .quiz_score
            .map(|score| u8::try_from(score).map_err(|_| out_of_range("quiz_score", score)))
            .transpose()?;

        ProgressEntry::new(self.subject, completed, total, quiz_score, self.updated_at)
            .map_err(|err: ProgressEntryError| StorageError::Serialization(err.to_string()))
    }
}

fn out_of_range(column: &str, value: i64) -> StorageError {
    StorageError::Serialization(format!("{column} out of range: {value}"))
}

/// In-memory key-value store for tests and prototyping.
///
/// `set_failing(true)` makes every call fail with `StorageError::Connection`.
#[derive(Clone, Default)]
pub struct InMemoryKeyValueStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
    failing: Arc<AtomicBool>,
}

impl InMemoryKeyValueStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without going through the async API.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut guard) = self.entries.lock() {
            guard.insert(key.into(), value.into());
        }
    }

    /// Synchronous peek used by tests.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("storage unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        let guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Connection("poisoned lock".into()))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let mut guard = self
            .entries
            .lock()
            .map_err(|_| StorageError::Connection("poisoned lock".into()))?;
        guard.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct StudentFixture {
    badges: Vec<Badge>,
    progress: Vec<ProgressEntry>,
}

/// In-memory progress source with per-student fixtures and injectable failures.
///
/// Unknown students resolve to empty lists, mirroring an empty table query.
#[derive(Clone, Default)]
pub struct InMemoryProgressSource {
    students: Arc<Mutex<HashMap<StudentId, StudentFixture>>>,
    failing: Arc<Mutex<HashSet<StudentId>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryProgressSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_badges(&self, student_id: &StudentId, badges: Vec<Badge>) {
        if let Ok(mut guard) = self.students.lock() {
            guard.entry(student_id.clone()).or_default().badges = badges;
        }
    }

    pub fn set_progress(&self, student_id: &StudentId, progress: Vec<ProgressEntry>) {
        if let Ok(mut guard) = self.students.lock() {
            guard.entry(student_id.clone()).or_default().progress = progress;
        }
    }

    /// Make every read for `student_id` fail until cleared.
    pub fn set_failing(&self, student_id: &StudentId, failing: bool) {
        if let Ok(mut guard) = self.failing.lock() {
            if failing {
                guard.insert(student_id.clone());
            } else {
                guard.remove(student_id);
            }
        }
    }

    /// Number of remote reads issued so far (badges and progress each count once).
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn begin_call(&self, student_id: &StudentId) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing
            .lock()
            .map_err(|_| StorageError::Connection("poisoned lock".into()))?;
        if failing.contains(student_id) {
            return Err(StorageError::Connection(format!(
                "backend unavailable for {student_id}"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ProgressSource for InMemoryProgressSource {
    async fn get_badges(&self, student_id: &StudentId) -> Result<Vec<Badge>, StorageError> {
        self.begin_call(student_id)?;
        let guard = self
            .students
            .lock()
            .map_err(|_| StorageError::Connection("poisoned lock".into()))?;
        Ok(guard
            .get(student_id)
            .map(|fixture| fixture.badges.clone())
            .unwrap_or_default())
    }

    async fn get_subject_progress(
        &self,
        student_id: &StudentId,
    ) -> Result<Vec<ProgressEntry>, StorageError> {
        self.begin_call(student_id)?;
        let guard = self
            .students
            .lock()
            .map_err(|_| StorageError::Connection("poisoned lock".into()))?;
        Ok(guard
            .get(student_id)
            .map(|fixture| fixture.progress.clone())
            .unwrap_or_default())
    }
}

/// Aggregates the storage collaborators behind trait objects for easy swapping.
#[derive(Clone)]
pub struct Storage {
    pub kv: Arc<dyn KeyValueStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            kv: Arc::new(InMemoryKeyValueStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edu_core::time::fixed_now;

    fn student(id: &str) -> StudentId {
        StudentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn kv_round_trips_and_fails_on_demand() {
        let store = InMemoryKeyValueStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", "7").await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("7"));

        store.set_failing(true);
        assert!(matches!(
            store.set("k", "8").await,
            Err(StorageError::Connection(_))
        ));
        assert_eq!(store.peek("k").as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn progress_source_serves_fixtures_and_counts_calls() {
        let source = InMemoryProgressSource::new();
        let id = student("s1");
        source.set_badges(&id, vec![Badge::new("b1", "Star", fixed_now()).unwrap()]);

        let badges = source.get_badges(&id).await.unwrap();
        assert_eq!(badges.len(), 1);
        let progress = source.get_subject_progress(&id).await.unwrap();
        assert!(progress.is_empty());
        assert_eq!(source.call_count(), 2);

        source.set_failing(&id, true);
        assert!(source.get_badges(&id).await.is_err());
        assert_eq!(source.call_count(), 3);
    }

    #[test]
    fn progress_record_rejects_out_of_range_columns() {
        let record = ProgressRecord {
            subject: "Math".into(),
            completed_lessons: -1,
            total_lessons: 4,
            quiz_score: None,
            updated_at: None,
        };
        assert!(matches!(
            record.into_entry(),
            Err(StorageError::Serialization(_))
        ));

        let record = ProgressRecord {
            subject: "Math".into(),
            completed_lessons: 5,
            total_lessons: 4,
            quiz_score: Some(90),
            updated_at: None,
        };
        assert!(matches!(
            record.into_entry(),
            Err(StorageError::Serialization(_))
        ));
    }

    #[test]
    fn badge_record_validates() {
        let record = BadgeRecord {
            id: "b1".into(),
            name: String::new(),
            earned_at: fixed_now(),
        };
        assert_eq!(record.into_badge().unwrap_err(), BadgeError::EmptyName);
    }
}
