use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    OptionId, Question, QuestionId, SessionConfig, SessionState, SessionStatus, Subject,
    SubjectId, TransitionError,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── SESSION SLOT ──────────────────────────────────────────────────────────────
//

/// Key of a durable session record. A single-session host uses the default slot.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionSlot(String);

impl SessionSlot {
    pub const DEFAULT: &'static str = "quiz-storage";

    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionSlot {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

impl fmt::Debug for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionSlot({})", self.0)
    }
}

impl fmt::Display for SessionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//
// ─── PERSISTED SESSION ─────────────────────────────────────────────────────────
//

/// Persisted shape of a session.
///
/// The navigation cursor is deliberately absent: a restored session resumes at
/// the first question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub config: SessionConfig,
    pub questions: Vec<Question>,
    pub answers: BTreeMap<QuestionId, OptionId>,
    pub flagged: BTreeSet<QuestionId>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    #[serde(default)]
    pub time_remaining: u32,
}

impl PersistedSession {
    #[must_use]
    pub fn from_state(state: &SessionState) -> Self {
        Self {
            config: state.config().clone(),
            questions: state.questions().to_vec(),
            answers: state.answers().clone(),
            flagged: state.flagged().clone(),
            start_time: state.start_time(),
            end_time: state.end_time(),
            status: state.status(),
            time_remaining: state.time_remaining(),
        }
    }

    /// Convert the record back into a live `SessionState`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the record violates the session invariants.
    pub fn into_state(self) -> Result<SessionState, TransitionError> {
        SessionState::from_persisted(
            self.config,
            self.questions,
            self.answers,
            self.flagged,
            self.start_time,
            self.end_time,
            self.status,
            self.time_remaining,
        )
    }

    /// Encode as the JSON payload stored by the adapters.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if encoding fails.
    pub fn to_json(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|e| StorageError::Serialization(e.to_string()))
    }

    /// Decode a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the payload is malformed or
    /// carries a question or config that fails validation.
    pub fn from_json(raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

//
// ─── REPOSITORY CONTRACTS ──────────────────────────────────────────────────────
//

/// Question bank: subjects and the pool of questions per subject.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or update a subject.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the subject cannot be stored.
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError>;

    /// Fetch a subject by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_subject(&self, id: &SubjectId) -> Result<Subject, StorageError>;

    /// All subjects in insertion order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError>;

    /// Persist or update a question, keyed by its bank id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// Questions in insertion order, restricted to `subject` when given.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn list_questions(&self, subject: Option<&SubjectId>)
    -> Result<Vec<Question>, StorageError>;
}

/// One durable record per slot holding the active session.
#[async_trait]
pub trait SessionSnapshotRepository: Send + Sync {
    /// Read the record for `slot`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures or a corrupt payload.
    async fn load_snapshot(
        &self,
        slot: &SessionSlot,
    ) -> Result<Option<PersistedSession>, StorageError>;

    /// Overwrite the record for `slot`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be written.
    async fn save_snapshot(
        &self,
        slot: &SessionSlot,
        session: &PersistedSession,
    ) -> Result<(), StorageError>;

    /// Remove the record for `slot`. Missing records are not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on adapter failures.
    async fn clear_snapshot(&self, slot: &SessionSlot) -> Result<(), StorageError>;
}

//
// ─── IN-MEMORY ADAPTER ─────────────────────────────────────────────────────────
//

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    subjects: Arc<Mutex<Vec<Subject>>>,
    questions: Arc<Mutex<Vec<Question>>>,
    snapshots: Arc<Mutex<HashMap<SessionSlot, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E: fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_subject(&self, subject: &Subject) -> Result<(), StorageError> {
        let mut guard = self.subjects.lock().map_err(poisoned)?;
        match guard.iter_mut().find(|s| s.id() == subject.id()) {
            Some(existing) => *existing = subject.clone(),
            None => guard.push(subject.clone()),
        }
        Ok(())
    }

    async fn get_subject(&self, id: &SubjectId) -> Result<Subject, StorageError> {
        let guard = self.subjects.lock().map_err(poisoned)?;
        guard
            .iter()
            .find(|s| s.id() == id)
            .cloned()
            .ok_or(StorageError::NotFound)
    }

    async fn list_subjects(&self) -> Result<Vec<Subject>, StorageError> {
        let guard = self.subjects.lock().map_err(poisoned)?;
        Ok(guard.clone())
    }

    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(poisoned)?;
        match guard.iter_mut().find(|q| q.id() == question.id()) {
            Some(existing) => *existing = question.clone(),
            None => guard.push(question.clone()),
        }
        Ok(())
    }

    async fn list_questions(
        &self,
        subject: Option<&SubjectId>,
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|q| subject.is_none_or(|s| q.subject_id() == s))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionSnapshotRepository for InMemoryRepository {
    async fn load_snapshot(
        &self,
        slot: &SessionSlot,
    ) -> Result<Option<PersistedSession>, StorageError> {
        let guard = self.snapshots.lock().map_err(poisoned)?;
        guard
            .get(slot)
            .map(|raw| PersistedSession::from_json(raw))
            .transpose()
    }

    async fn save_snapshot(
        &self,
        slot: &SessionSlot,
        session: &PersistedSession,
    ) -> Result<(), StorageError> {
        let payload = session.to_json()?;
        let mut guard = self.snapshots.lock().map_err(poisoned)?;
        guard.insert(slot.clone(), payload);
        Ok(())
    }

    async fn clear_snapshot(&self, slot: &SessionSlot) -> Result<(), StorageError> {
        let mut guard = self.snapshots.lock().map_err(poisoned)?;
        guard.remove(slot);
        Ok(())
    }
}

/// Aggregates the repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub snapshots: Arc<dyn SessionSnapshotRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let questions: Arc<dyn QuestionRepository> = Arc::new(repo.clone());
        let snapshots: Arc<dyn SessionSnapshotRepository> = Arc::new(repo);
        Self {
            questions,
            snapshots,
        }
    }
}
