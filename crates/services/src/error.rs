//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{SubjectId, TransitionError};
use storage::repository::StorageError;

/// Errors emitted by the session store, provider and facade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("no questions available for session")]
    Empty,
    #[error("session is not completed")]
    NotCompleted,
    #[error("unknown subject: {0}")]
    UnknownSubject(SubjectId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// True when the command was refused by the session lifecycle rather than
    /// failing in an adapter.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Transition(_) | Self::NotCompleted | Self::Empty)
    }
}
