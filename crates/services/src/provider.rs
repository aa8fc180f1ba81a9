//! Question sources for new sessions.

use std::sync::Arc;

use async_trait::async_trait;
use quiz_core::model::{Question, QuestionId, SubjectId};
use rand::seq::SliceRandom;
use storage::repository::QuestionRepository;

use crate::error::SessionError;

/// Produces the question sequence for a new session.
#[async_trait]
pub trait QuestionProvider: Send + Sync {
    /// Exactly `count` questions with session-scoped ids `q-1 ..= q-count`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if the pool has nothing to draw from,
    /// or `SessionError::Storage` if the pool cannot be read.
    async fn questions(
        &self,
        count: u32,
        subject: Option<&SubjectId>,
    ) -> Result<Vec<Question>, SessionError>;
}

/// Cycle through `pool` until `count` questions are produced, renumbering each.
///
/// # Errors
///
/// Returns `SessionError::Empty` if `pool` is empty and `count > 0`.
pub fn replicate(pool: &[Question], count: u32) -> Result<Vec<Question>, SessionError> {
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    if count == 0 {
        return Ok(Vec::new());
    }
    if pool.is_empty() {
        return Err(SessionError::Empty);
    }
    Ok(pool
        .iter()
        .cycle()
        .take(count)
        .enumerate()
        .map(|(i, q)| q.reissue(QuestionId::for_position(i)))
        .collect())
}

/// Draws its pool from the question bank, optionally shuffled.
#[derive(Clone)]
pub struct BankQuestionProvider {
    bank: Arc<dyn QuestionRepository>,
    shuffle: bool,
}

impl BankQuestionProvider {
    #[must_use]
    pub fn new(bank: Arc<dyn QuestionRepository>) -> Self {
        Self {
            bank,
            shuffle: false,
        }
    }

    /// Shuffle the pool before it is cycled.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }
}

#[async_trait]
impl QuestionProvider for BankQuestionProvider {
    async fn questions(
        &self,
        count: u32,
        subject: Option<&SubjectId>,
    ) -> Result<Vec<Question>, SessionError> {
        let mut pool = self.bank.list_questions(subject).await?;
        if self.shuffle {
            pool.shuffle(&mut rand::rng());
        }
        tracing::debug!(
            pool = pool.len(),
            count,
            subject = subject.map(SubjectId::as_str),
            "drawing session questions"
        );
        replicate(&pool, count)
    }
}
