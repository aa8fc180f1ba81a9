use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::ids::SubjectId;
use crate::model::question::Complexity;

/// Smallest number of questions a session may request.
pub const MIN_QUESTION_COUNT: u32 = 1;
/// Largest number of questions a session may request.
pub const MAX_QUESTION_COUNT: u32 = 100;
/// Countdown budget granted per question when no explicit duration is given.
pub const SECONDS_PER_QUESTION: u32 = 90;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("question count must be between {MIN_QUESTION_COUNT} and {MAX_QUESTION_COUNT}, got {0}")]
    InvalidQuestionCount(u32),
}

/// What the learner asked for before starting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredConfig")]
pub struct SessionConfig {
    subject_id: Option<SubjectId>,
    chapters: BTreeSet<String>,
    complexity: Complexity,
    question_count: u32,
}

/// Wire shape of `SessionConfig`; the count is range-checked on conversion.
#[derive(Deserialize)]
struct StoredConfig {
    subject_id: Option<SubjectId>,
    chapters: BTreeSet<String>,
    complexity: Complexity,
    question_count: u32,
}

impl TryFrom<StoredConfig> for SessionConfig {
    type Error = ConfigError;

    fn try_from(raw: StoredConfig) -> Result<Self, Self::Error> {
        check_count(raw.question_count)?;
        Ok(Self {
            subject_id: raw.subject_id,
            chapters: raw.chapters,
            complexity: raw.complexity,
            question_count: raw.question_count,
        })
    }
}

fn check_count(count: u32) -> Result<(), ConfigError> {
    if (MIN_QUESTION_COUNT..=MAX_QUESTION_COUNT).contains(&count) {
        Ok(())
    } else {
        Err(ConfigError::InvalidQuestionCount(count))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subject_id: None,
            chapters: BTreeSet::new(),
            complexity: Complexity::Intermediate,
            question_count: 20,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn subject_id(&self) -> Option<&SubjectId> {
        self.subject_id.as_ref()
    }

    #[must_use]
    pub fn chapters(&self) -> &BTreeSet<String> {
        &self.chapters
    }

    #[must_use]
    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    #[must_use]
    pub fn question_count(&self) -> u32 {
        self.question_count
    }

    /// Default countdown for this configuration: 90 seconds per question.
    #[must_use]
    pub fn default_duration_secs(&self) -> u32 {
        self.question_count.saturating_mul(SECONDS_PER_QUESTION)
    }

    /// Apply the fields present in `patch`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidQuestionCount` if the patched count is out
    /// of range. The config is left untouched on error.
    pub fn merge(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(count) = patch.question_count {
            check_count(count)?;
        }

        if let Some(subject_id) = patch.subject_id {
            self.subject_id = subject_id;
        }
        if let Some(chapters) = patch.chapters {
            self.chapters = chapters;
        }
        if let Some(complexity) = patch.complexity {
            self.complexity = complexity;
        }
        if let Some(count) = patch.question_count {
            self.question_count = count;
        }
        Ok(())
    }
}

/// Partial update for `SessionConfig`. `None` leaves a field as it is.
///
/// `subject_id` is doubly optional so a patch can clear the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigPatch {
    pub subject_id: Option<Option<SubjectId>>,
    pub chapters: Option<BTreeSet<String>>,
    pub complexity: Option<Complexity>,
    pub question_count: Option<u32>,
}

impl ConfigPatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn subject(mut self, subject_id: Option<SubjectId>) -> Self {
        self.subject_id = Some(subject_id);
        self
    }

    #[must_use]
    pub fn chapters<I, S>(mut self, chapters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.chapters = Some(chapters.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = Some(complexity);
        self
    }

    #[must_use]
    pub fn question_count(mut self, count: u32) -> Self {
        self.question_count = Some(count);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.subject_id.is_none()
            && self.chapters.is_none()
            && self.complexity.is_none()
            && self.question_count.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_only_touches_present_fields() {
        let mut config = SessionConfig::default();
        config
            .merge(ConfigPatch::new().complexity(Complexity::Advanced))
            .unwrap();

        assert_eq!(config.complexity(), Complexity::Advanced);
        assert_eq!(config.question_count(), 20);
        assert!(config.subject_id().is_none());
    }

    #[test]
    fn merge_can_clear_subject() {
        let mut config = SessionConfig::default();
        config
            .merge(ConfigPatch::new().subject(Some(SubjectId::new("physics"))))
            .unwrap();
        assert_eq!(config.subject_id().map(SubjectId::as_str), Some("physics"));

        config.merge(ConfigPatch::new().subject(None)).unwrap();
        assert!(config.subject_id().is_none());
    }

    #[test]
    fn chapters_are_a_set() {
        let mut config = SessionConfig::default();
        config
            .merge(ConfigPatch::new().chapters(["Limits", "Series", "Limits"]))
            .unwrap();
        assert_eq!(config.chapters().len(), 2);
    }

    #[test]
    fn out_of_range_count_is_rejected_without_partial_apply() {
        let mut config = SessionConfig::default();
        let err = config
            .merge(
                ConfigPatch::new()
                    .complexity(Complexity::Novice)
                    .question_count(0),
            )
            .unwrap_err();

        assert_eq!(err, ConfigError::InvalidQuestionCount(0));
        assert_eq!(config, SessionConfig::default());
        assert!(config.merge(ConfigPatch::new().question_count(101)).is_err());
        assert!(config.merge(ConfigPatch::new().question_count(100)).is_ok());
    }

    #[test]
    fn default_duration_is_ninety_seconds_per_question() {
        let mut config = SessionConfig::default();
        config.merge(ConfigPatch::new().question_count(4)).unwrap();
        assert_eq!(config.default_duration_secs(), 360);
    }
}
