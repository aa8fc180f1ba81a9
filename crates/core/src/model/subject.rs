use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::SubjectId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SubjectError {
    #[error("subject name cannot be empty")]
    EmptyName,

    #[error("duplicate chapter: {0}")]
    DuplicateChapter(String),
}

/// Catalog entry for a subject in the question bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    id: SubjectId,
    name: String,
    chapters: Vec<String>,
    total_questions: u32,
    xp_value: u32,
}

impl Subject {
    /// Creates a subject with its chapters in display order.
    ///
    /// # Errors
    ///
    /// Returns `SubjectError::EmptyName` for a blank name and
    /// `SubjectError::DuplicateChapter` if a chapter appears twice.
    pub fn new(
        id: SubjectId,
        name: impl Into<String>,
        chapters: Vec<String>,
        total_questions: u32,
        xp_value: u32,
    ) -> Result<Self, SubjectError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SubjectError::EmptyName);
        }
        for (i, chapter) in chapters.iter().enumerate() {
            if chapters[..i].contains(chapter) {
                return Err(SubjectError::DuplicateChapter(chapter.clone()));
            }
        }

        Ok(Self {
            id,
            name,
            chapters,
            total_questions,
            xp_value,
        })
    }

    #[must_use]
    pub fn id(&self) -> &SubjectId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn chapters(&self) -> &[String] {
        &self.chapters
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn xp_value(&self) -> u32 {
        self.xp_value
    }

    #[must_use]
    pub fn has_chapter(&self, chapter: &str) -> bool {
        self.chapters.iter().any(|c| c == chapter)
    }
}
