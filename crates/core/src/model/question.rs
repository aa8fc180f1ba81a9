use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId, SubjectId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question prompt cannot be empty")]
    EmptyPrompt,

    #[error("question needs at least 2 options, got {count}")]
    TooFewOptions { count: usize },

    #[error("duplicate option id: {0}")]
    DuplicateOption(OptionId),

    #[error("correct option {0} is not one of the question's options")]
    UnknownCorrectOption(OptionId),

    #[error("explanation step {found} out of order, expected {expected}")]
    ExplanationOrder { expected: u32, found: u32 },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown complexity level: {raw}")]
pub struct ParseComplexityError {
    raw: String,
}

//
// ─── COMPLEXITY ────────────────────────────────────────────────────────────────
//

/// Difficulty tier of a question or of a whole session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Novice,
    #[default]
    Intermediate,
    Advanced,
}

impl Complexity {
    pub const ALL: [Complexity; 3] = [Self::Novice, Self::Intermediate, Self::Advanced];

    /// Experience multiplier applied to correct answers.
    #[must_use]
    pub fn xp_multiplier(self) -> f64 {
        match self {
            Complexity::Novice => 1.0,
            Complexity::Intermediate => 1.5,
            Complexity::Advanced => 2.0,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Novice => "novice",
            Complexity::Intermediate => "intermediate",
            Complexity::Advanced => "advanced",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = ParseComplexityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "novice" => Ok(Self::Novice),
            "intermediate" => Ok(Self::Intermediate),
            "advanced" => Ok(Self::Advanced),
            _ => Err(ParseComplexityError { raw: s.to_owned() }),
        }
    }
}

//
// ─── QUESTION PARTS ────────────────────────────────────────────────────────────
//

/// One selectable answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: OptionId,
    pub text: String,
    /// Notation payload handed to the external renderer as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notation: Option<String>,
}

impl QuestionOption {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(id),
            text: text.into(),
            notation: None,
        }
    }

    #[must_use]
    pub fn with_notation(mut self, notation: impl Into<String>) -> Self {
        self.notation = Some(notation.into());
        self
    }
}

/// A numbered worked-solution step shown after completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplanationStep {
    pub step: u32,
    pub title: String,
    pub body: String,
}

impl ExplanationStep {
    #[must_use]
    pub fn new(step: u32, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            step,
            title: title.into(),
            body: body.into(),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// Unvalidated question as produced by a question bank or a form.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuestionDraft {
    pub id: QuestionId,
    pub subject_id: SubjectId,
    pub chapter: String,
    pub complexity: Complexity,
    pub prompt: String,
    #[serde(default)]
    pub notation: Option<String>,
    pub options: Vec<QuestionOption>,
    pub correct_option: OptionId,
    pub explanation: Vec<ExplanationStep>,
    pub xp_value: u32,
}

impl QuestionDraft {
    /// Check the structural rules of a question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if the prompt is blank, there are fewer than two
    /// options, option ids repeat, the correct option is missing, or the
    /// explanation steps are not numbered `1..=n`.
    pub fn validate(self) -> Result<Question, QuestionError> {
        if self.prompt.trim().is_empty() {
            return Err(QuestionError::EmptyPrompt);
        }
        if self.options.len() < 2 {
            return Err(QuestionError::TooFewOptions {
                count: self.options.len(),
            });
        }

        let mut seen = HashSet::with_capacity(self.options.len());
        for option in &self.options {
            if !seen.insert(&option.id) {
                return Err(QuestionError::DuplicateOption(option.id.clone()));
            }
        }
        if !seen.contains(&self.correct_option) {
            return Err(QuestionError::UnknownCorrectOption(self.correct_option));
        }

        for (expected, step) in (1_u32..).zip(&self.explanation) {
            if step.step != expected {
                return Err(QuestionError::ExplanationOrder {
                    expected,
                    found: step.step,
                });
            }
        }

        Ok(Question {
            id: self.id,
            subject_id: self.subject_id,
            chapter: self.chapter,
            complexity: self.complexity,
            prompt: self.prompt,
            notation: self.notation,
            options: self.options,
            correct_option: self.correct_option,
            explanation: self.explanation,
            xp_value: self.xp_value,
        })
    }
}

/// A validated, immutable question.
///
/// Deserializing goes through [`QuestionDraft::validate`], so a stored
/// question that breaks the structural rules is refused on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionDraft")]
pub struct Question {
    id: QuestionId,
    subject_id: SubjectId,
    chapter: String,
    complexity: Complexity,
    prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notation: Option<String>,
    options: Vec<QuestionOption>,
    correct_option: OptionId,
    explanation: Vec<ExplanationStep>,
    xp_value: u32,
}

impl TryFrom<QuestionDraft> for Question {
    type Error = QuestionError;

    fn try_from(draft: QuestionDraft) -> Result<Self, Self::Error> {
        draft.validate()
    }
}

impl Question {
    /// Copy of this question carrying a fresh session-scoped id.
    #[must_use]
    pub fn reissue(&self, id: QuestionId) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    #[must_use]
    pub fn chapter(&self) -> &str {
        &self.chapter
    }

    #[must_use]
    pub fn complexity(&self) -> Complexity {
        self.complexity
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    #[must_use]
    pub fn notation(&self) -> Option<&str> {
        self.notation.as_deref()
    }

    #[must_use]
    pub fn options(&self) -> &[QuestionOption] {
        &self.options
    }

    #[must_use]
    pub fn correct_option(&self) -> &OptionId {
        &self.correct_option
    }

    #[must_use]
    pub fn explanation(&self) -> &[ExplanationStep] {
        &self.explanation
    }

    #[must_use]
    pub fn xp_value(&self) -> u32 {
        self.xp_value
    }

    #[must_use]
    pub fn has_option(&self, option: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option)
    }

    #[must_use]
    pub fn is_correct(&self, option: &OptionId) -> bool {
        &self.correct_option == option
    }
}
