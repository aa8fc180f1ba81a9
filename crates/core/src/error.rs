use thiserror::Error;

use crate::model::{ConfigError, QuestionError, SubjectError, TransitionError};

/// Umbrella for every validation failure the domain layer can report.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}
