mod config;
mod ids;
mod question;
mod session;
mod subject;

pub use config::{
    ConfigError, ConfigPatch, MAX_QUESTION_COUNT, MIN_QUESTION_COUNT, SECONDS_PER_QUESTION,
    SessionConfig,
};
pub use ids::{OptionId, ParseIdError, QuestionId, SubjectId};
pub use question::{
    Complexity, ExplanationStep, ParseComplexityError, Question, QuestionDraft, QuestionError,
    QuestionOption,
};
pub use session::{SessionState, SessionStatus, TransitionError};
pub use subject::{Subject, SubjectError};
