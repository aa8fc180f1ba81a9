#![forbid(unsafe_code)]

pub mod error;
pub mod provider;
pub mod sessions;

pub use quiz_core::Clock;

pub use error::SessionError;
pub use provider::{BankQuestionProvider, QuestionProvider};
pub use sessions::{
    AssessmentSession, QuestionMarker, SessionProgress, SessionStore, TimerHandle,
};
