mod facade;
mod progress;
mod store;
pub mod timer;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use facade::AssessmentSession;
pub use progress::{QuestionMarker, SessionProgress, marker_for, markers};
pub use store::SessionStore;
pub use timer::TimerHandle;
