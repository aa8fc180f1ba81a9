use quiz_core::model::SessionState;
use serde::Serialize;

/// Remaining time below which the countdown is shown as urgent.
pub const LOW_TIME_SECS: u32 = 300;

/// Aggregated view of session progress, useful for UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub unanswered: usize,
    pub flagged: usize,
    /// 1-based position of the current question; 0 when there are none.
    pub current_position: usize,
    pub time_remaining: u32,
    pub is_low_time: bool,
    pub all_answered: bool,
}

impl SessionProgress {
    #[must_use]
    pub fn from_state(state: &SessionState) -> Self {
        let total = state.questions().len();
        let answered = state
            .questions()
            .iter()
            .filter(|q| state.answer_for(q.id()).is_some())
            .count();
        let flagged = state
            .questions()
            .iter()
            .filter(|q| state.is_flagged(q.id()))
            .count();

        Self {
            total,
            answered,
            unanswered: total - answered,
            flagged,
            current_position: if total == 0 {
                0
            } else {
                state.current_index() + 1
            },
            time_remaining: state.time_remaining(),
            is_low_time: state.is_in_progress() && state.time_remaining() < LOW_TIME_SECS,
            all_answered: total > 0 && answered == total,
        }
    }

    /// Whether submitting now should ask for confirmation first.
    #[must_use]
    pub fn needs_submit_confirmation(&self) -> bool {
        self.unanswered > 0
    }
}

/// Palette state of one question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum QuestionMarker {
    Current { flagged: bool },
    Answered { flagged: bool },
    Untouched { flagged: bool },
}

impl QuestionMarker {
    #[must_use]
    pub fn is_flagged(self) -> bool {
        match self {
            Self::Current { flagged } | Self::Answered { flagged } | Self::Untouched { flagged } => {
                flagged
            }
        }
    }
}

/// Marker for the question at `index`, or `None` past the end.
#[must_use]
pub fn marker_for(state: &SessionState, index: usize) -> Option<QuestionMarker> {
    let question = state.questions().get(index)?;
    let flagged = state.is_flagged(question.id());
    Some(if index == state.current_index() {
        QuestionMarker::Current { flagged }
    } else if state.answer_for(question.id()).is_some() {
        QuestionMarker::Answered { flagged }
    } else {
        QuestionMarker::Untouched { flagged }
    })
}

#[must_use]
pub fn markers(state: &SessionState) -> Vec<QuestionMarker> {
    (0..state.questions().len())
        .filter_map(|i| marker_for(state, i))
        .collect()
}
