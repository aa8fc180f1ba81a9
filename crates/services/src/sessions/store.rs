use quiz_core::Clock;
use quiz_core::model::{
    ConfigPatch, OptionId, Question, QuestionId, SessionState, SessionStatus, TransitionError,
};
use storage::repository::PersistedSession;

use crate::error::SessionError;

/// Single owner of a `SessionState`.
///
/// Every command is applied atomically: on error the state is untouched and
/// the rejection is logged at `debug`. Timestamps come from the store's clock.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    state: SessionState,
    clock: Clock,
}

impl SessionStore {
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            state: SessionState::new(),
            clock,
        }
    }

    /// Rebuild a store from a persisted record.
    ///
    /// Answers and flags that point at unknown questions or options are
    /// dropped; the cursor starts at the first question.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` if the record violates the session
    /// invariants.
    pub fn restore(clock: Clock, record: PersistedSession) -> Result<Self, SessionError> {
        let state = record.into_state()?;
        tracing::info!(
            status = %state.status(),
            questions = state.questions().len(),
            time_remaining = state.time_remaining(),
            "restored session"
        );
        Ok(Self { state, clock })
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn set_clock(&mut self, clock: Clock) {
        self.clock = clock;
    }

    /// The record written to the snapshot slot.
    #[must_use]
    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession::from_state(&self.state)
    }

    /// Returns `Ok(false)` if the session has started and the patch was ignored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` for an out-of-range question count.
    pub fn configure(&mut self, patch: ConfigPatch) -> Result<bool, SessionError> {
        let applied = rejected("configure", self.state.configure(patch))?;
        if !applied {
            tracing::debug!(status = %self.state.status(), "configure ignored after start");
        }
        Ok(applied)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Transition` outside setup or on duplicate ids.
    pub fn load_questions(&mut self, questions: Vec<Question>) -> Result<(), SessionError> {
        let count = questions.len();
        rejected("load_questions", self.state.load_questions(questions))?;
        tracing::debug!(count, "loaded questions");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Transition` without questions, for a zero
    /// duration, or once the session is completed.
    pub fn start(&mut self, duration_secs: u32) -> Result<(), SessionError> {
        let restart = self.state.is_in_progress();
        rejected("start", self.state.start(duration_secs, self.clock.now()))?;
        tracing::info!(
            questions = self.state.questions().len(),
            duration_secs,
            restart,
            "session started"
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Transition` if the session is not in progress or
    /// the ids do not resolve.
    pub fn answer(&mut self, question: &QuestionId, option: &OptionId) -> Result<(), SessionError> {
        rejected("answer", self.state.answer(question, option))
    }

    /// # Errors
    ///
    /// Returns `SessionError::Transition` for an unknown question.
    pub fn toggle_flag(&mut self, question: &QuestionId) -> Result<bool, SessionError> {
        rejected("toggle_flag", self.state.toggle_flag(question))
    }

    pub fn set_current_index(&mut self, index: usize) -> usize {
        self.state.set_current_index(index)
    }

    pub fn next(&mut self) -> usize {
        self.state.next()
    }

    pub fn previous(&mut self) -> usize {
        self.state.previous()
    }

    /// Feed the countdown with a new remaining value.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` outside an active session or if the
    /// value would grow.
    pub fn tick(&mut self, seconds_remaining: i64) -> Result<SessionStatus, SessionError> {
        let status = rejected("tick", self.state.tick(seconds_remaining, self.clock.now()))?;
        if status == SessionStatus::Completed {
            tracing::info!("time expired, session completed");
        }
        Ok(status)
    }

    /// One countdown step: the current value minus one second.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::tick`].
    pub fn tick_down(&mut self) -> Result<SessionStatus, SessionError> {
        self.tick(i64::from(self.state.time_remaining()) - 1)
    }

    /// Returns `Ok(false)` if the session was already completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` if the session never started.
    pub fn submit(&mut self) -> Result<bool, SessionError> {
        let submitted = rejected("submit", self.state.submit(self.clock.now()))?;
        if submitted {
            tracing::info!(
                answered = self.state.answers().len(),
                questions = self.state.questions().len(),
                "session submitted"
            );
        }
        Ok(submitted)
    }

    pub fn reset(&mut self) {
        self.state.reset();
        tracing::info!("session reset");
    }
}

fn rejected<T>(
    operation: &'static str,
    outcome: Result<T, TransitionError>,
) -> Result<T, SessionError> {
    outcome.map_err(|err| {
        tracing::debug!(operation, error = %err, "command rejected");
        SessionError::Transition(err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use quiz_core::model::{
        Complexity, QuestionDraft, QuestionOption, SubjectId,
    };
    use quiz_core::scoring::{Rank, SessionResult};
    use quiz_core::time::{fixed_clock, fixed_now};

    fn question(i: usize, correct: &str) -> Question {
        QuestionDraft {
            id: QuestionId::for_position(i),
            subject_id: SubjectId::new("calculus"),
            chapter: "Integrals".into(),
            complexity: Complexity::Intermediate,
            prompt: format!("Prompt {i}"),
            notation: None,
            options: vec![
                QuestionOption::new("a", "A"),
                QuestionOption::new("b", "B"),
                QuestionOption::new("c", "C"),
            ],
            correct_option: OptionId::new(correct),
            explanation: Vec::new(),
            xp_value: 25,
        }
        .validate()
        .unwrap()
    }

    fn store_with(n: usize) -> SessionStore {
        let mut store = SessionStore::new(fixed_clock());
        store
            .load_questions((0..n).map(|i| question(i, "a")).collect())
            .unwrap();
        store
    }

    #[test]
    fn rejected_commands_leave_state_untouched() {
        let mut store = store_with(2);
        let before = store.state().clone();

        assert!(matches!(
            store.answer(&QuestionId::new("q-1"), &OptionId::new("a")),
            Err(SessionError::Transition(TransitionError::WrongStatus { .. }))
        ));
        assert!(store.tick(10).is_err());
        assert!(store.submit().is_err());
        assert!(store.start(0).is_err());
        assert_eq!(store.state(), &before);
    }

    #[test]
    fn start_stamps_time_from_clock() {
        let mut store = store_with(3);
        store.start(270).unwrap();
        assert_eq!(store.state().start_time(), Some(fixed_now()));
        assert_eq!(store.state().time_remaining(), 270);
        assert!(store.state().is_in_progress());
    }

    #[test]
    fn tick_down_expires_at_zero() {
        let mut store = store_with(1);
        store.start(2).unwrap();
        assert_eq!(store.tick_down().unwrap(), SessionStatus::InProgress);
        assert_eq!(store.tick_down().unwrap(), SessionStatus::Completed);
        assert_eq!(store.state().time_remaining(), 0);
        assert!(store.tick_down().is_err());
    }

    #[test]
    fn tick_rejects_increase() {
        let mut store = store_with(1);
        store.start(60).unwrap();
        store.tick(50).unwrap();
        assert!(matches!(
            store.tick(55),
            Err(SessionError::Transition(TransitionError::TimeIncrease {
                current: 50,
                requested: 55
            }))
        ));
        assert_eq!(store.state().time_remaining(), 50);
    }

    #[test]
    fn configure_after_start_is_ignored() {
        let mut store = store_with(1);
        store.start(60).unwrap();
        let applied = store
            .configure(ConfigPatch::new().question_count(5))
            .unwrap();
        assert!(!applied);
        assert_eq!(store.state().config().question_count(), 20);
    }

    #[test]
    fn four_question_scenario_scores_from_clock_timestamps() {
        let mut store = SessionStore::new(fixed_clock());
        store
            .load_questions(vec![
                question(0, "a"),
                question(1, "b"),
                question(2, "c"),
                question(3, "a"),
            ])
            .unwrap();
        store.start(360).unwrap();
        store
            .answer(&QuestionId::new("q-1"), &OptionId::new("a"))
            .unwrap();
        store
            .answer(&QuestionId::new("q-2"), &OptionId::new("b"))
            .unwrap();
        store
            .answer(&QuestionId::new("q-3"), &OptionId::new("a"))
            .unwrap();

        let mut clock = store.clock();
        clock.advance(Duration::seconds(200));
        store.set_clock(clock);
        assert!(store.submit().unwrap());
        assert!(!store.submit().unwrap());

        let result = SessionResult::from_state(store.state());
        assert_eq!(result.correct_count, 2);
        assert_eq!(result.incorrect_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(result.accuracy, 50);
        assert_eq!(result.rank, Rank::Beginner);
        assert_eq!(result.experience_earned, 75);
        assert_eq!(result.elapsed_seconds, 200);
        assert!(result.within_pace);
    }

    #[test]
    fn restore_round_trips_through_record() {
        let mut store = store_with(2);
        store.start(180).unwrap();
        store
            .answer(&QuestionId::new("q-2"), &OptionId::new("c"))
            .unwrap();
        store.toggle_flag(&QuestionId::new("q-1")).unwrap();
        store.next();

        let restored = SessionStore::restore(fixed_clock(), store.to_persisted()).unwrap();
        assert_eq!(restored.state().answers(), store.state().answers());
        assert_eq!(restored.state().flagged(), store.state().flagged());
        assert_eq!(restored.state().time_remaining(), 180);
        assert_eq!(restored.state().current_index(), 0);
    }

    #[test]
    fn reset_matches_fresh_store() {
        let mut store = store_with(2);
        store.configure(ConfigPatch::new().question_count(2)).unwrap();
        store.start(180).unwrap();
        store.reset();
        assert_eq!(store.state(), SessionStore::new(fixed_clock()).state());
    }
}
