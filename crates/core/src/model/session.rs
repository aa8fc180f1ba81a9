use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use thiserror::Error;

use crate::model::config::{ConfigError, ConfigPatch, SessionConfig};
use crate::model::ids::{OptionId, QuestionId};
use crate::model::question::Question;
use crate::navigation;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// A command that was rejected. The state is unchanged whenever one is returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransitionError {
    #[error("{operation} is not allowed while the session is {status}")]
    WrongStatus {
        operation: &'static str,
        status: SessionStatus,
    },

    #[error("cannot start a session without questions")]
    NoQuestions,

    #[error("session duration must be > 0")]
    ZeroDuration,

    #[error("unknown question: {0}")]
    UnknownQuestion(QuestionId),

    #[error("option {option} does not belong to question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("duplicate question id in sequence: {0}")]
    DuplicateQuestion(QuestionId),

    #[error("time remaining cannot grow from {current}s to {requested}s")]
    TimeIncrease { current: u32, requested: i64 },

    #[error("invalid persisted state: {0}")]
    InvalidPersistedState(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle position of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    #[default]
    Setup,
    InProgress,
    Completed,
}

impl SessionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Setup => "setup",
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── SESSION STATE ─────────────────────────────────────────────────────────────
//

/// Aggregate root of one assessment attempt.
///
/// Every mutator either applies completely or returns a `TransitionError` and
/// leaves the state untouched. Timestamps are supplied by the caller so the
/// state machine stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SessionState {
    config: SessionConfig,
    questions: Vec<Question>,
    current_index: usize,
    answers: BTreeMap<QuestionId, OptionId>,
    flagged: BTreeSet<QuestionId>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    time_remaining: u32,
    status: SessionStatus,
}

impl SessionState {
    /// Fresh setup state with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrate a session from persisted storage.
    ///
    /// Answer and flag keys that no longer match a question (or an option) are
    /// dropped. Navigation always resumes at the first question.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::DuplicateQuestion` if question ids repeat and
    /// `TransitionError::InvalidPersistedState` if the timestamps contradict
    /// the status.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        config: SessionConfig,
        questions: Vec<Question>,
        answers: BTreeMap<QuestionId, OptionId>,
        flagged: BTreeSet<QuestionId>,
        start_time: Option<DateTime<Utc>>,
        end_time: Option<DateTime<Utc>>,
        status: SessionStatus,
        time_remaining: u32,
    ) -> Result<Self, TransitionError> {
        ensure_unique_ids(&questions)?;

        match status {
            SessionStatus::Setup => {
                if start_time.is_some() || end_time.is_some() {
                    return Err(TransitionError::InvalidPersistedState(
                        "setup session carries timestamps".into(),
                    ));
                }
                return Ok(Self {
                    config,
                    questions,
                    ..Self::default()
                });
            }
            SessionStatus::InProgress => {
                if start_time.is_none() || end_time.is_some() {
                    return Err(TransitionError::InvalidPersistedState(
                        "in-progress session needs a start time and no end time".into(),
                    ));
                }
            }
            SessionStatus::Completed => {
                if end_time.is_none() {
                    return Err(TransitionError::InvalidPersistedState(
                        "completed session is missing its end time".into(),
                    ));
                }
            }
        }
        if questions.is_empty() {
            return Err(TransitionError::InvalidPersistedState(format!(
                "{status} session has no questions"
            )));
        }

        let answers = answers
            .into_iter()
            .filter(|(qid, oid)| {
                questions
                    .iter()
                    .any(|q| q.id() == qid && q.has_option(oid))
            })
            .collect();
        let flagged = flagged
            .into_iter()
            .filter(|qid| questions.iter().any(|q| q.id() == qid))
            .collect();

        Ok(Self {
            config,
            questions,
            current_index: 0,
            answers,
            flagged,
            start_time,
            end_time,
            time_remaining,
            status,
        })
    }

    // ─── Accessors ─────────────────────────────────────────────────────────

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, OptionId> {
        &self.answers
    }

    #[must_use]
    pub fn flagged(&self) -> &BTreeSet<QuestionId> {
        &self.flagged
    }

    #[must_use]
    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    #[must_use]
    pub fn time_remaining(&self) -> u32 {
        self.time_remaining
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.status == SessionStatus::InProgress
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_index)
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn answer_for(&self, id: &QuestionId) -> Option<&OptionId> {
        self.answers.get(id)
    }

    #[must_use]
    pub fn is_flagged(&self, id: &QuestionId) -> bool {
        self.flagged.contains(id)
    }

    // ─── Setup ─────────────────────────────────────────────────────────────

    /// Merge a configuration patch.
    ///
    /// Returns `Ok(false)` when the session has already started; the patch is
    /// accepted but has no effect until the next reset.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::Config` if the patch carries an invalid value.
    pub fn configure(&mut self, patch: ConfigPatch) -> Result<bool, TransitionError> {
        if self.status != SessionStatus::Setup {
            return Ok(false);
        }
        self.config.merge(patch)?;
        Ok(true)
    }

    /// Replace the question sequence and rewind to the first question.
    /// Flags on questions that are no longer present are dropped.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::WrongStatus` once a session has started and
    /// `TransitionError::DuplicateQuestion` if ids repeat.
    pub fn load_questions(&mut self, questions: Vec<Question>) -> Result<(), TransitionError> {
        if self.status != SessionStatus::Setup {
            return Err(self.wrong_status("load_questions"));
        }
        ensure_unique_ids(&questions)?;
        self.flagged.retain(|id| questions.iter().any(|q| q.id() == id));
        self.questions = questions;
        self.current_index = 0;
        Ok(())
    }

    /// Begin (or restart) the countdown.
    ///
    /// Restarting an in-progress session is a fresh attempt: answers and flags
    /// are cleared.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::NoQuestions`, `TransitionError::ZeroDuration`,
    /// or `TransitionError::WrongStatus` for a completed session.
    pub fn start(&mut self, duration_secs: u32, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if self.status == SessionStatus::Completed {
            return Err(self.wrong_status("start"));
        }
        if self.questions.is_empty() {
            return Err(TransitionError::NoQuestions);
        }
        if duration_secs == 0 {
            return Err(TransitionError::ZeroDuration);
        }

        self.answers.clear();
        self.flagged.clear();
        self.start_time = Some(now);
        self.end_time = None;
        self.time_remaining = duration_secs;
        self.status = SessionStatus::InProgress;
        self.current_index = 0;
        Ok(())
    }

    // ─── Per-question commands ─────────────────────────────────────────────

    /// Record (or overwrite) the chosen option for a question.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the session is not in progress or the ids
    /// do not resolve.
    pub fn answer(&mut self, question: &QuestionId, option: &OptionId) -> Result<(), TransitionError> {
        if self.status != SessionStatus::InProgress {
            return Err(self.wrong_status("answer"));
        }
        let Some(q) = self.question(question) else {
            return Err(TransitionError::UnknownQuestion(question.clone()));
        };
        if !q.has_option(option) {
            return Err(TransitionError::UnknownOption {
                question: question.clone(),
                option: option.clone(),
            });
        }
        self.answers.insert(question.clone(), option.clone());
        Ok(())
    }

    /// Flip the review flag on a question. Allowed in any status.
    ///
    /// Returns whether the question is flagged afterwards.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::UnknownQuestion` if the id does not resolve.
    pub fn toggle_flag(&mut self, question: &QuestionId) -> Result<bool, TransitionError> {
        if self.question(question).is_none() {
            return Err(TransitionError::UnknownQuestion(question.clone()));
        }
        if self.flagged.remove(question) {
            Ok(false)
        } else {
            self.flagged.insert(question.clone());
            Ok(true)
        }
    }

    // ─── Navigation ────────────────────────────────────────────────────────

    /// Move to `index`, clamped into the question range. Returns the new index.
    pub fn set_current_index(&mut self, index: usize) -> usize {
        self.current_index = navigation::clamp_index(index, self.questions.len());
        self.current_index
    }

    pub fn next(&mut self) -> usize {
        self.current_index = navigation::step_forward(self.current_index, self.questions.len());
        self.current_index
    }

    pub fn previous(&mut self) -> usize {
        self.current_index = navigation::step_back(self.current_index, self.questions.len());
        self.current_index
    }

    // ─── Time & completion ─────────────────────────────────────────────────

    /// Feed the countdown. A value of zero or below ends the session.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::WrongStatus` outside an active session and
    /// `TransitionError::TimeIncrease` if the value would grow.
    pub fn tick(
        &mut self,
        seconds_remaining: i64,
        now: DateTime<Utc>,
    ) -> Result<SessionStatus, TransitionError> {
        if self.status != SessionStatus::InProgress {
            return Err(self.wrong_status("tick"));
        }
        if seconds_remaining > i64::from(self.time_remaining) {
            return Err(TransitionError::TimeIncrease {
                current: self.time_remaining,
                requested: seconds_remaining,
            });
        }

        // Bounded above by the current u32 value, so only the lower bound can fail.
        self.time_remaining = u32::try_from(seconds_remaining).unwrap_or(0);
        if self.time_remaining == 0 {
            self.complete(now);
        }
        Ok(self.status)
    }

    /// Finish the session. Returns `Ok(false)` if it was already completed.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError::WrongStatus` if the session never started.
    pub fn submit(&mut self, now: DateTime<Utc>) -> Result<bool, TransitionError> {
        match self.status {
            SessionStatus::Completed => Ok(false),
            SessionStatus::Setup => Err(self.wrong_status("submit")),
            SessionStatus::InProgress => {
                self.complete(now);
                Ok(true)
            }
        }
    }

    /// Discard everything and return to the default setup state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        self.end_time = Some(now);
        self.status = SessionStatus::Completed;
    }

    fn wrong_status(&self, operation: &'static str) -> TransitionError {
        TransitionError::WrongStatus {
            operation,
            status: self.status,
        }
    }
}

fn ensure_unique_ids(questions: &[Question]) -> Result<(), TransitionError> {
    let mut seen = HashSet::with_capacity(questions.len());
    for q in questions {
        if !seen.insert(q.id()) {
            return Err(TransitionError::DuplicateQuestion(q.id().clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::question::{Complexity, QuestionDraft, QuestionOption};
    use crate::model::ids::SubjectId;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn question(id: &str) -> Question {
        QuestionDraft {
            id: QuestionId::new(id),
            subject_id: SubjectId::new("calculus"),
            chapter: "Integrals".into(),
            complexity: Complexity::Intermediate,
            prompt: "Evaluate".into(),
            notation: None,
            options: vec![QuestionOption::new("a", "A"), QuestionOption::new("b", "B")],
            correct_option: OptionId::new("a"),
            explanation: Vec::new(),
            xp_value: 25,
        }
        .validate()
        .unwrap()
    }

    fn started(n: usize) -> SessionState {
        let mut state = SessionState::new();
        state
            .load_questions((1..=n).map(|i| question(&format!("q-{i}"))).collect())
            .unwrap();
        state.start(120, fixed_now()).unwrap();
        state
    }

    fn qid(s: &str) -> QuestionId {
        QuestionId::new(s)
    }

    fn oid(s: &str) -> OptionId {
        OptionId::new(s)
    }

    #[test]
    fn start_requires_questions() {
        let mut state = SessionState::new();
        assert_eq!(
            state.start(60, fixed_now()).unwrap_err(),
            TransitionError::NoQuestions
        );
        assert_eq!(state, SessionState::new());
    }

    #[test]
    fn start_sets_clock_fields() {
        let state = started(2);
        assert_eq!(state.status(), SessionStatus::InProgress);
        assert_eq!(state.start_time(), Some(fixed_now()));
        assert_eq!(state.end_time(), None);
        assert_eq!(state.time_remaining(), 120);
        assert_eq!(state.current_index(), 0);
    }

    #[test]
    fn restart_clears_answers_and_flags() {
        let mut state = started(3);
        state.answer(&qid("q-1"), &oid("a")).unwrap();
        state.toggle_flag(&qid("q-2")).unwrap();
        state.next();

        let later = fixed_now() + Duration::seconds(30);
        state.start(90, later).unwrap();

        assert!(state.answers().is_empty());
        assert!(state.flagged().is_empty());
        assert_eq!(state.current_index(), 0);
        assert_eq!(state.start_time(), Some(later));
        assert_eq!(state.time_remaining(), 90);
    }

    #[test]
    fn answer_overwrites_previous_choice() {
        let mut state = started(2);
        state.answer(&qid("q-1"), &oid("a")).unwrap();
        state.answer(&qid("q-1"), &oid("b")).unwrap();

        assert_eq!(state.answers().len(), 1);
        assert_eq!(state.answer_for(&qid("q-1")), Some(&oid("b")));
    }

    #[test]
    fn invalid_answers_leave_state_unchanged() {
        let mut state = started(2);
        let before = state.clone();

        assert!(matches!(
            state.answer(&qid("q-9"), &oid("a")),
            Err(TransitionError::UnknownQuestion(_))
        ));
        assert!(matches!(
            state.answer(&qid("q-1"), &oid("z")),
            Err(TransitionError::UnknownOption { .. })
        ));
        assert_eq!(state, before);

        let mut setup = SessionState::new();
        setup.load_questions(vec![question("q-1")]).unwrap();
        assert!(matches!(
            setup.answer(&qid("q-1"), &oid("a")),
            Err(TransitionError::WrongStatus { .. })
        ));
    }

    #[test]
    fn flag_toggles_independently_of_answers() {
        let mut state = started(2);
        state.answer(&qid("q-1"), &oid("a")).unwrap();
        assert!(state.toggle_flag(&qid("q-1")).unwrap());
        assert!(state.is_flagged(&qid("q-1")));
        assert!(!state.toggle_flag(&qid("q-1")).unwrap());
        assert!(!state.is_flagged(&qid("q-1")));
        assert_eq!(state.answer_for(&qid("q-1")), Some(&oid("a")));
    }

    #[test]
    fn flagging_is_allowed_after_completion() {
        let mut state = started(1);
        state.submit(fixed_now()).unwrap();
        assert!(state.toggle_flag(&qid("q-1")).unwrap());
    }

    #[test]
    fn navigation_is_clamped_without_wraparound() {
        let mut state = started(3);
        assert_eq!(state.previous(), 0);
        assert_eq!(state.next(), 1);
        assert_eq!(state.next(), 2);
        assert_eq!(state.next(), 2);
        assert_eq!(state.set_current_index(99), 2);
        assert_eq!(state.set_current_index(1), 1);
    }

    #[test]
    fn tick_to_zero_completes_and_freezes() {
        let mut state = started(2);
        let expiry = fixed_now() + Duration::seconds(120);
        assert_eq!(state.tick(1, fixed_now()).unwrap(), SessionStatus::InProgress);
        assert_eq!(state.tick(0, expiry).unwrap(), SessionStatus::Completed);
        assert_eq!(state.end_time(), Some(expiry));
        assert_eq!(state.time_remaining(), 0);

        let frozen = state.clone();
        assert!(!state.submit(expiry + Duration::seconds(5)).unwrap());
        assert_eq!(state, frozen);
    }

    #[test]
    fn negative_tick_clamps_to_zero() {
        let mut state = started(1);
        state.tick(-3, fixed_now()).unwrap();
        assert_eq!(state.time_remaining(), 0);
        assert!(state.is_completed());
    }

    #[test]
    fn tick_cannot_increase_time() {
        let mut state = started(1);
        state.tick(100, fixed_now()).unwrap();
        assert!(matches!(
            state.tick(101, fixed_now()),
            Err(TransitionError::TimeIncrease { current: 100, .. })
        ));
        assert_eq!(state.time_remaining(), 100);
    }

    #[test]
    fn completed_session_cannot_restart() {
        let mut state = started(1);
        state.submit(fixed_now()).unwrap();
        assert!(matches!(
            state.start(60, fixed_now()),
            Err(TransitionError::WrongStatus { .. })
        ));
        assert!(state.is_completed());
    }

    #[test]
    fn configure_after_start_has_no_effect() {
        let mut state = started(1);
        let applied = state
            .configure(ConfigPatch::new().question_count(5))
            .unwrap();
        assert!(!applied);
        assert_eq!(state.config().question_count(), 20);
    }

    #[test]
    fn load_rejects_duplicate_ids() {
        let mut state = SessionState::new();
        let err = state
            .load_questions(vec![question("q-1"), question("q-1")])
            .unwrap_err();
        assert_eq!(err, TransitionError::DuplicateQuestion(qid("q-1")));
        assert!(state.questions().is_empty());
    }

    #[test]
    fn reset_matches_fresh_state() {
        let mut state = started(3);
        state.answer(&qid("q-2"), &oid("b")).unwrap();
        state.toggle_flag(&qid("q-3")).unwrap();
        state.next();
        state.submit(fixed_now()).unwrap();

        state.reset();
        assert_eq!(state, SessionState::new());
    }

    #[test]
    fn from_persisted_drops_stray_keys() {
        let mut answers = BTreeMap::new();
        answers.insert(qid("q-1"), oid("b"));
        answers.insert(qid("q-1-gone"), oid("a"));
        answers.insert(qid("q-2"), oid("nope"));
        let flagged = [qid("q-2"), qid("ghost")].into_iter().collect();

        let state = SessionState::from_persisted(
            SessionConfig::default(),
            vec![question("q-1"), question("q-2")],
            answers,
            flagged,
            Some(fixed_now()),
            None,
            SessionStatus::InProgress,
            42,
        )
        .unwrap();

        assert_eq!(state.answers().len(), 1);
        assert_eq!(state.flagged().len(), 1);
        assert_eq!(state.time_remaining(), 42);
        assert_eq!(state.current_index(), 0);
    }

    #[test]
    fn from_persisted_rejects_contradicting_timestamps() {
        let err = SessionState::from_persisted(
            SessionConfig::default(),
            vec![question("q-1")],
            BTreeMap::new(),
            BTreeSet::new(),
            None,
            None,
            SessionStatus::Completed,
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidPersistedState(_)));
    }

    #[test]
    fn questions_are_fixed_once_started() {
        let mut state = started(2);
        state.answer(&qid("q-2"), &oid("b")).unwrap();
        let before = state.clone();
        assert!(matches!(
            state.load_questions(vec![question("q-9")]),
            Err(TransitionError::WrongStatus { .. })
        ));
        assert_eq!(state, before);

        state.submit(fixed_now()).unwrap();
        assert!(state.load_questions(Vec::new()).is_err());
        assert_eq!(state.questions().len(), 2);
    }

    #[test]
    fn reloading_questions_drops_flags_on_removed_ids() {
        let mut state = SessionState::new();
        state
            .load_questions(vec![question("q-1"), question("q-2"), question("q-3")])
            .unwrap();
        state.toggle_flag(&qid("q-1")).unwrap();
        state.toggle_flag(&qid("q-3")).unwrap();

        state.load_questions(vec![question("q-1")]).unwrap();

        assert!(state.is_flagged(&qid("q-1")));
        assert_eq!(state.flagged().len(), 1);
    }

    #[test]
    fn snapshot_deserialization_revalidates_questions_and_config() {
        let valid = serde_json::to_value(question("q-1")).unwrap();
        let restored: Question = serde_json::from_value(valid.clone()).unwrap();
        assert_eq!(restored, question("q-1"));

        let mut one_option = valid.clone();
        one_option["options"] = serde_json::json!([{ "id": "a", "text": "A" }]);
        assert!(serde_json::from_value::<Question>(one_option).is_err());

        let mut missing_answer = valid.clone();
        missing_answer["correct_option"] = serde_json::json!("zzz");
        assert!(serde_json::from_value::<Question>(missing_answer).is_err());

        let mut blank_prompt = valid.clone();
        blank_prompt["prompt"] = serde_json::json!("  ");
        assert!(serde_json::from_value::<Question>(blank_prompt).is_err());

        let mut misnumbered = valid;
        misnumbered["explanation"] =
            serde_json::json!([{ "step": 7, "title": "t", "body": "b" }]);
        assert!(serde_json::from_value::<Question>(misnumbered).is_err());

        let mut config = serde_json::to_value(SessionConfig::default()).unwrap();
        let restored: SessionConfig = serde_json::from_value(config.clone()).unwrap();
        assert_eq!(restored, SessionConfig::default());
        config["question_count"] = serde_json::json!(0);
        assert!(serde_json::from_value::<SessionConfig>(config.clone()).is_err());
        config["question_count"] = serde_json::json!(101);
        assert!(serde_json::from_value::<SessionConfig>(config).is_err());
    }
}
