//! Pure scoring over a `SessionState`.
//!
//! Nothing here is cached on the session; every figure is re-derived from the
//! answers, the question sequence and the timestamps each time it is asked for.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{
    Complexity, ExplanationStep, OptionId, QuestionId, SessionConfig, SessionState,
};

/// Base experience granted per correct answer before the complexity multiplier.
pub const XP_PER_CORRECT: u32 = 25;
/// A finished session counts as "fast" below this many seconds per question.
pub const PACE_SECONDS_PER_QUESTION: u64 = 60;
/// Questions that make up one day of streak progress on the setup screen.
pub const QUESTIONS_PER_STREAK_DAY: u32 = 10;

//
// ─── RANK ──────────────────────────────────────────────────────────────────────
//

/// Coarse label derived from accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Rank {
    Beginner,
    Novice,
    Apprentice,
    Adept,
    Expert,
    Grandmaster,
}

/// Highest threshold first; the first one met wins.
const RANK_LADDER: [(u32, Rank); 5] = [
    (95, Rank::Grandmaster),
    (90, Rank::Expert),
    (80, Rank::Adept),
    (70, Rank::Apprentice),
    (60, Rank::Novice),
];

impl Rank {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Rank::Beginner => "Beginner",
            Rank::Novice => "Novice",
            Rank::Apprentice => "Apprentice",
            Rank::Adept => "Adept",
            Rank::Expert => "Expert",
            Rank::Grandmaster => "Grandmaster",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[must_use]
pub fn rank(accuracy: u32) -> Rank {
    RANK_LADDER
        .iter()
        .find(|(threshold, _)| accuracy >= *threshold)
        .map_or(Rank::Beginner, |(_, rank)| *rank)
}

//
// ─── COUNTS ────────────────────────────────────────────────────────────────────
//

#[must_use]
pub fn correct_count(state: &SessionState) -> u32 {
    count_where(state, |q, chosen| chosen.is_some_and(|o| q.is_correct(o)))
}

#[must_use]
pub fn incorrect_count(state: &SessionState) -> u32 {
    count_where(state, |q, chosen| chosen.is_some_and(|o| !q.is_correct(o)))
}

#[must_use]
pub fn skipped_count(state: &SessionState) -> u32 {
    total_questions(state)
        .saturating_sub(correct_count(state))
        .saturating_sub(incorrect_count(state))
}

#[must_use]
pub fn total_questions(state: &SessionState) -> u32 {
    u32::try_from(state.questions().len()).unwrap_or(u32::MAX)
}

fn count_where<F>(state: &SessionState, pred: F) -> u32
where
    F: Fn(&crate::model::Question, Option<&OptionId>) -> bool,
{
    let n = state
        .questions()
        .iter()
        .filter(|q| pred(q, state.answer_for(q.id())))
        .count();
    u32::try_from(n).unwrap_or(u32::MAX)
}

//
// ─── DERIVED FIGURES ───────────────────────────────────────────────────────────
//

/// Percentage of correct answers, rounded half up. Zero when there are no questions.
#[must_use]
pub fn accuracy(correct: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct);
    let total = u64::from(total);
    let pct = (200 * correct + total) / (2 * total);
    u32::try_from(pct).unwrap_or(u32::MAX)
}

/// `round(correct * 25 * multiplier)` for the given complexity.
#[must_use]
pub fn experience_earned(correct: u32, complexity: Complexity) -> u32 {
    scaled_experience(correct, complexity.xp_multiplier())
}

/// Same as `experience_earned`, for a raw complexity label.
///
/// Unrecognized labels fall back to a multiplier of 1.0.
#[must_use]
pub fn experience_for_label(correct: u32, label: &str) -> u32 {
    let multiplier = label
        .parse::<Complexity>()
        .map_or(1.0, Complexity::xp_multiplier);
    scaled_experience(correct, multiplier)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_experience(correct: u32, multiplier: f64) -> u32 {
    let xp = (f64::from(correct) * f64::from(XP_PER_CORRECT) * multiplier).round();
    xp.clamp(0.0, f64::from(u32::MAX)) as u32
}

/// Whole seconds between start and end, or 0 if either is missing.
#[must_use]
pub fn elapsed_seconds(state: &SessionState) -> u64 {
    match (state.start_time(), state.end_time()) {
        (Some(start), Some(end)) => u64::try_from((end - start).num_seconds()).unwrap_or(0),
        _ => 0,
    }
}

/// Experience on offer if every question of `config` is answered correctly.
#[must_use]
pub fn potential_experience(config: &SessionConfig) -> u32 {
    experience_earned(config.question_count(), config.complexity())
}

/// Days of streak progress a session of `question_count` questions contributes.
#[must_use]
pub fn streak_impact(question_count: u32) -> u32 {
    question_count.div_ceil(QUESTIONS_PER_STREAK_DAY)
}

//
// ─── RESULT VIEW ───────────────────────────────────────────────────────────────
//

/// Everything the results screen shows, derived in one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResult {
    pub total_questions: u32,
    pub correct_count: u32,
    pub incorrect_count: u32,
    pub skipped_count: u32,
    pub accuracy: u32,
    pub rank: Rank,
    pub experience_earned: u32,
    pub elapsed_seconds: u64,
    /// Finished in under a minute per question.
    pub within_pace: bool,
}

impl SessionResult {
    #[must_use]
    pub fn from_state(state: &SessionState) -> Self {
        let total = total_questions(state);
        let correct = correct_count(state);
        let incorrect = incorrect_count(state);
        let accuracy = accuracy(correct, total);
        let elapsed = elapsed_seconds(state);

        Self {
            total_questions: total,
            correct_count: correct,
            incorrect_count: incorrect,
            skipped_count: total.saturating_sub(correct).saturating_sub(incorrect),
            accuracy,
            rank: rank(accuracy),
            experience_earned: experience_earned(correct, state.config().complexity()),
            elapsed_seconds: elapsed,
            within_pace: elapsed < u64::from(total) * PACE_SECONDS_PER_QUESTION,
        }
    }
}

/// How a single question ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnswerOutcome {
    Correct,
    Incorrect,
    Skipped,
}

/// Per-question line of the post-session review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionReview {
    pub position: usize,
    pub question_id: QuestionId,
    pub prompt: String,
    pub chosen: Option<OptionId>,
    pub correct: OptionId,
    pub outcome: AnswerOutcome,
    pub flagged: bool,
    pub explanation: Vec<ExplanationStep>,
}

#[must_use]
pub fn question_reviews(state: &SessionState) -> Vec<QuestionReview> {
    state
        .questions()
        .iter()
        .enumerate()
        .map(|(position, q)| {
            let chosen = state.answer_for(q.id()).cloned();
            let outcome = match &chosen {
                None => AnswerOutcome::Skipped,
                Some(o) if q.is_correct(o) => AnswerOutcome::Correct,
                Some(_) => AnswerOutcome::Incorrect,
            };
            QuestionReview {
                position,
                question_id: q.id().clone(),
                prompt: q.prompt().to_owned(),
                chosen,
                correct: q.correct_option().clone(),
                outcome,
                flagged: state.is_flagged(q.id()),
                explanation: q.explanation().to_vec(),
            }
        })
        .collect()
}
