use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quiz_core::model::{
    ConfigPatch, OptionId, QuestionId, SessionState, SessionStatus, SubjectId, TransitionError,
};
use quiz_core::scoring::AnswerOutcome;
use quiz_core::time::fixed_clock;
use services::{AssessmentSession, SessionError};
use storage::repository::{
    PersistedSession, SessionSlot, SessionSnapshotRepository, Storage, StorageError,
};
use storage::sample;

async fn seeded() -> Storage {
    let storage = Storage::in_memory();
    sample::seed(&storage).await.unwrap();
    storage
}

fn session(storage: &Storage) -> AssessmentSession {
    AssessmentSession::new(storage, fixed_clock(), SessionSlot::default())
}

async fn saved(storage: &Storage) -> Option<PersistedSession> {
    storage
        .snapshots
        .load_snapshot(&SessionSlot::default())
        .await
        .unwrap()
}

/// Snapshot store that fails every call the way a broken backend would.
struct BrokenSnapshots {
    error: fn() -> StorageError,
}

#[async_trait]
impl SessionSnapshotRepository for BrokenSnapshots {
    async fn load_snapshot(
        &self,
        _slot: &SessionSlot,
    ) -> Result<Option<PersistedSession>, StorageError> {
        Err((self.error)())
    }

    async fn save_snapshot(
        &self,
        _slot: &SessionSlot,
        _session: &PersistedSession,
    ) -> Result<(), StorageError> {
        Err((self.error)())
    }

    async fn clear_snapshot(&self, _slot: &SessionSlot) -> Result<(), StorageError> {
        Err((self.error)())
    }
}

fn with_snapshots(storage: &Storage, error: fn() -> StorageError) -> Storage {
    Storage {
        questions: Arc::clone(&storage.questions),
        snapshots: Arc::new(BrokenSnapshots { error }),
    }
}

#[tokio::test(start_paused = true)]
async fn countdown_expires_session_after_duration() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.configure(ConfigPatch::new().question_count(2))
        .await
        .unwrap();
    quiz.start_with_duration(120).await.unwrap();
    assert!(quiz.timer_running().await);

    tokio::time::sleep(Duration::from_millis(60_500)).await;
    let halfway = quiz.snapshot().await;
    assert_eq!(halfway.status(), SessionStatus::InProgress);
    assert_eq!(halfway.time_remaining(), 60);

    tokio::time::sleep(Duration::from_secs(61)).await;
    let state = quiz.snapshot().await;
    assert_eq!(state.status(), SessionStatus::Completed);
    assert_eq!(state.time_remaining(), 0);
    assert!(state.end_time().is_some());
    assert!(!quiz.timer_running().await);

    let record = saved(&storage).await.unwrap();
    assert_eq!(record.status, SessionStatus::Completed);
    assert_eq!(record.time_remaining, 0);
}

#[tokio::test(start_paused = true)]
async fn default_duration_is_ninety_seconds_per_question() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.configure(ConfigPatch::new().question_count(3))
        .await
        .unwrap();
    quiz.start().await.unwrap();

    let state = quiz.snapshot().await;
    assert_eq!(state.questions().len(), 3);
    assert_eq!(state.time_remaining(), 270);
    let ids: Vec<_> = state.questions().iter().map(|q| q.id().as_str()).collect();
    assert_eq!(ids, vec!["q-1", "q-2", "q-3"]);
}

#[tokio::test(start_paused = true)]
async fn hydrate_resumes_saved_session() {
    let storage = seeded().await;
    {
        let quiz = session(&storage);
        quiz.configure(ConfigPatch::new().question_count(4))
            .await
            .unwrap();
        quiz.start_with_duration(300).await.unwrap();
        quiz.answer(&QuestionId::new("q-2"), &OptionId::new("b"))
            .await
            .unwrap();
        quiz.toggle_flag(&QuestionId::new("q-3")).await.unwrap();
        quiz.jump(3).await;
        tokio::time::sleep(Duration::from_millis(10_500)).await;
    }

    // The first session's countdown died with it.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(saved(&storage).await.unwrap().time_remaining, 290);

    let quiz = session(&storage);
    assert_eq!(quiz.hydrate().await, SessionStatus::InProgress);
    let state = quiz.snapshot().await;
    assert_eq!(state.time_remaining(), 290);
    assert_eq!(state.current_index(), 0);
    assert_eq!(
        state.answer_for(&QuestionId::new("q-2")),
        Some(&OptionId::new("b"))
    );
    assert!(state.is_flagged(&QuestionId::new("q-3")));
    assert!(quiz.timer_running().await);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(quiz.snapshot().await.time_remaining(), 288);
}

#[tokio::test(start_paused = true)]
async fn hydrate_completes_session_with_no_time_left() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.configure(ConfigPatch::new().question_count(1))
        .await
        .unwrap();
    quiz.start_with_duration(60).await.unwrap();

    let mut record = saved(&storage).await.unwrap();
    record.time_remaining = 0;
    storage
        .snapshots
        .save_snapshot(&SessionSlot::default(), &record)
        .await
        .unwrap();

    let restored = session(&storage);
    assert_eq!(restored.hydrate().await, SessionStatus::Completed);
    assert!(!restored.timer_running().await);
    assert!(restored.result().await.is_ok());
    assert_eq!(
        saved(&storage).await.unwrap().status,
        SessionStatus::Completed
    );
}

#[tokio::test]
async fn hydrate_without_record_starts_fresh() {
    let storage = seeded().await;
    let quiz = session(&storage);
    assert_eq!(quiz.hydrate().await, SessionStatus::Setup);
    assert_eq!(quiz.snapshot().await, SessionState::new());
    assert!(!quiz.persistence_degraded());
}

#[tokio::test]
async fn corrupt_record_is_ignored() {
    let storage = with_snapshots(&seeded().await, || {
        StorageError::Serialization("expected value at line 1".into())
    });
    let quiz = session(&storage);
    assert_eq!(quiz.hydrate().await, SessionStatus::Setup);
    assert_eq!(quiz.snapshot().await, SessionState::new());
}

#[tokio::test(start_paused = true)]
async fn failed_writes_degrade_to_memory_only() {
    let storage = with_snapshots(&seeded().await, || {
        StorageError::Connection("disk full".into())
    });
    let quiz = session(&storage);
    assert!(!quiz.persistence_degraded());

    quiz.configure(ConfigPatch::new().question_count(2))
        .await
        .unwrap();
    assert!(quiz.persistence_degraded());

    quiz.start_with_duration(30).await.unwrap();
    quiz.answer(&QuestionId::new("q-1"), &OptionId::new("a"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    let state = quiz.snapshot().await;
    assert_eq!(state.answers().len(), 1);
    assert_eq!(state.time_remaining(), 27);

    quiz.reset().await;
    assert_eq!(quiz.snapshot().await, SessionState::new());
}

#[tokio::test(start_paused = true)]
async fn reset_clears_saved_record() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.configure(ConfigPatch::new().question_count(2))
        .await
        .unwrap();
    quiz.start().await.unwrap();
    assert!(saved(&storage).await.is_some());

    quiz.reset().await;
    assert!(saved(&storage).await.is_none());
    assert_eq!(quiz.snapshot().await, SessionState::new());
    assert!(!quiz.timer_running().await);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(saved(&storage).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn submit_scores_and_reviews() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.configure(
        ConfigPatch::new()
            .question_count(4)
            .complexity(quiz_core::model::Complexity::Advanced),
    )
    .await
    .unwrap();
    quiz.start().await.unwrap();
    assert!(matches!(
        quiz.result().await,
        Err(SessionError::NotCompleted)
    ));

    quiz.answer_current(&OptionId::new("a")).await.unwrap();
    quiz.next().await;
    quiz.answer_current(&OptionId::new("c")).await.unwrap();
    assert!(quiz.toggle_flag_current().await.unwrap());

    let progress = quiz.progress().await;
    assert_eq!(progress.answered, 2);
    assert_eq!(progress.flagged, 1);
    assert!(progress.needs_submit_confirmation());
    assert_eq!(quiz.preview().await.correct_count, 1);

    assert!(quiz.submit().await.unwrap());
    assert!(!quiz.submit().await.unwrap());
    assert!(!quiz.timer_running().await);

    let result = quiz.result().await.unwrap();
    assert_eq!(result.correct_count, 1);
    assert_eq!(result.incorrect_count, 1);
    assert_eq!(result.skipped_count, 2);
    assert_eq!(result.accuracy, 25);
    assert_eq!(result.experience_earned, 50);

    let reviews = quiz.reviews().await.unwrap();
    assert_eq!(reviews.len(), 4);
    assert_eq!(reviews[0].outcome, AnswerOutcome::Correct);
    assert_eq!(reviews[1].outcome, AnswerOutcome::Incorrect);
    assert!(reviews[1].flagged);
    assert_eq!(reviews[3].outcome, AnswerOutcome::Skipped);
    assert_eq!(reviews[0].explanation.len(), 3);

    let err = quiz.start().await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Transition(TransitionError::WrongStatus { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn restart_in_progress_clears_answers() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.configure(ConfigPatch::new().question_count(2))
        .await
        .unwrap();
    quiz.start().await.unwrap();
    quiz.answer(&QuestionId::new("q-1"), &OptionId::new("a"))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5_500)).await;

    quiz.start().await.unwrap();
    let state = quiz.snapshot().await;
    assert!(state.answers().is_empty());
    assert_eq!(state.time_remaining(), 180);
}

#[tokio::test]
async fn subject_selection_toggles() {
    let storage = seeded().await;
    let quiz = session(&storage);
    let calculus = SubjectId::new("calculus");

    assert_eq!(quiz.subjects().await.unwrap().len(), 6);

    assert_eq!(
        quiz.select_subject(&calculus).await.unwrap(),
        Some(calculus.clone())
    );
    assert_eq!(quiz.snapshot().await.config().chapters().len(), 4);

    assert!(!quiz.toggle_chapter("Series").await.unwrap());
    assert!(quiz.toggle_chapter("Series").await.unwrap());

    assert_eq!(quiz.select_subject(&calculus).await.unwrap(), None);
    assert!(quiz.snapshot().await.config().chapters().is_empty());

    let err = quiz
        .select_subject(&SubjectId::new("chemistry"))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::UnknownSubject(_)));
}

#[tokio::test]
async fn empty_bank_refuses_to_start() {
    let storage = seeded().await;
    let quiz = session(&storage);
    quiz.select_subject(&SubjectId::new("physics")).await.unwrap();

    let err = quiz.start().await.unwrap_err();
    assert!(matches!(err, SessionError::Empty));
    assert_eq!(quiz.snapshot().await.status(), SessionStatus::Setup);
    assert!(!quiz.timer_running().await);
}

#[tokio::test]
async fn invalid_count_is_rejected() {
    let storage = seeded().await;
    let quiz = session(&storage);
    let err = quiz
        .configure(ConfigPatch::new().question_count(0))
        .await
        .unwrap_err();
    assert!(err.is_rejection());
    assert_eq!(quiz.snapshot().await.config().question_count(), 20);
}
