use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use quiz_core::Clock;
use quiz_core::model::{
    ConfigPatch, OptionId, QuestionId, SessionState, SessionStatus, Subject, SubjectId,
    TransitionError,
};
use quiz_core::scoring::{QuestionReview, SessionResult, question_reviews};
use storage::repository::{
    QuestionRepository, SessionSlot, SessionSnapshotRepository, Storage, StorageError,
};
use tokio::sync::Mutex;

use super::progress::{self, QuestionMarker, SessionProgress};
use super::store::SessionStore;
use super::timer::{self, TICK_PERIOD, TimerHandle};
use crate::error::SessionError;
use crate::provider::{BankQuestionProvider, QuestionProvider};

//
// ─── SHARED STATE ──────────────────────────────────────────────────────────────
//

/// State reachable from both the facade and the countdown task.
struct Shared {
    store: Mutex<SessionStore>,
    snapshots: Arc<dyn SessionSnapshotRepository>,
    slot: SessionSlot,
    degraded: AtomicBool,
}

impl Shared {
    /// Best-effort write of the current record. Failures are logged and mark
    /// the session as running memory-only.
    async fn persist(&self, store: &SessionStore) {
        let record = store.to_persisted();
        if let Err(err) = self.snapshots.save_snapshot(&self.slot, &record).await {
            self.mark_degraded("save", &err);
        }
    }

    async fn clear(&self) {
        if let Err(err) = self.snapshots.clear_snapshot(&self.slot).await {
            self.mark_degraded("clear", &err);
        }
    }

    fn mark_degraded(&self, action: &'static str, err: &StorageError) {
        tracing::warn!(slot = %self.slot, action, error = %err, "session persistence failed");
        self.degraded.store(true, Ordering::Relaxed);
    }

    async fn countdown_step(&self) -> ControlFlow<()> {
        let mut store = self.store.lock().await;
        if !store.state().is_in_progress() {
            return ControlFlow::Break(());
        }
        match store.tick_down() {
            Ok(status) => {
                self.persist(&store).await;
                if status == SessionStatus::Completed {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "countdown tick rejected");
                ControlFlow::Break(())
            }
        }
    }
}

//
// ─── FACADE ────────────────────────────────────────────────────────────────────
//

/// Entry point for a front-end: one assessment session bound to a storage slot.
///
/// Every successful mutation is written through to the slot while the store
/// lock is held, so the record never lags behind a command that returned.
pub struct AssessmentSession {
    shared: Arc<Shared>,
    bank: Arc<dyn QuestionRepository>,
    provider: Arc<dyn QuestionProvider>,
    timer: Mutex<Option<TimerHandle>>,
}

impl AssessmentSession {
    /// A session in setup state. Call [`AssessmentSession::hydrate`] to pick up
    /// a saved attempt.
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, slot: SessionSlot) -> Self {
        let provider: Arc<dyn QuestionProvider> =
            Arc::new(BankQuestionProvider::new(Arc::clone(&storage.questions)));
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(SessionStore::new(clock)),
                snapshots: Arc::clone(&storage.snapshots),
                slot,
                degraded: AtomicBool::new(false),
            }),
            bank: Arc::clone(&storage.questions),
            provider,
            timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn QuestionProvider>) -> Self {
        self.provider = provider;
        self
    }

    #[must_use]
    pub fn slot(&self) -> &SessionSlot {
        &self.shared.slot
    }

    /// True once any read or write of the slot has failed.
    #[must_use]
    pub fn persistence_degraded(&self) -> bool {
        self.shared.degraded.load(Ordering::Relaxed)
    }

    // ─── Lifecycle ─────────────────────────────────────────────────────────

    /// Load the saved record for this slot, if any, and resume its countdown.
    ///
    /// A missing, unreadable or inconsistent record leaves a fresh setup state.
    pub async fn hydrate(&self) -> SessionStatus {
        let mut timer = self.timer.lock().await;
        timer.take();
        let mut store = self.shared.store.lock().await;
        let clock = store.clock();

        match self.shared.snapshots.load_snapshot(&self.shared.slot).await {
            Ok(None) => {
                tracing::debug!(slot = %self.shared.slot, "no saved session");
                *store = SessionStore::new(clock);
            }
            Ok(Some(record)) => match SessionStore::restore(clock, record) {
                Ok(restored) => *store = restored,
                Err(err) => {
                    tracing::warn!(
                        slot = %self.shared.slot,
                        error = %err,
                        "ignoring inconsistent saved session"
                    );
                    *store = SessionStore::new(clock);
                }
            },
            Err(StorageError::Serialization(reason)) => {
                tracing::warn!(slot = %self.shared.slot, %reason, "ignoring corrupt saved session");
                *store = SessionStore::new(clock);
            }
            Err(err) => {
                self.shared.mark_degraded("load", &err);
                *store = SessionStore::new(clock);
            }
        }

        if store.state().is_in_progress() {
            if store.state().time_remaining() == 0 {
                if store.tick(0).is_ok() {
                    self.shared.persist(&store).await;
                }
            } else {
                *timer = Some(self.spawn_timer());
            }
        }
        store.state().status()
    }

    /// Begin with the configured count and the default duration.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Empty` if the bank has nothing for the
    /// configuration, `SessionError::Transition` if the session cannot start,
    /// or `SessionError::Storage` if the bank cannot be read.
    pub async fn start(&self) -> Result<(), SessionError> {
        self.start_inner(None).await
    }

    /// Same as [`AssessmentSession::start`] with an explicit countdown.
    ///
    /// # Errors
    ///
    /// See [`AssessmentSession::start`].
    pub async fn start_with_duration(&self, duration_secs: u32) -> Result<(), SessionError> {
        self.start_inner(Some(duration_secs)).await
    }

    async fn start_inner(&self, duration_secs: Option<u32>) -> Result<(), SessionError> {
        let mut timer = self.timer.lock().await;
        let mut store = self.shared.store.lock().await;
        let config = store.state().config().clone();
        let duration = duration_secs.unwrap_or_else(|| config.default_duration_secs());

        if store.state().status() == SessionStatus::Setup {
            let questions = self
                .provider
                .questions(config.question_count(), config.subject_id())
                .await?;
            let mut candidate = store.clone();
            candidate.load_questions(questions)?;
            candidate.start(duration)?;
            *store = candidate;
        } else {
            store.start(duration)?;
        }

        self.shared.persist(&store).await;
        *timer = Some(self.spawn_timer());
        Ok(())
    }

    /// Finish the attempt and stop the countdown. `Ok(false)` if already completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` if the session never started.
    pub async fn submit(&self) -> Result<bool, SessionError> {
        self.stop_timer().await;
        let mut store = self.shared.store.lock().await;
        let submitted = store.submit()?;
        if submitted {
            self.shared.persist(&store).await;
        }
        Ok(submitted)
    }

    /// Discard the attempt, stop the countdown and clear the saved record.
    pub async fn reset(&self) {
        self.stop_timer().await;
        let mut store = self.shared.store.lock().await;
        store.reset();
        self.shared.clear().await;
    }

    /// Restart the countdown from the store's current value.
    ///
    /// Returns whether a countdown is running afterwards.
    pub async fn resume_timer(&self) -> bool {
        let mut timer = self.timer.lock().await;
        timer.take();
        let in_progress = self.shared.store.lock().await.state().is_in_progress();
        if in_progress {
            *timer = Some(self.spawn_timer());
        }
        in_progress
    }

    pub async fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    async fn stop_timer(&self) {
        if let Some(handle) = self.timer.lock().await.take() {
            handle.stop();
        }
    }

    fn spawn_timer(&self) -> TimerHandle {
        let shared = Arc::clone(&self.shared);
        timer::spawn(TICK_PERIOD, move || {
            let shared = Arc::clone(&shared);
            async move { shared.countdown_step().await }
        })
    }

    // ─── Setup ─────────────────────────────────────────────────────────────

    /// Subjects offered on the setup screen.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` if the bank cannot be read.
    pub async fn subjects(&self) -> Result<Vec<Subject>, SessionError> {
        Ok(self.bank.list_subjects().await?)
    }

    /// Returns `Ok(false)` if the session has started and the patch was ignored.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` for an out-of-range question count.
    pub async fn configure(&self, patch: ConfigPatch) -> Result<bool, SessionError> {
        let mut store = self.shared.store.lock().await;
        let applied = store.configure(patch)?;
        if applied {
            self.shared.persist(&store).await;
        }
        Ok(applied)
    }

    /// Select `subject` with all of its chapters, or clear the selection if it
    /// is already the selected subject. Returns the selection afterwards.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::UnknownSubject` if the bank has no such subject.
    pub async fn select_subject(
        &self,
        subject: &SubjectId,
    ) -> Result<Option<SubjectId>, SessionError> {
        let mut store = self.shared.store.lock().await;
        let patch = if store.state().config().subject_id() == Some(subject) {
            ConfigPatch::new().subject(None).chapters(Vec::<String>::new())
        } else {
            let found = match self.bank.get_subject(subject).await {
                Ok(found) => found,
                Err(StorageError::NotFound) => {
                    return Err(SessionError::UnknownSubject(subject.clone()));
                }
                Err(err) => return Err(err.into()),
            };
            ConfigPatch::new()
                .subject(Some(found.id().clone()))
                .chapters(found.chapters().iter().cloned())
        };

        if store.configure(patch)? {
            self.shared.persist(&store).await;
        }
        Ok(store.state().config().subject_id().cloned())
    }

    /// Flip one chapter in the selection. Returns whether it is selected afterwards.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Transition` if the configuration rejects the change.
    pub async fn toggle_chapter(&self, chapter: &str) -> Result<bool, SessionError> {
        let mut store = self.shared.store.lock().await;
        let mut chapters = store.state().config().chapters().clone();
        if !chapters.remove(chapter) {
            chapters.insert(chapter.to_owned());
        }

        if store.configure(ConfigPatch::new().chapters(chapters))? {
            self.shared.persist(&store).await;
        }
        Ok(store.state().config().chapters().contains(chapter))
    }

    // ─── Answering ─────────────────────────────────────────────────────────

    /// # Errors
    ///
    /// Returns `SessionError::Transition` if the session is not in progress or
    /// the ids do not resolve.
    pub async fn answer(&self, question: &QuestionId, option: &OptionId) -> Result<(), SessionError> {
        let mut store = self.shared.store.lock().await;
        store.answer(question, option)?;
        self.shared.persist(&store).await;
        Ok(())
    }

    /// Answer whichever question is currently shown.
    ///
    /// # Errors
    ///
    /// Same as [`AssessmentSession::answer`].
    pub async fn answer_current(&self, option: &OptionId) -> Result<(), SessionError> {
        let mut store = self.shared.store.lock().await;
        let question = current_id(store.state())?;
        store.answer(&question, option)?;
        self.shared.persist(&store).await;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `SessionError::Transition` for an unknown question.
    pub async fn toggle_flag(&self, question: &QuestionId) -> Result<bool, SessionError> {
        let mut store = self.shared.store.lock().await;
        let flagged = store.toggle_flag(question)?;
        self.shared.persist(&store).await;
        Ok(flagged)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Transition` when there is no current question.
    pub async fn toggle_flag_current(&self) -> Result<bool, SessionError> {
        let mut store = self.shared.store.lock().await;
        let question = current_id(store.state())?;
        let flagged = store.toggle_flag(&question)?;
        self.shared.persist(&store).await;
        Ok(flagged)
    }

    // ─── Navigation (not persisted) ────────────────────────────────────────

    pub async fn next(&self) -> usize {
        self.shared.store.lock().await.next()
    }

    pub async fn previous(&self) -> usize {
        self.shared.store.lock().await.previous()
    }

    pub async fn jump(&self, index: usize) -> usize {
        self.shared.store.lock().await.set_current_index(index)
    }

    // ─── Views ─────────────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> SessionState {
        self.shared.store.lock().await.state().clone()
    }

    pub async fn progress(&self) -> SessionProgress {
        SessionProgress::from_state(self.shared.store.lock().await.state())
    }

    pub async fn markers(&self) -> Vec<QuestionMarker> {
        progress::markers(self.shared.store.lock().await.state())
    }

    /// Final figures for a completed session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub async fn result(&self) -> Result<SessionResult, SessionError> {
        let store = self.shared.store.lock().await;
        if !store.state().is_completed() {
            return Err(SessionError::NotCompleted);
        }
        Ok(SessionResult::from_state(store.state()))
    }

    /// Figures as they would stand if the session ended now.
    pub async fn preview(&self) -> SessionResult {
        SessionResult::from_state(self.shared.store.lock().await.state())
    }

    /// Per-question review with explanations, available after completion.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotCompleted` before completion.
    pub async fn reviews(&self) -> Result<Vec<QuestionReview>, SessionError> {
        let store = self.shared.store.lock().await;
        if !store.state().is_completed() {
            return Err(SessionError::NotCompleted);
        }
        Ok(question_reviews(store.state()))
    }
}

fn current_id(state: &SessionState) -> Result<QuestionId, SessionError> {
    state
        .current_question()
        .map(|q| q.id().clone())
        .ok_or(SessionError::Transition(TransitionError::NoQuestions))
}
