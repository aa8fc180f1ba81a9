//! One-second countdown driver.
//!
//! The timer only knows how to wake up; what a tick does is supplied by the
//! caller. Dropping the handle stops the task.

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Owns a running countdown task and aborts it on drop.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Whether the task has exited on its own.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `on_tick` once per `period`, the first call one period from now,
/// until it returns `ControlFlow::Break`.
///
/// Must be called from within a tokio runtime.
pub fn spawn<F, Fut>(period: Duration, mut on_tick: F) -> TimerHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ControlFlow<()>> + Send + 'static,
{
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Burst);
        loop {
            interval.tick().await;
            if on_tick().await.is_break() {
                break;
            }
        }
        tracing::debug!("countdown stopped");
    });
    TimerHandle { task }
}
