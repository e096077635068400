//! PeriodicTask - Cancellable periodic trigger
//!
//! ## Responsibilities
//!
//! - Fire a callback at a fixed period on the tokio runtime
//! - Cancel deterministically (abort before the next firing)
//!
//! The first firing happens one full period after spawn, like a
//! browser interval timer. Missed ticks are skipped rather than bursted.

use std::ops::ControlFlow;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Handle to a running periodic trigger
///
/// Dropping the handle cancels the trigger.
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn a periodic trigger
    ///
    /// `on_tick` returning `ControlFlow::Break` ends the task (used when the
    /// receiving side has gone away).
    pub fn spawn<F>(name: &'static str, period: Duration, mut on_tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if on_tick().is_break() {
                    tracing::debug!(task = name, "Periodic task receiver gone, exiting");
                    break;
                }
            }
        });

        tracing::debug!(task = name, period_ms = period.as_millis() as u64, "Periodic task started");

        Self { name, handle }
    }

    /// Cancel the trigger
    pub fn cancel(self) {
        // Drop does the abort
    }

    /// True once the task exited on its own or was aborted
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            tracing::debug!(task = self.name, "Periodic task cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_period() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("test", Duration::from_millis(100), move || {
            c.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        task.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_ticks() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let task = PeriodicTask::spawn("test", Duration::from_millis(100), move || {
            c.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        task.cancel();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_break_ends_task() {
        let task = PeriodicTask::spawn("test", Duration::from_millis(10), || ControlFlow::Break(()));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(task.is_finished());
    }
}
