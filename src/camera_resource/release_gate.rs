//! Hand-off between a stopping capture thread and the next acquisition
//!
//! Releasing a stream must not block the controller, but the device stays
//! busy until its capture thread has closed it. The stream hands its thread
//! over on release and the next `open` waits for it here.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Exit handle of the last capture thread of one device
#[derive(Clone, Default)]
pub(crate) struct ReleaseGate {
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ReleaseGate {
    /// Park a thread that was asked to stop
    pub fn hand_over(&self, thread: JoinHandle<()>) {
        match self.pending.lock() {
            Ok(mut slot) => *slot = Some(thread),
            Err(_) => tracing::warn!("Release gate poisoned, capture thread detached"),
        }
    }

    /// Wait until the parked thread (if any) has exited
    pub async fn wait(&self) {
        let thread = match self.pending.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(thread) = thread else {
            return;
        };

        let name = thread.thread().name().unwrap_or("capture").to_string();
        tracing::debug!(thread = %name, "Waiting for previous capture session to close");

        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::warn!(thread = %name, "Capture thread panicked"),
            Err(e) => tracing::warn!(thread = %name, error = %e, "Failed to join capture thread"),
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.pending.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}
