// Periodic task - self-rescheduling tick with a cancellable handle
//
// The task sleeps for the interval, runs the tick to completion, then sleeps
// again. A slow tick therefore delays the next one instead of overlapping it.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Handle to a running periodic task
///
/// Dropping the handle cancels the task the same way [`cancel`](Self::cancel)
/// does.
pub struct PeriodicTask {
    interval: Duration,

    /// `true` once cancelled. Held by the task for the whole of each tick so
    /// cancellation waits for an in-flight tick and no tick starts afterwards.
    gate: Arc<Mutex<bool>>,

    /// Wakes the task out of its sleep when cancelled
    cancel_tx: watch::Sender<bool>,

    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Spawn `tick` to run every `interval` on `runtime`, first after one
    /// full interval.
    ///
    /// `tick` runs inline on the runtime; it may block for the duration of a
    /// remote call.
    pub fn spawn<F>(runtime: &Handle, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let gate = Arc::new(Mutex::new(false));
        let (cancel_tx, mut cancel_rx) = watch::channel(false);

        let task_gate = Arc::clone(&gate);
        let handle = runtime.spawn(async move {
            tracing::debug!("Periodic task started (interval: {:?})", interval);

            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = cancel_rx.changed() => break,
                }

                let cancelled = task_gate.lock().unwrap_or_else(PoisonError::into_inner);
                if *cancelled {
                    break;
                }
                tick();
                drop(cancelled);
            }

            tracing::debug!("Periodic task finished");
        });

        Self {
            interval,
            gate,
            cancel_tx,
            handle,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Cancel the task.
    ///
    /// Blocks until a tick that is already running has finished. Once this
    /// returns no further tick will start.
    pub fn cancel(&self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = true;
        let _ = self.cancel_tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the underlying tokio task has exited
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
