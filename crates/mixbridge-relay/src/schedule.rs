//! Cancelable one-shot scheduled tasks.
//!
//! A [`ScheduledTask`] runs a future after a delay on its own Tokio task.
//! The owner holds the handle; canceling or dropping it aborts the task if
//! it has not yet run.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a future scheduled to run once after a delay.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Spawn `action` to run after `delay`.
    pub fn after<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });
        ScheduledTask { handle }
    }

    /// Abort the task. No effect if it already ran.
    pub fn cancel(self) {
        drop(self);
    }

    /// Returns `true` once the action has run or the task was aborted.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
