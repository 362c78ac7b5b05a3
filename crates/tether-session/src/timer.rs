//! Cancellable scheduled tasks.
//!
//! All three per-session timers (renew reminder, token expiry, liveness
//! probe) share this one mechanism instead of juggling raw platform
//! handles: schedule a future, keep the handle, cancel the handle.
//! Dropping a handle cancels too, so a timer can never outlive the
//! state that owns it — dangling timers after teardown are the main
//! resource-leak risk in the session core.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// Handle to a scheduled task. Aborts the task on [`cancel`](Self::cancel)
/// or on drop.
#[derive(Debug)]
pub struct TaskHandle {
    handle: JoinHandle<()>,
}

impl TaskHandle {
    /// Spawns a task and returns its handle.
    pub fn spawn(future: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            handle: tokio::spawn(future),
        }
    }

    /// Spawns a task that runs `future` once `delay` has elapsed.
    ///
    /// Cancelling before the delay elapses means the future never runs.
    pub fn spawn_after(
        delay: Duration,
        future: impl Future<Output = ()> + Send + 'static,
    ) -> Self {
        Self::spawn(async move {
            tokio::time::sleep(delay).await;
            future.await;
        })
    }

    /// Cancels the task. A no-op if it already finished.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Whether the task has run to completion (or been aborted).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// =========================================================================
// Tests
// =========================================================================
