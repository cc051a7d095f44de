//! Background work the host must keep alive
//!
//! A browser worker is torn down once its event handlers return unless the
//! host is told to extend the event's lifetime. Here every piece of work
//! that outlives the call that started it comes back as a `BackgroundTask`
//! which the host awaits or holds until it is done.

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

/// Handle to spawned background work
#[derive(Debug)]
#[must_use = "background work may be lost unless the host awaits or holds it"]
pub struct BackgroundTask {
    label: String,
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    /// Spawn `work` on the current runtime
    pub fn spawn<F>(label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            label: label.into(),
            handle: tokio::spawn(work),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the work to finish
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            warn!("Background task {} did not complete: {}", self.label, e);
        }
    }

    /// Wait for every task in `tasks`
    pub async fn wait_all(tasks: Vec<BackgroundTask>) {
        futures_util::future::join_all(tasks.into_iter().map(BackgroundTask::wait)).await;
    }
}
