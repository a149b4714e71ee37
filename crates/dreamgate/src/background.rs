//! Fire-and-forget work that shutdown still waits for.
//!
//! Side-channel publishes are spawned here instead of on the request path.
//! [`BackgroundTasks::shutdown`] drains whatever is still in flight.

// std::sync::Mutex is correct here: the lock is never held across .await points.
use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Shared list of in-flight background tasks.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl BackgroundTasks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `future` and track it.
    ///
    /// The handle is recorded before this returns, so a task that finishes
    /// immediately is still accounted for. Finished handles are pruned here.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(future);

        let mut handles = self.handles.lock().expect("mutex poisoned");
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Wait for every tracked task. Panicked tasks are logged and skipped.
    pub async fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().expect("mutex poisoned"));
        if handles.is_empty() {
            return;
        }

        info!(count = handles.len(), "Waiting for background tasks");
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Background task failed");
            }
        }
        info!("Background tasks drained");
    }

    /// Number of tasks still running.
    pub fn pending_count(&self) -> usize {
        let mut handles = self.handles.lock().expect("mutex poisoned");
        handles.retain(|h| !h.is_finished());
        handles.len()
    }
}
