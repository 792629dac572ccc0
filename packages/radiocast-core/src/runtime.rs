//! Task spawning for short-lived request workers.
//!
//! Control operations that touch the network (adding a track, skipping) must
//! not block the caller. They hand their work to a [`TaskSpawner`]; the
//! production [`TokioSpawner`] also tracks those workers so shutdown can wait
//! for in-flight ones to finish.

use std::future::Future;
use std::time::Duration;

use tokio_util::task::TaskTracker;

/// Abstraction for spawning background work.
///
/// Spawned work runs detached from the caller; there is no join handle.
pub trait TaskSpawner: Send + Sync {
    /// Spawns a future as a background task.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Tokio-based spawner that keeps count of the workers it started.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: tokio::runtime::Handle,
    tracker: TaskTracker,
}

impl TokioSpawner {
    /// Creates a spawner for the given runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            tracker: TaskTracker::new(),
        }
    }

    /// Creates a spawner on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(tokio::runtime::Handle::current())
    }

    /// Number of spawned workers that have not finished yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting new work and waits up to `timeout` for running
    /// workers. Returns `false` if some were still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok()
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            log::debug!("[Runtime] Spawner closed, dropping worker");
            return;
        }
        self.tracker.spawn_on(future, &self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn spawned_worker_runs_and_drains() {
        let spawner = TokioSpawner::current();
        let executed = Arc::new(AtomicBool::new(false));
        let flag = executed.clone();

        spawner.spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(spawner.drain(Duration::from_secs(1)).await);
        assert!(executed.load(Ordering::SeqCst));
        assert_eq!(spawner.in_flight(), 0);
    }

    #[tokio::test]
    async fn closed_spawner_drops_new_work() {
        let spawner = TokioSpawner::current();
        assert!(spawner.drain(Duration::from_millis(10)).await);

        let executed = Arc::new(AtomicBool::new(false));
        let flag = executed.clone();
        spawner.spawn(async move { flag.store(true, Ordering::SeqCst) });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!executed.load(Ordering::SeqCst));
    }
}
