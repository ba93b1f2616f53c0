// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Delayed Task Executor
//!
//! Runs status-polling tasks after a delay on a bounded worker pool. Delayed
//! tasks sleep without holding a worker slot; once the delay elapses they
//! wait for one of `max_concurrent` permits. Shutdown drops tasks still in
//! their delay, closes the tracker and waits, up to a timeout, for the rest.
//! Dropped polls are picked up again by status reprocessing.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

pub struct DelayedTaskExecutor {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    max_concurrent: usize,
}

impl DelayedTaskExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            max_concurrent,
        }
    }

    /// Schedule `task` to run once `delay` has elapsed. Must be called from
    /// within a Tokio runtime.
    pub fn schedule<F>(&self, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            warn!("Executor is shutting down, task not scheduled");
            return;
        }

        let permits = self.permits.clone();
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            task.await;
        });
        metrics::counter!("siga_polling_tasks_scheduled_total").increment(1);
    }

    /// Tasks currently holding a worker slot.
    pub fn active_count(&self) -> usize {
        self.max_concurrent - self.permits.available_permits()
    }

    /// Tasks scheduled and not yet finished, including those still delayed.
    pub fn pending_count(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks and wait for in-flight ones. Returns `false` if the
    /// timeout elapsed first.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        self.cancel.cancel();
        debug!(pending = self.tracker.len(), "Waiting for polling tasks to finish");
        let finished = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        if !finished {
            warn!(pending = self.tracker.len(), "Shutdown timeout elapsed with polling tasks still running");
        }
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_after_delay() {
        let executor = DelayedTaskExecutor::new(2);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        executor.schedule(Duration::from_secs(5), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert_eq!(executor.pending_count(), 1);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(executor.shutdown(Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrency() {
        let executor = DelayedTaskExecutor::new(1);
        let gate = Arc::new(Semaphore::new(0));

        for _ in 0..2 {
            let gate = gate.clone();
            executor.schedule(Duration::ZERO, async move {
                let _ = gate.acquire().await;
            });
        }
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert_eq!(executor.active_count(), 1);

        gate.add_permits(2);
        assert!(executor.shutdown(Duration::from_secs(1)).await);
        assert_eq!(executor.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_delayed_tasks() {
        let executor = DelayedTaskExecutor::new(1);
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = runs.clone();
        executor.schedule(Duration::from_secs(3600), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;

        assert!(executor.shutdown(Duration::from_secs(1)).await);
        assert_eq!(executor.pending_count(), 0);
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_rejects_new_tasks() {
        let executor = DelayedTaskExecutor::new(1);
        assert!(executor.shutdown(Duration::from_secs(1)).await);

        executor.schedule(Duration::ZERO, async {});
        assert_eq!(executor.pending_count(), 0);
    }
}
