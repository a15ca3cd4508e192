//! Bounded worker pool
//!
//! Admission capacity is the maximum pool size plus the pending-task
//! queue capacity, tracked by an atomic counter that is incremented at
//! submit time and decremented by a drop guard when the task finishes
//! for any reason (completion, panic, abort). Actual concurrency is
//! bounded by a semaphore: tasks admitted beyond the permit count sit in
//! the queue waiting for a permit. The scheduler is the primary
//! admission control and never submits past the remaining capacity; the
//! capacity bound here is a last-resort safeguard.
//!
//! Every task completion sends a [`Event::TaskCompleted`] wakeup so the
//! scheduler re-evaluates capacity and frontier state.

use crate::crawler::spider::Event;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) struct Dispatcher {
    tasks: JoinSet<()>,
    active: Arc<AtomicUsize>,
    permits: Arc<Semaphore>,
    capacity: usize,
    grace: Duration,
    events: UnboundedSender<Event>,
}

/// Decrements the active count and wakes the scheduler when a task ends,
/// no matter how it ends.
struct ActiveGuard {
    active: Arc<AtomicUsize>,
    events: UnboundedSender<Event>,
}

impl ActiveGuard {
    fn new(active: Arc<AtomicUsize>, events: UnboundedSender<Event>) -> Self {
        active.fetch_add(1, Ordering::SeqCst);
        Self { active, events }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        // The receiver is gone only after the scheduler has fully
        // drained, at which point nobody is listening anyway.
        let _ = self.events.send(Event::TaskCompleted);
    }
}

impl Dispatcher {
    pub(crate) fn new(
        max_workers: usize,
        queue_capacity: usize,
        grace: Duration,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            tasks: JoinSet::new(),
            active: Arc::new(AtomicUsize::new(0)),
            permits: Arc::new(Semaphore::new(max_workers)),
            capacity: max_workers + queue_capacity,
            grace,
            events,
        }
    }

    /// Number of admitted tasks that have not yet finished
    pub(crate) fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Admission slots still available
    pub(crate) fn remaining_capacity(&self) -> usize {
        self.capacity.saturating_sub(self.active_count())
    }

    /// Submits a worker task. The caller is responsible for checking
    /// `remaining_capacity` first.
    pub(crate) fn submit<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = ActiveGuard::new(self.active.clone(), self.events.clone());
        let permits = self.permits.clone();
        self.tasks.spawn(async move {
            let _guard = guard;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return, // semaphore closed, pool shutting down
            };
            task.await;
        });
    }

    /// Reaps finished task handles without blocking.
    pub(crate) fn reap(&mut self) {
        while self.tasks.try_join_next().is_some() {}
    }

    /// Graceful shutdown: no new submissions, a bounded grace period for
    /// in-flight tasks, then force-cancel the remainder.
    pub(crate) async fn shutdown(mut self) {
        self.permits.close();
        let drained = tokio::time::timeout(self.grace, drain_all(&mut self.tasks)).await;
        if drained.is_err() {
            tracing::warn!(
                "pool did not terminate within {:?}, cancelling {} remaining tasks",
                self.grace,
                self.active_count()
            );
            self.tasks.abort_all();
            drain_all(&mut self.tasks).await;
        }
    }
}

async fn drain_all(tasks: &mut JoinSet<()>) {
    while tasks.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn dispatcher(
        max_workers: usize,
        queue: usize,
    ) -> (Dispatcher, mpsc::UnboundedReceiver<Event>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Dispatcher::new(max_workers, queue, Duration::from_millis(200), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn capacity_accounting() {
        let (mut pool, mut events) = dispatcher(2, 3);
        assert_eq!(pool.remaining_capacity(), 5);
        assert_eq!(pool.active_count(), 0);

        pool.submit(async {});
        assert_eq!(pool.active_count(), 1);
        assert_eq!(pool.remaining_capacity(), 4);

        // The completion wakeup arrives once the task has run.
        assert!(matches!(events.recv().await, Some(Event::TaskCompleted)));
        assert_eq!(pool.active_count(), 0);
        pool.reap();
    }

    #[tokio::test]
    async fn semaphore_bounds_running_tasks() {
        let (mut pool, mut events) = dispatcher(1, 4);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..4 {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            });
        }
        for _ in 0..4 {
            assert!(matches!(events.recv().await, Some(Event::TaskCompleted)));
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_stuck_tasks_after_grace() {
        let (mut pool, _events) = dispatcher(1, 1);
        pool.submit(async {
            // Never finishes on its own.
            std::future::pending::<()>().await;
        });

        let start = std::time::Instant::now();
        pool.shutdown().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(5));
    }
}
