//! Bounded worker pool with submit / await-all batches

use futures_util::FutureExt;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

/// Result of one pooled task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(String),
    TimedOut,
    /// Never submitted because cancellation was requested first
    Cancelled,
}

/// Fixed-size pool; each task holds one permit for its whole lifetime
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
    task_timeout: Duration,
}

impl WorkerPool {
    pub fn new(size: usize, task_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
            task_timeout,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Start a new batch bound to `cancel`
    pub fn batch<K, T>(&self, cancel: CancellationToken) -> PoolBatch<K, T> {
        PoolBatch {
            permits: Arc::clone(&self.permits),
            task_timeout: self.task_timeout,
            cancel,
            tasks: JoinSet::new(),
            cancelled: Vec::new(),
        }
    }
}

/// Tasks submitted together and awaited together
pub struct PoolBatch<K, T> {
    permits: Arc<Semaphore>,
    task_timeout: Duration,
    cancel: CancellationToken,
    tasks: JoinSet<(K, TaskOutcome<T>)>,
    cancelled: Vec<K>,
}

impl<K, T> PoolBatch<K, T>
where
    K: Send + 'static,
    T: Send + 'static,
{
    /// Wait for a free worker and spawn `task` on it.
    /// Returns false when cancellation fired first; `key` is then reported as cancelled.
    pub async fn submit<F, E>(&mut self, key: K, task: F) -> bool
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        E: Display,
    {
        if self.cancel.is_cancelled() {
            self.cancelled.push(key);
            return false;
        }

        let cancel = self.cancel.clone();
        let permits = Arc::clone(&self.permits);
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = permits.acquire_owned() => permit.ok(),
        };

        let Some(permit) = permit else {
            self.cancelled.push(key);
            return false;
        };

        let task_timeout = self.task_timeout;
        self.tasks.spawn(async move {
            let _permit = permit;
            let outcome = match AssertUnwindSafe(tokio::time::timeout(task_timeout, task))
                .catch_unwind()
                .await
            {
                Ok(Ok(Ok(value))) => TaskOutcome::Completed(value),
                Ok(Ok(Err(e))) => TaskOutcome::Failed(e.to_string()),
                Ok(Err(_)) => TaskOutcome::TimedOut,
                Err(_) => TaskOutcome::Failed("worker panicked".to_string()),
            };
            (key, outcome)
        });

        true
    }

    /// Drain every submitted task; completion order is not preserved
    pub async fn await_all(mut self) -> Vec<(K, TaskOutcome<T>)> {
        let mut results = Vec::with_capacity(self.tasks.len() + self.cancelled.len());

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => error!(target: "WORKER_POOL", "Worker task lost: {}", e),
            }
        }

        if !self.cancelled.is_empty() {
            debug!(
                target: "WORKER_POOL",
                "{} tasks not submitted due to cancellation",
                self.cancelled.len()
            );
        }
        results.extend(
            self.cancelled
                .drain(..)
                .map(|key| (key, TaskOutcome::Cancelled)),
        );
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrency_never_exceeds_pool_size() {
        let pool = WorkerPool::new(3, Duration::from_secs(5));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut batch = pool.batch(CancellationToken::new());
        for i in 0..12u32 {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            batch
                .submit(i, async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(i * 2)
                })
                .await;
        }

        let mut results = batch.await_all().await;
        results.sort_by_key(|(k, _)| *k);
        assert_eq!(results.len(), 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(results[5], (5, TaskOutcome::Completed(10)));
    }

    #[tokio::test]
    async fn failures_and_timeouts_are_reported_per_task() {
        let pool = WorkerPool::new(2, Duration::from_millis(30));
        let mut batch = pool.batch(CancellationToken::new());

        batch.submit("ok", async { Ok::<_, String>(1) }).await;
        batch
            .submit("err", async { Err::<u32, _>("bad shape".to_string()) })
            .await;
        batch
            .submit("slow", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, String>(3)
            })
            .await;

        let mut results = batch.await_all().await;
        results.sort_by_key(|(k, _)| *k);
        assert_eq!(
            results,
            vec![
                ("err", TaskOutcome::Failed("bad shape".to_string())),
                ("ok", TaskOutcome::Completed(1)),
                ("slow", TaskOutcome::TimedOut),
            ]
        );
    }

    #[tokio::test]
    async fn cancelled_batch_stops_submitting() {
        let pool = WorkerPool::new(1, Duration::from_secs(1));
        let cancel = CancellationToken::new();
        let mut batch = pool.batch(cancel.clone());

        assert!(batch.submit(1, async { Ok::<_, String>(()) }).await);
        cancel.cancel();
        assert!(!batch.submit(2, async { Ok::<_, String>(()) }).await);
        assert!(!batch.submit(3, async { Ok::<_, String>(()) }).await);

        let mut results = batch.await_all().await;
        results.sort_by_key(|(k, _)| *k);
        assert_eq!(results[0], (1, TaskOutcome::Completed(())));
        assert_eq!(results[1], (2, TaskOutcome::Cancelled));
        assert_eq!(results[2], (3, TaskOutcome::Cancelled));
    }

    #[tokio::test]
    async fn panicking_task_is_a_failure() {
        let pool = WorkerPool::new(1, Duration::from_secs(1));
        let mut batch = pool.batch(CancellationToken::new());
        batch
            .submit("boom", async {
                if true {
                    panic!("worker exploded");
                }
                Ok::<u32, String>(0)
            })
            .await;

        let results = batch.await_all().await;
        assert_eq!(
            results,
            vec![("boom", TaskOutcome::Failed("worker panicked".to_string()))]
        );
    }
}
