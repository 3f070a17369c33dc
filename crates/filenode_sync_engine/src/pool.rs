//! Bounded concurrent task scheduler.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::error;

/// Runs batches of async tasks with at most `size` in flight.
///
/// One pool is owned by each engine and shared by the hashing and download
/// phases of a run.
#[derive(Debug, Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl TaskPool {
    /// Creates a pool running at most `size` tasks at once (minimum 1).
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Maximum number of tasks in flight.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs `f` over every item and returns the outputs in input order.
    ///
    /// A slot is `None` if its task panicked.
    pub async fn run_all<I, F, Fut, T>(&self, items: Vec<I>, f: F) -> Vec<Option<T>>
    where
        I: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let f = Arc::new(f);
        let total = items.len();
        let mut set = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            let permits = Arc::clone(&self.permits);
            let f = Arc::clone(&f);
            set.spawn(async move {
                // The semaphore is never closed, so acquisition only fails on shutdown.
                let _permit = permits.acquire_owned().await.ok();
                (index, f(item).await)
            });
        }

        let mut slots: Vec<Option<T>> = (0..total).map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, value)) => slots[index] = Some(value),
                Err(e) => error!(error = %e, "pool task did not complete"),
            }
        }
        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_input_order() {
        let pool = TaskPool::new(4);
        let out = pool
            .run_all((0..20u64).collect(), |n| async move {
                tokio::time::sleep(Duration::from_millis(20 - n)).await;
                n * 2
            })
            .await;
        let values: Vec<u64> = out.into_iter().map(Option::unwrap).collect();
        assert_eq!(values, (0..20).map(|n| n * 2).collect::<Vec<_>>());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_size() {
        let pool = TaskPool::new(3);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (c, p) = (Arc::clone(&current), Arc::clone(&peak));
        pool.run_all((0..24).collect::<Vec<u32>>(), move |_| {
            let (c, p) = (Arc::clone(&c), Arc::clone(&p));
            async move {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                c.fetch_sub(1, Ordering::SeqCst);
            }
        })
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn size_is_at_least_one() {
        assert_eq!(TaskPool::new(0).size(), 1);
    }
}
