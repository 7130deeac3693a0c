//! Bounded worker pool with merge-by-index results.
//!
//! Units of work are submitted together with the position they belong to.
//! At most `size` of them run at once; [`WorkerPool::collect`] waits for all
//! of them and hands back a slot vector in original order, whatever order the
//! workers finished in.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// A bounded pool of async workers whose results are keyed by index.
pub struct WorkerPool<T> {
    size: usize,
    semaphore: Arc<Semaphore>,
    tasks: JoinSet<(usize, T)>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a pool running at most `size` units of work concurrently.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
            tasks: JoinSet::new(),
        }
    }

    /// Maximum number of concurrently running workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of submitted units of work not yet collected.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Submit a unit of work whose result belongs in slot `index`.
    pub fn submit<F>(&mut self, index: usize, work: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::clone(&self.semaphore);
        self.tasks.spawn(async move {
            // The semaphore is never closed, so acquiring only waits.
            let _permit = semaphore.acquire_owned().await;
            (index, work.await)
        });
    }

    /// Wait for every submitted unit and return results in slot order.
    ///
    /// `on_complete(done, total)` is called as each worker finishes. Slots of
    /// workers that panicked, and indexes never submitted, stay `None`.
    pub async fn collect(
        mut self,
        slots: usize,
        mut on_complete: impl FnMut(usize, usize),
    ) -> Vec<Option<T>> {
        let mut results: Vec<Option<T>> = std::iter::repeat_with(|| None).take(slots).collect();
        let total = self.tasks.len();
        let mut done = 0;

        while let Some(joined) = self.tasks.join_next().await {
            done += 1;
            match joined {
                Ok((index, value)) => match results.get_mut(index) {
                    Some(slot) => *slot = Some(value),
                    None => warn!(index, slots, "worker result outside slot range dropped"),
                },
                Err(e) => warn!(error = %e, "worker failed"),
            }
            on_complete(done, total);
        }

        results
    }
}
