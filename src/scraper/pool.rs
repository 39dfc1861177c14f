//! Bounded worker pool owned by one target run

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

/// Runs at most `size` jobs at once; `submit` waits for a free slot unless
/// the run is cancelled first.
///
/// Dropping the pool aborts unfinished jobs, so callers [`drain`](WorkerPool::drain)
/// it before returning.
pub(crate) struct WorkerPool<T> {
    limit: Arc<Semaphore>,
    tasks: JoinSet<T>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub(crate) fn new(size: usize, cancel: CancellationToken) -> Self {
        Self {
            limit: Arc::new(Semaphore::new(size.max(1))),
            tasks: JoinSet::new(),
            cancel,
        }
    }

    /// Spawn `job` once a worker slot is free.
    ///
    /// Returns `false` without spawning if the run is cancelled, including
    /// while waiting for a slot.
    pub(crate) async fn submit<F>(&mut self, job: F) -> bool
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return false,
            // The semaphore is never closed, so acquisition only fails if that changes
            permit = self.limit.clone().acquire_owned() => permit.ok(),
        };
        self.tasks.spawn(async move {
            let _permit = permit;
            job.await
        });
        true
    }

    /// Number of submitted jobs not yet collected
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every submitted job, in completion order
    pub(crate) async fn drain(&mut self) -> Vec<Result<T, JoinError>> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next().await {
            results.push(result);
        }
        results
    }
}
