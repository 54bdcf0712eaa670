//! Bounded worker pool shared by the download and upload phases.
//!
//! Each item runs in its own Tokio task; a semaphore permit is acquired before
//! the task is spawned, so at most `concurrency` items are in flight. The pool
//! joins every task before returning, which is the barrier between phases.

use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 64;

/// Concurrency used when none is configured: the host's available parallelism.
#[must_use]
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map_or(MIN_CONCURRENCY, NonZeroUsize::get)
        .clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

/// Error type for worker pool operations.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Live counters for one phase, updated from concurrent tasks.
#[derive(Debug, Default)]
pub struct PhaseStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
}

impl PhaseStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn record_failures(&self, count: usize) {
        self.failed.fetch_add(count, Ordering::SeqCst);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// Freezes the counters into a report.
    #[must_use]
    pub fn snapshot(&self) -> PhaseReport {
        PhaseReport {
            completed: self.completed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            skipped: self.skipped.load(Ordering::SeqCst),
        }
    }
}

/// Final counts for one phase.
///
/// `skipped` counts items settled without a transfer (for uploads: already
/// present remotely).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl PhaseReport {
    /// Total items processed.
    #[must_use]
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Semaphore-bounded task runner.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
}

impl WorkerPool {
    /// Creates a pool with the given concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConcurrency`] if the value is outside
    /// `MIN_CONCURRENCY..=MAX_CONCURRENCY`.
    pub fn new(concurrency: usize) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(PoolError::InvalidConcurrency { value: concurrency });
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        })
    }

    /// Creates a pool sized to the host's available parallelism.
    #[must_use]
    pub fn with_default_concurrency() -> Self {
        let concurrency = default_concurrency();
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
        }
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs `task` once per item and waits for all of them.
    ///
    /// Task panics are logged and counted, never propagated: one bad item must
    /// not abort the batch. Returns the number of tasks that panicked.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::SemaphoreClosed`] if the semaphore is closed.
    #[instrument(skip(self, items, task), fields(items = items.len(), concurrency = self.concurrency))]
    pub async fn run<T, F, Fut>(&self, items: Vec<T>, task: F) -> Result<usize, PoolError>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let task = Arc::new(task);
        let mut handles = Vec::with_capacity(items.len());

        for item in items {
            // Blocks while `concurrency` tasks are in flight
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| PoolError::SemaphoreClosed)?;

            let task = Arc::clone(&task);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                task(item).await;
            }));
        }

        debug!(task_count = handles.len(), "waiting for workers to drain");

        let mut panicked = 0;
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "worker task panicked");
                panicked += 1;
            }
        }

        Ok(panicked)
    }
}
