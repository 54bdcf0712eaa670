//! Download phase: fetch every pending file, then settle collection completion.
//!
//! # Overview
//!
//! The coordinator lists `downloaded = false` files, runs one worker per file
//! on a [`WorkerPool`], and marks each success in the catalog. Failures are
//! logged and left for the next run; nothing is retried within a run. Once the
//! pool has drained, collection completion is computed exactly once.
//!
//! # Example
//!
//! ```no_run
//! use catalog_sync_core::download::{DownloadCoordinator, HttpClient};
//! use catalog_sync_core::{Catalog, Database, WorkerPool};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new(Path::new("catalog.db")).await?;
//! let catalog = Catalog::new(db);
//! let coordinator = DownloadCoordinator::new(WorkerPool::new(8)?, HttpClient::new());
//! let report = coordinator.run(&catalog).await?;
//! println!("downloaded {}, failed {}", report.stats.completed, report.stats.failed);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{DownloadError, HttpClient};
use crate::catalog::{CatalogError, CatalogFile, CatalogRepository};
use crate::pool::{PhaseReport, PhaseStats, PoolError, WorkerPool};

/// Error type for the download phase as a whole.
///
/// Per-file failures never surface here; they are counted in the report.
#[derive(Debug, thiserror::Error)]
pub enum DownloadPhaseError {
    /// Listing pending files or computing completion failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The worker pool could not schedule tasks.
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Outcome of one download phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    pub stats: PhaseReport,
    /// Collections whose `skip` flag was set by this phase.
    pub completed_collections: Vec<String>,
}

/// Why a single file did not reach `downloaded = true`.
#[derive(Debug, thiserror::Error)]
enum FileFailure {
    #[error(transparent)]
    Transfer(#[from] DownloadError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Runs the download phase over a catalog.
#[derive(Debug, Clone)]
pub struct DownloadCoordinator {
    pool: WorkerPool,
    client: HttpClient,
}

impl DownloadCoordinator {
    /// Creates a coordinator that fetches with `client` on `pool`.
    #[must_use]
    pub fn new(pool: WorkerPool, client: HttpClient) -> Self {
        Self { pool, client }
    }

    /// Downloads every pending file, then computes collection completion.
    ///
    /// A run with nothing pending issues no network request and changes no
    /// file row.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadPhaseError`] only if the pending list or the
    /// completion step fails, or the pool cannot schedule work.
    #[instrument(skip(self, catalog), fields(concurrency = self.pool.concurrency()))]
    pub async fn run<R>(&self, catalog: &R) -> Result<DownloadReport, DownloadPhaseError>
    where
        R: CatalogRepository + Clone + 'static,
    {
        let pending = catalog.list_pending_downloads().await?;
        info!(pending = pending.len(), "starting download phase");

        let stats = Arc::new(PhaseStats::new());
        let task_stats = Arc::clone(&stats);
        let client = self.client.clone();
        let handle = catalog.clone();

        let panicked = self
            .pool
            .run(pending, move |file: CatalogFile| {
                let stats = Arc::clone(&task_stats);
                let client = client.clone();
                let catalog = handle.clone();
                async move {
                    match download_one(&client, &catalog, &file).await {
                        Ok(()) => stats.record_completed(),
                        Err(error) => {
                            warn!(
                                file = %file.name,
                                collection = %file.collection_name,
                                url = %file.url,
                                error = %error,
                                "download failed, will retry next run"
                            );
                            stats.record_failed();
                        }
                    }
                }
            })
            .await?;
        stats.record_failures(panicked);

        let completed_collections = catalog.compute_collection_completion().await?;

        let report = DownloadReport {
            stats: stats.snapshot(),
            completed_collections,
        };
        info!(
            completed = report.stats.completed,
            failed = report.stats.failed,
            collections_completed = report.completed_collections.len(),
            "download phase finished"
        );
        Ok(report)
    }
}

async fn download_one<R: CatalogRepository>(
    client: &HttpClient,
    catalog: &R,
    file: &CatalogFile,
) -> Result<(), FileFailure> {
    let dest = file.local_path();
    ensure_parent_dir(dest).await?;
    client.fetch_to_path(&file.url, dest).await?;
    catalog.mark_downloaded(&file.key()).await?;
    Ok(())
}

async fn ensure_parent_dir(path: &Path) -> Result<(), DownloadError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e)),
        _ => Ok(()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Alpha").join("models").join("a.stl");

        ensure_parent_dir(&target).await.unwrap();

        assert!(target.parent().unwrap().is_dir());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_accepts_bare_file_name() {
        ensure_parent_dir(Path::new("a.stl")).await.unwrap();
    }

    #[test]
    fn test_file_failure_display_is_transparent() {
        let failure = FileFailure::from(DownloadError::http_status("https://src/a.stl", 500));
        assert_eq!(failure.to_string(), "HTTP 500 downloading https://src/a.stl");
    }
}
