//! One synchronization run: download, then upload, then cleanup.
//!
//! Each phase starts only after the previous one has fully drained. Phases
//! are optional; a runner without an upload coordinator never needs remote
//! credentials. Per-file failures are reported, never raised.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use crate::catalog::{CatalogError, CatalogRepository};
use crate::cleanup::{CleanupReport, CleanupSweeper};
use crate::download::{DownloadCoordinator, DownloadPhaseError, DownloadReport};
use crate::upload::{UploadCoordinator, UploadPhaseError, UploadReport};

/// A phase failed as a whole (not a single file).
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("download phase failed: {0}")]
    Download(#[from] DownloadPhaseError),

    #[error("upload phase failed: {0}")]
    Upload(#[from] UploadPhaseError),

    #[error("cleanup failed: {0}")]
    Cleanup(#[from] CatalogError),
}

/// Aggregate of the phases that ran; `None` marks a disabled phase.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub download: Option<DownloadReport>,
    pub upload: Option<UploadReport>,
    pub cleanup: Option<CleanupReport>,
}

impl RunReport {
    /// Files that failed in any phase.
    #[must_use]
    pub fn failed_files(&self) -> usize {
        let downloads = self.download.as_ref().map_or(0, |r| r.stats.failed);
        let uploads = self.upload.as_ref().map_or(0, |r| r.stats.failed);
        downloads + uploads
    }
}

/// Drives the phases of a run against one catalog.
pub struct SyncRunner<R> {
    catalog: R,
    downloads: Option<DownloadCoordinator>,
    uploads: Option<UploadCoordinator>,
    sweeper: Option<CleanupSweeper>,
}

impl<R> SyncRunner<R>
where
    R: CatalogRepository + Clone + 'static,
{
    /// A runner with every phase disabled.
    #[must_use]
    pub fn new(catalog: R) -> Self {
        Self {
            catalog,
            downloads: None,
            uploads: None,
            sweeper: None,
        }
    }

    #[must_use]
    pub fn with_downloads(mut self, coordinator: DownloadCoordinator) -> Self {
        self.downloads = Some(coordinator);
        self
    }

    #[must_use]
    pub fn with_uploads(mut self, coordinator: UploadCoordinator) -> Self {
        self.uploads = Some(coordinator);
        self
    }

    #[must_use]
    pub fn with_cleanup(mut self, sweeper: CleanupSweeper) -> Self {
        self.sweeper = Some(sweeper);
        self
    }

    /// Runs the enabled phases in order.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`] if a phase cannot run at all; later phases are
    /// not started.
    #[instrument(skip(self), fields(
        download = self.downloads.is_some(),
        upload = self.uploads.is_some(),
        cleanup = self.sweeper.is_some()
    ))]
    pub async fn run(&self) -> Result<RunReport, SyncError> {
        let mut report = RunReport::default();

        if let Some(downloads) = &self.downloads {
            report.download = Some(downloads.run(&self.catalog).await?);
        }
        if let Some(uploads) = &self.uploads {
            report.upload = Some(uploads.run(&self.catalog).await?);
        }
        if let Some(sweeper) = &self.sweeper {
            report.cleanup = Some(sweeper.sweep(&self.catalog).await?);
        }

        info!(failed_files = report.failed_files(), "run finished");
        Ok(report)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::db::Database;
    use crate::pool::PhaseReport;

    #[tokio::test]
    async fn test_runner_with_no_phases_reports_nothing() {
        let catalog = Catalog::new(Database::new_in_memory().await.unwrap());

        let report = SyncRunner::new(catalog).run().await.unwrap();

        assert!(report.download.is_none());
        assert!(report.upload.is_none());
        assert!(report.cleanup.is_none());
        assert_eq!(report.failed_files(), 0);
    }

    #[test]
    fn test_failed_files_sums_transfer_phases() {
        let report = RunReport {
            download: Some(DownloadReport {
                stats: PhaseReport {
                    completed: 3,
                    failed: 2,
                    skipped: 0,
                },
                completed_collections: Vec::new(),
            }),
            upload: Some(UploadReport {
                stats: PhaseReport {
                    completed: 1,
                    failed: 1,
                    skipped: 4,
                },
                bytes_sent: 10,
            }),
            cleanup: None,
        };

        assert_eq!(report.failed_files(), 3);
    }
}
