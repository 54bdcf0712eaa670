//! Removal of local artifacts that the remote store already holds.
//!
//! The sweep never touches catalog rows. A crash between an upload commit and
//! the sweep just leaves a local copy for the next sweep to remove.

use std::io::ErrorKind;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogError, CatalogRepository};

/// Counts from one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Artifacts deleted by this sweep.
    pub removed: usize,
    /// Uploaded files whose artifact was already gone.
    pub absent: usize,
    /// Deletions that failed (permissions, path is a directory, ...).
    pub failed: usize,
}

/// Deletes local copies of uploaded files.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupSweeper;

impl CleanupSweeper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Deletes the local artifact of every `uploaded = true` file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the uploaded files cannot be listed.
    /// Individual deletion failures are logged and counted instead.
    #[instrument(skip(self, catalog))]
    pub async fn sweep<R: CatalogRepository>(
        &self,
        catalog: &R,
    ) -> Result<CleanupReport, CatalogError> {
        let uploaded = catalog.list_uploaded().await?;
        let mut report = CleanupReport::default();

        for file in &uploaded {
            match tokio::fs::remove_file(file.local_path()).await {
                Ok(()) => {
                    debug!(path = %file.path, "removed local copy");
                    report.removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => report.absent += 1,
                Err(e) => {
                    warn!(
                        file = %file.name,
                        collection = %file.collection_name,
                        path = %file.path,
                        error = %e,
                        "failed to remove local copy"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            removed = report.removed,
            absent = report.absent,
            failed = report.failed,
            "cleanup sweep finished"
        );
        Ok(report)
    }
}
