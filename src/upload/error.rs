//! Error types for the upload module.

use std::path::PathBuf;

use thiserror::Error;

use super::store::RemoteError;
use crate::catalog::CatalogError;
use crate::pool::PoolError;

/// Why a single file did not reach `uploaded = true`.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Reading the local artifact failed.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The local file being uploaded.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A remote store call failed; the transfer was abandoned.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The transfer succeeded but recording it failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

impl UploadError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attaches the real file path to an IO error raised by a path-less reader.
    #[must_use]
    pub fn with_path(self, path: impl Into<PathBuf>) -> Self {
        match self {
            Self::Io { source, .. } => Self::Io {
                path: path.into(),
                source,
            },
            other => other,
        }
    }
}

/// Error type for the upload phase as a whole.
///
/// Per-file failures never surface here; they are counted in the report.
#[derive(Debug, Error)]
pub enum UploadPhaseError {
    /// Listing pending uploads failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// The worker pool could not schedule tasks.
    #[error(transparent)]
    Pool(#[from] PoolError),
}
