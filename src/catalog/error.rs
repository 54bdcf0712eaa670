//! Error types for catalog operations.

use thiserror::Error;

use super::FileKey;
use crate::db::DbErrorKind;

/// Errors that can occur during catalog operations.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// Database operation failed.
    #[error("database error ({kind}): {message}")]
    Database {
        /// Typed classification used for failure handling.
        kind: DbErrorKind,
        /// Human-readable database error text.
        message: String,
    },

    /// No collection is registered under this URL.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A file referenced a collection name that no collection carries.
    #[error(
        "unknown collection '{0}'\n  Suggestion: register the collection and set its name before adding files"
    )]
    UnknownCollection(String),

    /// No file row exists for this key.
    #[error("file not found: {0}")]
    FileNotFound(FileKey),

    /// Attempted to mark a file uploaded before it was downloaded.
    #[error("file {0} cannot be marked uploaded before it is downloaded")]
    NotDownloaded(FileKey),

    /// Two distinct sources map to the same key even after disambiguation.
    #[error("duplicate catalog key {key}: held by {existing_url}, rejected {url}")]
    DuplicateKey {
        /// The contested key (after disambiguation).
        key: FileKey,
        /// Source URL already stored under the key.
        existing_url: String,
        /// Source URL that was rejected.
        url: String,
    },
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database {
            kind: DbErrorKind::from_sqlx(&err),
            message: err.to_string(),
        }
    }
}

impl CatalogError {
    /// Returns the typed database error kind, when this is a database error.
    #[must_use]
    pub fn database_kind(&self) -> Option<DbErrorKind> {
        match self {
            Self::Database { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns true when this error is a database busy/locked condition.
    #[must_use]
    pub fn is_busy_or_locked(&self) -> bool {
        self.database_kind() == Some(DbErrorKind::BusyOrLocked)
    }
}
