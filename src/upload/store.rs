//! Remote object store abstraction.
//!
//! The upload coordinator only needs five operations from a store; everything
//! wire-specific lives in the adapters.

use async_trait::async_trait;
use thiserror::Error;

/// Position inside an open upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadCursor {
    /// Store-assigned session identifier.
    pub session_id: String,
    /// Bytes the store has accepted so far.
    pub offset: u64,
}

/// Errors reported by a [`RemoteStore`].
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The folder being listed does not exist; callers treat this as empty.
    #[error("remote folder not found: {path}")]
    FolderNotFound {
        /// The folder that was listed.
        path: String,
    },

    /// The request never produced a response (connect, TLS, timeout, body read).
    #[error("transport error calling {endpoint}: {source}")]
    Transport {
        /// API endpoint that was called.
        endpoint: String,
        /// The underlying HTTP client error.
        #[source]
        source: reqwest::Error,
    },

    /// The store answered with an error.
    #[error("{endpoint} failed with HTTP {status}: {summary}")]
    Api {
        /// API endpoint that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Store-provided error summary (or the raw body).
        summary: String,
    },

    /// The final commit was refused, e.g. a conflicting object at the path.
    #[error("commit to {path} rejected: {reason}")]
    CommitRejected {
        /// Target path of the commit.
        path: String,
        /// Store-provided reason.
        reason: String,
    },

    /// The store's session offset disagrees with the bytes sent.
    #[error("session {session_id} offset mismatch: sent up to {expected}, store reports {actual}")]
    OffsetMismatch {
        /// Session identifier.
        session_id: String,
        /// Offset tracked locally.
        expected: u64,
        /// Offset reported by the store.
        actual: u64,
    },

    /// A successful response could not be decoded.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// API endpoint that was called.
        endpoint: String,
        /// Decoder message.
        message: String,
    },
}

impl RemoteError {
    /// Creates a transport error.
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Creates an API error.
    pub fn api(endpoint: impl Into<String>, status: u16, summary: impl Into<String>) -> Self {
        Self::Api {
            endpoint: endpoint.into(),
            status,
            summary: summary.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// True for commit-integrity failures (rejected commit or offset drift).
    #[must_use]
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::CommitRejected { .. } | Self::OffsetMismatch { .. })
    }
}

/// The operations the upload protocol needs from a remote object store.
///
/// Paths are absolute and `/`-separated (`/catalog/Alpha/a.stl`).
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Names of the entries directly inside `folder`.
    ///
    /// Returns [`RemoteError::FolderNotFound`] when the folder is absent.
    async fn list_folder(&self, folder: &str) -> Result<Vec<String>, RemoteError>;

    /// Uploads a small object in one request.
    async fn upload_whole(&self, bytes: Vec<u8>, path: &str) -> Result<(), RemoteError>;

    /// Opens a session with its first chunk and returns the session id.
    async fn start_session(&self, first_chunk: Vec<u8>) -> Result<String, RemoteError>;

    /// Appends `chunk` at `cursor.offset` and returns the store's new offset.
    async fn append_chunk(&self, chunk: Vec<u8>, cursor: &UploadCursor)
    -> Result<u64, RemoteError>;

    /// Sends the last chunk and commits the session's bytes to `path`.
    async fn finish_session(
        &self,
        chunk: Vec<u8>,
        cursor: &UploadCursor,
        path: &str,
    ) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::api("/2/files/upload", 409, "path/conflict/file/");
        let msg = err.to_string();
        assert!(msg.contains("409"));
        assert!(msg.contains("path/conflict"));

        let err = RemoteError::FolderNotFound {
            path: "/catalog/Alpha".to_string(),
        };
        assert!(err.to_string().contains("/catalog/Alpha"));
    }

    #[test]
    fn test_remote_error_integrity_classification() {
        assert!(
            RemoteError::CommitRejected {
                path: "/a".to_string(),
                reason: "conflict".to_string(),
            }
            .is_integrity_failure()
        );
        assert!(
            RemoteError::OffsetMismatch {
                session_id: "s".to_string(),
                expected: 8,
                actual: 4,
            }
            .is_integrity_failure()
        );
        assert!(!RemoteError::api("/x", 500, "boom").is_integrity_failure());
    }
}
