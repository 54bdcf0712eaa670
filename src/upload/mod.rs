//! Upload phase and the remote object store it talks to.
//!
//! # Overview
//!
//! - [`RemoteStore`] - the five store operations the protocol needs
//! - [`DropboxStore`] - Dropbox v2 HTTP implementation
//! - [`UploadCoordinator`] - existence check, transfer and bookkeeping per file
//! - [`TargetMapper`] - local path to remote path mapping

mod coordinator;
mod dropbox;
mod error;
mod listing_cache;
mod protocol;
mod store;
mod target;

pub use coordinator::{UploadCoordinator, UploadOptions, UploadReport};
pub use dropbox::{
    DEFAULT_API_BASE_URL, DEFAULT_CONTENT_BASE_URL, DEFAULT_TIMEOUT_SECS, DropboxConfig,
    DropboxStore,
};
pub use error::{UploadError, UploadPhaseError};
pub use listing_cache::ListingCache;
pub use protocol::{DEFAULT_CHUNK_SIZE, UploadStrategy, transfer_file};
pub use store::{RemoteError, RemoteStore, UploadCursor};
pub use target::{RemoteTarget, TargetMapper};
