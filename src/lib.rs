//! Catalog Sync Core Library
//!
//! Keeps a durable catalog of remote files, downloads each one exactly once to
//! local storage, uploads each one exactly once to a remote object store, and
//! survives crashes and repeated runs by treating the per-file flags as the
//! only source of truth.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Collections, files and their transfer flags
//! - [`db`] - Database connection and schema management
//! - [`discovery`] - Ingest of crawler manifests into the catalog
//! - [`download`] - Download phase with streaming fetches
//! - [`upload`] - Upload phase, chunked session protocol, remote store adapters
//! - [`cleanup`] - Removal of local copies once uploaded
//! - [`pool`] - Bounded worker pool shared by both transfer phases
//! - [`sync`] - Phase sequencing for one run
//! - [`retry`] - Bounded retry for database bootstrap

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod cleanup;
pub mod db;
pub mod discovery;
pub mod download;
pub mod pool;
pub mod retry;
pub mod sync;
pub mod upload;

// Re-export commonly used types
pub use catalog::{Catalog, CatalogError, CatalogFile, CatalogRepository, Collection, FileKey};
pub use cleanup::{CleanupReport, CleanupSweeper};
pub use db::{Database, DatabaseOptions, DbError};
pub use discovery::{CatalogEntry, IngestReport, ingest, load_manifest};
pub use download::{DownloadCoordinator, DownloadReport, HttpClient};
pub use pool::{PhaseReport, WorkerPool, default_concurrency};
pub use retry::RetryPolicy;
pub use sync::{RunReport, SyncError, SyncRunner};
pub use upload::{
    DropboxConfig, DropboxStore, RemoteStore, TargetMapper, UploadCoordinator, UploadOptions,
    UploadReport,
};
