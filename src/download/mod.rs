//! Download phase for catalogued files.
//!
//! # Features
//!
//! - Streaming downloads straight to each file's recorded path
//! - Configurable timeouts (30s connect, 5min between reads by default)
//! - Structured error types with full context
//! - Bounded concurrency through the shared worker pool
//! - Collection completion computed once after the batch drains

mod client;
mod constants;
mod coordinator;
mod error;

pub use client::{HttpClient, USER_AGENT};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
pub use coordinator::{DownloadCoordinator, DownloadPhaseError, DownloadReport};
pub use error::DownloadError;
