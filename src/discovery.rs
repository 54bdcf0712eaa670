//! Ingest of catalog entries produced by the external crawler.
//!
//! The crawler writes a JSON array of entries; each entry names a collection
//! and one file in it. Ingesting registers collections, applies their display
//! names and upserts the files. A bad row is logged and counted, and the rest
//! of the batch still lands.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::{CatalogError, CatalogRepository, NewFile, UpsertAction};

/// One discovered file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub collection_url: String,
    pub collection_name: String,
    pub file_name: String,
    pub file_url: String,
    pub local_path: String,
}

/// Errors loading a manifest.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Counts from one ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    /// Distinct collections in the batch.
    pub collections: usize,
    pub inserted: usize,
    pub unchanged: usize,
    /// Stale rows evicted and recreated.
    pub refreshed: usize,
    /// Rows stored under a parent-prefixed name after a key collision.
    pub disambiguated: usize,
    pub failed: usize,
}

/// Reads a JSON manifest from disk.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if the file cannot be read or is not a JSON
/// array of entries.
pub async fn load_manifest(path: &Path) -> Result<Vec<CatalogEntry>, DiscoveryError> {
    let raw = tokio::fs::read(path)
        .await
        .map_err(|source| DiscoveryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    serde_json::from_slice(&raw).map_err(|source| DiscoveryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Applies a batch of entries to the catalog.
///
/// Collections are registered and named once each, in first-seen order.
/// Rows of a collection that could not be registered are counted as failed.
#[instrument(skip(catalog, entries), fields(entries = entries.len()))]
pub async fn ingest<R: CatalogRepository>(catalog: &R, entries: &[CatalogEntry]) -> IngestReport {
    let mut report = IngestReport::default();
    let mut registered: HashMap<&str, bool> = HashMap::new();

    for entry in entries {
        let ready = match registered.get(entry.collection_url.as_str()) {
            Some(ready) => *ready,
            None => {
                let ready = match register_collection(catalog, entry).await {
                    Ok(()) => true,
                    Err(error) => {
                        warn!(
                            collection = %entry.collection_url,
                            name = %entry.collection_name,
                            error = %error,
                            "failed to register collection"
                        );
                        false
                    }
                };
                registered.insert(&entry.collection_url, ready);
                report.collections += 1;
                ready
            }
        };
        if !ready {
            report.failed += 1;
            continue;
        }

        let new_file = NewFile {
            name: &entry.file_name,
            collection_name: &entry.collection_name,
            url: &entry.file_url,
            path: &entry.local_path,
        };
        match catalog.upsert_file(&new_file).await {
            Ok(outcome) => {
                match outcome.action {
                    UpsertAction::Inserted => report.inserted += 1,
                    UpsertAction::Unchanged => report.unchanged += 1,
                    UpsertAction::Refreshed => report.refreshed += 1,
                }
                if outcome.disambiguated {
                    report.disambiguated += 1;
                }
                debug!(file = %outcome.file.key(), action = %outcome.action, "catalogued");
            }
            Err(error) => {
                warn!(
                    file = %entry.file_name,
                    collection = %entry.collection_name,
                    error = %error,
                    "failed to catalogue file"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        collections = report.collections,
        inserted = report.inserted,
        unchanged = report.unchanged,
        refreshed = report.refreshed,
        disambiguated = report.disambiguated,
        failed = report.failed,
        "ingest finished"
    );
    report
}

async fn register_collection<R: CatalogRepository>(
    catalog: &R,
    entry: &CatalogEntry,
) -> Result<(), CatalogError> {
    catalog.upsert_collection(&entry.collection_url).await?;
    catalog
        .set_collection_name(&entry.collection_url, &entry.collection_name)
        .await
}
