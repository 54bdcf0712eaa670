//! Upload phase: push every downloaded-but-not-uploaded file to the remote store.
//!
//! Per file the worker first lists the target folder; a name already present
//! there is recorded as uploaded without transferring anything. Otherwise the
//! file is sent (whole or chunked) and marked uploaded once the store has
//! committed it. Any remote failure abandons that file for this run.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::listing_cache::ListingCache;
use super::protocol::{DEFAULT_CHUNK_SIZE, transfer_file};
use super::store::{RemoteError, RemoteStore};
use super::target::{RemoteTarget, TargetMapper};
use super::{UploadError, UploadPhaseError};
use crate::catalog::{CatalogFile, CatalogRepository};
use crate::pool::{PhaseReport, PhaseStats, WorkerPool};

/// Tunables for the upload phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadOptions {
    /// Single-request threshold and session chunk size, in bytes.
    pub chunk_size: usize,
    /// Reuse folder listings across files within one run.
    pub cache_listings: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            cache_listings: false,
        }
    }
}

/// Outcome of one upload phase.
///
/// `stats.skipped` counts files that were already present remotely.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UploadReport {
    pub stats: PhaseReport,
    pub bytes_sent: u64,
}

/// How a successful file settled.
enum Settled {
    Transferred(u64),
    AlreadyPresent,
}

struct Shared {
    store: Arc<dyn RemoteStore>,
    mapper: TargetMapper,
    options: UploadOptions,
    cache: Option<ListingCache>,
    bytes_sent: AtomicU64,
}

/// Runs the upload phase over a catalog.
pub struct UploadCoordinator {
    pool: WorkerPool,
    store: Arc<dyn RemoteStore>,
    mapper: TargetMapper,
    options: UploadOptions,
}

impl UploadCoordinator {
    #[must_use]
    pub fn new(
        pool: WorkerPool,
        store: Arc<dyn RemoteStore>,
        mapper: TargetMapper,
        options: UploadOptions,
    ) -> Self {
        Self {
            pool,
            store,
            mapper,
            options,
        }
    }

    /// Uploads every pending file.
    ///
    /// # Errors
    ///
    /// Returns [`UploadPhaseError`] only if the pending list cannot be read or
    /// the pool cannot schedule work.
    #[instrument(skip(self, catalog), fields(concurrency = self.pool.concurrency(), chunk_size = self.options.chunk_size))]
    pub async fn run<R>(&self, catalog: &R) -> Result<UploadReport, UploadPhaseError>
    where
        R: CatalogRepository + Clone + 'static,
    {
        let pending = catalog.list_pending_uploads().await?;
        info!(pending = pending.len(), "starting upload phase");

        let shared = Arc::new(Shared {
            store: Arc::clone(&self.store),
            mapper: self.mapper.clone(),
            options: UploadOptions {
                chunk_size: self.options.chunk_size.max(1),
                ..self.options
            },
            cache: self.options.cache_listings.then(ListingCache::new),
            bytes_sent: AtomicU64::new(0),
        });
        let stats = Arc::new(PhaseStats::new());

        let task_shared = Arc::clone(&shared);
        let task_stats = Arc::clone(&stats);
        let handle = catalog.clone();
        let panicked = self
            .pool
            .run(pending, move |file: CatalogFile| {
                let shared = Arc::clone(&task_shared);
                let stats = Arc::clone(&task_stats);
                let catalog = handle.clone();
                async move {
                    match upload_one(&shared, &catalog, &file).await {
                        Ok(Settled::Transferred(bytes)) => {
                            shared.bytes_sent.fetch_add(bytes, Ordering::SeqCst);
                            stats.record_completed();
                        }
                        Ok(Settled::AlreadyPresent) => stats.record_skipped(),
                        Err(UploadError::Remote(error)) if error.is_integrity_failure() => {
                            error!(
                                file = %file.name,
                                collection = %file.collection_name,
                                error = %error,
                                "remote store rejected upload, will restart next run"
                            );
                            stats.record_failed();
                        }
                        Err(error) => {
                            warn!(
                                file = %file.name,
                                collection = %file.collection_name,
                                error = %error,
                                "upload failed, will restart next run"
                            );
                            stats.record_failed();
                        }
                    }
                }
            })
            .await?;
        stats.record_failures(panicked);

        let report = UploadReport {
            stats: stats.snapshot(),
            bytes_sent: shared.bytes_sent.load(Ordering::SeqCst),
        };
        info!(
            uploaded = report.stats.completed,
            already_present = report.stats.skipped,
            failed = report.stats.failed,
            bytes = report.bytes_sent,
            "upload phase finished"
        );
        Ok(report)
    }
}

async fn upload_one<R: CatalogRepository>(
    shared: &Shared,
    catalog: &R,
    file: &CatalogFile,
) -> Result<Settled, UploadError> {
    let target = shared.mapper.target_for(file);

    if remote_names(shared, &target).await?.contains(&target.name) {
        debug!(file = %file.name, target = %target.path(), "already present remotely");
        catalog.mark_uploaded(&file.key()).await?;
        return Ok(Settled::AlreadyPresent);
    }

    let sent = transfer_file(
        shared.store.as_ref(),
        file.local_path(),
        &target.path(),
        shared.options.chunk_size,
    )
    .await?;

    if let Some(cache) = &shared.cache {
        cache.invalidate(&target.folder);
    }
    catalog.mark_uploaded(&file.key()).await?;
    debug!(file = %file.name, target = %target.path(), bytes = sent, "upload committed");
    Ok(Settled::Transferred(sent))
}

/// Names in the target folder; an absent folder lists as empty.
async fn remote_names(
    shared: &Shared,
    target: &RemoteTarget,
) -> Result<Arc<HashSet<String>>, RemoteError> {
    if let Some(names) = shared.cache.as_ref().and_then(|c| c.get(&target.folder)) {
        return Ok(names);
    }
    let generation = shared
        .cache
        .as_ref()
        .map_or(0, |c| c.generation(&target.folder));

    let names: HashSet<String> = match shared.store.list_folder(&target.folder).await {
        Ok(names) => names.into_iter().collect(),
        Err(RemoteError::FolderNotFound { .. }) => HashSet::new(),
        Err(error) => return Err(error),
    };

    Ok(match &shared.cache {
        Some(cache) => cache.insert(&target.folder, generation, names),
        None => Arc::new(names),
    })
}
