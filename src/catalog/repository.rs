//! Repository seam for catalog persistence operations.
//!
//! Coordinators and the discovery ingest depend on this trait rather than on
//! the `SQLite` store directly, so the storage engine stays swappable.

use async_trait::async_trait;

use super::{Catalog, CatalogFile, Collection, FileKey, NewFile, Result, UpsertOutcome};

/// Data-access contract for the synchronization state machine.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Returns the collection for `url`, creating it with `skip = false` if absent.
    async fn upsert_collection(&self, url: &str) -> Result<Collection>;

    /// Overwrites a collection's display name.
    async fn set_collection_name(&self, url: &str, name: &str) -> Result<()>;

    /// Records a discovered file (eviction and collision rules apply).
    async fn upsert_file(&self, entry: &NewFile<'_>) -> Result<UpsertOutcome>;

    /// Files with `downloaded = false`.
    async fn list_pending_downloads(&self) -> Result<Vec<CatalogFile>>;

    /// Files with `downloaded = true, uploaded = false`.
    async fn list_pending_uploads(&self) -> Result<Vec<CatalogFile>>;

    /// Files with `uploaded = true`.
    async fn list_uploaded(&self) -> Result<Vec<CatalogFile>>;

    /// Sets `downloaded`; `Ok(false)` when it was already set.
    async fn mark_downloaded(&self, key: &FileKey) -> Result<bool>;

    /// Sets `uploaded`; `Ok(false)` when it was already set.
    async fn mark_uploaded(&self, key: &FileKey) -> Result<bool>;

    /// Marks fully downloaded collections as skipped; returns newly marked URLs.
    async fn compute_collection_completion(&self) -> Result<Vec<String>>;
}

#[async_trait]
impl CatalogRepository for Catalog {
    async fn upsert_collection(&self, url: &str) -> Result<Collection> {
        Catalog::upsert_collection(self, url).await
    }

    async fn set_collection_name(&self, url: &str, name: &str) -> Result<()> {
        Catalog::set_collection_name(self, url, name).await
    }

    async fn upsert_file(&self, entry: &NewFile<'_>) -> Result<UpsertOutcome> {
        Catalog::upsert_file(self, entry).await
    }

    async fn list_pending_downloads(&self) -> Result<Vec<CatalogFile>> {
        Catalog::list_pending_downloads(self).await
    }

    async fn list_pending_uploads(&self) -> Result<Vec<CatalogFile>> {
        Catalog::list_pending_uploads(self).await
    }

    async fn list_uploaded(&self) -> Result<Vec<CatalogFile>> {
        Catalog::list_uploaded(self).await
    }

    async fn mark_downloaded(&self, key: &FileKey) -> Result<bool> {
        Catalog::mark_downloaded(self, key).await
    }

    async fn mark_uploaded(&self, key: &FileKey) -> Result<bool> {
        Catalog::mark_uploaded(self, key).await
    }

    async fn compute_collection_completion(&self) -> Result<Vec<String>> {
        Catalog::compute_collection_completion(self).await
    }
}
