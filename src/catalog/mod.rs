//! Catalog store: the persisted record of collections, files and transfer flags.
//!
//! Every other component reads and writes through [`Catalog`]. The per-file
//! `downloaded`/`uploaded` flags are the single source of truth for crash
//! recovery: anything not flagged restarts whole on the next run.
//!
//! # Overview
//!
//! - [`Catalog`] - `SQLite`-backed store
//! - [`CatalogRepository`] - the operation set the coordinators depend on
//! - [`Collection`], [`CatalogFile`], [`FileKey`] - row types
//! - [`CatalogError`] - operation error types
//!
//! # Example
//!
//! ```ignore
//! use catalog_sync_core::catalog::{Catalog, NewFile};
//! use catalog_sync_core::Database;
//!
//! let catalog = Catalog::new(Database::new_in_memory().await?);
//! catalog.upsert_collection("https://src.example/alpha").await?;
//! catalog.set_collection_name("https://src.example/alpha", "Alpha").await?;
//! catalog
//!     .upsert_file(&NewFile {
//!         name: "dragon.stl",
//!         collection_name: "Alpha",
//!         url: "https://src.example/files/dragon.stl",
//!         path: "downloads/Alpha/dragon.stl",
//!     })
//!     .await?;
//! ```

mod error;
mod model;
mod repository;

pub use error::CatalogError;
pub use model::{
    CatalogFile, CatalogSummary, Collection, CollectionProgress, FileKey, NewFile, UpsertAction,
    UpsertOutcome, disambiguated_name, sibling_path,
};
pub use repository::CatalogRepository;

use sqlx::SqliteConnection;
use tracing::{debug, info, instrument, warn};

use crate::db::Database;

/// Age after which a not-yet-downloaded row is evicted and recreated on rediscovery.
pub const STALE_AFTER_SECS: u64 = 24 * 60 * 60;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

const FILE_COLUMNS: &str = "name, collection_name, url, path, changed, downloaded, uploaded";

/// `SQLite` modifier passed to `datetime('now', ?)` for the staleness cutoff.
fn stale_cutoff_modifier() -> String {
    format!("-{STALE_AFTER_SECS} seconds")
}

/// Outcome of upserting under one concrete key.
enum KeyUpsert {
    Stored(CatalogFile, UpsertAction),
    /// The key belongs to a different source.
    Collision(CatalogFile),
}

/// Catalog store backed by the shared database pool.
///
/// Cloning yields an independent handle: each clone checks out its own
/// connection per statement, so worker tasks never share a session.
#[derive(Debug, Clone)]
pub struct Catalog {
    db: Database,
}

impl Catalog {
    /// Creates a catalog over the given database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Returns the existing collection for `url`, or registers a new one with `skip = false`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the insert or lookup fails.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn upsert_collection(&self, url: &str) -> Result<Collection> {
        sqlx::query("INSERT INTO collection (url, name, skip) VALUES (?, NULL, 0) ON CONFLICT(url) DO NOTHING")
            .bind(url)
            .execute(self.db.pool())
            .await?;

        self.get_collection(url)
            .await?
            .ok_or_else(|| CatalogError::CollectionNotFound(url.to_string()))
    }

    /// Overwrites the display name of the collection at `url`. `skip` is untouched.
    ///
    /// Files already filed under the old name follow the rename, unless
    /// another collection still carries the old name and so still owns them.
    /// Names need not be unique: collections sharing a name share one file
    /// namespace.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::CollectionNotFound`] if no collection has this URL.
    #[instrument(skip(self), fields(url = %url, name = %name))]
    pub async fn set_collection_name(&self, url: &str, name: &str) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        let previous: Option<Option<String>> =
            sqlx::query_scalar("SELECT name FROM collection WHERE url = ?")
                .bind(url)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(previous) = previous else {
            return Err(CatalogError::CollectionNotFound(url.to_string()));
        };

        sqlx::query("UPDATE collection SET name = ? WHERE url = ?")
            .bind(name)
            .bind(url)
            .execute(&mut *tx)
            .await?;

        if let Some(old) = previous.as_deref().filter(|old| *old != name) {
            let still_owned: Option<i64> =
                sqlx::query_scalar("SELECT 1 FROM collection WHERE name = ? LIMIT 1")
                    .bind(old)
                    .fetch_optional(&mut *tx)
                    .await?;

            if still_owned.is_none() {
                let moved = sqlx::query(
                    "UPDATE OR IGNORE file SET collection_name = ? WHERE collection_name = ?",
                )
                .bind(name)
                .bind(old)
                .execute(&mut *tx)
                .await?;
                debug!(from = %old, moved = moved.rows_affected(), "files follow renamed collection");

                let left: i64 =
                    sqlx::query_scalar("SELECT COUNT(*) FROM file WHERE collection_name = ?")
                        .bind(old)
                        .fetch_one(&mut *tx)
                        .await?;
                if left > 0 {
                    warn!(
                        from = %old,
                        left,
                        "files already present under the new name were not moved"
                    );
                }
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets a collection by URL.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn get_collection(&self, url: &str) -> Result<Option<Collection>> {
        let collection = sqlx::query_as::<_, Collection>(
            "SELECT url, name, skip FROM collection WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(collection)
    }

    /// Records a discovered file.
    ///
    /// - An already-downloaded row is returned untouched.
    /// - A not-downloaded row older than [`STALE_AFTER_SECS`] is deleted and
    ///   recreated with fresh `changed` and cleared flags.
    /// - Otherwise the existing row is returned untouched.
    ///
    /// When the key already belongs to a different source URL, the name is
    /// retried once prefixed with the parent folder of `path`. If the local
    /// path would also collide, the disambiguated row gets a sibling path.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownCollection`] if `collection_name` is not
    /// registered, [`CatalogError::DuplicateKey`] if the disambiguated key is
    /// also taken by another source, or [`CatalogError::Database`].
    #[instrument(skip(self, entry), fields(name = %entry.name, collection = %entry.collection_name))]
    pub async fn upsert_file(&self, entry: &NewFile<'_>) -> Result<UpsertOutcome> {
        let mut tx = self.db.pool().begin().await?;

        let known: Option<i64> = sqlx::query_scalar("SELECT 1 FROM collection WHERE name = ?")
            .bind(entry.collection_name)
            .fetch_optional(&mut *tx)
            .await?;
        if known.is_none() {
            return Err(CatalogError::UnknownCollection(
                entry.collection_name.to_string(),
            ));
        }

        let outcome = match upsert_key(&mut *tx, entry).await? {
            KeyUpsert::Stored(file, action) => UpsertOutcome {
                file,
                action,
                disambiguated: false,
            },
            KeyUpsert::Collision(existing) => {
                let Some(alt_name) = disambiguated_name(entry.path, entry.name) else {
                    return Err(CatalogError::DuplicateKey {
                        key: FileKey::new(entry.name, entry.collection_name),
                        existing_url: existing.url,
                        url: entry.url.to_string(),
                    });
                };
                let alt_path = if existing.path == entry.path {
                    sibling_path(entry.path, &alt_name)
                        .to_string_lossy()
                        .into_owned()
                } else {
                    entry.path.to_string()
                };
                debug!(
                    existing_url = %existing.url,
                    alt_name = %alt_name,
                    "name collides with a different source, disambiguating"
                );

                let retry_entry = NewFile {
                    name: &alt_name,
                    collection_name: entry.collection_name,
                    url: entry.url,
                    path: &alt_path,
                };
                match upsert_key(&mut *tx, &retry_entry).await? {
                    KeyUpsert::Stored(file, action) => UpsertOutcome {
                        file,
                        action,
                        disambiguated: true,
                    },
                    KeyUpsert::Collision(second) => {
                        return Err(CatalogError::DuplicateKey {
                            key: FileKey::new(alt_name, entry.collection_name),
                            existing_url: second.url,
                            url: entry.url.to_string(),
                        });
                    }
                }
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Gets a file by key.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn get_file(&self, key: &FileKey) -> Result<Option<CatalogFile>> {
        let file = sqlx::query_as::<_, CatalogFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM file WHERE name = ? AND collection_name = ?"
        ))
        .bind(&key.name)
        .bind(&key.collection_name)
        .fetch_optional(self.db.pool())
        .await?;

        Ok(file)
    }

    /// Lists every file not yet downloaded.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_pending_downloads(&self) -> Result<Vec<CatalogFile>> {
        self.list_where("downloaded = 0").await
    }

    /// Lists every file downloaded but not yet uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_pending_uploads(&self) -> Result<Vec<CatalogFile>> {
        self.list_where("downloaded = 1 AND uploaded = 0").await
    }

    /// Lists every file confirmed uploaded.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn list_uploaded(&self) -> Result<Vec<CatalogFile>> {
        self.list_where("uploaded = 1").await
    }

    async fn list_where(&self, predicate: &str) -> Result<Vec<CatalogFile>> {
        let files = sqlx::query_as::<_, CatalogFile>(&format!(
            "SELECT {FILE_COLUMNS} FROM file WHERE {predicate} ORDER BY collection_name, name"
        ))
        .fetch_all(self.db.pool())
        .await?;

        Ok(files)
    }

    /// Flags a file as downloaded.
    ///
    /// Returns `true` if the flag transitioned, `false` if it was already set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::FileNotFound`] if no row has this key.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn mark_downloaded(&self, key: &FileKey) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE file SET downloaded = 1 WHERE name = ? AND collection_name = ? AND downloaded = 0",
        )
        .bind(&key.name)
        .bind(&key.collection_name)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get_file(key).await? {
            Some(_) => Ok(false),
            None => Err(CatalogError::FileNotFound(key.clone())),
        }
    }

    /// Flags a file as uploaded.
    ///
    /// Returns `true` if the flag transitioned, `false` if it was already set.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::FileNotFound`] if no row has this key, or
    /// [`CatalogError::NotDownloaded`] if the file was never downloaded.
    #[instrument(skip(self), fields(key = %key))]
    pub async fn mark_uploaded(&self, key: &FileKey) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE file SET uploaded = 1
             WHERE name = ? AND collection_name = ? AND downloaded = 1 AND uploaded = 0",
        )
        .bind(&key.name)
        .bind(&key.collection_name)
        .execute(self.db.pool())
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        match self.get_file(key).await? {
            Some(file) if !file.downloaded => Err(CatalogError::NotDownloaded(key.clone())),
            Some(_) => Ok(false),
            None => Err(CatalogError::FileNotFound(key.clone())),
        }
    }

    /// Sets `skip` on every collection whose files are all downloaded.
    ///
    /// Collections without files are left alone, and a collection already
    /// skipped is never re-evaluated, even if files were appended since.
    /// Returns the URLs of collections newly marked.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the update fails.
    #[instrument(skip(self))]
    pub async fn compute_collection_completion(&self) -> Result<Vec<String>> {
        let completed: Vec<String> = sqlx::query_scalar(
            "UPDATE collection SET skip = 1
             WHERE skip = 0
               AND name IS NOT NULL
               AND EXISTS (SELECT 1 FROM file f WHERE f.collection_name = collection.name)
               AND NOT EXISTS (
                   SELECT 1 FROM file f
                   WHERE f.collection_name = collection.name AND f.downloaded = 0
               )
             RETURNING url",
        )
        .fetch_all(self.db.pool())
        .await?;

        for url in &completed {
            info!(collection = %url, "collection fully downloaded, excluded from discovery");
        }
        Ok(completed)
    }

    /// URLs of collections the discovery collaborator should no longer scan.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn skipped_collection_urls(&self) -> Result<Vec<String>> {
        let urls = sqlx::query_scalar("SELECT url FROM collection WHERE skip = 1 ORDER BY url")
            .fetch_all(self.db.pool())
            .await?;
        Ok(urls)
    }

    /// Per-collection file counts.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn collection_progress(&self) -> Result<Vec<CollectionProgress>> {
        let rows = sqlx::query_as::<_, CollectionProgress>(
            "SELECT c.url, c.name, c.skip,
                    COUNT(f.name) AS total,
                    COALESCE(SUM(f.downloaded), 0) AS downloaded,
                    COALESCE(SUM(f.uploaded), 0) AS uploaded
             FROM collection c
             LEFT JOIN file f ON f.collection_name = c.name
             GROUP BY c.url, c.name, c.skip
             ORDER BY c.name, c.url",
        )
        .fetch_all(self.db.pool())
        .await?;
        Ok(rows)
    }

    /// Catalog-wide counts.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Database`] if the query fails.
    #[instrument(skip(self))]
    pub async fn summary(&self) -> Result<CatalogSummary> {
        let summary = sqlx::query_as::<_, CatalogSummary>(
            "SELECT
                (SELECT COUNT(*) FROM collection) AS collections,
                (SELECT COUNT(*) FROM collection WHERE skip = 1) AS skipped_collections,
                (SELECT COUNT(*) FROM file) AS files,
                (SELECT COUNT(*) FROM file WHERE downloaded = 1) AS downloaded,
                (SELECT COUNT(*) FROM file WHERE uploaded = 1) AS uploaded",
        )
        .fetch_one(self.db.pool())
        .await?;
        Ok(summary)
    }
}

/// Applies the upsert rules under exactly `entry`'s key.
async fn upsert_key(conn: &mut SqliteConnection, entry: &NewFile<'_>) -> Result<KeyUpsert> {
    let existing = sqlx::query_as::<_, CatalogFile>(&format!(
        "SELECT {FILE_COLUMNS} FROM file WHERE name = ? AND collection_name = ?"
    ))
    .bind(entry.name)
    .bind(entry.collection_name)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(existing) = existing else {
        let file = insert_fresh(conn, entry).await?;
        return Ok(KeyUpsert::Stored(file, UpsertAction::Inserted));
    };

    if existing.url != entry.url {
        return Ok(KeyUpsert::Collision(existing));
    }

    if existing.downloaded {
        return Ok(KeyUpsert::Stored(existing, UpsertAction::Unchanged));
    }

    let stale: bool = sqlx::query_scalar("SELECT ? < datetime('now', ?)")
        .bind(&existing.changed)
        .bind(stale_cutoff_modifier())
        .fetch_one(&mut *conn)
        .await?;
    if !stale {
        return Ok(KeyUpsert::Stored(existing, UpsertAction::Unchanged));
    }

    warn!(
        name = %entry.name,
        collection = %entry.collection_name,
        changed = %existing.changed,
        "evicting stale catalog entry"
    );
    sqlx::query("DELETE FROM file WHERE name = ? AND collection_name = ?")
        .bind(entry.name)
        .bind(entry.collection_name)
        .execute(&mut *conn)
        .await?;
    let file = insert_fresh(conn, entry).await?;
    Ok(KeyUpsert::Stored(file, UpsertAction::Refreshed))
}

async fn insert_fresh(conn: &mut SqliteConnection, entry: &NewFile<'_>) -> Result<CatalogFile> {
    let file = sqlx::query_as::<_, CatalogFile>(&format!(
        "INSERT INTO file (name, collection_name, url, path, changed, downloaded, uploaded)
         VALUES (?, ?, ?, ?, datetime('now'), 0, 0)
         RETURNING {FILE_COLUMNS}"
    ))
    .bind(entry.name)
    .bind(entry.collection_name)
    .bind(entry.url)
    .bind(entry.path)
    .fetch_one(&mut *conn)
    .await?;
    Ok(file)
}
