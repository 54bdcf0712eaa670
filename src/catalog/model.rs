//! Catalog row types.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identity of a catalogued file: `(name, collection_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileKey {
    /// Leaf file name (possibly disambiguated with its parent folder).
    pub name: String,
    /// Name of the owning collection.
    pub collection_name: String,
}

impl FileKey {
    #[must_use]
    pub fn new(name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collection_name: collection_name.into(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_name, self.name)
    }
}

/// A logical grouping of files discovered from one source location.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Collection {
    /// Source URL; the collection's identity.
    pub url: String,
    /// Display name, unknown until the collection is first visited.
    pub name: Option<String>,
    /// Sticky "fully transferred" marker; set only by completion tracking.
    pub skip: bool,
}

/// A catalogued remote file and its transfer flags.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CatalogFile {
    /// Leaf file name.
    pub name: String,
    /// Owning collection name.
    pub collection_name: String,
    /// Source location.
    pub url: String,
    /// Local destination path.
    pub path: String,
    /// Last-catalogued timestamp (`YYYY-MM-DD HH:MM:SS`, UTC).
    pub changed: String,
    /// Whether the bytes are on local disk.
    pub downloaded: bool,
    /// Whether the remote store has committed the object.
    pub uploaded: bool,
}

impl CatalogFile {
    /// Returns the row's identity.
    #[must_use]
    pub fn key(&self) -> FileKey {
        FileKey::new(&self.name, &self.collection_name)
    }

    /// Returns the local destination as a path.
    #[must_use]
    pub fn local_path(&self) -> &Path {
        Path::new(&self.path)
    }
}

impl fmt::Display for CatalogFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CatalogFile {{ key: {}, downloaded: {}, uploaded: {} }}",
            self.key(),
            self.downloaded,
            self.uploaded
        )
    }
}

/// A discovered file handed to [`Catalog::upsert_file`](super::Catalog::upsert_file).
#[derive(Debug, Clone, Copy)]
pub struct NewFile<'a> {
    pub name: &'a str,
    pub collection_name: &'a str,
    pub url: &'a str,
    pub path: &'a str,
}

/// What `upsert_file` did to the row it returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertAction {
    /// No row existed; a fresh one was inserted.
    Inserted,
    /// An existing row was returned as-is.
    Unchanged,
    /// A stale, not-yet-downloaded row was deleted and recreated.
    Refreshed,
}

impl UpsertAction {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Unchanged => "unchanged",
            Self::Refreshed => "refreshed",
        }
    }
}

impl fmt::Display for UpsertAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of an upsert: the stored row and how it got there.
#[derive(Debug, Clone)]
pub struct UpsertOutcome {
    pub file: CatalogFile,
    pub action: UpsertAction,
    /// True when the row lives under a parent-prefixed name because the plain
    /// name already belonged to a different source.
    pub disambiguated: bool,
}

/// Per-collection transfer counts.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct CollectionProgress {
    pub url: String,
    pub name: Option<String>,
    pub skip: bool,
    pub total: i64,
    pub downloaded: i64,
    pub uploaded: i64,
}

/// Catalog-wide counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize)]
pub struct CatalogSummary {
    pub collections: i64,
    pub skipped_collections: i64,
    pub files: i64,
    pub downloaded: i64,
    pub uploaded: i64,
}

impl CatalogSummary {
    /// Files still waiting for the download phase.
    #[must_use]
    pub fn pending_downloads(&self) -> i64 {
        self.files - self.downloaded
    }

    /// Files waiting for the upload phase.
    #[must_use]
    pub fn pending_uploads(&self) -> i64 {
        self.downloaded - self.uploaded
    }
}

/// Name used when `name` collides with a different source: the immediate
/// parent folder of `path` is prefixed. `None` when `path` has no named parent.
#[must_use]
pub fn disambiguated_name(path: &str, name: &str) -> Option<String> {
    let parent = Path::new(path).parent()?.file_name()?.to_str()?;
    if parent.is_empty() {
        return None;
    }
    Some(format!("{parent} - {name}"))
}

/// Sibling of `path` carrying `file_name`.
#[must_use]
pub fn sibling_path(path: &str, file_name: &str) -> PathBuf {
    Path::new(path).with_file_name(file_name)
}
