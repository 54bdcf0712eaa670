//! Shared helpers for integration tests: temp-file catalogs and a recording
//! in-memory remote store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use catalog_sync_core::catalog::{NewFile, UpsertOutcome};
use catalog_sync_core::upload::{RemoteError, RemoteStore, UploadCursor};
use catalog_sync_core::{Catalog, Database};
use tempfile::TempDir;

/// Helper to create a test database with migrations applied.
pub async fn setup_test_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("catalog.db");

    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");

    (db, temp_dir)
}

/// Catalog over a fresh temp-file database.
pub async fn setup_catalog() -> (Catalog, TempDir) {
    let (db, temp_dir) = setup_test_db().await;
    (Catalog::new(db), temp_dir)
}

/// Registers and names a collection.
pub async fn seed_collection(catalog: &Catalog, url: &str, name: &str) {
    catalog
        .upsert_collection(url)
        .await
        .expect("Failed to upsert collection");
    catalog
        .set_collection_name(url, name)
        .await
        .expect("Failed to name collection");
}

/// Upserts a file whose url is derived from its name.
pub async fn seed_file(catalog: &Catalog, collection: &str, name: &str, path: &str) -> UpsertOutcome {
    catalog
        .upsert_file(&NewFile {
            name,
            collection_name: collection,
            url: &format!("https://src.example/{collection}/{name}"),
            path,
        })
        .await
        .expect("Failed to upsert file")
}

/// One call observed by [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    List(String),
    Whole { path: String, len: usize },
    Start { len: usize },
    Append { len: usize, offset: u64 },
    Finish { len: usize, offset: u64, path: String },
}

impl StoreCall {
    pub fn is_transfer(&self) -> bool {
        !matches!(self, Self::List(_))
    }

    pub fn payload_len(&self) -> usize {
        match self {
            Self::List(_) => 0,
            Self::Whole { len, .. }
            | Self::Start { len }
            | Self::Append { len, .. }
            | Self::Finish { len, .. } => *len,
        }
    }
}

/// In-memory [`RemoteStore`] that records every call.
///
/// Committed objects become visible to later listings. Folders not yet
/// created list as [`RemoteError::FolderNotFound`].
#[derive(Debug, Default)]
pub struct RecordingStore {
    calls: Mutex<Vec<StoreCall>>,
    folders: Mutex<HashMap<String, HashSet<String>>>,
    sessions: Mutex<HashMap<String, Vec<u8>>>,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    /// Object paths whose commit fails with an API error.
    fail_commits_to: Mutex<HashSet<String>>,
    /// Object paths whose commit is refused as a conflict.
    reject_commits_to: Mutex<HashSet<String>>,
    fail_listing: Mutex<bool>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretends `path` was uploaded by someone else.
    pub fn preload(&self, path: &str) {
        let (folder, name) = split(path);
        self.folders
            .lock()
            .unwrap()
            .entry(folder)
            .or_default()
            .insert(name);
    }

    pub fn fail_commit(&self, path: &str) {
        self.fail_commits_to.lock().unwrap().insert(path.to_string());
    }

    pub fn reject_commit(&self, path: &str) {
        self.reject_commits_to.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_listings(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.calls().iter().filter(|c| !c.is_transfer()).count()
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(path).cloned()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn commit(&self, path: &str, bytes: Vec<u8>) -> Result<(), RemoteError> {
        if self.fail_commits_to.lock().unwrap().contains(path) {
            return Err(RemoteError::api("/commit", 500, "internal_error"));
        }
        if self.reject_commits_to.lock().unwrap().contains(path) {
            return Err(RemoteError::CommitRejected {
                path: path.to_string(),
                reason: "path/conflict/file/".to_string(),
            });
        }
        let (folder, name) = split(path);
        self.folders
            .lock()
            .unwrap()
            .entry(folder)
            .or_default()
            .insert(name);
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }
}

fn split(path: &str) -> (String, String) {
    match path.rsplit_once('/') {
        Some(("", name)) => ("/".to_string(), name.to_string()),
        Some((folder, name)) => (folder.to_string(), name.to_string()),
        None => ("/".to_string(), path.to_string()),
    }
}

#[async_trait]
impl RemoteStore for RecordingStore {
    async fn list_folder(&self, folder: &str) -> Result<Vec<String>, RemoteError> {
        self.record(StoreCall::List(folder.to_string()));
        if *self.fail_listing.lock().unwrap() {
            return Err(RemoteError::api("/2/files/list_folder", 503, "too_many_requests"));
        }
        match self.folders.lock().unwrap().get(folder) {
            Some(names) => Ok(names.iter().cloned().collect()),
            None => Err(RemoteError::FolderNotFound {
                path: folder.to_string(),
            }),
        }
    }

    async fn upload_whole(&self, bytes: Vec<u8>, path: &str) -> Result<(), RemoteError> {
        self.record(StoreCall::Whole {
            path: path.to_string(),
            len: bytes.len(),
        });
        self.commit(path, bytes)
    }

    async fn start_session(&self, first_chunk: Vec<u8>) -> Result<String, RemoteError> {
        self.record(StoreCall::Start {
            len: first_chunk.len(),
        });
        let mut sessions = self.sessions.lock().unwrap();
        let id = format!("session-{}", sessions.len() + 1);
        sessions.insert(id.clone(), first_chunk);
        Ok(id)
    }

    async fn append_chunk(
        &self,
        chunk: Vec<u8>,
        cursor: &UploadCursor,
    ) -> Result<u64, RemoteError> {
        self.record(StoreCall::Append {
            len: chunk.len(),
            offset: cursor.offset,
        });
        let mut sessions = self.sessions.lock().unwrap();
        let buffer = sessions
            .get_mut(&cursor.session_id)
            .ok_or_else(|| RemoteError::api("/append", 404, "not_found"))?;
        if buffer.len() as u64 != cursor.offset {
            return Err(RemoteError::OffsetMismatch {
                session_id: cursor.session_id.clone(),
                expected: cursor.offset,
                actual: buffer.len() as u64,
            });
        }
        buffer.extend_from_slice(&chunk);
        Ok(buffer.len() as u64)
    }

    async fn finish_session(
        &self,
        chunk: Vec<u8>,
        cursor: &UploadCursor,
        path: &str,
    ) -> Result<(), RemoteError> {
        self.record(StoreCall::Finish {
            len: chunk.len(),
            offset: cursor.offset,
            path: path.to_string(),
        });
        let mut bytes = self
            .sessions
            .lock()
            .unwrap()
            .remove(&cursor.session_id)
            .ok_or_else(|| RemoteError::api("/finish", 404, "not_found"))?;
        bytes.extend_from_slice(&chunk);
        self.commit(path, bytes)
    }
}
