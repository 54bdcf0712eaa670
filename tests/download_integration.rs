//! Integration tests for the download phase.
//!
//! These tests drive the coordinator against a mock HTTP server and a real
//! SQLite catalog.

mod support;

use catalog_sync_core::catalog::NewFile;
use catalog_sync_core::download::{DownloadCoordinator, DownloadError, HttpClient};
use catalog_sync_core::{Catalog, WorkerPool};
use support::{seed_collection, setup_catalog};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn add_file(catalog: &Catalog, server: &MockServer, dir: &TempDir, collection: &str, name: &str) {
    let local = dir.path().join("downloads").join(collection).join(name);
    catalog
        .upsert_file(&NewFile {
            name,
            collection_name: collection,
            url: &format!("{}/files/{collection}/{name}", server.uri()),
            path: local.to_str().expect("utf-8 temp path"),
        })
        .await
        .expect("Failed to upsert file");
}

fn coordinator(concurrency: usize) -> DownloadCoordinator {
    DownloadCoordinator::new(
        WorkerPool::new(concurrency).expect("valid concurrency"),
        HttpClient::new(),
    )
}

// ==================== HttpClient ====================

#[tokio::test]
async fn test_fetch_to_path_preserves_content() {
    let mock_server = MockServer::start().await;
    let content = b"solid dragon\nfacet normal 0 0 1\nendsolid dragon\n";
    Mock::given(method("GET"))
        .and(path("/dragon.stl"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.to_vec()))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let dest = temp_dir.path().join("dragon.stl");

    let bytes = HttpClient::new()
        .fetch_to_path(&format!("{}/dragon.stl", mock_server.uri()), &dest)
        .await
        .expect("download should succeed");

    assert_eq!(bytes, content.len() as u64);
    assert_eq!(std::fs::read(&dest).unwrap(), content);
}

#[tokio::test]
async fn test_fetch_to_path_http_error_creates_no_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let dest = temp_dir.path().join("missing.stl");

    let result = HttpClient::new()
        .fetch_to_path(&format!("{}/missing.stl", mock_server.uri()), &dest)
        .await;

    assert!(matches!(
        result,
        Err(DownloadError::HttpStatus { status: 404, .. })
    ));
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_fetch_to_path_overwrites_previous_partial_file() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"complete".to_vec()))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().expect("failed to create temp dir");
    let dest = temp_dir.path().join("a.stl");
    std::fs::write(&dest, b"partial bytes from a crashed run that are longer").unwrap();

    HttpClient::new()
        .fetch_to_path(&format!("{}/a.stl", mock_server.uri()), &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), b"complete");
}

// ==================== DownloadCoordinator ====================

#[tokio::test]
async fn test_download_phase_fetches_all_pending_and_marks_them() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mesh".to_vec()))
        .expect(3)
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let (catalog, _db_dir) = setup_catalog().await;
    seed_collection(&catalog, "https://src.example/alpha", "Alpha").await;
    for name in ["a.stl", "b.stl", "c.stl"] {
        add_file(&catalog, &mock_server, &temp_dir, "Alpha", name).await;
    }

    let report = coordinator(2).run(&catalog).await.unwrap();

    assert_eq!(report.stats.completed, 3);
    assert_eq!(report.stats.failed, 0);
    assert_eq!(
        report.completed_collections,
        vec!["https://src.example/alpha".to_string()]
    );
    assert!(catalog.list_pending_downloads().await.unwrap().is_empty());
    for name in ["a.stl", "b.stl", "c.stl"] {
        let local = temp_dir.path().join("downloads/Alpha").join(name);
        assert_eq!(std::fs::read(local).unwrap(), b"mesh");
    }
}

#[tokio::test]
async fn test_download_failure_leaves_flag_unset_and_batch_continues() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/Alpha/broken.stl"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/Alpha/fine.stl"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ok".to_vec()))
        .mount(&mock_server)
        .await;
    let temp_dir = TempDir::new().unwrap();
    let (catalog, _db_dir) = setup_catalog().await;
    seed_collection(&catalog, "https://src.example/alpha", "Alpha").await;
    add_file(&catalog, &mock_server, &temp_dir, "Alpha", "broken.stl").await;
    add_file(&catalog, &mock_server, &temp_dir, "Alpha", "fine.stl").await;

    let report = coordinator(4).run(&catalog).await.unwrap();

    assert_eq!(report.stats.completed, 1);
    assert_eq!(report.stats.failed, 1);
    // One file is still pending, so the collection is not complete
    assert!(report.completed_collections.is_empty());

    let pending = catalog.list_pending_downloads().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].name, "broken.stl");
    assert!(!temp_dir.path().join("downloads/Alpha/broken.stl").exists());
}

#[tokio::test]
async fn test_download_rerun_with_nothing_pending_makes_no_requests() {
    let mock_server = MockServer::start().await;
    let temp_dir = TempDir::new().unwrap();
    let (catalog, _db_dir) = setup_catalog().await;
    seed_collection(&catalog, "https://src.example/alpha", "Alpha").await;
    add_file(&catalog, &mock_server, &temp_dir, "Alpha", "a.stl").await;

    {
        let _first = Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
            .expect(1)
            .mount_as_scoped(&mock_server)
            .await;
        coordinator(2).run(&catalog).await.unwrap();
    }

    let _second = Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount_as_scoped(&mock_server)
        .await;
    let before = catalog.list_pending_uploads().await.unwrap();

    let report = coordinator(2).run(&catalog).await.unwrap();

    assert_eq!(report.stats.total(), 0);
    assert!(report.completed_collections.is_empty());
    assert_eq!(catalog.list_pending_uploads().await.unwrap(), before);
}

#[tokio::test]
async fn test_download_unreachable_host_counts_as_failure() {
    let temp_dir = TempDir::new().unwrap();
    let (catalog, _db_dir) = setup_catalog().await;
    seed_collection(&catalog, "https://src.example/alpha", "Alpha").await;
    let local = temp_dir.path().join("a.stl");
    catalog
        .upsert_file(&NewFile {
            name: "a.stl",
            collection_name: "Alpha",
            url: "http://127.0.0.1:1/a.stl",
            path: local.to_str().unwrap(),
        })
        .await
        .unwrap();

    let report = coordinator(1).run(&catalog).await.unwrap();

    assert_eq!(report.stats.failed, 1);
    assert_eq!(catalog.list_pending_downloads().await.unwrap().len(), 1);
}
