//! End-to-end CLI tests for the catalog-sync binary.

// `Command::cargo_bin` is deprecated in assert_cmd >=2.0.17 in favor of
// `cargo::cargo_bin_cmd!` macro. Suppressed until migration to the new API.
#![allow(deprecated)]

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use catalog_sync_core::catalog::NewFile;
use catalog_sync_core::{Catalog, Database};
use predicates::prelude::*;
use tempfile::TempDir;

/// A command isolated from the user's config and credentials.
fn catalog_sync(tempdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("catalog-sync").unwrap();
    cmd.env("XDG_CONFIG_HOME", tempdir.path().join("xdg-config"))
        .env_remove("DROPBOX_ACCESS_TOKEN")
        .env("RUST_LOG", "warn");
    cmd
}

fn write_config(tempdir: &TempDir, contents: &str) {
    let config_dir = tempdir.path().join("xdg-config").join("catalog-sync");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(config_dir.join("config.toml"), contents).unwrap();
}

fn toml_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "\\\\")
}

/// Seeds one collection with one downloaded file whose local copy exists,
/// optionally marking it uploaded and completing the collection.
fn seed_downloaded_file(db_path: &Path, local: &Path, uploaded: bool) {
    std::fs::create_dir_all(local.parent().expect("file should have a parent")).unwrap();
    std::fs::write(local, b"solid a").unwrap();

    tokio_test::block_on(async {
        let db = Database::new(db_path).await.unwrap();
        let catalog = Catalog::new(db.clone());
        catalog.upsert_collection("https://src.example/alpha").await.unwrap();
        catalog
            .set_collection_name("https://src.example/alpha", "Alpha")
            .await
            .unwrap();
        let outcome = catalog
            .upsert_file(&NewFile {
                name: "a.stl",
                collection_name: "Alpha",
                url: "https://src.example/alpha/a.stl",
                path: local.to_str().unwrap(),
            })
            .await
            .unwrap();
        catalog.mark_downloaded(&outcome.file.key()).await.unwrap();
        catalog.compute_collection_completion().await.unwrap();
        if uploaded {
            catalog.mark_uploaded(&outcome.file.key()).await.unwrap();
        }
        db.close().await;
    });
}

fn db_path(tempdir: &TempDir) -> PathBuf {
    tempdir.path().join("catalog.db")
}

#[test]
fn test_binary_help_lists_subcommands() {
    let tempdir = TempDir::new().unwrap();
    catalog_sync(&tempdir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("import"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("skipped"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let tempdir = TempDir::new().unwrap();
    catalog_sync(&tempdir).assert().failure();
}

#[test]
fn test_binary_status_on_fresh_database_reports_zero() {
    let tempdir = TempDir::new().unwrap();
    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("collections: 0"))
        .stdout(predicate::str::contains("files: 0"));
    assert!(db_path(&tempdir).exists());
}

#[test]
fn test_binary_import_then_status_json() {
    let tempdir = TempDir::new().unwrap();
    let manifest = tempdir.path().join("manifest.json");
    std::fs::write(
        &manifest,
        r#"[
            {"collection_url": "https://src.example/alpha", "collection_name": "Alpha",
             "file_name": "a.stl", "file_url": "https://src.example/alpha/a.stl",
             "local_path": "downloads/Alpha/a.stl"},
            {"collection_url": "https://src.example/alpha", "collection_name": "Alpha",
             "file_name": "b.stl", "file_url": "https://src.example/alpha/b.stl",
             "local_path": "downloads/Alpha/b.stl"}
        ]"#,
    )
    .unwrap();

    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .arg("import")
        .arg(&manifest)
        .assert()
        .success()
        .stdout(predicate::str::contains("imported 2 entries: 2 new"));

    let output = catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["summary"]["collections"], 1);
    assert_eq!(status["summary"]["files"], 2);
    assert_eq!(status["summary"]["downloaded"], 0);
    assert_eq!(status["collections"][0]["name"], "Alpha");
    assert_eq!(status["collections"][0]["total"], 2);
}

#[test]
fn test_binary_import_rejects_malformed_manifest() {
    let tempdir = TempDir::new().unwrap();
    let manifest = tempdir.path().join("manifest.json");
    std::fs::write(&manifest, "{not json").unwrap();

    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .arg("import")
        .arg(&manifest)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid manifest"));
}

#[test]
fn test_binary_run_without_token_fails_before_any_work() {
    let tempdir = TempDir::new().unwrap();
    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("DROPBOX_ACCESS_TOKEN"));
    assert!(!db_path(&tempdir).exists());
}

#[test]
fn test_binary_cleanup_only_run_removes_uploaded_copies() {
    let tempdir = TempDir::new().unwrap();
    let local = tempdir.path().join("downloads/Alpha/a.stl");
    seed_downloaded_file(&db_path(&tempdir), &local, true);

    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .args(["run", "--no-download", "--no-upload"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleanup: 1 removed"));
    assert!(!local.exists());
}

#[test]
fn test_binary_no_cleanup_keeps_local_copies() {
    let tempdir = TempDir::new().unwrap();
    let local = tempdir.path().join("downloads/Alpha/a.stl");
    seed_downloaded_file(&db_path(&tempdir), &local, true);

    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .args(["run", "--no-download", "--no-upload", "--no-cleanup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cleanup").not());
    assert!(local.exists());
}

#[test]
fn test_binary_skipped_lists_completed_collections() {
    let tempdir = TempDir::new().unwrap();
    let local = tempdir.path().join("downloads/Alpha/a.stl");
    seed_downloaded_file(&db_path(&tempdir), &local, false);

    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .arg("skipped")
        .assert()
        .success()
        .stdout(predicate::str::diff("https://src.example/alpha\n"));
}

#[test]
fn test_binary_database_from_config_file() {
    let tempdir = TempDir::new().unwrap();
    let configured = tempdir.path().join("from-config.db");
    write_config(
        &tempdir,
        &format!("database = \"{}\"\nconcurrency = 2\n", toml_path(&configured)),
    );

    catalog_sync(&tempdir)
        .current_dir(tempdir.path())
        .arg("status")
        .assert()
        .success();
    assert!(configured.exists());
}

#[test]
fn test_binary_invalid_config_value_fails() {
    let tempdir = TempDir::new().unwrap();
    write_config(&tempdir, "concurrency = 0\n");

    catalog_sync(&tempdir)
        .arg("--database")
        .arg(db_path(&tempdir))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_binary_missing_explicit_config_fails() {
    let tempdir = TempDir::new().unwrap();
    catalog_sync(&tempdir)
        .arg("--config")
        .arg(tempdir.path().join("nope.toml"))
        .arg("status")
        .assert()
        .failure();
}

#[test]
fn test_binary_rejects_out_of_range_concurrency() {
    let tempdir = TempDir::new().unwrap();
    catalog_sync(&tempdir)
        .args(["run", "--no-upload", "-c", "65"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("65"));
}
