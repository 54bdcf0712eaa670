//! CLI entry point for catalog-sync.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use catalog_sync_core::{
    Catalog, CleanupSweeper, Database, DownloadCoordinator, DropboxConfig, DropboxStore,
    HttpClient, RetryPolicy, SyncRunner, TargetMapper, UploadCoordinator, UploadOptions,
    WorkerPool, ingest, load_manifest,
};
use clap::Parser;
use tracing::{debug, info};

mod cli;
mod config;

use cli::{Args, Command, RunArgs};
use config::Settings;

/// Environment variable holding the remote store access token.
const ACCESS_TOKEN_ENV: &str = "DROPBOX_ACCESS_TOKEN";

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    let file_config = config::load(args.config.as_deref())?;
    let settings = Settings::resolve(&args, &file_config);

    match &args.command {
        Command::Import { manifest } => {
            let entries = load_manifest(manifest).await?;
            let catalog = open_catalog(&settings).await?;
            let report = ingest(&catalog, &entries).await;
            println!(
                "imported {} entries: {} new, {} unchanged, {} refreshed, {} disambiguated, {} failed",
                entries.len(),
                report.inserted,
                report.unchanged,
                report.refreshed,
                report.disambiguated,
                report.failed
            );
        }
        Command::Run(run) => {
            let settings = settings.with_run_overrides(run);
            run_sync(&settings, run).await?;
        }
        Command::Status { json } => {
            let catalog = open_catalog(&settings).await?;
            print_status(&catalog, *json).await?;
        }
        Command::Skipped => {
            let catalog = open_catalog(&settings).await?;
            for url in catalog.skipped_collection_urls().await? {
                println!("{url}");
            }
        }
    }

    Ok(())
}

async fn open_catalog(settings: &Settings) -> Result<Catalog> {
    let db = Database::connect_with_retry(
        &settings.database,
        settings.db_options,
        &RetryPolicy::default(),
    )
    .await
    .with_context(|| {
        format!(
            "Failed to open catalog database '{}'",
            settings.database.display()
        )
    })?;
    Ok(Catalog::new(db))
}

async fn run_sync(settings: &Settings, run: &RunArgs) -> Result<()> {
    // Resolve the token before touching anything so a misconfigured run does no work
    let access_token = if run.no_upload {
        None
    } else {
        match std::env::var(ACCESS_TOKEN_ENV) {
            Ok(token) if !token.trim().is_empty() => Some(token),
            _ => bail!("{ACCESS_TOKEN_ENV} must be set for the upload phase (or pass --no-upload)"),
        }
    };

    let pool = WorkerPool::new(settings.concurrency)?;
    let catalog = open_catalog(settings).await?;
    info!(
        database = %settings.database.display(),
        concurrency = settings.concurrency,
        "catalog-sync starting"
    );

    let mut runner = SyncRunner::new(catalog);
    if !run.no_download {
        let client = HttpClient::new_with_timeouts(
            settings.download_connect_timeout_secs,
            settings.download_read_timeout_secs,
        );
        runner = runner.with_downloads(DownloadCoordinator::new(pool.clone(), client));
    }
    if let Some(token) = access_token {
        let store = DropboxStore::new(DropboxConfig::new(token).with_timeout(settings.upload_timeout));
        let mapper = TargetMapper::new(&settings.local_root, &settings.remote_root);
        let options = UploadOptions {
            chunk_size: settings.chunk_size,
            cache_listings: settings.cache_listings,
        };
        runner = runner.with_uploads(UploadCoordinator::new(
            pool,
            Arc::new(store),
            mapper,
            options,
        ));
    }
    if !run.no_cleanup {
        runner = runner.with_cleanup(CleanupSweeper::new());
    }

    let report = runner.run().await?;

    if let Some(download) = &report.download {
        println!(
            "download: {} completed, {} failed; {} collections completed",
            download.stats.completed,
            download.stats.failed,
            download.completed_collections.len()
        );
    }
    if let Some(upload) = &report.upload {
        println!(
            "upload: {} completed, {} already present, {} failed ({} bytes)",
            upload.stats.completed, upload.stats.skipped, upload.stats.failed, upload.bytes_sent
        );
    }
    if let Some(cleanup) = &report.cleanup {
        println!(
            "cleanup: {} removed, {} already absent, {} failed",
            cleanup.removed, cleanup.absent, cleanup.failed
        );
    }
    Ok(())
}

async fn print_status(catalog: &Catalog, json: bool) -> Result<()> {
    let summary = catalog.summary().await?;
    let collections = catalog.collection_progress().await?;

    if json {
        let value = serde_json::json!({
            "summary": summary,
            "collections": collections,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!(
        "collections: {} ({} complete)",
        summary.collections, summary.skipped_collections
    );
    println!(
        "files: {} | downloaded: {} | uploaded: {} | pending downloads: {} | pending uploads: {}",
        summary.files,
        summary.downloaded,
        summary.uploaded,
        summary.pending_downloads(),
        summary.pending_uploads()
    );
    for collection in &collections {
        println!(
            "  {:<40} {:>6}/{:<6} downloaded {:>6} uploaded{}",
            collection.name.as_deref().unwrap_or(&collection.url),
            collection.downloaded,
            collection.total,
            collection.uploaded,
            if collection.skip { "  [complete]" } else { "" }
        );
    }
    Ok(())
}
