//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

/// Download a remote file catalog once, upload it once.
///
/// State lives in a SQLite catalog; every command can be re-run safely and a
/// crashed run is recovered by running again.
#[derive(Parser, Debug)]
#[command(name = "catalog-sync")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/catalog-sync/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Catalog database file
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Ingest a discovery manifest (JSON array of catalog entries)
    Import {
        /// Manifest file written by the crawler
        manifest: PathBuf,
    },

    /// Download pending files, upload downloaded files, remove uploaded copies
    Run(RunArgs),

    /// Show catalog counts
    Status {
        /// Print machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List collection URLs the crawler should no longer scan
    Skipped,
}

#[derive(ClapArgs, Debug, Default)]
pub struct RunArgs {
    /// Maximum concurrent transfers per phase (1-64)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: Option<u8>,

    /// Directory downloads are written under
    #[arg(long, value_name = "DIR")]
    pub local_root: Option<PathBuf>,

    /// Remote folder mirroring the local root
    #[arg(long, value_name = "PATH")]
    pub remote_root: Option<String>,

    /// Reuse remote folder listings within this run
    #[arg(long)]
    pub cache_listings: bool,

    /// Skip the download phase
    #[arg(long)]
    pub no_download: bool,

    /// Skip the upload phase (no access token needed)
    #[arg(long)]
    pub no_upload: bool,

    /// Keep local copies of uploaded files
    #[arg(long)]
    pub no_cleanup: bool,
}
