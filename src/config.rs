//! Configuration file loading and resolution against CLI flags.
//!
//! The file is a flat `key = value` subset of TOML. Precedence is CLI flag,
//! then file value, then built-in default.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use catalog_sync_core::download::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use catalog_sync_core::upload::{DEFAULT_CHUNK_SIZE, DEFAULT_TIMEOUT_SECS};
use catalog_sync_core::{DatabaseOptions, default_concurrency, pool};

use crate::cli::{Args, RunArgs};

/// Database file used when neither flag nor config names one.
pub const DEFAULT_DATABASE: &str = "catalog.db";

/// Local download root used when neither flag nor config names one.
pub const DEFAULT_LOCAL_ROOT: &str = "downloads";

/// Largest accepted chunk size: the store's per-request body limit (150 MiB).
pub const MAX_CHUNK_SIZE: usize = 150 * 1024 * 1024;

/// Values read from the config file; `None` means "not set".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    pub database: Option<PathBuf>,
    pub local_root: Option<PathBuf>,
    pub remote_root: Option<String>,
    pub concurrency: Option<usize>,
    pub chunk_size: Option<usize>,
    pub cache_listings: Option<bool>,
    pub download_connect_timeout_secs: Option<u64>,
    pub download_read_timeout_secs: Option<u64>,
    pub upload_timeout_secs: Option<u64>,
    pub db_max_connections: Option<u32>,
    pub db_busy_timeout_ms: Option<u32>,
}

impl FileConfig {
    /// Validates config values against runtime constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(concurrency) = self.concurrency {
            validate_concurrency(concurrency)?;
        }
        if let Some(chunk_size) = self.chunk_size {
            validate_chunk_size(chunk_size)?;
        }
        validate_timeout_secs(
            "download_connect_timeout_secs",
            self.download_connect_timeout_secs,
        )?;
        validate_timeout_secs(
            "download_read_timeout_secs",
            self.download_read_timeout_secs,
        )?;
        validate_timeout_secs("upload_timeout_secs", self.upload_timeout_secs)?;
        if let Some(value) = self.db_max_connections
            && !(1..=20).contains(&value)
        {
            bail!("Invalid config value for `db_max_connections`: {value}. Expected range: 1..=20");
        }
        if let Some(value) = self.db_busy_timeout_ms
            && value > 120_000
        {
            bail!("Invalid config value for `db_busy_timeout_ms`: {value}. Expected range: 0..=120000");
        }
        Ok(())
    }
}

fn validate_concurrency(value: usize) -> Result<()> {
    if !(pool::MIN_CONCURRENCY..=pool::MAX_CONCURRENCY).contains(&value) {
        bail!(
            "Invalid config value for `concurrency`: {value}. Expected range: {}..={}",
            pool::MIN_CONCURRENCY,
            pool::MAX_CONCURRENCY
        );
    }
    Ok(())
}

fn validate_chunk_size(value: usize) -> Result<()> {
    if !(1..=MAX_CHUNK_SIZE).contains(&value) {
        bail!("Invalid config value for `chunk_size`: {value}. Expected range: 1..={MAX_CHUNK_SIZE}");
    }
    Ok(())
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/catalog-sync/config.toml`
/// 2. `$HOME/.config/catalog-sync/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("catalog-sync")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("catalog-sync")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads the config file.
///
/// An explicit path must exist; the default path is optional.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig> {
    if let Some(path) = explicit {
        return load_file_config(path);
    }
    match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path),
        _ => Ok(FileConfig::default()),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "database" => cfg.database = Some(parse_string_literal(value).with_context(invalid)?.into()),
            "local_root" => {
                cfg.local_root = Some(parse_string_literal(value).with_context(invalid)?.into());
            }
            "remote_root" => cfg.remote_root = Some(parse_string_literal(value).with_context(invalid)?),
            "concurrency" => cfg.concurrency = Some(parse_usize(value).with_context(invalid)?),
            "chunk_size" => cfg.chunk_size = Some(parse_usize(value).with_context(invalid)?),
            "cache_listings" => cfg.cache_listings = Some(parse_boolean(value).with_context(invalid)?),
            "download_connect_timeout_secs" => {
                cfg.download_connect_timeout_secs = Some(parse_u64(value).with_context(invalid)?);
            }
            "download_read_timeout_secs" => {
                cfg.download_read_timeout_secs = Some(parse_u64(value).with_context(invalid)?);
            }
            "upload_timeout_secs" => {
                cfg.upload_timeout_secs = Some(parse_u64(value).with_context(invalid)?);
            }
            "db_max_connections" => {
                let parsed = parse_u64(value).with_context(invalid)?;
                cfg.db_max_connections = Some(
                    u32::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("db_max_connections out of range for u32"))?,
                );
            }
            "db_busy_timeout_ms" => {
                let parsed = parse_u64(value).with_context(invalid)?;
                cfg.db_busy_timeout_ms = Some(
                    u32::try_from(parsed)
                        .map_err(|_| anyhow::anyhow!("db_busy_timeout_ms out of range for u32"))?,
                );
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_usize(raw_value: &str) -> Result<usize> {
    let value = parse_u64(raw_value)?;
    usize::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for usize"))
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected boolean value (true or false)"),
    }
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database: PathBuf,
    pub local_root: PathBuf,
    pub remote_root: String,
    pub concurrency: usize,
    pub chunk_size: usize,
    pub cache_listings: bool,
    pub download_connect_timeout_secs: u64,
    pub download_read_timeout_secs: u64,
    pub upload_timeout: Duration,
    pub db_options: DatabaseOptions,
}

impl Settings {
    /// Merges global flags and file values over defaults.
    pub fn resolve(args: &Args, file: &FileConfig) -> Self {
        let db_defaults = DatabaseOptions::default();
        Self {
            database: args
                .database
                .clone()
                .or_else(|| file.database.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE)),
            local_root: file
                .local_root
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_ROOT)),
            remote_root: file.remote_root.clone().unwrap_or_else(|| "/".to_string()),
            concurrency: file.concurrency.unwrap_or_else(default_concurrency),
            chunk_size: file.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            cache_listings: file.cache_listings.unwrap_or(false),
            download_connect_timeout_secs: file
                .download_connect_timeout_secs
                .unwrap_or(CONNECT_TIMEOUT_SECS),
            download_read_timeout_secs: file
                .download_read_timeout_secs
                .unwrap_or(READ_TIMEOUT_SECS),
            upload_timeout: Duration::from_secs(
                file.upload_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            ),
            db_options: DatabaseOptions {
                max_connections: file
                    .db_max_connections
                    .unwrap_or(db_defaults.max_connections),
                busy_timeout_ms: file
                    .db_busy_timeout_ms
                    .unwrap_or(db_defaults.busy_timeout_ms),
            },
        }
    }

    /// Applies `run` subcommand flags.
    #[must_use]
    pub fn with_run_overrides(mut self, run: &RunArgs) -> Self {
        if let Some(concurrency) = run.concurrency {
            self.concurrency = usize::from(concurrency);
        }
        if let Some(local_root) = &run.local_root {
            self.local_root.clone_from(local_root);
        }
        if let Some(remote_root) = &run.remote_root {
            self.remote_root.clone_from(remote_root);
        }
        if run.cache_listings {
            self.cache_listings = true;
        }
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn test_parse_config_all_keys() {
        let cfg = parse_config_str(
            r#"
# catalog-sync settings
database = "/var/lib/catalog-sync/catalog.db"
local_root = "/srv/downloads"   # where artifacts land
remote_root = "/catalog"
concurrency = 25
chunk_size = 8388608
cache_listings = true
download_connect_timeout_secs = 10
download_read_timeout_secs = 600
upload_timeout_secs = 900
db_max_connections = 8
db_busy_timeout_ms = 10000
"#,
        )
        .unwrap();

        assert_eq!(
            cfg.database.as_deref(),
            Some(Path::new("/var/lib/catalog-sync/catalog.db"))
        );
        assert_eq!(cfg.local_root.as_deref(), Some(Path::new("/srv/downloads")));
        assert_eq!(cfg.remote_root.as_deref(), Some("/catalog"));
        assert_eq!(cfg.concurrency, Some(25));
        assert_eq!(cfg.chunk_size, Some(8_388_608));
        assert_eq!(cfg.cache_listings, Some(true));
        assert_eq!(cfg.upload_timeout_secs, Some(900));
        assert_eq!(cfg.db_max_connections, Some(8));
    }

    #[test]
    fn test_parse_config_hash_inside_string_is_not_comment() {
        let cfg = parse_config_str(r#"remote_root = "/catalog #1""#).unwrap();
        assert_eq!(cfg.remote_root.as_deref(), Some("/catalog #1"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_key() {
        let err = parse_config_str("output_dir = \"x\"").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("concurrency 4").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_parse_config_rejects_out_of_range_concurrency() {
        let err = parse_config_str("concurrency = 65").unwrap_err();
        assert!(err.to_string().contains("concurrency"));
        assert!(parse_config_str("concurrency = 0").is_err());
    }

    #[test]
    fn test_parse_config_rejects_zero_chunk_size() {
        assert!(parse_config_str("chunk_size = 0").is_err());
    }

    #[test]
    fn test_parse_config_rejects_unquoted_string() {
        let err = parse_config_str("database = catalog.db").unwrap_err();
        assert!(format!("{err:#}").contains("double-quoted"));
    }

    #[test]
    fn test_load_explicit_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = load(Some(&dir.path().join("absent.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_settings_precedence_flag_over_file_over_default() {
        let file = FileConfig {
            database: Some(PathBuf::from("from-file.db")),
            concurrency: Some(4),
            ..FileConfig::default()
        };

        let args = Args::try_parse_from(["catalog-sync", "status"]).unwrap();
        let settings = Settings::resolve(&args, &file);
        assert_eq!(settings.database, PathBuf::from("from-file.db"));
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.remote_root, "/");

        let args =
            Args::try_parse_from(["catalog-sync", "--database", "flag.db", "status"]).unwrap();
        assert_eq!(
            Settings::resolve(&args, &file).database,
            PathBuf::from("flag.db")
        );
    }

    #[test]
    fn test_settings_run_overrides() {
        let args = Args::try_parse_from([
            "catalog-sync",
            "run",
            "-c",
            "12",
            "--remote-root",
            "/mirror",
            "--cache-listings",
        ])
        .unwrap();
        let crate::cli::Command::Run(run) = &args.command else {
            panic!("expected run subcommand");
        };

        let settings = Settings::resolve(&args, &FileConfig::default()).with_run_overrides(run);

        assert_eq!(settings.concurrency, 12);
        assert_eq!(settings.remote_root, "/mirror");
        assert!(settings.cache_listings);
    }
}
