//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. If `HEARTHSYNC_DB_PATH` is set, configuration comes from the environment
//! 2. Otherwise the first config file found by [`find_config_path`] is used
//! 3. With neither, built-in defaults apply
//!
//! OAuth client credentials in the environment always override the file, so
//! secrets can stay out of checked-in config.
//!
//! ## Environment Variables
//! - `HEARTHSYNC_DB_PATH`: Database file path (selects environment loading)
//! - `HEARTHSYNC_DB_POOL_SIZE`: Connection pool size
//! - `HEARTHSYNC_SCHEDULER_ENABLED`: Whether the periodic sync runs (true/false)
//! - `HEARTHSYNC_SCHEDULER_CRON`: Six-field cron expression
//! - `HEARTHSYNC_BATCH_LIMIT`: Connections per scheduler run
//! - `HEARTHSYNC_MAX_CONCURRENCY`: Concurrent syncs per run
//! - `HEARTHSYNC_PROVIDER_TIMEOUT_SECS`: Upper bound for provider calls
//! - `HEARTHSYNC_BACKOFF_BASE_SECS`, `HEARTHSYNC_FAILURE_THRESHOLD`,
//!   `HEARTHSYNC_MAX_BACKOFF_SECS`: Failure backoff policy
//! - `HEARTHSYNC_OAUTH_SESSION_TTL_SECS`: OAuth session lifetime
//! - `HEARTHSYNC_GOOGLE_CLIENT_ID` / `HEARTHSYNC_GOOGLE_CLIENT_SECRET`
//! - `HEARTHSYNC_OUTLOOK_CLIENT_ID` / `HEARTHSYNC_OUTLOOK_CLIENT_SECRET`
//! - `HEARTHSYNC_CALDAV_SERVER_URL`: Generic CalDAV server
//! - `HEARTHSYNC_BIND_ADDR`: HTTP listen address
//!
//! ## File Locations
//! The loader looks for `hearthsync.toml`, `hearthsync.json`, `config.toml` and
//! `config.json` in the working directory and up to two parents, then next
//! to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use hearthsync_domain::{Config, DatabaseConfig, HearthSyncError, OAuthClientConfig, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["hearthsync.toml", "hearthsync.json", "config.toml", "config.json"];

/// Load configuration with automatic fallback strategy
///
/// # Errors
/// Returns `HearthSyncError::Config` if an environment value or the found
/// file is invalid.
pub fn load() -> Result<Config> {
    let mut config = if std::env::var_os("HEARTHSYNC_DB_PATH").is_some() {
        let config = load_from_env()?;
        tracing::info!("Configuration loaded from environment variables");
        config
    } else if let Some(path) = find_config_path() {
        load_from_file(Some(path))?
    } else {
        tracing::info!("No configuration found; using defaults");
        Config::default()
    };

    apply_oauth_env(&mut config);
    Ok(config)
}

/// Load configuration from environment variables
///
/// `HEARTHSYNC_DB_PATH` is required; every other variable falls back to its
/// default when unset.
///
/// # Errors
/// Returns `HearthSyncError::Config` if the database path is missing or a
/// value cannot be parsed.
pub fn load_from_env() -> Result<Config> {
    let defaults = Config::default();
    let mut config = Config {
        database: DatabaseConfig {
            path: env_var("HEARTHSYNC_DB_PATH")?,
            pool_size: env_parse("HEARTHSYNC_DB_POOL_SIZE", defaults.database.pool_size)?,
        },
        ..defaults
    };

    let scheduler = &mut config.scheduler;
    scheduler.enabled = env_bool("HEARTHSYNC_SCHEDULER_ENABLED", scheduler.enabled);
    if let Ok(cron) = std::env::var("HEARTHSYNC_SCHEDULER_CRON") {
        scheduler.cron_expression = cron;
    }
    scheduler.batch_limit = env_parse("HEARTHSYNC_BATCH_LIMIT", scheduler.batch_limit)?;
    scheduler.max_concurrency =
        env_parse("HEARTHSYNC_MAX_CONCURRENCY", scheduler.max_concurrency)?;
    scheduler.provider_timeout_secs =
        env_parse("HEARTHSYNC_PROVIDER_TIMEOUT_SECS", scheduler.provider_timeout_secs)?;

    let backoff = &mut config.backoff;
    backoff.base_interval_secs =
        env_parse("HEARTHSYNC_BACKOFF_BASE_SECS", backoff.base_interval_secs)?;
    backoff.failure_threshold =
        env_parse("HEARTHSYNC_FAILURE_THRESHOLD", backoff.failure_threshold)?;
    backoff.max_backoff_secs = env_parse("HEARTHSYNC_MAX_BACKOFF_SECS", backoff.max_backoff_secs)?;

    config.oauth.session_ttl_secs =
        env_parse("HEARTHSYNC_OAUTH_SESSION_TTL_SECS", config.oauth.session_ttl_secs)?;
    if let Ok(server) = std::env::var("HEARTHSYNC_CALDAV_SERVER_URL") {
        config.caldav.server_url = Some(server);
    }
    if let Ok(bind_addr) = std::env::var("HEARTHSYNC_BIND_ADDR") {
        config.server.bind_addr = bind_addr;
    }

    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, searches the standard locations. JSON and TOML are
/// detected by extension.
///
/// # Errors
/// Returns `HearthSyncError::Config` if the file is missing, unreadable or
/// malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(HearthSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => find_config_path().ok_or_else(|| {
            HearthSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| HearthSyncError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| HearthSyncError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| HearthSyncError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(HearthSyncError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Search the standard locations for a configuration file
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn find_config_path() -> Option<PathBuf> {
    let mut dirs = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        dirs.extend(cwd.ancestors().take(3).map(Path::to_path_buf));
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            dirs.push(exe_dir.to_path_buf());
        }
    }

    search_dirs(&dirs)
}

fn search_dirs(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .flat_map(|dir| CONFIG_FILE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|path| path.is_file())
}

/// Fill OAuth client registrations from the environment.
///
/// A client id creates the registration if the file had none; a secret alone
/// only updates an existing one.
fn apply_oauth_env(config: &mut Config) {
    apply_client_env(&mut config.oauth.google, "GOOGLE");
    apply_client_env(&mut config.oauth.outlook, "OUTLOOK");
}

fn apply_client_env(slot: &mut Option<OAuthClientConfig>, provider: &str) {
    let client_id = std::env::var(format!("HEARTHSYNC_{provider}_CLIENT_ID")).ok();
    let client_secret = std::env::var(format!("HEARTHSYNC_{provider}_CLIENT_SECRET")).ok();

    if let Some(client_id) = client_id {
        let client = slot.get_or_insert_with(|| OAuthClientConfig {
            client_id: String::new(),
            client_secret: None,
            auth_endpoint: None,
            token_endpoint: None,
            api_base_url: None,
        });
        client.client_id = client_id;
    }
    if let (Some(client), Some(secret)) = (slot.as_mut(), client_secret) {
        client.client_secret = Some(secret);
    }
}

fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        HearthSyncError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable, keeping `default` when unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| HearthSyncError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
