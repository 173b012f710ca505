//! Dashboard configuration (~/.milkboard/config.json + env overrides).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::records::{ColumnMapping, Locale};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    NoHomeDir,
    #[error("Failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("Invalid value for {key}: {value}")]
    InvalidOverride { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Display name of the spreadsheet, as shown in Drive.
    #[serde(default = "default_spreadsheet_name")]
    pub spreadsheet_name: String,
    /// Stable spreadsheet id, used when the name lookup finds nothing.
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    /// Env var holding the service-account JSON on hosted deployments.
    #[serde(default = "default_secret_env_key")]
    pub secret_env_key: String,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub refresh_interval_secs: Option<u64>,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub locale: Locale,
}

fn default_spreadsheet_name() -> String {
    "Datos Lechería".to_string()
}
fn default_credentials_path() -> String {
    "credenciales.json".to_string()
}
fn default_secret_env_key() -> String {
    "GCP_SERVICE_ACCOUNT".to_string()
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            spreadsheet_name: default_spreadsheet_name(),
            spreadsheet_id: None,
            credentials_path: default_credentials_path(),
            secret_env_key: default_secret_env_key(),
            cache_ttl_secs: default_cache_ttl_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            refresh_interval_secs: None,
            columns: ColumnMapping::default(),
            locale: Locale::default(),
        }
    }
}

impl Config {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

/// Get the canonical config file path (~/.milkboard/config.json)
pub fn config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".milkboard").join("config.json"))
}

/// Load config from the canonical path, then apply environment overrides.
pub fn load_config() -> Result<Config, ConfigError> {
    let path = config_path()?;
    let config = load_config_from(&path)?;
    apply_env_overrides(config, |key| std::env::var(key).ok())
}

/// Read a config file; a missing file means all defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        log::debug!("No config at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Overlay `MILKBOARD_*` variables on top of file config.
pub fn apply_env_overrides(
    mut config: Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(name) = get("MILKBOARD_SPREADSHEET") {
        config.spreadsheet_name = name;
    }
    if let Some(id) = get("MILKBOARD_SPREADSHEET_ID") {
        config.spreadsheet_id = Some(id);
    }
    if let Some(path) = get("MILKBOARD_CREDENTIALS") {
        config.credentials_path = path;
    }
    if let Some(ttl) = get("MILKBOARD_CACHE_TTL_SECS") {
        config.cache_ttl_secs = ttl
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidOverride {
                key: "MILKBOARD_CACHE_TTL_SECS",
                value: ttl.clone(),
            })?;
    }
    Ok(config)
}
