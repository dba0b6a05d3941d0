//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration lives in a TOML file and cannot change while a
//! service runs. Runtime values (generated hashing salt, API keys entered at
//! runtime) live in the database `settings` table and are resolved by each
//! service.
//!
//! # Root folder priority
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "ROLLCALL_ROOT_FOLDER";

/// Default HTTP port for the representative index service
pub const DEFAULT_PORT: u16 = 5830;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// External representative data providers
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,

    /// Global retry policy for provider calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Quality scoring and retention parameters
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// External geocoding provider
    #[serde(default)]
    pub geocoder: GeocoderConfig,

    /// Address hashing and analytics retention
    #[serde(default)]
    pub privacy: PrivacyConfig,

    /// Ingestion cycle scheduling
    #[serde(default)]
    pub ingest: IngestConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            providers: Vec::new(),
            retry: RetryConfig::default(),
            scoring: ScoringConfig::default(),
            geocoder: GeocoderConfig::default(),
            privacy: PrivacyConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// How a provider's records are obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Paginated HTTP endpoint returning JSON
    JsonFeed,
    /// Local JSON file (offline seeding, fixtures)
    StaticFile,
}

/// Per-provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique provider name, used in the crosswalk and provenance tags
    pub name: String,

    pub kind: ProviderKind,

    /// Base URL for `json_feed` providers
    #[serde(default)]
    pub base_url: Option<String>,

    /// File path for `static_file` providers
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// API credential (database and environment take precedence)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Query parameter carrying the API credential
    #[serde(default = "default_api_key_param")]
    pub api_key_param: String,

    /// Sustained request rate allowed by the provider
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Token bucket burst size
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Static reliability weight (0.0-1.0)
    pub reliability: f64,

    /// Age at which this provider's records reach the recency floor
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u64,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// JSON pointer mapping from provider payload to record fields
    #[serde(default)]
    pub mapping: FieldMapping,
}

/// JSON pointer locations of record fields inside one provider item
///
/// Pointers are relative to a single item of the `records` array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    pub records: String,
    pub next_cursor: String,
    pub id: String,
    pub name: String,
    pub office: String,
    pub level: String,
    pub state: String,
    pub district: String,
    pub party: String,
    pub email: String,
    pub phone: String,
    pub website: String,
    pub social: String,
    pub term_start: String,
    pub term_end: String,
    pub in_office: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            records: "/results".to_string(),
            next_cursor: "/next".to_string(),
            id: "/id".to_string(),
            name: "/name".to_string(),
            office: "/office".to_string(),
            level: "/level".to_string(),
            state: "/state".to_string(),
            district: "/district".to_string(),
            party: "/party".to_string(),
            email: "/email".to_string(),
            phone: "/phone".to_string(),
            website: "/website".to_string(),
            social: "/social".to_string(),
            term_start: "/term_start".to_string(),
            term_end: "/term_end".to_string(),
            in_office: "/in_office".to_string(),
        }
    }
}

/// Retry policy applied by the fetch scheduler to every provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per operation, including the first
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Jitter as a fraction of the computed backoff (0.0-1.0)
    pub jitter: f64,
    /// Consecutive failed operations before a provider is degraded
    pub degrade_after_failures: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 500,
            max_backoff_ms: 30_000,
            jitter: 0.2,
            degrade_after_failures: 3,
        }
    }
}

/// Quality scoring and record retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Recency factor reached at the provider staleness threshold
    pub recency_floor: f64,
    /// Superseded source records older than this are purged
    pub retention_days: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_floor: 0.5,
            retention_days: 90,
        }
    }
}

/// External geocoding provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeocoderConfig {
    /// Endpoint URL; no URL means state-only resolution
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    /// Lifetime of cached jurisdiction mappings (keyed by address hash)
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    /// Offline locality → state fallback ("springfield" = "IL")
    pub localities: BTreeMap<String, String>,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_ms: 3_000,
            cache_ttl_secs: 86_400,
            cache_capacity: 10_000,
            localities: BTreeMap::new(),
        }
    }
}

/// Address hashing and aggregate analytics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivacyConfig {
    /// Hashing salt; generated and stored in the database when absent
    pub salt: Option<String>,
    /// Retain (hash, coarse bucket) pairs for aggregate analytics
    pub analytics_enabled: bool,
    /// Minimum distinct hashes before a bucket is reported
    pub k_anonymity: u32,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            salt: None,
            analytics_enabled: false,
            k_anonymity: 5,
        }
    }
}

/// Ingestion cycle scheduling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Seconds between automatic cycles (0 disables the periodic loop)
    pub interval_secs: u64,
    /// Page cap per provider per cycle; the cursor resumes the rest next cycle
    pub max_pages_per_cycle: u32,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
            max_pages_per_cycle: 100,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_api_key_param() -> String {
    "apikey".to_string()
}

fn default_requests_per_second() -> u32 {
    1
}

fn default_burst() -> u32 {
    1
}

fn default_staleness_hours() -> u64 {
    168
}

fn default_page_size() -> u32 {
    50
}

impl TomlConfig {
    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for provider in &self.providers {
            if provider.name.trim().is_empty() {
                return Err(Error::Config("Provider name cannot be empty".to_string()));
            }
            if !names.insert(provider.name.as_str()) {
                return Err(Error::Config(format!(
                    "Duplicate provider name: {}",
                    provider.name
                )));
            }
            if !(0.0..=1.0).contains(&provider.reliability) {
                return Err(Error::Config(format!(
                    "Provider {} reliability {} outside 0.0-1.0",
                    provider.name, provider.reliability
                )));
            }
            if provider.requests_per_second == 0 || provider.burst == 0 {
                return Err(Error::Config(format!(
                    "Provider {} rate limit must be non-zero",
                    provider.name
                )));
            }
            if provider.staleness_hours == 0 {
                return Err(Error::Config(format!(
                    "Provider {} staleness_hours must be non-zero",
                    provider.name
                )));
            }
            match provider.kind {
                ProviderKind::JsonFeed if provider.base_url.is_none() => {
                    return Err(Error::Config(format!(
                        "Provider {} (json_feed) requires base_url",
                        provider.name
                    )));
                }
                ProviderKind::StaticFile if provider.path.is_none() => {
                    return Err(Error::Config(format!(
                        "Provider {} (static_file) requires path",
                        provider.name
                    )));
                }
                _ => {}
            }
        }

        if !(0.0..=1.0).contains(&self.scoring.recency_floor) {
            return Err(Error::Config(format!(
                "recency_floor {} outside 0.0-1.0",
                self.scoring.recency_floor
            )));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(Error::Config(format!(
                "retry jitter {} outside 0.0-1.0",
                self.retry.jitter
            )));
        }
        for (locality, state) in &self.geocoder.localities {
            if state.trim().len() != 2 {
                return Err(Error::Config(format!(
                    "Locality {} must map to a two-letter state code, got {}",
                    locality, state
                )));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::Config("retry max_attempts must be at least 1".to_string()));
        }

        Ok(())
    }
}

/// Load bootstrap configuration
///
/// A missing file is not fatal: the service starts with defaults and logs a
/// warning. A file that exists but fails to parse or validate is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!(
            "Config file {} not found, using built-in defaults",
            path.display()
        );
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    config.validate()?;

    info!(
        providers = config.providers.len(),
        "Loaded configuration from {}",
        path.display()
    );
    Ok(config)
}

/// Resolve the root folder (see module docs for priority order)
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Default configuration file location for the platform
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("rollcall").join("rollcall-ri.toml"))
        .unwrap_or_else(|| PathBuf::from("rollcall-ri.toml"))
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("rollcall"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\rollcall"))
    } else {
        dirs::data_local_dir()
            .map(|d| d.join("rollcall"))
            .unwrap_or_else(|| PathBuf::from("./rollcall_data"))
    }
}

/// Database file inside a root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join("rollcall.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TomlConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.scoring.recency_floor, 0.5);
    }

    #[test]
    fn test_database_path_under_root() {
        let path = database_path(Path::new("/var/lib/rollcall"));
        assert_eq!(path, PathBuf::from("/var/lib/rollcall/rollcall.db"));
    }

    #[test]
    fn test_validate_rejects_json_feed_without_url() {
        let mut config = TomlConfig::default();
        config.providers.push(ProviderConfig {
            name: "feed".to_string(),
            kind: ProviderKind::JsonFeed,
            base_url: None,
            path: None,
            api_key: None,
            api_key_param: default_api_key_param(),
            requests_per_second: 1,
            burst: 1,
            reliability: 0.8,
            staleness_hours: 24,
            page_size: 50,
            mapping: FieldMapping::default(),
        });
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
