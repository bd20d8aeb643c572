//! Configuration infrastructure
//!
//! Contains configuration loading and validation for catalog crawling.
//!
//! Sources are layered with the `config` crate, later ones winning:
//! 1. Built-in defaults (`defaults` module)
//! 2. Optional config file (TOML / JSON / YAML by extension)
//! 3. Environment variables prefixed `CATALOG_CRAWLER_` (`__` between sections)

#![allow(clippy::derivable_impls)]

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Remote catalog endpoint and request headers
    pub api: ApiConfig,

    /// Per-item retry and timing policy
    pub fetch: FetchConfig,

    /// Batching and concurrency
    pub batch: BatchConfig,

    /// Input list and output artifacts
    pub io: IoConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Remote endpoint and header rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL; the item ID is appended as the last path segment
    pub endpoint: String,

    /// Pool of User-Agent strings, one picked at random per request
    pub user_agents: Vec<String>,

    pub accept: String,
    pub accept_language: String,
    pub referer: String,

    /// Optional extra header (e.g. a guest token)
    pub extra_header: Option<ExtraHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraHeader {
    pub name: String,
    pub value: String,
}

/// Per-item fetch policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Per-request timeout in seconds
    pub timeout_seconds: u64,

    /// Maximum HTTP attempts per item (retryable statuses and non-JSON bodies consume these)
    pub max_attempts: u32,

    /// Maximum retries for 2xx responses that are not JSON
    pub max_non_json_attempts: u32,

    /// Linear backoff unit in milliseconds (`base × attempt`)
    pub base_delay_ms: u64,

    /// Status codes retried with backoff
    pub retryable_statuses: Vec<u16>,

    /// Cooldown after a redirect to a maintenance/login/challenge page
    pub rate_limit_cooldown_seconds: u64,

    /// Cooldowns allowed per item before giving up with `rate_limited`
    pub max_rate_limit_cooldowns: u32,

    /// Location substrings that mark a redirect as a block signal
    pub block_redirect_markers: Vec<String>,

    /// Random pacing delay before every attempt (uniform in [min, max])
    pub pacing_min_ms: u64,
    pub pacing_max_ms: u64,

    /// Description length cap in characters
    pub max_description_length: usize,

    /// Raw body snippet cap in characters for content-type mismatches
    pub raw_snippet_length: usize,
}

/// Batch processing configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Number of IDs per batch (one artifact per batch)
    pub batch_size: usize,

    /// Maximum fetches in flight at once
    pub concurrency: usize,

    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// CSV file holding the ID column
    pub input_file: PathBuf,

    /// Name of the ID column
    pub id_column: String,

    /// Only take the first N IDs
    pub limit: Option<usize>,

    /// Directory receiving the batch artifacts
    pub output_dir: PathBuf,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "error", "warn", "info", "debug", "trace"
    pub level: String,

    /// Enable JSON formatted file logs
    pub json_format: bool,

    /// Enable console output
    pub console_output: bool,

    /// Enable file output
    pub file_output: bool,

    /// Log directory; defaults to `logs/` next to the executable
    pub log_dir: Option<PathBuf>,

    /// Log file name inside the log directory
    pub file_name: String,

    /// Module-specific log level filters (e.g., "reqwest": "info")
    pub module_filters: HashMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            fetch: FetchConfig::default(),
            batch: BatchConfig::default(),
            io: IoConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            user_agents: defaults::USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            accept: defaults::ACCEPT.to_string(),
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
            referer: defaults::REFERER.to_string(),
            extra_header: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_attempts: defaults::MAX_ATTEMPTS,
            max_non_json_attempts: defaults::MAX_NON_JSON_ATTEMPTS,
            base_delay_ms: defaults::BASE_DELAY_MS,
            retryable_statuses: defaults::RETRYABLE_STATUSES.to_vec(),
            rate_limit_cooldown_seconds: defaults::RATE_LIMIT_COOLDOWN_SECONDS,
            max_rate_limit_cooldowns: defaults::MAX_RATE_LIMIT_COOLDOWNS,
            block_redirect_markers: defaults::BLOCK_REDIRECT_MARKERS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            pacing_min_ms: defaults::PACING_MIN_MS,
            pacing_max_ms: defaults::PACING_MAX_MS,
            max_description_length: defaults::MAX_DESCRIPTION_LENGTH,
            raw_snippet_length: defaults::RAW_SNIPPET_LENGTH,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::BATCH_SIZE,
            concurrency: defaults::CONCURRENT_REQUESTS,
            batch_delay_ms: defaults::BATCH_DELAY_MS,
        }
    }
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_file: PathBuf::from(defaults::INPUT_FILE),
            id_column: defaults::ID_COLUMN.to_string(),
            limit: None,
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: defaults::LOG_JSON_FORMAT,
            console_output: defaults::LOG_CONSOLE_OUTPUT,
            file_output: defaults::LOG_FILE_OUTPUT,
            log_dir: None,
            file_name: defaults::LOG_FILE_NAME.to_string(),
            module_filters: {
                let mut filters = HashMap::new();
                filters.insert("reqwest".to_string(), "info".to_string());
                filters.insert("hyper".to_string(), "warn".to_string());
                filters.insert("h2".to_string(), "warn".to_string());
                filters.insert("html5ever".to_string(), "warn".to_string());
                filters
            },
        }
    }
}

impl FetchConfig {
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub const fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_seconds)
    }

    pub const fn pacing_range(&self) -> (Duration, Duration) {
        (
            Duration::from_millis(self.pacing_min_ms),
            Duration::from_millis(self.pacing_max_ms),
        )
    }
}

impl BatchConfig {
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

impl AppConfig {
    /// Load configuration from an optional file plus the environment.
    ///
    /// The file is the one chosen by [`AppConfig::config_source`].
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(source) = Self::config_source(path) {
            builder = builder.add_source(config::File::from(source));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// The file `load` reads: the explicit path, else the first existing
    /// entry of [`AppConfig::default_locations`]
    pub fn config_source(path: Option<&Path>) -> Option<PathBuf> {
        match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_locations().into_iter().find(|p| p.exists()),
        }
    }

    /// Candidate config files, most specific first
    pub fn default_locations() -> Vec<PathBuf> {
        let mut locations = vec![PathBuf::from("config/default.toml")];
        if let Some(dir) = dirs::config_dir() {
            locations.push(dir.join(defaults::APP_DIR_NAME).join("config.toml"));
        }
        locations
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = url::Url::parse(&self.api.endpoint).map_err(|e| {
            ConfigError::validation(format!("endpoint '{}' is not a valid URL: {}", self.api.endpoint, e))
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::validation("endpoint must use http or https"));
        }

        if self.api.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::validation("user_agents must contain at least one entry"));
        }

        if let Some(extra) = &self.api.extra_header {
            if extra.name.trim().is_empty() {
                return Err(ConfigError::validation("extra_header.name must not be empty"));
            }
        }

        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::validation("max_attempts must be greater than 0"));
        }

        if self.fetch.timeout_seconds == 0 {
            return Err(ConfigError::validation("timeout_seconds must be greater than 0"));
        }

        if self.fetch.pacing_min_ms > self.fetch.pacing_max_ms {
            return Err(ConfigError::validation(
                "pacing_min_ms cannot be greater than pacing_max_ms",
            ));
        }

        if self.batch.batch_size == 0 {
            return Err(ConfigError::validation("batch_size must be greater than 0"));
        }

        if self.batch.concurrency == 0 {
            return Err(ConfigError::validation("concurrency must be greater than 0"));
        }

        if self.io.id_column.trim().is_empty() {
            return Err(ConfigError::validation("id_column must not be empty"));
        }

        Ok(())
    }
}

/// Default crawling configuration values
pub mod defaults {
    /// Environment variable prefix
    pub const ENV_PREFIX: &str = "CATALOG_CRAWLER";

    /// Directory name under the user config dir
    pub const APP_DIR_NAME: &str = "catalog-crawler";

    /// Default product API endpoint
    pub const ENDPOINT: &str = "https://tiki.vn/api/v2/products";

    pub const ACCEPT: &str = "application/json";
    pub const ACCEPT_LANGUAGE: &str = "vi-VN,vi;q=0.9,en;q=0.8";
    pub const REFERER: &str = "https://tiki.vn/";

    /// Rotating desktop browser User-Agents
    pub const USER_AGENTS: &[&str] = &[
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
    ];

    /// Default request timeout in seconds
    pub const REQUEST_TIMEOUT_SECONDS: u64 = 60;

    /// Default maximum attempts per item
    pub const MAX_ATTEMPTS: u32 = 5;

    /// Default maximum retries for non-JSON 2xx bodies
    pub const MAX_NON_JSON_ATTEMPTS: u32 = 2;

    /// Default linear backoff unit in milliseconds
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Statuses retried with backoff
    pub const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504, 302];

    /// Default cooldown after a block redirect
    pub const RATE_LIMIT_COOLDOWN_SECONDS: u64 = 30;

    /// Default cooldowns allowed per item
    pub const MAX_RATE_LIMIT_COOLDOWNS: u32 = 3;

    /// Location substrings marking a block/maintenance redirect
    pub const BLOCK_REDIRECT_MARKERS: &[&str] = &["maintenance", "login", "challenge"];

    /// Default pacing delay range in milliseconds
    pub const PACING_MIN_MS: u64 = 1000;
    pub const PACING_MAX_MS: u64 = 2000;

    /// Default description cap in characters
    pub const MAX_DESCRIPTION_LENGTH: usize = 2000;

    /// Default raw response snippet cap in characters
    pub const RAW_SNIPPET_LENGTH: usize = 300;

    // Batch configuration defaults
    /// Default batch size
    pub const BATCH_SIZE: usize = 1000;

    /// Default maximum in-flight requests
    pub const CONCURRENT_REQUESTS: usize = 10;

    /// Default delay between batches in milliseconds
    pub const BATCH_DELAY_MS: u64 = 500;

    // IO defaults
    pub const INPUT_FILE: &str = "data/products.csv";
    pub const ID_COLUMN: &str = "id";
    pub const OUTPUT_DIR: &str = "catalog_products";

    // Log configuration defaults
    /// Default log level
    pub const LOG_LEVEL: &str = "info";

    /// Default JSON format setting
    pub const LOG_JSON_FORMAT: bool = false;

    /// Default console output setting
    pub const LOG_CONSOLE_OUTPUT: bool = true;

    /// Default file output setting
    pub const LOG_FILE_OUTPUT: bool = true;

    /// Default log file name
    pub const LOG_FILE_NAME: &str = "catalog-crawler.log";
}
