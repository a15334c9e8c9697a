//! Configuration loading for the `muninn` host binary.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.muninn/config.toml` (user)
//! 3. `/etc/muninn/config.toml` (system)
//!
//! If no file exists at (2) or (3), defaults are used. Every section and
//! field is optional. The API key is never read from the file; it comes
//! from `GEMINI_API_KEY`.
//!
//! ```toml
//! [cache]
//! max_entries = 50
//! ttl_secs = 86400
//! min_interval_ms = 2000
//! max_wait_ms = 30000
//!
//! [gemini]
//! model = "gemini-2.0-flash"
//! prompt_template = "Extract the places mentioned in: {text}"
//!
//! [retry]
//! max_attempts = 3
//!
//! [sweep]
//! interval_secs = 3600
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::providers::RetryConfig;
use crate::providers::gemini::DEFAULT_MODEL;
use crate::{MuninnError, Result};

/// Environment variable holding the Gemini API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Host configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheSection,
    #[serde(default)]
    pub gemini: GeminiSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub sweep: SweepSection,
}

/// Request cache settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSection {
    /// Maximum resident entries (default: 50).
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Entry freshness window in seconds (default: 86400).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Minimum spacing between outbound calls in milliseconds (default: 2000).
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
    /// How long to wait on an in-flight request in milliseconds (default: 30000).
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Key namespace tag (default: "gemini").
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            ttl_secs: default_ttl_secs(),
            min_interval_ms: default_min_interval_ms(),
            max_wait_ms: default_max_wait_ms(),
            namespace: default_namespace(),
        }
    }
}

fn default_max_entries() -> usize {
    50
}

fn default_ttl_secs() -> u64 {
    24 * 3600
}

fn default_min_interval_ms() -> u64 {
    2000
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_namespace() -> String {
    "gemini".to_string()
}

impl CacheSection {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.max_entries)
            .ttl(Duration::from_secs(self.ttl_secs))
            .min_interval(Duration::from_millis(self.min_interval_ms))
            .max_wait(Duration::from_millis(self.max_wait_ms))
            .namespace(self.namespace.clone())
    }
}

/// Gemini client settings.
#[derive(Debug, Clone, Deserialize)]
pub struct GeminiSection {
    #[serde(default = "default_model")]
    pub model: String,
    /// Prompt wrapped around each request; `{text}` is the request text.
    #[serde(default)]
    pub prompt_template: Option<String>,
    /// Override the API base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds (default: 30).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GeminiSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            prompt_template: None,
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// Retry settings for the outbound call.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    500
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.max_attempts)
            .initial_delay(Duration::from_millis(self.initial_delay_ms))
    }
}

/// Periodic expiry sweep.
#[derive(Debug, Clone, Deserialize)]
pub struct SweepSection {
    /// Seconds between sweeps (default: 3600). 0 disables the sweeper.
    #[serde(default = "default_sweep_secs")]
    pub interval_secs: u64,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            interval_secs: default_sweep_secs(),
        }
    }
}

fn default_sweep_secs() -> u64 {
    3600
}

impl SweepSection {
    /// Sweep period, or `None` when disabled.
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Without one, the first existing
    /// standard location is used, falling back to defaults.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Parse a specific config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            MuninnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            MuninnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(MuninnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".muninn").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        let system_config = PathBuf::from("/etc/muninn/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

/// Read the API key from the environment.
pub fn api_key_from_env() -> Result<String> {
    std::env::var(API_KEY_ENV)
        .ok()
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| MuninnError::Configuration(format!("{API_KEY_ENV} is not set")))
}
