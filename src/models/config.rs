//! Application configuration structures.
//!
//! Built once at startup and passed by reference into each component's
//! constructor. There is no ambient global configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP client and fetch-strategy settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Page cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Supplementary-link enrichment settings
    #[serde(default)]
    pub enrich: EnrichConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.http.user_agents.is_empty() {
            return Err(AppError::validation("http.user_agents is empty"));
        }
        if self.http.timeout_secs == 0 {
            return Err(AppError::validation("http.timeout_secs must be > 0"));
        }
        if self.http.max_concurrent == 0 {
            return Err(AppError::validation("http.max_concurrent must be > 0"));
        }
        if self.http.max_retries == 0 {
            return Err(AppError::validation("http.max_retries must be > 0"));
        }
        if self.cache.min_ttl_secs < 1 {
            return Err(AppError::validation("cache.min_ttl_secs must be >= 1"));
        }
        if self.cache.max_ttl_secs < self.cache.min_ttl_secs {
            return Err(AppError::validation(
                "cache.max_ttl_secs must be >= cache.min_ttl_secs",
            ));
        }
        if self.cache.default_ttl_secs < self.cache.min_ttl_secs
            || self.cache.default_ttl_secs > self.cache.max_ttl_secs
        {
            return Err(AppError::validation(
                "cache.default_ttl_secs must fall inside [min_ttl_secs, max_ttl_secs]",
            ));
        }
        Ok(())
    }
}

/// HTTP client, pacing, retry and fallback-strategy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// User-Agent pool rotated across requests
    #[serde(default = "defaults::user_agents")]
    pub user_agents: Vec<String>,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum concurrent in-flight fetches (global semaphore)
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Minimum interval between requests to the same host, in milliseconds
    #[serde(default = "defaults::per_host_interval")]
    pub per_host_interval_ms: u64,

    /// Retry attempts for transient failures
    #[serde(default = "defaults::max_retries")]
    pub max_retries: u32,

    /// Exponential backoff base in seconds
    #[serde(default = "defaults::backoff_base")]
    pub backoff_base_secs: f64,

    /// Allow shelling out to the system `curl` binary
    #[serde(default = "defaults::enabled")]
    pub enable_subprocess_curl: bool,

    /// Allow headless-browser rendering (still per-call opt-in)
    #[serde(default = "defaults::enabled")]
    pub enable_browser: bool,

    /// Allow the interactive manual-paste fallback
    #[serde(default)]
    pub enable_interactive: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agents: defaults::user_agents(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
            per_host_interval_ms: defaults::per_host_interval(),
            max_retries: defaults::max_retries(),
            backoff_base_secs: defaults::backoff_base(),
            enable_subprocess_curl: true,
            enable_browser: true,
            enable_interactive: false,
        }
    }
}

/// Page cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL when response headers give no usable max-age, in seconds
    #[serde(default = "defaults::default_ttl")]
    pub default_ttl_secs: u64,

    /// Lower clamp for header-derived TTLs
    #[serde(default = "defaults::min_ttl")]
    pub min_ttl_secs: u64,

    /// Upper clamp for header-derived TTLs
    #[serde(default = "defaults::max_ttl")]
    pub max_ttl_secs: u64,

    /// Extended TTL for manually captured pages
    #[serde(default = "defaults::manual_ttl")]
    pub manual_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: defaults::default_ttl(),
            min_ttl_secs: defaults::min_ttl(),
            max_ttl_secs: defaults::max_ttl(),
            manual_ttl_secs: defaults::manual_ttl(),
        }
    }
}

/// Supplementary-link enrichment settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichConfig {
    /// JSON feed providing form-guide links per (course, date); enrichment
    /// is skipped entirely when unset
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Origin name recorded in the attribution map for attached links
    #[serde(default = "defaults::enrich_origin")]
    pub origin_name: String,
}

impl Default for EnrichConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            origin_name: defaults::enrich_origin(),
        }
    }
}

mod defaults {
    // HTTP defaults
    pub fn user_agents() -> Vec<String> {
        vec![
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 13_5) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".into(),
            "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".into(),
        ]
    }
    pub fn timeout() -> u64 {
        30
    }
    pub fn max_concurrent() -> usize {
        8
    }
    pub fn per_host_interval() -> u64 {
        250
    }
    pub fn max_retries() -> u32 {
        4
    }
    pub fn backoff_base() -> f64 {
        2.0
    }
    pub fn enabled() -> bool {
        true
    }

    // Cache defaults
    pub fn default_ttl() -> u64 {
        1800
    }
    pub fn min_ttl() -> u64 {
        60
    }
    pub fn max_ttl() -> u64 {
        21600
    }
    pub fn manual_ttl() -> u64 {
        21600
    }

    // Enrichment defaults
    pub fn enrich_origin() -> String {
        "R&S".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agents() {
        let mut config = Config::default();
        config.http.user_agents.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.http.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_ttl_bounds() {
        let mut config = Config::default();
        config.cache.min_ttl_secs = 7200;
        config.cache.max_ttl_secs = 60;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [http]
            max_concurrent = 12
            enable_interactive = true

            [cache]
            default_ttl_secs = 600
            "#,
        )
        .unwrap();

        assert_eq!(config.http.max_concurrent, 12);
        assert!(config.http.enable_interactive);
        assert_eq!(config.cache.default_ttl_secs, 600);
        // Untouched sections keep their defaults
        assert_eq!(config.cache.max_ttl_secs, 21600);
        assert_eq!(config.http.max_retries, 4);
    }
}
