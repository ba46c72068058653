//! Environment-driven configuration.
//!
//! Source settings use per-source prefixes (`VASTAI_API_KEY`,
//! `AKASH_RATE_LIMIT`, ...); reliability knobs are global. Every key has a
//! production default so an empty environment yields a runnable service.

use std::env;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::error::ConfigError;
use crate::retry::RetryConfig;
use crate::source::SourceId;

/// Per-source connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub source: SourceId,
    pub enabled: bool,
    pub api_key: Option<String>,
    pub base_url: String,
    pub rate_limit_per_minute: u32,
    pub timeout: Duration,
}

impl SourceConfig {
    /// Production defaults matching each marketplace's published quota.
    pub fn defaults(source: SourceId) -> Self {
        let (base_url, rate_limit_per_minute, timeout_secs) = match source {
            SourceId::Vastai => ("https://console.vast.ai/api/v0", 100, 30),
            SourceId::Akash => ("https://rpc.akashnet.net:443", 60, 45),
            SourceId::Render => ("https://api.rendernetwork.com", 50, 30),
            SourceId::Ionet => ("https://api.io.net/v1", 150, 30),
        };
        Self {
            source,
            enabled: true,
            api_key: None,
            base_url: base_url.to_owned(),
            rate_limit_per_minute,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Load settings for `source` from `{PREFIX}_ENABLED`, `{PREFIX}_API_KEY`,
    /// `{PREFIX}_BASE_URL`, `{PREFIX}_RATE_LIMIT`, and `{PREFIX}_TIMEOUT`.
    pub fn from_env(source: SourceId) -> Result<Self, ConfigError> {
        let prefix = source.env_prefix();
        let mut config = Self::defaults(source);

        if let Some(value) = read_env(&format!("{prefix}_ENABLED")) {
            config.enabled = parse_bool(&format!("{prefix}_ENABLED"), &value)?;
        }
        if let Some(value) = read_env(&format!("{prefix}_API_KEY")) {
            config.api_key = Some(value);
        }
        if let Some(value) = read_env(&format!("{prefix}_BASE_URL")) {
            config.base_url = value;
        }
        if let Some(value) = read_env(&format!("{prefix}_RATE_LIMIT")) {
            config.rate_limit_per_minute = parse_u32(&format!("{prefix}_RATE_LIMIT"), &value)?;
        }
        if let Some(value) = read_env(&format!("{prefix}_TIMEOUT")) {
            config.timeout = parse_secs(&format!("{prefix}_TIMEOUT"), &value)?;
        }

        if config.rate_limit_per_minute == 0 {
            return Err(ConfigError::ZeroRateLimit { source_id: source });
        }
        Ok(config)
    }
}

/// Global reliability settings shared by every source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReliabilityConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub sync_interval: Duration,
    pub sync_deadline: Duration,
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            sync_interval: Duration::from_secs(30),
            sync_deadline: Duration::from_secs(300),
        }
    }
}

impl ReliabilityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = read_env("CIRCUIT_BREAKER_THRESHOLD") {
            config.circuit_breaker.failure_threshold =
                parse_u32("CIRCUIT_BREAKER_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("CIRCUIT_BREAKER_TIMEOUT") {
            config.circuit_breaker.recovery_timeout = parse_secs("CIRCUIT_BREAKER_TIMEOUT", &value)?;
        }
        if let Some(value) = read_env("CIRCUIT_BREAKER_HALF_OPEN_MAX_CALLS") {
            config.circuit_breaker.half_open_max_calls =
                parse_u32("CIRCUIT_BREAKER_HALF_OPEN_MAX_CALLS", &value)?;
        }

        if let Some(value) = read_env("CACHE_TTL") {
            config.cache.base_ttl = parse_secs("CACHE_TTL", &value)?;
        }
        if let Some(value) = read_env("CACHE_MIN_TTL") {
            config.cache.min_ttl = parse_secs("CACHE_MIN_TTL", &value)?;
        }
        if let Some(value) = read_env("CACHE_MAX_TTL") {
            config.cache.max_ttl = parse_secs("CACHE_MAX_TTL", &value)?;
        }

        if let Some(value) = read_env("MAX_RETRIES") {
            config.retry.max_retries = parse_u32("MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("RETRY_BASE_DELAY") {
            config.retry.backoff.base_delay = parse_secs("RETRY_BASE_DELAY", &value)?;
        }
        if let Some(value) = read_env("RETRY_MAX_DELAY") {
            config.retry.backoff.max_delay = parse_secs("RETRY_MAX_DELAY", &value)?;
        }
        if let Some(value) = read_env("RETRY_JITTER") {
            config.retry.backoff.jitter = parse_secs("RETRY_JITTER", &value)?;
        }

        if let Some(value) = read_env("SYNC_INTERVAL") {
            config.sync_interval = parse_secs("SYNC_INTERVAL", &value)?;
        }
        if let Some(value) = read_env("SYNC_DEADLINE") {
            config.sync_deadline = parse_secs("SYNC_DEADLINE", &value)?;
        }

        Ok(config)
    }

    /// Per-attempt timeout is the tighter of the retry default and the
    /// source's own request timeout.
    pub fn retry_for(&self, source_config: &SourceConfig) -> RetryConfig {
        RetryConfig {
            attempt_timeout: self.retry.attempt_timeout.min(source_config.timeout),
            ..self.retry
        }
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        }),
    }
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        })?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}
