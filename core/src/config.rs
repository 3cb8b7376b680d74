//! Client configuration.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.optimizely.com/v2";
pub const DEFAULT_PER_PAGE: u32 = 100;
const DEFAULT_RATE_LIMIT_WAIT_MS: u64 = 1_000;

/// Failure reading configuration from the environment.
#[derive(Debug, Error)]
#[error("invalid value {value:?} for {var}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Settings for `OptimizelyClient`.
///
/// Deserializable so a host can keep it in its own settings file; every field
/// has a default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Page size injected into GET requests that do not set `per_page`.
    pub per_page: u32,
    /// Overall per-request timeout enforced by the transport. Read from
    /// `timeout_ms` in settings files; zero means no timeout.
    #[serde(rename = "timeout_ms", deserialize_with = "timeout_from_millis")]
    pub timeout: Option<Duration>,
    pub user_agent: String,
    /// Give up after this many consecutive 429 responses. `None` retries for
    /// as long as the server keeps answering 429.
    pub max_rate_limit_retries: Option<u32>,
    /// Wait applied to a 429 that carries no usable `X-RATELIMIT-RESET`.
    pub default_rate_limit_wait_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            per_page: DEFAULT_PER_PAGE,
            timeout: None,
            user_agent: concat!("optimizely-core/", env!("CARGO_PKG_VERSION")).to_string(),
            max_rate_limit_retries: None,
            default_rate_limit_wait_ms: DEFAULT_RATE_LIMIT_WAIT_MS,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `OPTIMIZELY_API_BASE_URL`, `OPTIMIZELY_PER_PAGE`,
    /// `OPTIMIZELY_TIMEOUT_SECS` and `OPTIMIZELY_MAX_RETRIES` when set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(url) = lookup("OPTIMIZELY_API_BASE_URL") {
            config.base_url = url;
        }
        if let Some(v) = lookup("OPTIMIZELY_PER_PAGE") {
            config.per_page = parse_var("OPTIMIZELY_PER_PAGE", v)?;
        }
        if let Some(v) = lookup("OPTIMIZELY_TIMEOUT_SECS") {
            let secs: u64 = parse_var("OPTIMIZELY_TIMEOUT_SECS", v)?;
            config.timeout = non_zero(Duration::from_secs(secs));
        }
        if let Some(v) = lookup("OPTIMIZELY_MAX_RETRIES") {
            config.max_rate_limit_retries = Some(parse_var("OPTIMIZELY_MAX_RETRIES", v)?);
        }
        Ok(config)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Kept at full precision. `Duration::ZERO` clears the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = non_zero(timeout);
        self
    }

    pub fn with_max_rate_limit_retries(mut self, max: u32) -> Self {
        self.max_rate_limit_retries = Some(max);
        self
    }

    pub fn with_default_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.default_rate_limit_wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn default_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.default_rate_limit_wait_ms)
    }
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

fn timeout_from_millis<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let millis = Option::<u64>::deserialize(deserializer)?;
    Ok(millis.map(Duration::from_millis).and_then(non_zero))
}

fn parse_var<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError { var, value })
}
