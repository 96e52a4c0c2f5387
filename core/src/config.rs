//! Client configuration.
//!
//! `ClientConfig` carries process-wide defaults; `RequestConfig` overrides
//! them for a single call.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;
use crate::retry::RetryPolicy;

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide client settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// API root without trailing slash.
    pub base_url: String,
    /// Deadline for a single attempt.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Load settings from `BANAGOCHI_*` environment variables. Unset
    /// variables keep their defaults; unparsable ones are an error.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let base_url = lookup("BANAGOCHI_API_URL").unwrap_or(defaults.base_url);
        let timeout = parse_var(&lookup, "BANAGOCHI_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);
        let retries = parse_var(&lookup, "BANAGOCHI_RETRY_ATTEMPTS")?
            .map(|n: u64| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(defaults.retry.retries);
        let base_delay = parse_var(&lookup, "BANAGOCHI_RETRY_DELAY_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry.base_delay);

        Ok(Self::new(&base_url)
            .with_timeout(timeout)
            .with_retry(RetryPolicy::new(retries, base_delay)))
    }
}

fn parse_var(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}

/// Per-call overrides. Unset fields fall back to `ClientConfig`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    /// Extra headers, applied after the defaults and replacing any with the
    /// same name.
    pub headers: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub(crate) fn resolve_timeout(&self, defaults: &ClientConfig) -> Duration {
        self.timeout.unwrap_or(defaults.timeout)
    }

    pub(crate) fn resolve_policy(&self, defaults: &ClientConfig) -> RetryPolicy {
        RetryPolicy {
            retries: self.retries.unwrap_or(defaults.retry.retries),
            base_delay: self.retry_delay.unwrap_or(defaults.retry.base_delay),
        }
    }
}
