//! Configuration for the query client and the HTTP layer.

use crate::error::ConfigError;
use crate::retry::RetryPolicy;
use std::time::Duration;

/// Environment variable holding the API base URL.
pub const API_URL_VAR: &str = "MARQUEE_API_URL";

/// Environment variable holding the request timeout in seconds.
pub const API_TIMEOUT_VAR: &str = "MARQUEE_API_TIMEOUT_SECS";

/// Base URL used when [`API_URL_VAR`] is unset.
pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Timeout used when [`API_TIMEOUT_VAR`] is unset.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Query client configuration.
///
/// # Example
///
/// ```
/// use marquee_runtime::config::QueryClientConfig;
/// use marquee_runtime::retry::RetryPolicy;
/// use std::time::Duration;
///
/// let config = QueryClientConfig::default()
///     .with_stale_time(Duration::from_secs(60))
///     .with_retry_policy(RetryPolicy::builder().max_retries(2).build());
///
/// assert_eq!(config.stale_time, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QueryClientConfig {
    /// How long settled data counts as fresh. Fresh data is served from cache
    /// without a request; zero means every fetch goes to the network.
    pub stale_time: Duration,
    /// Retry policy for retryable transport errors
    pub retry_policy: RetryPolicy,
    /// How long an entry with no running request is kept after its last use
    pub cache_time: Duration,
}

/// Cache time used by [`QueryClientConfig::default`].
pub const DEFAULT_CACHE_TIME: Duration = Duration::from_secs(5 * 60);

impl Default for QueryClientConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::ZERO,
            retry_policy: RetryPolicy::none(),
            cache_time: DEFAULT_CACHE_TIME,
        }
    }
}

impl QueryClientConfig {
    /// Set how long settled data stays fresh.
    #[must_use]
    pub const fn with_stale_time(mut self, stale_time: Duration) -> Self {
        self.stale_time = stale_time;
        self
    }

    /// Set how long idle entries are kept.
    #[must_use]
    pub const fn with_cache_time(mut self, cache_time: Duration) -> Self {
        self.cache_time = cache_time;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }
}

/// HTTP repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpConfig {
    /// Base URL every request path is appended to
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl HttpConfig {
    /// Create a configuration for `base_url` with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] unless the URL is `http` or `https`.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        validate_url(&base_url)?;
        Ok(Self {
            base_url,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load from `MARQUEE_API_URL` and `MARQUEE_API_TIMEOUT_SECS`, falling
    /// back to the defaults for unset variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string());
        validate_url(&base_url)?;

        let timeout = match lookup(API_TIMEOUT_VAR) {
            None => DEFAULT_TIMEOUT,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
        };

        Ok(Self { base_url, timeout })
    }
}

fn validate_url(url: &str) -> Result<(), ConfigError> {
    let rest = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"));

    match rest {
        Some(host) if !host.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidUrl(url.to_string())),
    }
}
