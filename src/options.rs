use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::header;

const REDACTED: &str = "<redacted>";

/// How the wait before each retry grows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Backoff {
    /// `base_delay_ms * retry`: 1x, 2x, 3x, ...
    #[default]
    Linear,
    /// `base_delay_ms * 2^(retry - 1)`: 1x, 2x, 4x, ...
    Exponential,
}

/// Retry behavior for transient failures.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Values below 1 act as 1.
    pub max_attempts: u32,
    /// Delay unit in milliseconds.
    pub base_delay_ms: u64,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub(crate) fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait before retry number `retry` (1-indexed).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        let factor = match self.backoff {
            Backoff::Linear => u64::from(retry),
            Backoff::Exponential => 1u64 << (retry - 1).min(16),
        };
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            backoff: Backoff::Linear,
        }
    }
}

/// Configures timeout, default headers and retry behavior.
#[derive(Clone, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Headers sent with every request.
    pub default_headers: BTreeMap<String, String>,
    pub retry: RetryPolicy,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("timeout_ms", &self.timeout_ms)
            .field("default_headers", &redacted_headers(&self.default_headers))
            .field("retry", &self.retry)
            .finish()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 10_000,
            default_headers: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Header view for `Debug` output with the `authorization` value masked.
pub(crate) fn redacted_headers(headers: &BTreeMap<String, String>) -> BTreeMap<&str, &str> {
    headers
        .iter()
        .map(|(name, value)| {
            if name.eq_ignore_ascii_case(header::AUTHORIZATION.as_str()) {
                (name.as_str(), REDACTED)
            } else {
                (name.as_str(), value.as_str())
            }
        })
        .collect()
}

/// Partial update applied by [`HttpClient::update_config`](crate::HttpClient::update_config).
///
/// Headers are merged into the existing defaults; every other field replaces
/// the current value when set.
#[derive(Clone, Default, Eq, PartialEq)]
pub struct ConfigUpdate {
    pub base_url: Option<String>,
    pub timeout_ms: Option<u64>,
    pub headers: BTreeMap<String, String>,
    pub retry: Option<RetryPolicy>,
}

impl fmt::Debug for ConfigUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigUpdate")
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("headers", &redacted_headers(&self.headers))
            .field("retry", &self.retry)
            .finish()
    }
}

impl ConfigUpdate {
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
