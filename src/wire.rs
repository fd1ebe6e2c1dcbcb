use serde::Deserialize;

use crate::RateLimit;

/// Body of `/rate_limit`; only the core quota is surfaced.
#[derive(Debug, Deserialize)]
pub struct RateLimitResponse {
    pub rate: RateLimit,
}
