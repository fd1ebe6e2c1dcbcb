//! `github-explorer` is an async client for the GitHub REST API v3.
//!
//! Layers, bottom-up:
//! - [`HttpClient`]: base URL, default headers, per-attempt timeout, retry
//!   with backoff for transient failures.
//! - [`classify_http_failure`]: turns a failed attempt into a
//!   [`ClassifiedError`] with a stable code, retryability and user message.
//! - [`GithubClient`]: validated, logged calls to the user search, profile,
//!   repository and rate limit endpoints.
//! - [`DebouncedSearch`]: search-as-you-type that drops stale responses.

mod classify;
mod client;
mod error;
mod github;
mod models;
mod options;
mod request;
mod search;
mod settings;
mod wire;

pub use classify::{classify_http_failure, FailureContext, RawFailure, RawResponse};
pub use client::HttpClient;
pub use error::{
    is_retryable_status, ClassifiedError, CollectedError, ErrorAggregator, ErrorKind, ErrorRecord,
    ErrorSummary, Severity,
};
pub use github::GithubClient;
pub use models::{
    License, RateLimit, RateLimitStatus, RepoParams, RepoSort, RepoType, Repository,
    SearchParams, SortOrder, User, UserSearchResult, UserSort,
};
pub use options::{Backoff, ClientOptions, ConfigUpdate, RetryPolicy};
pub use request::{HttpMethod, RequestSpec, ResponseEnvelope};
pub use search::{DebouncedSearch, SearchOutcome};
pub use settings::{GithubSettings, DEFAULT_BASE_URL, DEFAULT_PER_PAGE, MAX_PER_PAGE};

pub type Result<T> = std::result::Result<T, ClassifiedError>;
