use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::HttpMethod;

/// Returns `true` for upstream statuses worth re-issuing unchanged.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Closed set of failure classes produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ErrorKind {
    /// Caller input rejected before any network call.
    #[error("{message}")]
    Validation {
        /// Name of the offending input, when there is one.
        field: Option<String>,
        message: String,
    },
    /// Upstream answered with a non-success status.
    #[error("{message}")]
    Api {
        status: u16,
        status_text: String,
        /// Message extracted from the response body, or `HTTP {status}: {status_text}`.
        message: String,
        /// Parsed JSON body, or the raw text body as a JSON string.
        body: Option<serde_json::Value>,
        url: Option<String>,
        method: Option<HttpMethod>,
    },
    /// No response was received.
    #[error("{message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },
    /// An attempt exceeded its deadline.
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    /// A success body did not match the expected shape.
    #[error("decode error: {0}")]
    Decode(String),
}

/// Coarse urgency used when logging a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by this crate.
///
/// Wraps an [`ErrorKind`] together with the moment the failure was observed.
/// The code, retryability and user-facing message are all derived from the
/// kind, so two errors of the same kind always agree on them.
#[derive(Debug)]
pub struct ClassifiedError {
    kind: ErrorKind,
    timestamp: DateTime<Utc>,
}

impl ClassifiedError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation {
            field: Some(field.into()),
            message: message.into(),
        })
    }

    pub fn network(message: impl Into<String>, source: Option<reqwest::Error>) -> Self {
        Self::new(ErrorKind::Network {
            message: message.into(),
            source,
        })
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::new(ErrorKind::Timeout { timeout_ms })
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Decode(message.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ErrorKind {
        self.kind
    }

    /// When the failure was classified.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// HTTP status for [`ErrorKind::Api`] failures.
    pub fn status(&self) -> Option<u16> {
        match &self.kind {
            ErrorKind::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Stable machine-readable code, e.g. `API_ERROR_404`.
    pub fn code(&self) -> String {
        match &self.kind {
            ErrorKind::Validation { .. } => "VALIDATION_ERROR".to_owned(),
            ErrorKind::Api { status, .. } => format!("API_ERROR_{status}"),
            ErrorKind::Network { .. } => "NETWORK_ERROR".to_owned(),
            ErrorKind::Timeout { .. } => "TIMEOUT_ERROR".to_owned(),
            ErrorKind::Decode(_) => "DECODE_ERROR".to_owned(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            ErrorKind::Api { status, .. } => is_retryable_status(*status),
            ErrorKind::Network { .. } | ErrorKind::Timeout { .. } => true,
            ErrorKind::Validation { .. } | ErrorKind::Decode(_) => false,
        }
    }

    /// Message suitable for showing to an end user.
    pub fn user_message(&self) -> &str {
        match &self.kind {
            ErrorKind::Validation { message, .. } => message.as_str(),
            ErrorKind::Api { status, .. } => api_user_message(*status),
            ErrorKind::Network { .. } => {
                "Network error. Please check your connection and try again."
            }
            ErrorKind::Timeout { .. } => "Request timed out. Please try again.",
            ErrorKind::Decode(_) => "An unexpected response was received. Please try again later.",
        }
    }

    pub fn severity(&self) -> Severity {
        match &self.kind {
            ErrorKind::Api { status, .. } if *status >= 500 => Severity::Critical,
            ErrorKind::Api { status: 429, .. } => Severity::High,
            ErrorKind::Api { status: 404, .. } => Severity::Medium,
            ErrorKind::Api { .. } => Severity::Low,
            ErrorKind::Network { .. } | ErrorKind::Decode(_) => Severity::High,
            ErrorKind::Timeout { .. } => Severity::Medium,
            ErrorKind::Validation { .. } => Severity::Low,
        }
    }

    /// Structured view of this error for logs and JSON output.
    pub fn record(&self) -> ErrorRecord<'_> {
        let (url, method) = match &self.kind {
            ErrorKind::Api { url, method, .. } => (url.as_deref(), *method),
            _ => (None, None),
        };
        ErrorRecord {
            code: self.code(),
            message: self.to_string(),
            retryable: self.is_retryable(),
            severity: self.severity(),
            timestamp: self.timestamp,
            status: self.status(),
            url,
            method: method.map(HttpMethod::as_str),
        }
    }
}

fn api_user_message(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Please check your input and try again.",
        401 => "Authentication required. Please sign in.",
        403 => "You do not have permission to perform this action.",
        404 => "The requested resource was not found.",
        409 => "A conflict occurred. The resource may have been modified.",
        422 => "Invalid data provided. Please check your input.",
        429 => "Too many requests. Please wait a moment and try again.",
        503 => "Service temporarily unavailable. Please try again later.",
        500..=599 => "A server error occurred. Please try again later.",
        400..=499 => "A client error occurred. Please check your request.",
        _ => "An unexpected error occurred.",
    }
}

/// Serializable snapshot of a [`ClassifiedError`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ErrorRecord<'a> {
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<&'static str>,
}

/// One error collected by an [`ErrorAggregator`].
#[derive(Debug)]
pub struct CollectedError {
    pub error: ClassifiedError,
    /// What the caller was doing, e.g. `"loading repositories"`.
    pub context: Option<String>,
    pub collected_at: DateTime<Utc>,
}

/// Counts over the errors held by an [`ErrorAggregator`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ErrorSummary {
    pub total: usize,
    /// Keyed by [`ClassifiedError::code`].
    pub by_code: BTreeMap<String, usize>,
    pub by_severity: BTreeMap<Severity, usize>,
    pub retryable: usize,
}

/// Collects failures from a batch of calls so they can be reported together.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Vec<CollectedError>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: ClassifiedError) {
        self.push(error, None);
    }

    pub fn add_with_context(&mut self, error: ClassifiedError, context: impl Into<String>) {
        self.push(error, Some(context.into()));
    }

    pub fn errors(&self) -> &[CollectedError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn summary(&self) -> ErrorSummary {
        self.errors
            .iter()
            .fold(ErrorSummary::default(), |mut summary, collected| {
                let error = &collected.error;
                summary.total += 1;
                *summary.by_code.entry(error.code()).or_default() += 1;
                *summary.by_severity.entry(error.severity()).or_default() += 1;
                if error.is_retryable() {
                    summary.retryable += 1;
                }
                summary
            })
    }

    fn push(&mut self, error: ClassifiedError, context: Option<String>) {
        self.errors.push(CollectedError {
            error,
            context,
            collected_at: Utc::now(),
        });
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl std::error::Error for ClassifiedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<ErrorKind> for ClassifiedError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}
