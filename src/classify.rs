use serde_json::Value as JsonValue;

use crate::{ClassifiedError, ErrorKind, HttpMethod};

/// Outcome of a single failed attempt, as observed by the transport.
#[derive(Debug)]
pub enum RawFailure {
    /// The attempt ran past its deadline.
    TimedOut,
    /// No response was received.
    Transport(reqwest::Error),
    /// The server answered with a non-success status.
    Response(RawResponse),
}

/// Non-success response captured before classification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub status_text: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// Request details attached to the classified error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FailureContext {
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    /// Deadline of the failed attempt.
    pub timeout_ms: u64,
}

impl RawFailure {
    /// Whether the client may re-issue the request after this failure.
    ///
    /// Only missing responses and 5xx statuses qualify; a 429 is flagged
    /// retryable on the classified error but is left to the caller.
    pub(crate) fn is_transient(&self) -> bool {
        match self {
            Self::TimedOut => true,
            Self::Transport(err) => !err.is_builder(),
            Self::Response(response) => response.status >= 500,
        }
    }
}

/// Maps a raw failure to exactly one [`ErrorKind`].
pub fn classify_http_failure(raw: RawFailure, context: &FailureContext) -> ClassifiedError {
    match raw {
        RawFailure::TimedOut => ClassifiedError::timeout(context.timeout_ms),
        RawFailure::Transport(err) => {
            ClassifiedError::network(format!("network error: {err}"), Some(err))
        }
        RawFailure::Response(response) => {
            let (message, body) = extract_message(&response);
            ErrorKind::Api {
                status: response.status,
                status_text: response.status_text,
                message,
                body,
                url: context.url.clone(),
                method: context.method,
            }
            .into()
        }
    }
}

fn extract_message(response: &RawResponse) -> (String, Option<JsonValue>) {
    let fallback = format!("HTTP {}: {}", response.status, response.status_text);
    let is_json = response
        .content_type
        .as_deref()
        .is_some_and(|value| value.contains("application/json"));

    if is_json {
        return match serde_json::from_str::<JsonValue>(&response.body) {
            Ok(body) => {
                let message = ["message", "error", "detail"]
                    .iter()
                    .find_map(|key| {
                        body.get(key)
                            .and_then(JsonValue::as_str)
                            .filter(|message| !message.is_empty())
                    })
                    .map(str::to_owned)
                    .unwrap_or(fallback);
                (message, Some(body))
            }
            Err(_) => (fallback, text_body(&response.body)),
        };
    }

    match text_body(&response.body) {
        Some(body) => (response.body.clone(), Some(body)),
        None => (fallback, None),
    }
}

fn text_body(body: &str) -> Option<JsonValue> {
    (!body.is_empty()).then(|| JsonValue::String(body.to_owned()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{classify_http_failure, FailureContext, RawFailure, RawResponse};
    use crate::{ErrorKind, HttpMethod};

    fn response(status: u16, content_type: Option<&str>, body: &str) -> RawFailure {
        RawFailure::Response(RawResponse {
            status,
            status_text: "Unprocessable Entity".to_owned(),
            content_type: content_type.map(str::to_owned),
            body: body.to_owned(),
        })
    }

    fn context() -> FailureContext {
        FailureContext {
            url: Some("https://api.github.com/search/users".to_owned()),
            method: Some(HttpMethod::Get),
            timeout_ms: 10_000,
        }
    }

    #[test]
    fn json_message_field_becomes_the_error_message() {
        let err = classify_http_failure(
            response(422, Some("application/json; charset=utf-8"), r#"{"message":"custom"}"#),
            &context(),
        );

        assert_eq!(err.to_string(), "custom");
        assert_eq!(
            err.user_message(),
            "Invalid data provided. Please check your input."
        );
        assert!(!err.is_retryable());
        match err.kind() {
            ErrorKind::Api {
                status, body, url, ..
            } => {
                assert_eq!(*status, 422);
                assert_eq!(body.as_ref(), Some(&json!({"message": "custom"})));
                assert_eq!(url.as_deref(), Some("https://api.github.com/search/users"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn error_then_detail_fields_are_tried_in_order() {
        let err = classify_http_failure(
            response(400, Some("application/json"), r#"{"detail":"d","error":"e"}"#),
            &context(),
        );
        assert_eq!(err.to_string(), "e");

        let err = classify_http_failure(
            response(400, Some("application/json"), r#"{"detail":"d"}"#),
            &context(),
        );
        assert_eq!(err.to_string(), "d");
    }

    #[test]
    fn json_without_known_fields_falls_back_to_status_line() {
        let err = classify_http_failure(
            response(422, Some("application/json"), r#"{"errors":[]}"#),
            &context(),
        );
        assert_eq!(err.to_string(), "HTTP 422: Unprocessable Entity");
    }

    #[test]
    fn text_body_is_used_verbatim() {
        let err = classify_http_failure(response(502, Some("text/html"), "bad gateway"), &context());
        assert_eq!(err.to_string(), "bad gateway");
        assert!(err.is_retryable());
    }

    #[test]
    fn empty_body_uses_status_line() {
        let err = classify_http_failure(response(404, None, ""), &context());
        assert_eq!(err.to_string(), "HTTP 404: Unprocessable Entity");
        match err.kind() {
            ErrorKind::Api { body, .. } => assert!(body.is_none()),
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_carries_the_attempt_deadline() {
        let err = classify_http_failure(RawFailure::TimedOut, &context());
        assert!(matches!(err.kind(), ErrorKind::Timeout { timeout_ms: 10_000 }));
        assert!(err.is_retryable());
    }

    #[test]
    fn only_server_errors_are_transient_responses() {
        assert!(response(500, None, "").is_transient());
        assert!(response(501, None, "").is_transient());
        assert!(!response(429, None, "").is_transient());
        assert!(!response(404, None, "").is_transient());
        assert!(RawFailure::TimedOut.is_transient());
    }
}
