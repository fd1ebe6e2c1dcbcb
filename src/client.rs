use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::sleep;
use url::Url;

use crate::{
    classify::{classify_http_failure, FailureContext, RawFailure, RawResponse},
    options::redacted_headers,
    ClassifiedError, ClientOptions, ConfigUpdate, RequestSpec, ResponseEnvelope, Result,
};

#[derive(Clone)]
/// HTTP client bound to one base URL, retrying transient failures.
pub struct HttpClient {
    http: reqwest::Client,
    base_url: Url,
    options: ClientOptions,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout_ms", &self.options.timeout_ms)
            .field("default_headers", &redacted_headers(&self.options.default_headers))
            .field("retry", &self.options.retry)
            .finish()
    }
}

impl HttpClient {
    /// Creates a client for `base_url` with default options.
    ///
    /// Fails with a validation error when the URL is not absolute `http(s)`.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: parse_base_url(base_url.as_ref())?,
            options: ClientOptions::default(),
        })
    }

    /// Applies client options such as timeout, default headers and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer_token(mut self, token: impl AsRef<str>) -> Self {
        self.options.default_headers.insert(
            header::AUTHORIZATION.as_str().to_owned(),
            normalize_bearer_authorization(token.as_ref()),
        );
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Merges `update` into the current configuration.
    ///
    /// Nothing changes when any part of the update is invalid.
    pub fn update_config(&mut self, update: ConfigUpdate) -> Result<()> {
        let base_url = update
            .base_url
            .as_deref()
            .map(parse_base_url)
            .transpose()?;
        if let Some(timeout_ms) = update.timeout_ms {
            validate_timeout(timeout_ms)?;
        }
        to_header_map(update.headers.iter())?;

        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
        if let Some(timeout_ms) = update.timeout_ms {
            self.options.timeout_ms = timeout_ms;
        }
        if let Some(retry) = update.retry {
            self.options.retry = retry;
        }
        self.options.default_headers.extend(update.headers);
        Ok(())
    }

    /// Performs one logical request, retrying per the configured policy.
    ///
    /// The body is decoded as JSON into `T`; an empty body decodes as `null`.
    pub async fn request<T: DeserializeOwned>(
        &self,
        spec: &RequestSpec,
    ) -> Result<ResponseEnvelope<T>> {
        let url = self.endpoint_url(spec)?;
        let headers = to_header_map(self.options.default_headers.iter().chain(&spec.headers))?;
        let timeout_ms = spec.timeout_ms.unwrap_or(self.options.timeout_ms);
        validate_timeout(timeout_ms)?;

        let max_attempts = self.options.retry.attempts();
        let mut attempt = 1u32;
        loop {
            match self.send_once(&url, spec, &headers, timeout_ms).await {
                Ok(envelope) => return decode_envelope(envelope, &url),
                Err(failure) => {
                    if failure.is_transient() && attempt < max_attempts {
                        self.wait_before_retry(attempt, &url).await;
                        attempt += 1;
                        continue;
                    }

                    let context = FailureContext {
                        url: Some(url.to_string()),
                        method: Some(spec.method),
                        timeout_ms,
                    };
                    return Err(classify_http_failure(failure, &context));
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<ResponseEnvelope<T>> {
        self.request(&RequestSpec::get(endpoint)).await
    }

    pub async fn post<T, B>(&self, endpoint: &str, body: &B) -> Result<ResponseEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(&RequestSpec::post(endpoint).json(to_json_body(body)?))
            .await
    }

    pub async fn put<T, B>(&self, endpoint: &str, body: &B) -> Result<ResponseEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(&RequestSpec::put(endpoint).json(to_json_body(body)?))
            .await
    }

    pub async fn patch<T, B>(&self, endpoint: &str, body: &B) -> Result<ResponseEnvelope<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(&RequestSpec::patch(endpoint).json(to_json_body(body)?))
            .await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
    ) -> Result<ResponseEnvelope<T>> {
        self.request(&RequestSpec::delete(endpoint)).await
    }

    fn endpoint_url(&self, spec: &RequestSpec) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = spec.endpoint.trim_start_matches('/');
        let mut url = Url::parse(&format!("{base}/{path}")).map_err(|err| {
            ClassifiedError::validation(
                "endpoint",
                format!("invalid endpoint '{}': {err}", spec.endpoint),
            )
        })?;

        if !spec.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| {
                    ClassifiedError::validation(
                        "endpoint",
                        format!("cannot append path segments to '{}'", spec.endpoint),
                    )
                })?
                .pop_if_empty()
                .extend(&spec.segments);
        }

        if !spec.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                spec.query
                    .iter()
                    .map(|(key, value)| (key.as_str(), value.as_str())),
            );
        }
        Ok(url)
    }

    async fn send_once(
        &self,
        url: &Url,
        spec: &RequestSpec,
        headers: &HeaderMap,
        timeout_ms: u64,
    ) -> std::result::Result<ResponseEnvelope<String>, RawFailure> {
        let mut builder = self
            .http
            .request(spec.method.into(), url.clone())
            .headers(headers.clone())
            .timeout(Duration::from_millis(timeout_ms));
        if let Some(body) = &spec.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(raw_transport_failure)?;
        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_owned();
        let headers = collect_headers(response.headers());
        let body = response.text().await.map_err(raw_transport_failure)?;

        if !status.is_success() {
            return Err(RawFailure::Response(RawResponse {
                status: status.as_u16(),
                status_text,
                content_type: headers.get(header::CONTENT_TYPE.as_str()).cloned(),
                body,
            }));
        }

        Ok(ResponseEnvelope {
            data: body,
            status: status.as_u16(),
            status_text,
            headers,
        })
    }

    /// Sleeps for the backoff that precedes retry number `retry`.
    async fn wait_before_retry(&self, retry: u32, url: &Url) {
        let delay = self.options.retry.delay_for(retry);

        tracing::debug!(
            url = %url,
            retry,
            delay_ms = delay.as_millis() as u64,
            "retrying request"
        );

        sleep(delay).await;
    }
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).map_err(|err| {
        ClassifiedError::validation("base_url", format!("invalid base URL '{raw}': {err}"))
    })?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return Err(ClassifiedError::validation(
            "base_url",
            format!("base URL must be an absolute http(s) URL, got '{raw}'"),
        ));
    }
    Ok(url)
}

fn validate_timeout(timeout_ms: u64) -> Result<()> {
    if timeout_ms == 0 {
        return Err(ClassifiedError::validation(
            "timeout_ms",
            "timeout must be greater than zero",
        ));
    }
    Ok(())
}

fn to_header_map<'a, I>(pairs: I) -> Result<HeaderMap>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            ClassifiedError::validation("headers", format!("invalid header name '{name}'"))
        })?;
        let mut header_value = HeaderValue::from_str(value).map_err(|_| {
            ClassifiedError::validation("headers", format!("invalid value for header '{name}'"))
        })?;
        if header_name == header::AUTHORIZATION {
            header_value.set_sensitive(true);
        }
        headers.insert(header_name, header_value);
    }
    Ok(headers)
}

fn collect_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_owned(), value.to_owned()))
        })
        .collect()
}

fn raw_transport_failure(err: reqwest::Error) -> RawFailure {
    if err.is_timeout() {
        RawFailure::TimedOut
    } else {
        RawFailure::Transport(err)
    }
}

fn decode_envelope<T: DeserializeOwned>(
    envelope: ResponseEnvelope<String>,
    url: &Url,
) -> Result<ResponseEnvelope<T>> {
    let data = {
        let body = envelope.data.trim();
        let body = if body.is_empty() { "null" } else { body };
        serde_json::from_str::<T>(body).map_err(|err| {
            ClassifiedError::decode(format!("invalid response JSON from {url}: {err}"))
        })?
    };
    Ok(envelope.map(|_| data))
}

fn to_json_body<B: Serialize + ?Sized>(body: &B) -> Result<serde_json::Value> {
    serde_json::to_value(body)
        .map_err(|err| ClassifiedError::validation("body", format!("unserializable body: {err}")))
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_bearer_authorization, HttpClient};
    use crate::{ConfigUpdate, ErrorKind, RequestSpec};

    #[test]
    fn bare_github_token_gets_bearer_scheme() {
        assert_eq!(
            normalize_bearer_authorization("  ghp_abc123 "),
            "Bearer ghp_abc123"
        );
        assert_eq!(
            normalize_bearer_authorization("github_pat_11AB"),
            "Bearer github_pat_11AB"
        );
    }

    #[test]
    fn token_with_scheme_is_left_alone() {
        assert_eq!(
            normalize_bearer_authorization("bearer ghp_abc123"),
            "bearer ghp_abc123"
        );
        assert_eq!(normalize_bearer_authorization("Bearer"), "Bearer Bearer");
    }

    #[test]
    fn debug_redacts_authorization_value() {
        let client = HttpClient::new("https://api.github.com")
            .expect("valid base url")
            .with_bearer_token("secret-token");
        let debug = format!("{client:?}");
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn rejects_non_http_base_url() {
        let err = HttpClient::new("ftp://example.com").expect_err("ftp must be rejected");
        assert!(matches!(
            err.kind(),
            ErrorKind::Validation { field: Some(field), .. } if field == "base_url"
        ));
        assert!(HttpClient::new("not a url").is_err());
    }

    #[test]
    fn endpoint_url_keeps_base_path_and_encodes_query() {
        let client = HttpClient::new("https://ghe.example.com/api/v3/").expect("valid base url");
        let spec = RequestSpec::get("/search/users").query("q", "linus torvalds");
        let url = client.endpoint_url(&spec).expect("valid endpoint");
        assert_eq!(
            url.as_str(),
            "https://ghe.example.com/api/v3/search/users?q=linus+torvalds"
        );
    }

    #[test]
    fn segments_are_percent_encoded() {
        let client = HttpClient::new("https://api.github.com").expect("valid base url");
        let spec = RequestSpec::get("/users")
            .segment("octocat_acme")
            .segment("a/b c")
            .segment("repos");
        let url = client.endpoint_url(&spec).expect("valid endpoint");
        assert_eq!(
            url.as_str(),
            "https://api.github.com/users/octocat_acme/a%2Fb%20c/repos"
        );
    }

    #[test]
    fn update_config_merges_headers_and_is_all_or_nothing() {
        let mut client = HttpClient::new("https://api.github.com").expect("valid base url");
        client
            .update_config(ConfigUpdate::default().header("X-One", "1"))
            .expect("valid update");
        client
            .update_config(ConfigUpdate {
                timeout_ms: Some(2_000),
                ..ConfigUpdate::default().header("X-Two", "2")
            })
            .expect("valid update");

        assert_eq!(client.options().timeout_ms, 2_000);
        assert_eq!(client.options().default_headers.len(), 2);

        let rejected = client.update_config(ConfigUpdate {
            base_url: Some("https://other.example.com".to_owned()),
            timeout_ms: Some(0),
            ..ConfigUpdate::default()
        });
        assert!(rejected.is_err());
        assert_eq!(client.base_url().as_str(), "https://api.github.com/");
        assert_eq!(client.options().timeout_ms, 2_000);
    }

    #[test]
    fn invalid_header_is_a_validation_error() {
        let mut client = HttpClient::new("https://api.github.com").expect("valid base url");
        let err = client
            .update_config(ConfigUpdate::default().header("bad header", "x"))
            .expect_err("space in header name must be rejected");
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }
}
