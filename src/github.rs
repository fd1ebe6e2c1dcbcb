use std::collections::BTreeMap;

use reqwest::header;
use serde::de::DeserializeOwned;

use crate::{
    settings::MAX_PER_PAGE, wire::RateLimitResponse, ClassifiedError, ClientOptions,
    GithubSettings, HttpClient, RateLimit, RepoParams, Repository, RequestSpec, Result,
    RetryPolicy, SearchParams, User, UserSearchResult,
};

const GITHUB_ACCEPT: &str = "application/vnd.github.v3+json";
const SEARCH_MIN_CHARS: usize = 1;
const SEARCH_MAX_CHARS: usize = 256;

/// GitHub REST API v3 service.
///
/// Validates inputs, calls the endpoints through [`HttpClient`] and logs each
/// call. Errors are returned unchanged after logging.
#[derive(Clone, Debug)]
pub struct GithubClient {
    http: HttpClient,
    default_per_page: u32,
}

impl GithubClient {
    /// Wraps an existing [`HttpClient`], which should already carry the
    /// GitHub `Accept` and `User-Agent` headers.
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            default_per_page: crate::settings::DEFAULT_PER_PAGE,
        }
    }

    /// Builds the HTTP client from settings with the default retry policy.
    pub fn from_settings(settings: &GithubSettings) -> Result<Self> {
        Self::from_settings_with_retry(settings, RetryPolicy::default())
    }

    pub fn from_settings_with_retry(settings: &GithubSettings, retry: RetryPolicy) -> Result<Self> {
        let mut default_headers = BTreeMap::new();
        default_headers.insert(header::ACCEPT.as_str().to_owned(), GITHUB_ACCEPT.to_owned());
        default_headers.insert(
            header::USER_AGENT.as_str().to_owned(),
            settings.user_agent.clone(),
        );

        let mut http = HttpClient::new(&settings.base_url)?.with_options(ClientOptions {
            timeout_ms: settings.timeout_ms,
            default_headers,
            retry,
        });
        if let Some(token) = &settings.token {
            http = http.with_bearer_token(token);
        }

        Ok(Self {
            http,
            default_per_page: settings.default_per_page.clamp(1, MAX_PER_PAGE),
        })
    }

    /// Reads [`GithubSettings::from_env`] and builds a client from it.
    pub fn from_env() -> Result<Self> {
        Self::from_settings(&GithubSettings::from_env()?)
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    /// Mutable access for [`HttpClient::update_config`].
    pub fn http_mut(&mut self) -> &mut HttpClient {
        &mut self.http
    }

    /// Searches users. The query must be 1 to 256 characters long.
    pub async fn search_users(&self, params: &SearchParams) -> Result<UserSearchResult> {
        let per_page = self.page_size(params.per_page);
        let page = params.page.max(1);
        let sort = params.sort.map(|sort| sort.as_str());
        let order = params.order.map(|order| order.as_str());

        tracing::info!(
            query = %params.query,
            sort,
            order,
            per_page,
            page,
            "searching GitHub users"
        );

        let result = async {
            validate_query(&params.query)?;

            let mut spec = RequestSpec::get("/search/users")
                .query("q", &params.query)
                .query("per_page", per_page)
                .query("page", page);
            if let Some(sort) = sort {
                spec = spec.query("sort", sort);
            }
            if let Some(order) = order {
                spec = spec.query("order", order);
            }
            self.fetch::<UserSearchResult>(&spec).await
        }
        .await;

        match &result {
            Ok(found) => tracing::info!(
                query = %params.query,
                total_results = found.total_count,
                results_returned = found.items.len(),
                "user search completed"
            ),
            Err(err) => log_failure("GitHub user search failed", err),
        }
        result
    }

    /// Fetches a user profile.
    pub async fn get_user(&self, username: &str) -> Result<User> {
        tracing::info!(username, "retrieving GitHub user");

        let result = async {
            validate_username(username)?;
            self.fetch::<User>(&RequestSpec::get("/users").segment(username))
                .await
        }
        .await;

        match &result {
            Ok(user) => tracing::info!(username, user_id = user.id, "user profile retrieved"),
            Err(err) => log_failure("GitHub user retrieval failed", err),
        }
        result
    }

    /// Lists repositories of a user.
    pub async fn get_user_repositories(&self, params: &RepoParams) -> Result<Vec<Repository>> {
        let per_page = self.page_size(params.per_page);
        let page = params.page.max(1);

        tracing::info!(
            username = %params.username,
            kind = params.kind.as_str(),
            sort = params.sort.as_str(),
            direction = params.direction.as_str(),
            per_page,
            page,
            "retrieving user repositories"
        );

        let result = async {
            validate_username(&params.username)?;
            let spec = RequestSpec::get("/users")
                .segment(&params.username)
                .segment("repos")
                .query("type", params.kind.as_str())
                .query("sort", params.sort.as_str())
                .query("direction", params.direction.as_str())
                .query("per_page", per_page)
                .query("page", page);
            self.fetch::<Vec<Repository>>(&spec).await
        }
        .await;

        match &result {
            Ok(repositories) => tracing::info!(
                username = %params.username,
                repository_count = repositories.len(),
                "user repositories retrieved"
            ),
            Err(err) => log_failure("GitHub repositories retrieval failed", err),
        }
        result
    }

    /// Fetches one repository.
    pub async fn get_repository(&self, owner: &str, repo: &str) -> Result<Repository> {
        tracing::info!(owner, repo, "retrieving GitHub repository");

        let result = async {
            validate_username(owner)?;
            validate_repo_name(repo)?;
            let spec = RequestSpec::get("/repos").segment(owner).segment(repo);
            self.fetch::<Repository>(&spec).await
        }
        .await;

        match &result {
            Ok(repository) => tracing::info!(
                owner,
                repo,
                repository_id = repository.id,
                "repository retrieved"
            ),
            Err(err) => log_failure("GitHub repository retrieval failed", err),
        }
        result
    }

    /// Fetches the core API quota.
    pub async fn get_rate_limit(&self) -> Result<RateLimit> {
        tracing::info!("retrieving GitHub rate limit");

        let result = self
            .fetch::<RateLimitResponse>(&RequestSpec::get("/rate_limit"))
            .await
            .map(|response| response.rate);

        match &result {
            Ok(rate) => tracing::info!(
                limit = rate.limit,
                remaining = rate.remaining,
                reset = rate.reset,
                "rate limit retrieved"
            ),
            Err(err) => log_failure("GitHub rate limit retrieval failed", err),
        }
        result
    }

    async fn fetch<T: DeserializeOwned>(&self, spec: &RequestSpec) -> Result<T> {
        Ok(self.http.request::<T>(spec).await?.data)
    }

    fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_per_page)
            .clamp(1, MAX_PER_PAGE)
    }
}

fn log_failure(message: &str, err: &ClassifiedError) {
    let record = err.record();
    tracing::error!(
        error = %record.message,
        code = %record.code,
        retryable = record.retryable,
        severity = %record.severity.as_str(),
        timestamp = %record.timestamp.to_rfc3339(),
        status = record.status,
        url = record.url,
        method = record.method,
        "{message}"
    );
}

fn validate_query(query: &str) -> Result<()> {
    let length = query.chars().count();
    if length < SEARCH_MIN_CHARS {
        return Err(ClassifiedError::validation(
            "query",
            format!("Search query must be at least {SEARCH_MIN_CHARS} character(s)"),
        ));
    }
    if length > SEARCH_MAX_CHARS {
        return Err(ClassifiedError::validation(
            "query",
            format!("Search query must be no more than {SEARCH_MAX_CHARS} characters"),
        ));
    }
    Ok(())
}

/// Names are percent-encoded as path segments, so only values that would
/// collapse the route are rejected.
fn validate_username(username: &str) -> Result<()> {
    validate_segment("username", username, "GitHub username")
}

fn validate_repo_name(repo: &str) -> Result<()> {
    validate_segment("repo", repo, "repository name")
}

fn validate_segment(field: &str, value: &str, what: &str) -> Result<()> {
    if value.trim().is_empty() || value == "." || value == ".." {
        return Err(ClassifiedError::validation(
            field,
            format!("'{value}' is not a valid {what}"),
        ));
    }
    Ok(())
}
