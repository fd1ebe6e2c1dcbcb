use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// A GitHub account as returned by search and profile endpoints.
///
/// Profile-only fields (`name`, `bio`, counters, `created_at`) are absent
/// from search results and default to `None`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    #[serde(default)]
    pub node_id: String,
    pub avatar_url: String,
    pub html_url: String,
    #[serde(default)]
    pub repos_url: Option<String>,
    #[serde(rename = "type", default)]
    pub account_type: Option<String>,
    #[serde(default)]
    pub site_admin: bool,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub public_repos: Option<u32>,
    #[serde(default)]
    pub followers: Option<u32>,
    #[serde(default)]
    pub following: Option<u32>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Response of `/search/users`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UserSearchResult {
    pub total_count: u64,
    pub incomplete_results: bool,
    pub items: Vec<User>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub spdx_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    pub html_url: String,
    #[serde(default)]
    pub clone_url: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub watchers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    #[serde(default)]
    pub open_issues_count: u64,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub pushed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub visibility: Option<String>,
    pub license: Option<License>,
    pub owner: User,
}

/// Health bucket of the remaining request quota.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitStatus {
    /// More than half of the quota left.
    Healthy,
    /// More than a fifth left.
    Warning,
    Critical,
}

/// Core API quota from `/rate_limit`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimit {
    pub limit: u32,
    pub remaining: u32,
    /// Reset instant in Unix seconds.
    pub reset: i64,
    #[serde(default)]
    pub used: u32,
    #[serde(default)]
    pub resource: Option<String>,
}

impl RateLimit {
    pub fn remaining_percent(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        f64::from(self.remaining) / f64::from(self.limit) * 100.0
    }

    pub fn status(&self) -> RateLimitStatus {
        let percent = self.remaining_percent();
        if percent > 50.0 {
            RateLimitStatus::Healthy
        } else if percent > 20.0 {
            RateLimitStatus::Warning
        } else {
            RateLimitStatus::Critical
        }
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.reset, 0).single()
    }
}

/// Sort keys accepted by user search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserSort {
    Followers,
    Repositories,
    Joined,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoType {
    #[default]
    Owner,
    Member,
    Collaborator,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoSort {
    Created,
    #[default]
    Updated,
    Pushed,
    FullName,
}

impl UserSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Followers => "followers",
            Self::Repositories => "repositories",
            Self::Joined => "joined",
        }
    }
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

impl RepoType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Member => "member",
            Self::Collaborator => "collaborator",
        }
    }
}

impl RepoSort {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Pushed => "pushed",
            Self::FullName => "full_name",
        }
    }
}

/// Parameters of [`GithubClient::search_users`](crate::GithubClient::search_users).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SearchParams {
    pub query: String,
    pub sort: Option<UserSort>,
    pub order: Option<SortOrder>,
    /// `None` uses the configured default page size.
    pub per_page: Option<u32>,
    pub page: u32,
}

impl SearchParams {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            sort: None,
            order: None,
            per_page: None,
            page: 1,
        }
    }

    pub fn sort(mut self, sort: UserSort, order: SortOrder) -> Self {
        self.sort = Some(sort);
        self.order = Some(order);
        self
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}

/// Parameters of [`GithubClient::get_user_repositories`](crate::GithubClient::get_user_repositories).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepoParams {
    pub username: String,
    pub kind: RepoType,
    pub sort: RepoSort,
    pub direction: SortOrder,
    pub per_page: Option<u32>,
    pub page: u32,
}

impl RepoParams {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            kind: RepoType::default(),
            sort: RepoSort::default(),
            direction: SortOrder::default(),
            per_page: None,
            page: 1,
        }
    }

    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }
}
