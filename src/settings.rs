use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::{ClassifiedError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.github.com";
pub const DEFAULT_PER_PAGE: u32 = 30;
pub const MAX_PER_PAGE: u32 = 100;

/// Application-level settings for [`GithubClient`](crate::GithubClient) and
/// [`DebouncedSearch`](crate::DebouncedSearch).
#[derive(Clone, PartialEq, Eq)]
pub struct GithubSettings {
    pub base_url: String,
    pub token: Option<String>,
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Page size used when a call does not name one; capped at [`MAX_PER_PAGE`].
    pub default_per_page: u32,
    pub search_debounce_ms: u64,
    /// Shortest query the debounced search sends upstream.
    pub search_min_chars: usize,
    pub user_agent: String,
}

impl fmt::Debug for GithubSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GithubSettings")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("default_per_page", &self.default_per_page)
            .field("search_debounce_ms", &self.search_debounce_ms)
            .field("search_min_chars", &self.search_min_chars)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            token: None,
            timeout_ms: 10_000,
            default_per_page: DEFAULT_PER_PAGE,
            search_debounce_ms: 300,
            search_min_chars: 2,
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

impl GithubSettings {
    /// Reads settings from the process environment.
    ///
    /// Recognized variables, all optional:
    /// - `GITHUB_API_BASE_URL` (default `https://api.github.com`)
    /// - `GITHUB_TOKEN`
    /// - `GITHUB_API_TIMEOUT_MS` (default 10000)
    /// - `GITHUB_PER_PAGE` (default 30, capped at 100)
    /// - `GITHUB_SEARCH_DEBOUNCE_MS` (default 300)
    /// - `GITHUB_SEARCH_MIN_CHARS` (default 2)
    ///
    /// Empty values count as unset. Unparseable numbers are validation errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            base_url: get("GITHUB_API_BASE_URL").unwrap_or(defaults.base_url),
            token: get("GITHUB_TOKEN"),
            timeout_ms: parse_var(&get, "GITHUB_API_TIMEOUT_MS")?.unwrap_or(defaults.timeout_ms),
            default_per_page: parse_var(&get, "GITHUB_PER_PAGE")?
                .unwrap_or(defaults.default_per_page)
                .clamp(1, MAX_PER_PAGE),
            search_debounce_ms: parse_var(&get, "GITHUB_SEARCH_DEBOUNCE_MS")?
                .unwrap_or(defaults.search_debounce_ms),
            search_min_chars: parse_var(&get, "GITHUB_SEARCH_MIN_CHARS")?
                .unwrap_or(defaults.search_min_chars),
            user_agent: defaults.user_agent,
        })
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>().map_err(|_| {
                ClassifiedError::validation(key, format!("{key} must be a number, got '{raw}'"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{GithubSettings, DEFAULT_BASE_URL};

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let settings = GithubSettings::from_lookup(lookup(&[])).expect("defaults are valid");
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.default_per_page, 30);
        assert_eq!(settings.search_debounce_ms, 300);
        assert_eq!(settings.search_min_chars, 2);
        assert_eq!(settings.token, None);
    }

    #[test]
    fn reads_overrides_and_caps_page_size() {
        let settings = GithubSettings::from_lookup(lookup(&[
            ("GITHUB_API_BASE_URL", "http://localhost:8080"),
            ("GITHUB_TOKEN", " ghp_abc "),
            ("GITHUB_PER_PAGE", "500"),
            ("GITHUB_API_TIMEOUT_MS", "2500"),
        ]))
        .expect("overrides are valid");

        assert_eq!(settings.base_url, "http://localhost:8080");
        assert_eq!(settings.token.as_deref(), Some("ghp_abc"));
        assert_eq!(settings.default_per_page, 100);
        assert_eq!(settings.timeout_ms, 2_500);
    }

    #[test]
    fn empty_values_count_as_unset() {
        let settings = GithubSettings::from_lookup(lookup(&[("GITHUB_TOKEN", "  ")]))
            .expect("empty token is fine");
        assert_eq!(settings.token, None);
    }

    #[test]
    fn bad_number_names_the_variable() {
        let err = GithubSettings::from_lookup(lookup(&[("GITHUB_SEARCH_DEBOUNCE_MS", "soon")]))
            .expect_err("non-numeric debounce must fail");
        assert_eq!(
            err.to_string(),
            "GITHUB_SEARCH_DEBOUNCE_MS must be a number, got 'soon'"
        );
    }

    #[test]
    fn debug_hides_token() {
        let settings = GithubSettings::from_lookup(lookup(&[("GITHUB_TOKEN", "ghp_supersecret")]))
            .expect("token is valid");
        let debug = format!("{settings:?}");
        assert!(!debug.contains("ghp_supersecret"));
        assert!(debug.contains("token: Some(\"<redacted>\")"));
    }
}
