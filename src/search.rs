use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use crate::{
    GithubClient, GithubSettings, Result, SearchParams, SortOrder, UserSearchResult, UserSort,
};

const RESULTS_PER_SEARCH: u32 = 10;

/// Result of one [`DebouncedSearch::search`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchOutcome {
    Results(UserSearchResult),
    /// The trimmed query was below the minimum length; nothing was sent.
    TooShort,
    /// A newer call arrived before this one finished; its result was dropped.
    Superseded,
}

/// Search-as-you-type helper.
///
/// Every call waits out the debounce window and only the latest call's
/// response is delivered. Clones share the same generation counter.
#[derive(Clone, Debug)]
pub struct DebouncedSearch {
    client: GithubClient,
    debounce: Duration,
    min_chars: usize,
    generation: Arc<AtomicU64>,
}

impl DebouncedSearch {
    pub fn new(client: GithubClient, debounce: Duration, min_chars: usize) -> Self {
        Self {
            client,
            debounce,
            min_chars,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_settings(client: GithubClient, settings: &GithubSettings) -> Self {
        Self::new(client, settings.search_debounce(), settings.search_min_chars)
    }

    /// Searches users matching `query`, best-followed first.
    ///
    /// `query` is trimmed before the minimum-length check and before it is
    /// sent, so a blank or whitespace-padded short query yields
    /// [`SearchOutcome::TooShort`] without a request.
    ///
    /// Errors from a superseded call are dropped along with its results.
    pub async fn search(&self, query: &str) -> Result<SearchOutcome> {
        let ticket = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let query = query.trim();
        if query.chars().count() < self.min_chars {
            return Ok(SearchOutcome::TooShort);
        }

        sleep(self.debounce).await;
        if !self.is_current(ticket) {
            tracing::debug!(query, "search superseded during debounce");
            return Ok(SearchOutcome::Superseded);
        }

        let params = SearchParams::new(query)
            .sort(UserSort::Followers, SortOrder::Desc)
            .per_page(RESULTS_PER_SEARCH);
        let result = self.client.search_users(&params).await;

        if !self.is_current(ticket) {
            tracing::debug!(query, "discarding stale search response");
            return Ok(SearchOutcome::Superseded);
        }
        result.map(SearchOutcome::Results)
    }

    /// Invalidates every pending call.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }
}
