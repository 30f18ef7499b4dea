//! Free-text search driven by debounced input.
//!
//! Keystrokes go to a [`Debouncer`]; a background driver turns each settled
//! query into a page-1 request. A query that settles while the previous one
//! is still in flight abandons it.

use super::feed::{ListState, PagedFeed};
use crate::cache::{CacheKey, TtlCache, fingerprint};
use crate::debounce::{DEFAULT_DEBOUNCE, Debouncer};
use crate::fetch::{CacheMode, Outcome, RetryPolicy};
use crate::storage::history::{self, MIN_QUERY_LEN};
use crate::storage::{HistoryEntry, LocalStore, SearchHistory, Suggestion};
use crate::tmdb::{CatalogSource, MoviePage};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;

pub const MAX_SEARCH_PAGES: u32 = 20;

#[derive(Debug, Clone, Copy)]
pub struct SearchOptions {
    pub debounce: Duration,
    pub min_query_len: usize,
    pub enable_history: bool,
    pub page_ceiling: u32,
    pub retry: RetryPolicy,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_query_len: MIN_QUERY_LEN,
            enable_history: true,
            page_ceiling: MAX_SEARCH_PAGES,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchMetrics {
    /// Page-1 searches that went to the network.
    pub total_searches: u64,
    pub last_response_time: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Case, surrounding whitespace and Unicode composition do not distinguish searches.
pub fn search_key(query: &str, page: u32) -> CacheKey {
    let query: String = query.trim().nfc().collect();
    fingerprint(
        "search",
        &json!({ "query": query.to_lowercase(), "page": page }),
    )
}

struct Searcher {
    source: Arc<dyn CatalogSource>,
    feed: PagedFeed,
    history: Option<SearchHistory>,
    /// The query the visible results belong to.
    active: Mutex<String>,
    metrics: Mutex<SearchMetrics>,
    options: SearchOptions,
}

impl Searcher {
    async fn settle(self: Arc<Self>, raw: String) {
        let query = raw.trim().to_owned();
        if query.chars().count() < self.options.min_query_len {
            debug!(query = %query, "query below minimum length, clearing results");
            lock(&self.active).clear();
            self.feed.reset();
            return;
        }
        *lock(&self.active) = query.clone();
        self.page(&query, 1).await;
    }

    async fn page(&self, query: &str, page: u32) -> Outcome<MoviePage> {
        let mode = if page <= 1 {
            CacheMode::ReadWrite
        } else {
            CacheMode::Bypass
        };
        let source = &self.source;
        let started = Instant::now();
        let outcome = self
            .feed
            .load(search_key(query, page), page, mode, || source.search(query, page))
            .await;

        if let Outcome::Fresh(data) = &outcome {
            let elapsed = started.elapsed();
            {
                let mut metrics = lock(&self.metrics);
                if page <= 1 {
                    metrics.total_searches += 1;
                }
                metrics.last_response_time = elapsed;
            }
            info!(
                query,
                page,
                results = data.total_results,
                elapsed = crate::utils::fmt_duration(elapsed),
                "search completed"
            );
            if page <= 1
                && !data.results.is_empty()
                && let Some(history) = &self.history
            {
                history.record(query, data.total_results);
            }
        }
        outcome
    }
}

/// Runs each settled query, dropping the previous one when a new one arrives.
async fn drive(searcher: Arc<Searcher>, mut settled: watch::Receiver<String>) {
    let mut inflight: Option<BoxFuture<'static, ()>> = None;
    loop {
        tokio::select! {
            changed = settled.changed() => {
                if changed.is_err() {
                    break;
                }
                let query = settled.borrow_and_update().clone();
                inflight = Some(searcher.clone().settle(query).boxed());
            }
            () = finish(&mut inflight), if inflight.is_some() => {
                inflight = None;
            }
        }
    }
}

async fn finish(task: &mut Option<BoxFuture<'static, ()>>) {
    match task {
        Some(task) => task.await,
        None => std::future::pending().await,
    }
}

pub struct SearchSession {
    searcher: Arc<Searcher>,
    debouncer: Debouncer,
    query: Mutex<String>,
    driver: JoinHandle<()>,
}

impl SearchSession {
    /// Start a session. History is kept only when a store is given and
    /// history is enabled. Must be called inside a tokio runtime.
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: TtlCache<MoviePage>,
        store: Option<&LocalStore>,
        options: SearchOptions,
    ) -> Self {
        let searcher = Arc::new(Searcher {
            source,
            feed: PagedFeed::new("search", Some(cache), options.retry, Some(options.page_ceiling)),
            history: store
                .filter(|_| options.enable_history)
                .map(SearchHistory::new),
            active: Mutex::new(String::new()),
            metrics: Mutex::new(SearchMetrics::default()),
            options,
        });
        let debouncer = Debouncer::new(options.debounce, "");
        let driver = tokio::spawn(drive(searcher.clone(), debouncer.subscribe()));
        Self {
            searcher,
            debouncer,
            query: Mutex::new(String::new()),
            driver,
        }
    }

    /// Record a keystroke. The search itself waits for the input to settle.
    pub fn set_query(&self, raw: impl Into<String>) {
        let raw = raw.into();
        *lock(&self.query) = raw.clone();
        self.debouncer.submit(raw);
    }

    /// Search for `query` without waiting for the debounce interval.
    pub fn search_now(&self, query: impl Into<String>) {
        let query = query.into();
        *lock(&self.query) = query.clone();
        self.debouncer.flush(query);
    }

    pub fn search_by_suggestion(&self, suggestion: &Suggestion) {
        self.search_now(suggestion.query.clone());
    }

    /// The raw input as last typed.
    pub fn query(&self) -> String {
        lock(&self.query).clone()
    }

    /// The query the current results belong to.
    pub fn active_query(&self) -> String {
        lock(&self.searcher.active).clone()
    }

    pub fn is_debouncing(&self) -> bool {
        self.debouncer.is_pending()
    }

    pub fn state(&self) -> ListState {
        self.searcher.feed.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.searcher.feed.subscribe()
    }

    pub fn metrics(&self) -> SearchMetrics {
        *lock(&self.searcher.metrics)
    }

    /// No results for a query long enough to have been searched.
    pub fn is_empty(&self) -> bool {
        let state = self.state();
        !state.loading
            && !state.has_data()
            && self.active_query().chars().count() >= self.searcher.options.min_query_len
    }

    pub async fn load_more(&self) -> Option<Outcome<MoviePage>> {
        let query = self.active_query();
        if query.is_empty() {
            return None;
        }
        let page = self.searcher.feed.next_page()?;
        Some(self.searcher.page(&query, page).await)
    }

    pub async fn retry(&self) -> Option<Outcome<MoviePage>> {
        let query = self.active_query();
        if query.is_empty() {
            return None;
        }
        Some(self.searcher.page(&query, self.searcher.feed.last_page()).await)
    }

    /// Forget the query and its results. History is kept.
    pub fn clear_search(&self) {
        lock(&self.query).clear();
        lock(&self.searcher.active).clear();
        self.searcher.feed.reset();
        self.debouncer.flush("");
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.searcher
            .history
            .as_ref()
            .map(SearchHistory::entries)
            .unwrap_or_default()
    }

    pub fn clear_history(&self) -> bool {
        self.searcher
            .history
            .as_ref()
            .is_some_and(SearchHistory::clear)
    }

    /// Suggestions for the raw input.
    pub fn suggestions(&self) -> Vec<Suggestion> {
        let query = self.query();
        match &self.searcher.history {
            Some(history) => history.suggestions(&query),
            None => history::suggest(&[], &query),
        }
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.searcher.feed.coordinator().cache() {
            cache.clear();
        }
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.driver.abort();
    }
}
