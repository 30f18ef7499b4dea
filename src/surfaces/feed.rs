//! The paged list shared by listing, discovery and search surfaces.
//!
//! A feed pairs one coordinator with one accumulating paginator and
//! publishes the combined view. Only outcomes from the current load are
//! applied; a load that was overtaken leaves the view alone.

use crate::cache::{CacheKey, TtlCache};
use crate::fetch::{CacheMode, Outcome, RequestCoordinator, RetryPolicy};
use crate::pagination::Paginator;
use crate::tmdb::{ApiError, ErrorInfo, MoviePage, MovieSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::info;

/// What a paged surface shows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListState {
    pub items: Vec<MovieSummary>,
    pub page: u32,
    pub total_pages: u32,
    pub total_results: u64,
    pub has_more: bool,
    pub loading: bool,
    pub loading_more: bool,
    pub error: Option<ErrorInfo>,
    pub from_cache: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ListState {
    pub fn has_data(&self) -> bool {
        !self.items.is_empty()
    }

    /// Settled with nothing to show and no error.
    pub fn is_empty(&self) -> bool {
        !self.loading && self.items.is_empty() && self.error.is_none()
    }

    pub fn is_busy(&self) -> bool {
        self.loading || self.loading_more
    }
}

pub struct PagedFeed {
    coordinator: RequestCoordinator<MoviePage>,
    pages: Mutex<Paginator<MovieSummary>>,
    view: watch::Sender<ListState>,
    session: AtomicU64,
    last_page: AtomicU64,
}

impl PagedFeed {
    pub fn new(
        surface: &'static str,
        cache: Option<TtlCache<MoviePage>>,
        policy: RetryPolicy,
        page_ceiling: Option<u32>,
    ) -> Self {
        let coordinator = match cache {
            Some(cache) => RequestCoordinator::new(surface, cache, policy),
            None => RequestCoordinator::uncached(surface, policy),
        };
        let pages = match page_ceiling {
            Some(ceiling) => Paginator::with_page_ceiling(ceiling),
            None => Paginator::new(),
        };
        let (view, _) = watch::channel(ListState::default());
        Self {
            coordinator,
            pages: Mutex::new(pages),
            view,
            session: AtomicU64::new(0),
            last_page: AtomicU64::new(1),
        }
    }

    fn pages(&self) -> MutexGuard<'_, Paginator<MovieSummary>> {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn coordinator(&self) -> &RequestCoordinator<MoviePage> {
        &self.coordinator
    }

    pub fn state(&self) -> ListState {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.view.subscribe()
    }

    /// The page a `load more` would request, unless one is already running.
    pub fn next_page(&self) -> Option<u32> {
        if self.view.borrow().is_busy() {
            return None;
        }
        self.pages().next_page()
    }

    /// The page of the most recent load, for retrying it.
    pub fn last_page(&self) -> u32 {
        self.last_page.load(Ordering::Acquire) as u32
    }

    /// Drop accumulated results and abandon anything in flight.
    pub fn reset(&self) {
        let mut pages = self.pages();
        self.session.fetch_add(1, Ordering::AcqRel);
        self.coordinator.cancel();
        pages.reset();
        self.view.send_replace(ListState::default());
    }

    /// Load `page` and merge it into the running list.
    pub async fn load<F, Fut>(
        &self,
        key: CacheKey,
        page: u32,
        mode: CacheMode,
        fetch: F,
    ) -> Outcome<MoviePage>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<MoviePage, ApiError>>,
    {
        // Sessions are only bumped and compared under the pages lock.
        let session = {
            let _pages = self.pages();
            let session = self.session.fetch_add(1, Ordering::AcqRel) + 1;
            self.last_page.store(u64::from(page), Ordering::Release);
            self.view.send_modify(|v| {
                v.loading = page <= 1;
                v.loading_more = page > 1;
                v.error = None;
            });
            session
        };

        let outcome = self.coordinator.run(key, mode, fetch).await;

        let mut pages = self.pages();
        if self.session.load(Ordering::Acquire) != session {
            return Outcome::Superseded;
        }

        match &outcome {
            Outcome::Fresh(data) | Outcome::Cached(data) => {
                let from_cache = matches!(outcome, Outcome::Cached(_));
                let added = pages.append_page(
                    data.results.iter().cloned(),
                    page,
                    data.total_pages,
                    data.total_results,
                );
                info!(
                    surface = self.coordinator.surface(),
                    page,
                    added,
                    total = pages.items().len(),
                    from_cache,
                    "page loaded"
                );
                let snapshot = pages.snapshot();
                let has_more = pages.has_more();
                self.view.send_modify(|v| {
                    v.items = snapshot.items;
                    v.page = snapshot.page;
                    v.total_pages = snapshot.total_pages;
                    v.total_results = snapshot.total_count;
                    v.has_more = has_more;
                    v.loading = false;
                    v.loading_more = false;
                    v.error = None;
                    v.from_cache = from_cache;
                    v.last_updated = Some(Utc::now());
                });
            }
            Outcome::Failed(err) => {
                let info = ErrorInfo::from(err);
                // A failed first page leaves nothing to show; a failed later
                // page keeps what was already loaded.
                if page <= 1 {
                    pages.reset();
                    self.view.send_modify(|v| {
                        *v = ListState {
                            error: Some(info),
                            ..ListState::default()
                        };
                    });
                } else {
                    self.view.send_modify(|v| {
                        v.loading = false;
                        v.loading_more = false;
                        v.error = Some(info);
                    });
                }
            }
            Outcome::Superseded => {
                if !self.coordinator.state().is_loading() {
                    self.view.send_modify(|v| {
                        v.loading = false;
                        v.loading_more = false;
                    });
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use std::time::Duration;

    fn page(ids: std::ops::Range<u64>, page: u32, total_pages: u32) -> MoviePage {
        let results = ids
            .map(|id| serde_json::from_value(serde_json::json!({ "id": id, "title": format!("m{id}") })).unwrap())
            .collect();
        MoviePage {
            page,
            results,
            total_pages,
            total_results: 100,
        }
    }

    fn feed() -> PagedFeed {
        let cache = TtlCache::new("feed", CachePolicy::new(Duration::from_secs(600), 10));
        PagedFeed::new("feed", Some(cache), RetryPolicy::none(), None)
    }

    #[tokio::test(start_paused = true)]
    async fn later_page_failure_keeps_items() {
        let feed = feed();
        feed.load(CacheKey::raw("p1"), 1, CacheMode::ReadWrite, || async { Ok(page(0..5, 1, 3)) })
            .await;
        assert_eq!(feed.next_page(), Some(2));

        let out = feed
            .load(CacheKey::raw("p2"), 2, CacheMode::Bypass, || async {
                Err(ApiError::Server { status: 500 })
            })
            .await;
        assert!(matches!(out, Outcome::Failed(_)));

        let state = feed.state();
        assert_eq!(state.items.len(), 5);
        assert_eq!(state.page, 1);
        assert!(state.error.is_some());
        assert!(!state.is_busy());
        assert_eq!(feed.last_page(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_page_failure_clears() {
        let feed = feed();
        feed.load(CacheKey::raw("a"), 1, CacheMode::ReadWrite, || async { Ok(page(0..5, 1, 3)) })
            .await;
        feed.load(CacheKey::raw("b"), 1, CacheMode::ReadWrite, || async {
            Err(ApiError::NotFound)
        })
        .await;
        let state = feed.state();
        assert!(state.items.is_empty());
        assert_eq!(state.error.unwrap().status, Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_clears_view() {
        let feed = feed();
        feed.load(CacheKey::raw("a"), 1, CacheMode::ReadWrite, || async { Ok(page(0..5, 1, 1)) })
            .await;
        assert!(feed.state().has_data());
        feed.reset();
        assert!(feed.state().is_empty());
        assert_eq!(feed.next_page(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_during_load_discards_the_page() {
        let feed = feed();
        let out = feed
            .load(CacheKey::raw("a"), 1, CacheMode::ReadWrite, || async {
                feed.reset();
                Ok(page(0..5, 1, 3))
            })
            .await;

        assert!(out.is_superseded());
        let state = feed.state();
        assert!(state.is_empty());
        assert!(!state.is_busy());
        assert_eq!(feed.next_page(), None);
    }
}
