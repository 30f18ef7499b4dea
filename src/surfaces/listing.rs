//! Fixed catalog listings (trending, popular, top rated, ...).

use super::feed::{ListState, PagedFeed};
use crate::cache::{CacheKey, TtlCache, fingerprint};
use crate::fetch::{CacheMode, Outcome, RetryPolicy};
use crate::tmdb::{CatalogSource, ListEndpoint, MoviePage, TimeWindow};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Serialize)]
struct ListingParams {
    #[serde(flatten)]
    endpoint: ListEndpoint,
    page: u32,
}

/// One endpoint's accumulated pages. Page 1 is cached; later pages are not.
pub struct Listing {
    source: Arc<dyn CatalogSource>,
    endpoint: ListEndpoint,
    feed: PagedFeed,
}

impl Listing {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: TtlCache<MoviePage>,
        endpoint: ListEndpoint,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            endpoint,
            feed: PagedFeed::new("listing", Some(cache), policy, None),
        }
    }

    pub fn endpoint(&self) -> ListEndpoint {
        self.endpoint
    }

    pub fn cache_key(endpoint: ListEndpoint, page: u32) -> CacheKey {
        fingerprint("listing", &ListingParams { endpoint, page })
    }

    pub fn state(&self) -> ListState {
        self.feed.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.feed.subscribe()
    }

    pub fn is_loading_more(&self) -> bool {
        self.feed.state().loading_more
    }

    async fn fetch(&self, page: u32, mode: CacheMode) -> Outcome<MoviePage> {
        let key = Self::cache_key(self.endpoint, page);
        let source = &self.source;
        let endpoint = self.endpoint;
        self.feed
            .load(key, page, mode, || source.list(endpoint, page))
            .await
    }

    /// First page, from cache when fresh.
    pub async fn load(&self) -> Outcome<MoviePage> {
        self.fetch(1, CacheMode::ReadWrite).await
    }

    /// First page from the network, replacing the cached copy.
    pub async fn refresh(&self) -> Outcome<MoviePage> {
        self.fetch(1, CacheMode::Refresh).await
    }

    /// The next page, if there is one and nothing is loading.
    pub async fn load_more(&self) -> Option<Outcome<MoviePage>> {
        let page = self.feed.next_page()?;
        Some(self.fetch(page, CacheMode::Bypass).await)
    }

    /// Repeat the most recent page request.
    pub async fn retry(&self) -> Outcome<MoviePage> {
        let page = self.feed.last_page();
        let mode = if page <= 1 {
            CacheMode::ReadWrite
        } else {
            CacheMode::Bypass
        };
        self.fetch(page, mode).await
    }

    /// Drop every cached listing page, for all endpoints sharing the cache.
    pub fn clear_cache(&self) {
        if let Some(cache) = self.feed.coordinator().cache() {
            cache.clear();
        }
    }
}

/// Trending, popular and upcoming, loaded together.
pub struct Dashboard {
    pub trending: Listing,
    pub popular: Listing,
    pub upcoming: Listing,
}

impl Dashboard {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: TtlCache<MoviePage>,
        window: TimeWindow,
        policy: RetryPolicy,
    ) -> Self {
        let listing = |endpoint| Listing::new(source.clone(), cache.clone(), endpoint, policy);
        Self {
            trending: listing(ListEndpoint::Trending { window }),
            popular: listing(ListEndpoint::Popular),
            upcoming: listing(ListEndpoint::Upcoming),
        }
    }

    pub async fn load_all(&self) {
        tokio::join!(self.trending.load(), self.popular.load(), self.upcoming.load());
    }

    pub async fn refresh_all(&self) {
        tokio::join!(
            self.trending.refresh(),
            self.popular.refresh(),
            self.upcoming.refresh()
        );
    }

    pub fn is_loading(&self) -> bool {
        [&self.trending, &self.popular, &self.upcoming]
            .iter()
            .any(|l| l.state().loading)
    }

    /// The first error among the three, if any.
    pub fn error(&self) -> Option<String> {
        [&self.trending, &self.popular, &self.upcoming]
            .iter()
            .find_map(|l| l.state().error.map(|e| e.message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::surfaces::testing::FakeCatalog;

    fn listing(source: Arc<FakeCatalog>, endpoint: ListEndpoint) -> Listing {
        Listing::new(
            source,
            TtlCache::new("listings", CachePolicy::LISTINGS),
            endpoint,
            RetryPolicy::none(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_page_cached_later_pages_not() {
        let source = Arc::new(FakeCatalog::new(3));
        let popular = listing(source.clone(), ListEndpoint::Popular);

        popular.load().await;
        popular.load_more().await;
        let state = popular.state();
        assert_eq!(state.items.len(), 10);
        assert_eq!(state.page, 2);
        assert!(state.has_more);

        popular.load().await;
        assert_eq!(source.calls(), 2);
        assert!(popular.state().from_cache);
        assert_eq!(popular.state().items.len(), 5);

        popular.refresh().await;
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn load_more_stops_at_last_page() {
        let source = Arc::new(FakeCatalog::new(2));
        let top = listing(source.clone(), ListEndpoint::TopRated);
        top.load().await;
        assert!(top.load_more().await.is_some());
        assert!(!top.state().has_more);
        assert!(top.load_more().await.is_none());
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_repeats_failed_page() {
        let source = Arc::new(FakeCatalog::new(3));
        let upcoming = listing(source.clone(), ListEndpoint::Upcoming);
        upcoming.load().await;

        source.fail_next(crate::tmdb::ApiError::Server { status: 503 });
        upcoming.load_more().await;
        assert!(upcoming.state().error.is_some());
        assert_eq!(upcoming.state().items.len(), 5);

        upcoming.retry().await;
        let state = upcoming.state();
        assert!(state.error.is_none());
        assert_eq!(state.page, 2);
        assert_eq!(state.items.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn dashboard_loads_three_endpoints() {
        let source = Arc::new(FakeCatalog::new(1));
        let dashboard = Dashboard::new(
            source.clone(),
            TtlCache::new("listings", CachePolicy::LISTINGS),
            TimeWindow::Week,
            RetryPolicy::none(),
        );
        dashboard.load_all().await;
        assert_eq!(source.calls(), 3);
        assert!(!dashboard.is_loading());
        assert!(dashboard.error().is_none());
        assert!(dashboard.trending.state().has_data());

        // Distinct endpoints never share a cache slot.
        assert_ne!(
            Listing::cache_key(ListEndpoint::Popular, 1),
            Listing::cache_key(ListEndpoint::Upcoming, 1)
        );
    }
}
