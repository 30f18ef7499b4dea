//! Filtered browsing over the discover endpoint.
//!
//! Every page is cached under `(filters, page)`, so paging back through an
//! earlier filter set is served locally. Changing filters starts a new
//! session: accumulated results are dropped and page 1 is loaded.

use super::feed::{ListState, PagedFeed};
use crate::cache::{CacheKey, TtlCache, fingerprint};
use crate::fetch::{CacheMode, Outcome, RetryPolicy};
use crate::tmdb::{CatalogSource, DiscoverFilters, MoviePage};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Popular,
    HighRated,
    Recent,
    Classics,
    Action,
    Family,
}

impl Preset {
    pub const ALL: [Preset; 6] = [
        Self::Popular,
        Self::HighRated,
        Self::Recent,
        Self::Classics,
        Self::Action,
        Self::Family,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Popular => "Popular Movies",
            Self::HighRated => "Highly Rated",
            Self::Recent => "Recent Releases",
            Self::Classics => "Classic Films",
            Self::Action => "Action Movies",
            Self::Family => "Family Movies",
        }
    }

    /// The filter set for this preset. `Recent` is relative to `today`.
    pub fn filters(self, today: NaiveDate) -> DiscoverFilters {
        let base = DiscoverFilters::default();
        match self {
            Self::Popular => DiscoverFilters {
                vote_count_gte: Some(1000),
                ..base
            },
            Self::HighRated => DiscoverFilters {
                sort_by: "vote_average.desc".to_owned(),
                vote_average_gte: Some(7.5),
                vote_count_gte: Some(500),
                ..base
            },
            Self::Recent => DiscoverFilters {
                sort_by: "primary_release_date.desc".to_owned(),
                release_date_gte: today
                    .checked_sub_days(Days::new(365))
                    .map(|d| d.format("%Y-%m-%d").to_string()),
                ..base
            },
            Self::Classics => DiscoverFilters {
                sort_by: "vote_average.desc".to_owned(),
                release_date_lte: Some("2000-12-31".to_owned()),
                vote_average_gte: Some(7.0),
                vote_count_gte: Some(1000),
                ..base
            },
            Self::Action => DiscoverFilters::genres([28]),
            Self::Family => DiscoverFilters::genres([10751, 16]),
        }
    }
}

#[derive(Serialize)]
struct DiscoverParams<'a> {
    #[serde(flatten)]
    filters: &'a DiscoverFilters,
    page: u32,
}

pub struct Discovery {
    source: Arc<dyn CatalogSource>,
    filters: Mutex<DiscoverFilters>,
    preset: Mutex<Option<Preset>>,
    feed: PagedFeed,
}

impl Discovery {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: TtlCache<MoviePage>,
        filters: DiscoverFilters,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            filters: Mutex::new(filters),
            preset: Mutex::new(None),
            feed: PagedFeed::new("discovery", Some(cache), policy, None),
        }
    }

    pub fn cache_key(filters: &DiscoverFilters, page: u32) -> CacheKey {
        fingerprint("discover", &DiscoverParams { filters, page })
    }

    fn lock_filters(&self) -> MutexGuard<'_, DiscoverFilters> {
        self.filters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_preset(&self) -> MutexGuard<'_, Option<Preset>> {
        self.preset.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn filters(&self) -> DiscoverFilters {
        self.lock_filters().clone()
    }

    pub fn active_preset(&self) -> Option<Preset> {
        *self.lock_preset()
    }

    pub fn has_active_filters(&self) -> bool {
        *self.lock_filters() != DiscoverFilters::default()
    }

    pub fn filter_count(&self) -> usize {
        self.lock_filters().active_count()
    }

    pub fn state(&self) -> ListState {
        self.feed.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.feed.subscribe()
    }

    async fn fetch(&self, page: u32, mode: CacheMode) -> Outcome<MoviePage> {
        let filters = self.filters();
        let key = Self::cache_key(&filters, page);
        let source = &self.source;
        let filters = &filters;
        self.feed
            .load(key, page, mode, || source.discover(filters, page))
            .await
    }

    /// Load page 1 of the current filters.
    pub async fn discover(&self) -> Outcome<MoviePage> {
        self.fetch(1, CacheMode::ReadWrite).await
    }

    fn replace(&self, filters: DiscoverFilters, preset: Option<Preset>) {
        debug!(?preset, active = filters.active_count(), "discovery filters changed");
        *self.lock_filters() = filters;
        *self.lock_preset() = preset;
        self.feed.reset();
    }

    /// Edit the current filters and restart at page 1. Clears the preset.
    pub async fn update_filters(&self, edit: impl FnOnce(&mut DiscoverFilters)) -> Outcome<MoviePage> {
        let mut filters = self.filters();
        edit(&mut filters);
        self.replace(filters, None);
        self.discover().await
    }

    pub async fn apply_preset(&self, preset: Preset, today: NaiveDate) -> Outcome<MoviePage> {
        self.replace(preset.filters(today), Some(preset));
        self.discover().await
    }

    pub async fn reset_filters(&self) -> Outcome<MoviePage> {
        self.replace(DiscoverFilters::default(), None);
        self.discover().await
    }

    pub async fn load_more(&self) -> Option<Outcome<MoviePage>> {
        let page = self.feed.next_page()?;
        Some(self.fetch(page, CacheMode::ReadWrite).await)
    }

    pub async fn retry(&self) -> Outcome<MoviePage> {
        self.fetch(self.feed.last_page(), CacheMode::ReadWrite).await
    }

    /// Page 1 from the network, replacing the cached copy.
    pub async fn refresh(&self) -> Outcome<MoviePage> {
        self.fetch(1, CacheMode::Refresh).await
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.feed.coordinator().cache() {
            cache.clear();
        }
    }
}
