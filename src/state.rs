//! Application state shared by every surface.
//!
//! Caches are created once here and handed to the surfaces that use them, so
//! two surfaces of the same kind share one cache without any global state.

use crate::cache::{CachePolicy, TtlCache};
use crate::fetch::RetryPolicy;
use crate::storage::{Collection, LocalStore, SearchHistory};
use crate::streaming::{AvailabilitySource, StreamingBundle};
use crate::surfaces::{
    Availability, Dashboard, Details, Discovery, GenreInfo, Genres, Listing, SearchOptions,
    SearchSession,
};
use crate::tmdb::{CatalogSource, DiscoverFilters, ListEndpoint, MovieDetail, MoviePage, TimeWindow};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Health of a collaborator as seen at startup.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    /// Running on generated data instead of the live collaborator.
    Simulated,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for collaborators to report their status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status)
    }

    /// All statuses, sorted by service name.
    pub fn all(&self) -> Vec<(String, ServiceStatus)> {
        let mut all: Vec<_> = self
            .inner
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().status))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

/// One cache per surface kind.
#[derive(Clone)]
pub struct SurfaceCaches {
    pub listings: TtlCache<MoviePage>,
    pub discovery: TtlCache<MoviePage>,
    pub search: TtlCache<MoviePage>,
    pub details: TtlCache<MovieDetail>,
    pub streaming: TtlCache<StreamingBundle>,
    pub genres: TtlCache<Vec<GenreInfo>>,
}

impl Default for SurfaceCaches {
    fn default() -> Self {
        Self {
            listings: TtlCache::new("listings", CachePolicy::LISTINGS),
            discovery: TtlCache::new("discovery", CachePolicy::DISCOVERY),
            search: TtlCache::new("search", CachePolicy::SEARCH),
            details: TtlCache::new("details", CachePolicy::DETAILS),
            streaming: TtlCache::new("streaming", CachePolicy::STREAMING),
            genres: TtlCache::new("genres", CachePolicy::GENRES),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogSource>,
    pub availability: Arc<dyn AvailabilitySource>,
    pub store: LocalStore,
    pub caches: SurfaceCaches,
    pub image_base_url: String,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        availability: Arc<dyn AvailabilitySource>,
        store: LocalStore,
        image_base_url: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            availability,
            store,
            caches: SurfaceCaches::default(),
            image_base_url: image_base_url.into(),
            service_statuses: ServiceStatusRegistry::new(),
        }
    }

    pub fn listing(&self, endpoint: ListEndpoint) -> Listing {
        Listing::new(
            self.catalog.clone(),
            self.caches.listings.clone(),
            endpoint,
            RetryPolicy::default(),
        )
    }

    pub fn dashboard(&self, window: TimeWindow) -> Dashboard {
        Dashboard::new(
            self.catalog.clone(),
            self.caches.listings.clone(),
            window,
            RetryPolicy::default(),
        )
    }

    pub fn discovery(&self, filters: DiscoverFilters) -> Discovery {
        Discovery::new(
            self.catalog.clone(),
            self.caches.discovery.clone(),
            filters,
            RetryPolicy::default(),
        )
    }

    /// Requires a Tokio runtime; the session runs a background driver.
    pub fn search(&self, options: SearchOptions) -> SearchSession {
        SearchSession::new(
            self.catalog.clone(),
            self.caches.search.clone(),
            Some(&self.store),
            options,
        )
    }

    pub fn details(&self) -> Details {
        Details::new(
            self.catalog.clone(),
            self.caches.details.clone(),
            self.image_base_url.clone(),
            RetryPolicy::default(),
        )
    }

    pub fn streaming(&self) -> Availability {
        Availability::new(
            self.availability.clone(),
            self.caches.streaming.clone(),
            RetryPolicy::exponential(),
        )
    }

    pub fn genres(&self) -> Genres {
        Genres::new(
            self.catalog.clone(),
            self.caches.genres.clone(),
            self.store.clone(),
            RetryPolicy::default(),
        )
    }

    pub fn favorites(&self) -> Collection {
        Collection::favorites(&self.store)
    }

    pub fn watchlist(&self) -> Collection {
        Collection::watchlist(&self.store)
    }

    pub fn history(&self) -> SearchHistory {
        SearchHistory::new(&self.store)
    }
}
