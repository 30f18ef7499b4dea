//! Where-to-watch lookups for one movie at a time.

use crate::cache::{CacheKey, TtlCache, fingerprint};
use crate::fetch::{CacheMode, Outcome, RequestCoordinator, RequestState, RetryPolicy};
use crate::streaming::{self, AvailabilitySource, StreamingBundle};
use crate::tmdb::{ApiError, MovieSummary};
use chrono::Utc;
use serde_json::json;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

pub struct Availability {
    source: Arc<dyn AvailabilitySource>,
    coordinator: RequestCoordinator<StreamingBundle>,
    current: Mutex<Option<MovieSummary>>,
}

impl Availability {
    /// Retries back off exponentially unless `policy` says otherwise.
    pub fn new(
        source: Arc<dyn AvailabilitySource>,
        cache: TtlCache<StreamingBundle>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            coordinator: RequestCoordinator::new("streaming", cache, policy),
            current: Mutex::new(None),
        }
    }

    pub fn cache_key(movie_id: u64) -> CacheKey {
        fingerprint("streaming", &json!({ "id": movie_id }))
    }

    /// Whether live data can be fetched. When not, lookups are simulated.
    pub fn is_configured(&self) -> bool {
        self.source.is_configured()
    }

    pub fn state(&self) -> RequestState<StreamingBundle> {
        self.coordinator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<StreamingBundle>> {
        self.coordinator.subscribe()
    }

    /// Whether the shown bundle is older than the cache lifetime.
    pub fn is_stale(&self) -> bool {
        let ttl = self
            .coordinator
            .cache()
            .map(|c| c.policy().ttl)
            .unwrap_or_default();
        self.state()
            .data
            .is_some_and(|b| b.is_stale(ttl, Utc::now()))
    }

    async fn fetch(&self, movie: &MovieSummary, mode: CacheMode) -> Outcome<StreamingBundle> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(movie.clone());
        if movie.id == 0 {
            return self
                .coordinator
                .reject(ApiError::Validation("Movie ID is required".to_owned()));
        }
        let source = self.source.as_ref();
        self.coordinator
            .run(Self::cache_key(movie.id), mode, || streaming::lookup(source, movie))
            .await
    }

    pub async fn load(&self, movie: &MovieSummary) -> Outcome<StreamingBundle> {
        self.fetch(movie, CacheMode::ReadWrite).await
    }

    fn current(&self) -> Option<MovieSummary> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn retry(&self) -> Option<Outcome<StreamingBundle>> {
        let movie = self.current()?;
        Some(self.fetch(&movie, CacheMode::ReadWrite).await)
    }

    /// Drop the cached bundle for the current movie and look it up again.
    pub async fn refresh(&self) -> Option<Outcome<StreamingBundle>> {
        let movie = self.current()?;
        self.clear_cache(movie.id);
        Some(self.fetch(&movie, CacheMode::Refresh).await)
    }

    pub fn clear_cache(&self, movie_id: u64) {
        if let Some(cache) = self.coordinator.cache() {
            cache.remove(&Self::cache_key(movie_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::fetch::Status;
    use crate::streaming::{DataSource, ServiceInfo, SourceType, StreamingOption};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Live {
        calls: AtomicU32,
    }

    #[async_trait]
    impl AvailabilitySource for Live {
        fn is_configured(&self) -> bool {
            true
        }

        async fn sources(&self, movie: &MovieSummary) -> Result<StreamingBundle, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut bundle = StreamingBundle::empty(DataSource::Live);
            bundle.push(StreamingOption {
                service: ServiceInfo::resolve("Netflix", SourceType::Subscription),
                kind: SourceType::Subscription,
                price: None,
                url: format!("https://www.netflix.com/title/{}", movie.id),
            });
            Ok(bundle)
        }
    }

    struct Offline;

    #[async_trait]
    impl AvailabilitySource for Offline {
        fn is_configured(&self) -> bool {
            false
        }

        async fn sources(&self, _movie: &MovieSummary) -> Result<StreamingBundle, ApiError> {
            Err(ApiError::Unauthorized)
        }
    }

    fn movie(id: u64) -> MovieSummary {
        serde_json::from_value(json!({
            "id": id,
            "title": "Heat",
            "release_date": "1995-12-15",
            "vote_average": 7.9
        }))
        .unwrap()
    }

    fn cache() -> TtlCache<StreamingBundle> {
        TtlCache::new("streaming", CachePolicy::STREAMING)
    }

    #[tokio::test(start_paused = true)]
    async fn live_results_are_cached_per_movie() {
        let live = Arc::new(Live {
            calls: AtomicU32::new(0),
        });
        let availability = Availability::new(live.clone(), cache(), RetryPolicy::exponential());

        availability.load(&movie(949)).await;
        availability.load(&movie(949)).await;
        availability.load(&movie(950)).await;
        assert_eq!(live.calls.load(Ordering::SeqCst), 2);

        availability.refresh().await;
        assert_eq!(live.calls.load(Ordering::SeqCst), 3);

        let bundle = availability.state().data.unwrap();
        assert_eq!(bundle.source, DataSource::Live);
        assert_eq!(bundle.subscriptions[0].url, "https://www.netflix.com/title/950");
        assert!(!availability.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn unconfigured_source_simulates() {
        let availability = Availability::new(Arc::new(Offline), cache(), RetryPolicy::exponential());
        assert!(!availability.is_configured());

        let out = availability.load(&movie(949)).await;
        let bundle = out.into_value().unwrap();
        assert!(bundle.is_simulated());
        assert!(bundle.has_data());
        assert_eq!(availability.state().status, Status::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_id_is_rejected() {
        let availability = Availability::new(Arc::new(Offline), cache(), RetryPolicy::exponential());
        let out = availability.load(&movie(0)).await;
        assert!(matches!(out, Outcome::Failed(ApiError::Validation(_))));
        assert!(availability.state().is_failed());
    }
}
