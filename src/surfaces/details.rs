//! One movie's detail record plus the values derived from it for display.

use crate::cache::{CacheKey, TtlCache, fingerprint};
use crate::fetch::{CacheMode, Outcome, RequestCoordinator, RetryPolicy};
use crate::tmdb::models::{CastMember, CrewMember, Video, parse_release_date};
use crate::tmdb::{ApiError, CatalogSource, ErrorInfo, MovieDetail, image_url};
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;

const MAIN_CAST: usize = 8;
const POSTER_SIZE: &str = "w500";
const BACKDROP_SIZE: &str = "original";

/// `148` becomes `"2h 28m"`.
pub fn format_runtime(minutes: u32) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovieView {
    #[serde(flatten)]
    pub detail: MovieDetail,
    pub year: Option<i32>,
    pub formatted_runtime: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub rating_formatted: String,
    pub rating_percentage: u8,
    pub director: Option<CrewMember>,
    pub main_cast: Vec<CastMember>,
    pub trailer: Option<Video>,
    pub is_released: bool,
    pub release_date_formatted: Option<String>,
}

impl MovieView {
    pub fn build(detail: MovieDetail, image_base: &str, today: NaiveDate) -> Self {
        let released = parse_release_date(&detail.release_date);
        let rating = detail.vote_average;
        let has_rating = rating > 0.0;
        Self {
            year: released.map(|d| chrono::Datelike::year(&d)),
            formatted_runtime: detail.runtime.filter(|&m| m > 0).map(format_runtime),
            poster_url: image_url(image_base, detail.poster_path.as_deref(), POSTER_SIZE),
            backdrop_url: image_url(image_base, detail.backdrop_path.as_deref(), BACKDROP_SIZE),
            rating_formatted: if has_rating {
                format!("{rating:.1}/10")
            } else {
                "No rating".to_owned()
            },
            rating_percentage: if has_rating {
                (rating * 10.0).round().clamp(0.0, 100.0) as u8
            } else {
                0
            },
            director: detail
                .credits
                .crew
                .iter()
                .find(|c| c.job == "Director")
                .cloned(),
            main_cast: detail.credits.cast.iter().take(MAIN_CAST).cloned().collect(),
            trailer: detail
                .videos
                .results
                .iter()
                .find(|v| v.kind == "Trailer" && v.site == "YouTube")
                .cloned(),
            is_released: released.is_some_and(|d| d <= today),
            release_date_formatted: released.map(|d| d.format("%B %-d, %Y").to_string()),
            detail,
        }
    }

    pub fn trailer_url(&self) -> Option<String> {
        self.trailer
            .as_ref()
            .map(|v| format!("https://www.youtube.com/watch?v={}", v.key))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DetailState {
    pub movie_id: Option<u64>,
    pub movie: Option<MovieView>,
    pub loading: bool,
    pub error: Option<ErrorInfo>,
}

impl DetailState {
    pub fn is_loaded(&self) -> bool {
        self.movie.is_some()
    }
}

pub struct Details {
    source: Arc<dyn CatalogSource>,
    coordinator: RequestCoordinator<MovieDetail>,
    image_base: String,
    current: AtomicU64,
    view: watch::Sender<DetailState>,
}

impl Details {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: TtlCache<MovieDetail>,
        image_base: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        let (view, _) = watch::channel(DetailState::default());
        Self {
            source,
            coordinator: RequestCoordinator::new("details", cache, policy),
            image_base: image_base.into(),
            current: AtomicU64::new(0),
            view,
        }
    }

    pub fn cache_key(id: u64) -> CacheKey {
        fingerprint("movie", &json!({ "id": id }))
    }

    pub fn state(&self) -> DetailState {
        self.view.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailState> {
        self.view.subscribe()
    }

    pub fn coordinator(&self) -> &RequestCoordinator<MovieDetail> {
        &self.coordinator
    }

    async fn fetch(&self, id: u64, mode: CacheMode) -> Outcome<MovieDetail> {
        self.current.store(id, Ordering::Release);
        if id == 0 {
            let outcome = self
                .coordinator
                .reject(ApiError::Validation("Movie ID is required".to_owned()));
            if let Outcome::Failed(err) = &outcome {
                self.view.send_replace(DetailState {
                    error: Some(ErrorInfo::from(err)),
                    ..DetailState::default()
                });
            }
            return outcome;
        }

        self.view.send_modify(|v| {
            v.movie_id = Some(id);
            v.loading = true;
            v.error = None;
        });

        let source = &self.source;
        let outcome = self
            .coordinator
            .run(Self::cache_key(id), mode, || source.detail(id))
            .await;

        match &outcome {
            Outcome::Fresh(detail) | Outcome::Cached(detail) => {
                let movie = MovieView::build(
                    detail.clone(),
                    &self.image_base,
                    chrono::Utc::now().date_naive(),
                );
                self.view.send_replace(DetailState {
                    movie_id: Some(id),
                    movie: Some(movie),
                    loading: false,
                    error: None,
                });
            }
            Outcome::Failed(err) => {
                self.view.send_replace(DetailState {
                    movie_id: Some(id),
                    movie: None,
                    loading: false,
                    error: Some(ErrorInfo::from(err)),
                });
            }
            Outcome::Superseded => {
                if !self.coordinator.state().is_loading() {
                    self.view.send_modify(|v| v.loading = false);
                }
            }
        }
        outcome
    }

    /// Load `id`, from cache when fresh. A zero id fails without a request.
    pub async fn load(&self, id: u64) -> Outcome<MovieDetail> {
        self.fetch(id, CacheMode::ReadWrite).await
    }

    pub async fn retry(&self) -> Outcome<MovieDetail> {
        self.fetch(self.current.load(Ordering::Acquire), CacheMode::ReadWrite)
            .await
    }

    /// Evict the current movie and fetch it again.
    pub async fn refresh(&self) -> Outcome<MovieDetail> {
        let id = self.current.load(Ordering::Acquire);
        if let Some(cache) = self.coordinator.cache() {
            cache.remove(&Self::cache_key(id));
        }
        self.fetch(id, CacheMode::Refresh).await
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = self.coordinator.cache() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::surfaces::testing::{FakeCatalog, sample_detail};

    const IMAGES: &str = "https://image.tmdb.org/t/p";

    fn details(source: Arc<FakeCatalog>) -> Details {
        Details::new(
            source,
            TtlCache::new("details", CachePolicy::DETAILS),
            IMAGES,
            RetryPolicy::none(),
        )
    }

    #[test]
    fn derived_fields() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let view = MovieView::build(sample_detail(27205), IMAGES, today);

        assert_eq!(view.year, Some(2010));
        assert_eq!(view.formatted_runtime.as_deref(), Some("2h 28m"));
        assert_eq!(
            view.poster_url.as_deref(),
            Some("https://image.tmdb.org/t/p/w500/poster.jpg")
        );
        assert_eq!(
            view.backdrop_url.as_deref(),
            Some("https://image.tmdb.org/t/p/original/backdrop.jpg")
        );
        assert_eq!(view.rating_formatted, "8.4/10");
        assert_eq!(view.rating_percentage, 84);
        assert_eq!(view.director.as_ref().unwrap().name, "Christopher Nolan");
        assert_eq!(view.main_cast.len(), 8);
        assert_eq!(view.trailer.as_ref().unwrap().key, "YoHD9XEInc0");
        assert!(view.is_released);
        assert_eq!(view.release_date_formatted.as_deref(), Some("July 15, 2010"));
    }

    #[test]
    fn unrated_and_unreleased() {
        let mut detail = sample_detail(1);
        detail.vote_average = 0.0;
        detail.release_date = "2030-05-01".to_owned();
        detail.runtime = None;
        let view = MovieView::build(detail, IMAGES, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(view.rating_formatted, "No rating");
        assert_eq!(view.rating_percentage, 0);
        assert!(!view.is_released);
        assert_eq!(view.formatted_runtime, None);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_id_fails_without_request() {
        let source = Arc::new(FakeCatalog::new(1));
        let details = details(source.clone());
        let out = details.load(0).await;
        assert!(matches!(out, Outcome::Failed(ApiError::Validation(_))));
        assert_eq!(details.state().error.unwrap().message, "Movie ID is required");
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_evicts_and_refetches() {
        let source = Arc::new(FakeCatalog::new(1));
        let details = details(source.clone());

        details.load(27205).await;
        details.load(27205).await;
        assert_eq!(source.calls(), 1);
        assert!(details.state().is_loaded());

        details.refresh().await;
        assert_eq!(source.calls(), 2);
        assert_eq!(details.state().movie_id, Some(27205));
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_clears_movie() {
        let source = Arc::new(FakeCatalog::new(1));
        let details = details(source.clone());
        details.load(1).await;

        source.fail_next(ApiError::NotFound);
        details.load(2).await;
        let state = details.state();
        assert!(state.movie.is_none());
        assert_eq!(state.error.unwrap().message, "Requested resource not found.");

        details.retry().await;
        assert!(details.state().is_loaded());
    }
}
