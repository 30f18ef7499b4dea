//! In-process catalog used by the surface tests.

use crate::tmdb::models::{Genre, MovieDetail};
use crate::tmdb::{ApiError, CatalogSource, DiscoverFilters, GenreList, ListEndpoint, MoviePage};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

pub const PAGE_SIZE: u64 = 5;

/// Serves `PAGE_SIZE` distinct movies per page; ids are `page * 100 + n`.
pub struct FakeCatalog {
    total_pages: u32,
    latency: Duration,
    calls: AtomicU32,
    failures: Mutex<VecDeque<ApiError>>,
    requests: Mutex<Vec<String>>,
}

impl FakeCatalog {
    pub fn new(total_pages: u32) -> Self {
        Self {
            total_pages,
            latency: Duration::ZERO,
            calls: AtomicU32::new(0),
            failures: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, err: ApiError) {
        self.failures.lock().unwrap().push_back(err);
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn page(&self, page: u32) -> MoviePage {
        let results = (0..PAGE_SIZE)
            .map(|n| {
                let id = u64::from(page) * 100 + n;
                serde_json::from_value(json!({
                    "id": id,
                    "title": format!("Movie {id}"),
                    "release_date": "2020-06-01",
                    "vote_average": 7.5,
                    "genre_ids": [28],
                }))
                .unwrap()
            })
            .collect();
        MoviePage {
            page,
            results,
            total_pages: self.total_pages,
            total_results: u64::from(self.total_pages) * PAGE_SIZE,
        }
    }

    async fn respond<T>(&self, request: String, value: impl FnOnce() -> T) -> Result<T, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(err) => Err(err),
            None => Ok(value()),
        }
    }
}

#[async_trait]
impl CatalogSource for FakeCatalog {
    async fn list(&self, endpoint: ListEndpoint, page: u32) -> Result<MoviePage, ApiError> {
        self.respond(format!("{endpoint}?page={page}"), || self.page(page))
            .await
    }

    async fn discover(&self, filters: &DiscoverFilters, page: u32) -> Result<MoviePage, ApiError> {
        let query: Vec<String> = filters
            .to_query()
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        self.respond(format!("discover?{}&page={page}", query.join("&")), || {
            self.page(page)
        })
        .await
    }

    async fn search(&self, query: &str, page: u32) -> Result<MoviePage, ApiError> {
        self.respond(format!("search?query={query}&page={page}"), || self.page(page))
            .await
    }

    async fn detail(&self, id: u64) -> Result<MovieDetail, ApiError> {
        self.respond(format!("movie/{id}"), || sample_detail(id))
            .await
    }

    async fn genres(&self) -> Result<GenreList, ApiError> {
        self.respond("genres".to_owned(), || GenreList {
            genres: vec![
                Genre {
                    id: 28,
                    name: "Action".to_owned(),
                },
                Genre {
                    id: 35,
                    name: "Comedy".to_owned(),
                },
                Genre {
                    id: 18,
                    name: "Drama".to_owned(),
                },
                Genre {
                    id: 99999,
                    name: "Experimental".to_owned(),
                },
            ],
        })
        .await
    }
}

pub fn sample_detail(id: u64) -> MovieDetail {
    let cast: Vec<_> = (0..12)
        .map(|n| json!({ "id": n, "name": format!("Actor {n}"), "character": "", "order": n }))
        .collect();
    serde_json::from_value(json!({
        "id": id,
        "title": "Inception",
        "runtime": 148,
        "release_date": "2010-07-15",
        "vote_average": 8.36,
        "vote_count": 35000,
        "poster_path": "/poster.jpg",
        "backdrop_path": "/backdrop.jpg",
        "genres": [{"id": 28, "name": "Action"}],
        "credits": {
            "cast": cast,
            "crew": [
                {"id": 90, "name": "Emma Thomas", "job": "Producer"},
                {"id": 91, "name": "Christopher Nolan", "job": "Director"}
            ]
        },
        "videos": {"results": [
            {"key": "vimeo1", "site": "Vimeo", "type": "Trailer"},
            {"key": "tease", "site": "YouTube", "type": "Teaser"},
            {"key": "YoHD9XEInc0", "site": "YouTube", "type": "Trailer"}
        ]}
    }))
    .unwrap()
}
