//! A scripted catalog for exercising surfaces end to end without a network.

use async_trait::async_trait;
use cinefetch::tmdb::models::{Genre, MovieDetail};
use cinefetch::tmdb::{
    ApiError, CatalogSource, DiscoverFilters, GenreList, ListEndpoint, MoviePage,
};
use serde_json::json;
use std::sync::Mutex;

pub const PAGE_SIZE: u64 = 5;

/// Every list endpoint serves `PAGE_SIZE` movies per page with ids
/// `page * 10 + n`, under fixed totals.
pub struct StubCatalog {
    total_pages: u32,
    total_results: u64,
    requests: Mutex<Vec<String>>,
}

impl StubCatalog {
    pub fn new(total_pages: u32, total_results: u64) -> Self {
        Self {
            total_pages,
            total_results,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: String) {
        self.requests.lock().unwrap().push(request);
    }

    fn page(&self, page: u32) -> MoviePage {
        let results = (0..PAGE_SIZE)
            .map(|n| {
                let id = u64::from(page) * 10 + n;
                serde_json::from_value(json!({
                    "id": id,
                    "title": format!("Movie {id}"),
                    "release_date": "2019-03-08",
                    "vote_average": 6.8,
                }))
                .unwrap()
            })
            .collect();
        MoviePage {
            page,
            results,
            total_pages: self.total_pages,
            total_results: self.total_results,
        }
    }
}

#[async_trait]
impl CatalogSource for StubCatalog {
    async fn list(&self, endpoint: ListEndpoint, page: u32) -> Result<MoviePage, ApiError> {
        self.record(format!("{endpoint}?page={page}"));
        Ok(self.page(page))
    }

    async fn discover(&self, _filters: &DiscoverFilters, page: u32) -> Result<MoviePage, ApiError> {
        self.record(format!("discover?page={page}"));
        Ok(self.page(page))
    }

    async fn search(&self, query: &str, page: u32) -> Result<MoviePage, ApiError> {
        self.record(format!("search?query={query}&page={page}"));
        Ok(self.page(page))
    }

    async fn detail(&self, id: u64) -> Result<MovieDetail, ApiError> {
        self.record(format!("movie/{id}"));
        let title = if id == 42 {
            "X".to_owned()
        } else {
            format!("Movie {id}")
        };
        Ok(serde_json::from_value(json!({
            "id": id,
            "title": title,
            "release_date": "2001-01-01",
            "vote_average": 7.1,
        }))
        .unwrap())
    }

    async fn genres(&self) -> Result<GenreList, ApiError> {
        self.record("genres".to_owned());
        Ok(GenreList {
            genres: vec![
                Genre {
                    id: 28,
                    name: "Action".to_owned(),
                },
                Genre {
                    id: 10751,
                    name: "Family".to_owned(),
                },
            ],
        })
    }
}
