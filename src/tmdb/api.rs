//! HTTP client for the TMDB v3 API.

use super::filters::DiscoverFilters;
use super::json::decode_body;
use super::models::{GenreList, MovieDetail, MoviePage};
use super::{ApiError, CatalogSource, ListEndpoint};
use crate::utils::log_if_slow;
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

const DETAIL_APPENDS: &str = "videos,credits,reviews,similar,recommendations";
const SLOW_REQUEST: Duration = Duration::from_secs(2);

pub struct TmdbClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
}

impl TmdbClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cinefetch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            limiter: None,
        })
    }

    /// Cap outbound requests at `per_second`. Zero disables the limiter.
    pub fn with_rate_limit(mut self, per_second: u32) -> Self {
        self.limiter = NonZeroU32::new(per_second)
            .map(|n| Arc::new(RateLimiter::direct(Quota::per_second(n))));
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T, ApiError> {
        let Some(api_key) = &self.api_key else {
            return Err(ApiError::Unauthorized);
        };

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let url = format!("{}{path}", self.base_url);
        let start = Instant::now();
        trace!(%url, ?query, "catalog request");

        let response = self
            .http
            .get(&url)
            .query(&[("api_key", api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status().as_u16();
        if let Some(err) = ApiError::from_status(status) {
            debug!(%url, status, "catalog request rejected");
            return Err(err);
        }

        let body = response
            .text()
            .await
            .map_err(ApiError::from_reqwest)?;
        log_if_slow(start, SLOW_REQUEST, path);
        decode_body(&body, status, &url)
    }
}

fn page_param(page: u32) -> (String, String) {
    ("page".to_owned(), page.max(1).to_string())
}

#[async_trait]
impl CatalogSource for TmdbClient {
    async fn list(&self, endpoint: ListEndpoint, page: u32) -> Result<MoviePage, ApiError> {
        match endpoint {
            ListEndpoint::Trending { window } => {
                self.get(
                    &format!("/trending/movie/{}", window.as_str()),
                    &[page_param(page)],
                )
                .await
            }
            ListEndpoint::Popular => self.get("/movie/popular", &[page_param(page)]).await,
            ListEndpoint::TopRated => self.get("/movie/top_rated", &[page_param(page)]).await,
            ListEndpoint::Upcoming => self.get("/movie/upcoming", &[page_param(page)]).await,
            ListEndpoint::NowPlaying => self.get("/movie/now_playing", &[page_param(page)]).await,
            ListEndpoint::ByGenre { genre_id } => {
                self.discover(&DiscoverFilters::genres([genre_id]), page)
                    .await
            }
        }
    }

    async fn discover(&self, filters: &DiscoverFilters, page: u32) -> Result<MoviePage, ApiError> {
        let mut query = filters.to_query();
        query.push(page_param(page));
        self.get("/discover/movie", &query).await
    }

    async fn search(&self, query: &str, page: u32) -> Result<MoviePage, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::Validation("Search query is required".to_owned()));
        }
        let params = [
            ("query".to_owned(), query.to_owned()),
            page_param(page),
            ("include_adult".to_owned(), "false".to_owned()),
        ];
        self.get("/search/movie", &params).await
    }

    async fn detail(&self, id: u64) -> Result<MovieDetail, ApiError> {
        if id == 0 {
            return Err(ApiError::Validation("Movie ID is required".to_owned()));
        }
        let params = [("append_to_response".to_owned(), DETAIL_APPENDS.to_owned())];
        self.get(&format!("/movie/{id}"), &params).await
    }

    async fn genres(&self) -> Result<GenreList, ApiError> {
        self.get("/genre/movie/list", &[]).await
    }
}
