//! HTTP client for the Watchmode streaming-availability API.

use super::AvailabilitySource;
use super::models::{
    DataSource, ServiceInfo, SourceType, StreamingBundle, StreamingOption, parse_price, search_url,
};
use crate::tmdb::json::decode_body;
use crate::tmdb::{ApiError, MovieSummary};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};

#[derive(Debug, Deserialize)]
struct TitleSearch {
    #[serde(default)]
    title_results: Vec<TitleMatch>,
}

#[derive(Debug, Deserialize)]
struct TitleMatch {
    id: u64,
    #[serde(default)]
    year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct SourceRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    price: serde_json::Value,
    #[serde(default)]
    web_url: Option<String>,
}

pub struct WatchmodeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl WatchmodeClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, ApiError> {
        let Some(api_key) = &self.api_key else {
            return Err(ApiError::Unauthorized);
        };
        let url = format!("{}{path}", self.base_url);
        trace!(%url, ?query, "availability request");

        let response = self
            .http
            .get(&url)
            .query(&[("apikey", api_key.as_str())])
            .query(query)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let status = response.status().as_u16();
        if let Some(err) = ApiError::from_status(status) {
            return Err(err);
        }
        let body = response
            .text()
            .await
            .map_err(ApiError::from_reqwest)?;
        decode_body(&body, status, &url)
    }

    /// Resolve the collaborator's title id, preferring a match within a year
    /// of the catalog release year.
    async fn find_title(&self, movie: &MovieSummary) -> Result<u64, ApiError> {
        let search: TitleSearch = self
            .get(
                "/search/",
                &[
                    ("search_field", "name"),
                    ("search_value", movie.title.as_str()),
                    ("search_type", "movie"),
                ],
            )
            .await?;

        let year = movie.release_year();
        let best = year
            .and_then(|y| {
                search
                    .title_results
                    .iter()
                    .find(|r| r.year.is_some_and(|ry| (ry - y).abs() <= 1))
            })
            .or_else(|| search.title_results.first());

        match best {
            Some(m) => Ok(m.id),
            None => {
                debug!(title = %movie.title, "no title match");
                Err(ApiError::NotFound)
            }
        }
    }
}

/// Reshape upstream source records into the three buckets.
fn bundle_from_sources(records: Vec<SourceRecord>, title: &str) -> StreamingBundle {
    let mut bundle = StreamingBundle::empty(DataSource::Live);
    for record in records {
        let Some(name) = record.name.filter(|n| !n.trim().is_empty()) else {
            continue;
        };
        let kind = SourceType::from_upstream(record.kind.as_deref());
        let service = ServiceInfo::resolve(&name, kind);
        let url = record
            .web_url
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| search_url(&service.name, title));
        bundle.push(StreamingOption {
            service,
            kind,
            price: parse_price(&record.price),
            url,
        });
    }
    bundle
}

#[async_trait]
impl AvailabilitySource for WatchmodeClient {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn sources(&self, movie: &MovieSummary) -> Result<StreamingBundle, ApiError> {
        let title_id = self.find_title(movie).await?;
        let records: Vec<SourceRecord> = self
            .get(
                &format!("/title/{title_id}/sources/"),
                &[("regions", "US"), ("source_types", "sub,free,buy,rent")],
            )
            .await?;
        Ok(bundle_from_sources(records, &movie.title))
    }
}
