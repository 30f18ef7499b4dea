//! Catalog API collaborator (TMDB).

pub mod api;
pub mod errors;
pub mod filters;
pub mod json;
pub mod models;

pub use api::TmdbClient;
pub use errors::{ApiError, ErrorInfo};
pub use filters::DiscoverFilters;
pub use models::{GenreList, MovieDetail, MoviePage, MovieSummary};

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeWindow {
    #[default]
    Day,
    Week,
}

impl TimeWindow {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
        }
    }
}

/// Fixed list endpoints. `discover` is separate since it takes a filter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "endpoint", rename_all = "kebab-case")]
pub enum ListEndpoint {
    Trending { window: TimeWindow },
    Popular,
    TopRated,
    Upcoming,
    NowPlaying,
    ByGenre { genre_id: u32 },
}

impl ListEndpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Trending { .. } => "trending",
            Self::Popular => "popular",
            Self::TopRated => "top-rated",
            Self::Upcoming => "upcoming",
            Self::NowPlaying => "now-playing",
            Self::ByGenre { .. } => "by-genre",
        }
    }
}

impl fmt::Display for ListEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Trending { window } => write!(f, "trending/{}", window.as_str()),
            Self::ByGenre { genre_id } => write!(f, "by-genre/{genre_id}"),
            other => f.write_str(other.name()),
        }
    }
}

/// The catalog operations the surfaces depend on.
///
/// [`TmdbClient`] is the production implementation; tests substitute fakes.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list(&self, endpoint: ListEndpoint, page: u32) -> Result<MoviePage, ApiError>;

    async fn discover(&self, filters: &DiscoverFilters, page: u32) -> Result<MoviePage, ApiError>;

    async fn search(&self, query: &str, page: u32) -> Result<MoviePage, ApiError>;

    async fn detail(&self, id: u64) -> Result<MovieDetail, ApiError>;

    async fn genres(&self) -> Result<GenreList, ApiError>;
}

/// Full image URL for an upstream artwork path, or `None` when there is no artwork.
pub fn image_url(base: &str, path: Option<&str>, size: &str) -> Option<String> {
    let path = path.filter(|p| !p.is_empty())?;
    Some(format!("{}/{size}{path}", base.trim_end_matches('/')))
}
