//! Query parameters for the discover endpoint.

use serde::{Serialize, Serializer};

pub const DEFAULT_SORT: &str = "popularity.desc";

/// Filters accepted by `/discover/movie`.
///
/// Serializes to exactly the upstream query parameters, with unset fields
/// omitted, so the same value drives both the request and its cache key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoverFilters {
    pub sort_by: String,
    #[serde(
        skip_serializing_if = "Vec::is_empty",
        serialize_with = "comma_joined"
    )]
    pub with_genres: Vec<u32>,
    #[serde(
        rename = "primary_release_date.gte",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_date_gte: Option<String>,
    #[serde(
        rename = "primary_release_date.lte",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_date_lte: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_release_year: Option<i32>,
    #[serde(
        rename = "vote_average.gte",
        skip_serializing_if = "Option::is_none"
    )]
    pub vote_average_gte: Option<f64>,
    #[serde(
        rename = "vote_count.gte",
        skip_serializing_if = "Option::is_none"
    )]
    pub vote_count_gte: Option<u32>,
    pub include_adult: bool,
}

fn comma_joined<S: Serializer>(ids: &[u32], serializer: S) -> Result<S::Ok, S::Error> {
    let joined = ids
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(",");
    serializer.serialize_str(&joined)
}

impl Default for DiscoverFilters {
    fn default() -> Self {
        Self {
            sort_by: DEFAULT_SORT.to_owned(),
            with_genres: Vec::new(),
            release_date_gte: None,
            release_date_lte: None,
            primary_release_year: None,
            vote_average_gte: None,
            vote_count_gte: None,
            include_adult: false,
        }
    }
}

impl DiscoverFilters {
    pub fn genres(ids: impl IntoIterator<Item = u32>) -> Self {
        Self {
            with_genres: ids.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn year(year: i32) -> Self {
        Self {
            primary_release_year: Some(year),
            sort_by: "vote_average.desc".to_owned(),
            ..Self::default()
        }
    }

    pub fn rating(min_rating: f64, min_votes: u32) -> Self {
        Self {
            vote_average_gte: Some(min_rating),
            vote_count_gte: Some(min_votes),
            sort_by: "vote_average.desc".to_owned(),
            ..Self::default()
        }
    }

    /// Number of fields that differ from the defaults.
    pub fn active_count(&self) -> usize {
        let defaults = Self::default();
        [
            self.sort_by != defaults.sort_by,
            !self.with_genres.is_empty(),
            self.release_date_gte.is_some(),
            self.release_date_lte.is_some(),
            self.primary_release_year.is_some(),
            self.vote_average_gte.is_some(),
            self.vote_count_gte.is_some(),
            self.include_adult,
        ]
        .into_iter()
        .filter(|&active| active)
        .count()
    }

    /// Query pairs for the request, in a stable order.
    pub fn to_query(&self) -> Vec<(String, String)> {
        let Ok(serde_json::Value::Object(map)) = serde_json::to_value(self) else {
            return Vec::new();
        };
        let mut pairs: Vec<(String, String)> = map
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();
        pairs.sort();
        pairs
    }
}
