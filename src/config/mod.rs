//! Runtime configuration, read from the environment.
//!
//! Every field maps to an upper-case environment variable of the same name
//! (`TMDB_API_KEY`, `REQUEST_TIMEOUT`, ...). A `.env` file is loaded first by
//! the binary, so local overrides work without exporting anything.

use anyhow::Context;
use figment::Figment;
use figment::providers::Env;
use fundu::{DurationParser, TimeUnit};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

#[derive(Deserialize, custom_debug_derive::Debug)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Catalog API key. Catalog calls fail as unauthorized without it.
    #[serde(default)]
    #[debug(with = crate::fmt::redacted)]
    pub tmdb_api_key: Option<String>,
    #[serde(default = "default_tmdb_base_url")]
    pub tmdb_base_url: String,
    #[serde(default = "default_tmdb_image_base_url")]
    pub tmdb_image_base_url: String,

    /// Streaming-availability key. Without it availability is simulated.
    #[serde(default)]
    #[debug(with = crate::fmt::redacted)]
    pub watchmode_api_key: Option<String>,
    #[serde(default = "default_watchmode_base_url")]
    pub watchmode_base_url: String,

    /// Per-call timeout, e.g. `10s`, `2500ms` or a bare number of seconds.
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration"
    )]
    pub request_timeout: Duration,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_second: u32,

    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_tmdb_base_url() -> String {
    "https://api.themoviedb.org/3".to_owned()
}

fn default_tmdb_image_base_url() -> String {
    "https://image.tmdb.org/t/p".to_owned()
}

fn default_watchmode_base_url() -> String {
    "https://api.watchmode.com/v1".to_owned()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_rate_limit() -> u32 {
    40
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from(".cinefetch")
}

/// Parse a human duration such as `10s`, `1.5m` or `250ms`.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let parser = DurationParser::with_time_units(&[
        TimeUnit::MilliSecond,
        TimeUnit::Second,
        TimeUnit::Minute,
    ]);
    let parsed = parser
        .parse(raw.trim())
        .map_err(|e| format!("invalid duration {raw:?}: {e}"))?;
    Duration::try_from(parsed).map_err(|e| format!("invalid duration {raw:?}: {e}"))
}

fn deserialize_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
        Raw::Text(text) => parse_duration(&text).map_err(serde::de::Error::custom),
    }
}

fn non_blank(key: &Option<String>) -> bool {
    key.as_deref().is_some_and(|k| !k.trim().is_empty())
}

impl Config {
    /// Read the process environment.
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(Figment::new().merge(Env::raw()))
    }

    pub fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Self = figment.extract().context("Failed to load config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("TMDB_BASE_URL", &self.tmdb_base_url),
            ("TMDB_IMAGE_BASE_URL", &self.tmdb_image_base_url),
            ("WATCHMODE_BASE_URL", &self.watchmode_base_url),
        ] {
            Url::parse(value).with_context(|| format!("{name} is not a valid URL: {value}"))?;
        }
        anyhow::ensure!(
            self.rate_limit_per_second > 0,
            "RATE_LIMIT_PER_SECOND must be at least 1"
        );
        anyhow::ensure!(
            !self.request_timeout.is_zero(),
            "REQUEST_TIMEOUT must be greater than zero"
        );
        Ok(())
    }

    pub fn has_catalog_key(&self) -> bool {
        non_blank(&self.tmdb_api_key)
    }

    pub fn has_streaming_key(&self) -> bool {
        non_blank(&self.watchmode_api_key)
    }
}
