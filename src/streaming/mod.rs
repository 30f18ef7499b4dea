//! Streaming-availability collaborator and its simulated fallback.

pub mod api;
pub mod models;
pub mod simulate;

pub use api::WatchmodeClient;
pub use models::{DataSource, ServiceInfo, SourceType, StreamingBundle, StreamingOption};

use crate::tmdb::{ApiError, MovieSummary};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

/// A live source of streaming availability.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Whether live lookups can be attempted at all.
    fn is_configured(&self) -> bool;

    async fn sources(&self, movie: &MovieSummary) -> Result<StreamingBundle, ApiError>;
}

/// Resolve availability for `movie`, substituting simulated data when the
/// live source is unconfigured or fails. Only a missing movie id is an error.
pub async fn lookup(
    source: &dyn AvailabilitySource,
    movie: &MovieSummary,
) -> Result<StreamingBundle, ApiError> {
    if movie.id == 0 {
        return Err(ApiError::Validation("Movie ID is required".to_owned()));
    }

    let today = Utc::now().date_naive();
    if !source.is_configured() {
        debug!(movie_id = movie.id, "availability source unconfigured, simulating");
        return Ok(simulate::simulate(movie, today));
    }

    match source.sources(movie).await {
        Ok(bundle) => Ok(bundle),
        Err(ApiError::Cancelled) => Err(ApiError::Cancelled),
        Err(err) => {
            warn!(movie_id = movie.id, error = %err, "live availability lookup failed, simulating");
            Ok(simulate::simulate(movie, today))
        }
    }
}

/// Names of every service with a known display entry.
pub fn supported_services() -> impl Iterator<Item = &'static str> {
    models::KNOWN_SERVICES.iter().map(|s| s.name)
}
