//! Deterministic stand-in availability used when the live collaborator is
//! unconfigured or unreachable.
//!
//! The result depends only on the movie's own metadata and the reference
//! date, so repeated lookups always agree.

use super::models::{
    DataSource, KnownService, ServiceInfo, SourceType, StreamingBundle, StreamingOption,
    known_service, search_url,
};
use crate::tmdb::MovieSummary;
use chrono::{Datelike, NaiveDate};

const DEFAULT_YEAR: i32 = 2020;
const DEFAULT_RATING: f64 = 6.0;
const RENTAL_SERVICES: [&str; 4] = ["amazon-video", "apple-itunes", "google-play", "vudu"];
const FAMILY_GENRES: [u32; 2] = [10751, 16];

fn option(service: &KnownService, kind: SourceType, title: &str, price: Option<f64>) -> StreamingOption {
    StreamingOption {
        service: ServiceInfo::from(service),
        kind,
        price,
        url: search_url(service.name, title),
    }
}

fn push_known(bundle: &mut StreamingBundle, id: &str, title: &str) {
    if let Some(service) = known_service(id) {
        bundle.push(option(service, service.kind, title, None));
    }
}

pub fn simulate(movie: &MovieSummary, today: NaiveDate) -> StreamingBundle {
    let year = movie.release_year().unwrap_or(DEFAULT_YEAR);
    let rating = if movie.vote_average > 0.0 {
        movie.vote_average
    } else {
        DEFAULT_RATING
    };
    let is_recent = year >= today.year() - 2;
    let is_popular = rating >= 7.0;
    let is_family = movie.title.to_lowercase().contains("disney")
        || movie.genre_ids.iter().any(|g| FAMILY_GENRES.contains(g));

    let mut bundle = StreamingBundle::empty(DataSource::Simulated);

    if is_popular {
        push_known(&mut bundle, "netflix", &movie.title);
    }
    if is_recent {
        push_known(&mut bundle, "amazon-prime", &movie.title);
    }
    if is_family {
        push_known(&mut bundle, "disney-plus", &movie.title);
    }

    let rent_price = 3.99 + if is_recent { 2.0 } else { 0.0 };
    for id in RENTAL_SERVICES {
        if let Some(service) = known_service(id) {
            bundle.push(option(service, SourceType::Rent, &movie.title, Some(rent_price)));
        }
    }

    if year < DEFAULT_YEAR || rating < 7.0 {
        push_known(&mut bundle, "tubi", &movie.title);
    }

    bundle
}
