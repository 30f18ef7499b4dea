//! One type per logical query surface.
//!
//! Each surface owns its coordinator and publishes what it shows on a
//! `watch` channel. Caches and collaborators are injected at construction.

pub mod details;
pub mod discovery;
pub mod feed;
pub mod genres;
pub mod listing;
pub mod search;
pub mod streaming;

#[cfg(test)]
pub(crate) mod testing;

pub use details::{DetailState, Details, MovieView};
pub use discovery::{Discovery, Preset};
pub use feed::ListState;
pub use genres::{GenreInfo, Genres};
pub use listing::{Dashboard, Listing};
pub use search::{SearchMetrics, SearchOptions, SearchSession};
pub use streaming::Availability;
