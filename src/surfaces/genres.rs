//! The genre catalog, with display colors and id lookups.
//!
//! The list changes rarely, so besides the in-memory TTL cache it is kept as
//! a timestamped snapshot in the durable store and reused across runs.

use crate::cache::{CacheKey, TtlCache};
use crate::fetch::{CacheMode, Outcome, RequestCoordinator, RequestState, RetryPolicy};
use crate::storage::{LocalStore, keys};
use crate::tmdb::{CatalogSource, GenreList};
use crate::utils::fold;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub const SNAPSHOT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const FALLBACK_COLOR: &str = "#90A4AE";

const GENRE_COLORS: &[(u32, &str)] = &[
    (28, "#FF6B6B"),
    (12, "#4ECDC4"),
    (16, "#45B7D1"),
    (35, "#FFA726"),
    (80, "#8E24AA"),
    (99, "#6D4C41"),
    (18, "#F06292"),
    (10751, "#81C784"),
    (14, "#BA68C8"),
    (36, "#A1887F"),
    (27, "#E57373"),
    (10402, "#FFB74D"),
    (9648, "#7986CB"),
    (10749, "#F48FB1"),
    (878, "#64B5F6"),
    (53, "#FF8A65"),
    (10752, "#8D6E63"),
    (37, "#D4B896"),
];

pub fn genre_color(id: u32) -> &'static str {
    GENRE_COLORS
        .iter()
        .find(|(gid, _)| *gid == id)
        .map_or(FALLBACK_COLOR, |(_, color)| color)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreInfo {
    pub id: u32,
    pub name: String,
    pub color: String,
}

/// What goes into the durable store.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    data: Vec<GenreInfo>,
    /// Milliseconds since the Unix epoch.
    timestamp: i64,
}

impl Snapshot {
    /// Time since the snapshot was taken. A timestamp in the future counts as zero.
    fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.timestamp).max(0) as u64)
    }

    fn is_fresh(&self, now_ms: i64) -> bool {
        self.age(now_ms) < SNAPSHOT_TTL
    }
}

fn decorate(list: GenreList) -> Vec<GenreInfo> {
    list.genres
        .into_iter()
        .map(|g| GenreInfo {
            color: genre_color(g.id).to_owned(),
            id: g.id,
            name: g.name,
        })
        .collect()
}

pub struct Genres {
    source: Arc<dyn CatalogSource>,
    store: LocalStore,
    coordinator: RequestCoordinator<Vec<GenreInfo>>,
}

impl Genres {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        cache: TtlCache<Vec<GenreInfo>>,
        store: LocalStore,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            source,
            store,
            coordinator: RequestCoordinator::new("genres", cache, policy),
        }
    }

    fn key() -> CacheKey {
        CacheKey::raw("genres")
    }

    pub fn state(&self) -> RequestState<Vec<GenreInfo>> {
        self.coordinator.state()
    }

    pub fn genres(&self) -> Vec<GenreInfo> {
        self.coordinator.state().data.unwrap_or_default()
    }

    async fn fetch(&self, mode: CacheMode) -> Outcome<Vec<GenreInfo>> {
        if mode == CacheMode::ReadWrite
            && let Some(cache) = self.coordinator.cache()
            && !cache.contains(&Self::key())
            && let Some(snapshot) = self.store.read_opt::<Snapshot>(keys::GENRES)
        {
            let now_ms = Utc::now().timestamp_millis();
            if snapshot.is_fresh(now_ms) {
                let age = snapshot.age(now_ms);
                debug!(count = snapshot.data.len(), ?age, "genres restored from snapshot");
                cache.set_with_age(Self::key(), snapshot.data, age);
            }
        }

        let source = &self.source;
        let outcome = self
            .coordinator
            .run(Self::key(), mode, || async move {
                source.genres().await.map(decorate)
            })
            .await;

        if let Outcome::Fresh(genres) = &outcome {
            self.store.write(
                keys::GENRES,
                &Snapshot {
                    data: genres.clone(),
                    timestamp: Utc::now().timestamp_millis(),
                },
            );
        }
        outcome
    }

    /// The genre list from memory, the stored snapshot, or the network, in that order.
    pub async fn load(&self) -> Outcome<Vec<GenreInfo>> {
        self.fetch(CacheMode::ReadWrite).await
    }

    pub async fn retry(&self) -> Outcome<Vec<GenreInfo>> {
        self.fetch(CacheMode::ReadWrite).await
    }

    /// Drop the stored snapshot and fetch from the network.
    pub async fn refresh(&self) -> Outcome<Vec<GenreInfo>> {
        self.store.remove(keys::GENRES);
        self.fetch(CacheMode::Refresh).await
    }

    pub fn clear_cache(&self) {
        self.store.remove(keys::GENRES);
        if let Some(cache) = self.coordinator.cache() {
            cache.clear();
        }
    }

    pub fn by_id(&self, id: u32) -> Option<GenreInfo> {
        self.genres().into_iter().find(|g| g.id == id)
    }

    /// Genres among `ids`, in catalog order.
    pub fn by_ids(&self, ids: &[u32]) -> Vec<GenreInfo> {
        self.genres()
            .into_iter()
            .filter(|g| ids.contains(&g.id))
            .collect()
    }

    /// Names joined by `separator`; past `max_items` the rest collapse into "+N more".
    pub fn format_list(&self, ids: &[u32], separator: &str, max_items: usize) -> String {
        let names: Vec<String> = self.by_ids(ids).into_iter().map(|g| g.name).collect();
        if names.len() <= max_items {
            return names.join(separator);
        }
        format!(
            "{} +{} more",
            names[..max_items].join(separator),
            names.len() - max_items
        )
    }

    pub fn search(&self, query: &str) -> Vec<GenreInfo> {
        let needle = fold(query.trim());
        if needle.is_empty() {
            return Vec::new();
        }
        self.genres()
            .into_iter()
            .filter(|g| fold(&g.name).contains(&needle))
            .collect()
    }
}
