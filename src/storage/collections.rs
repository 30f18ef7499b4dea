//! User collections (favorites, watchlist) kept in the local store.

use super::{LocalStore, Persisted, keys};
use crate::tmdb::MovieSummary;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A movie saved into a collection, stamped with when it was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedMovie {
    #[serde(flatten)]
    pub movie: MovieSummary,
    /// Milliseconds since the Unix epoch.
    #[serde(rename = "dateAdded", default)]
    pub date_added: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SortKey {
    #[default]
    DateAdded,
    Title,
    Rating,
    Year,
}

/// An ordered, id-unique list of saved movies under one storage key.
pub struct Collection {
    items: Persisted<Vec<SavedMovie>>,
}

impl Collection {
    pub fn new(store: &LocalStore, key: &str) -> Self {
        Self {
            items: Persisted::new(store, key, Vec::new()),
        }
    }

    pub fn favorites(store: &LocalStore) -> Self {
        Self::new(store, keys::FAVORITES)
    }

    pub fn watchlist(store: &LocalStore) -> Self {
        Self::new(store, keys::WATCHLIST)
    }

    /// Follow writes made through other store handles.
    pub fn synced(self) -> Self {
        Self {
            items: self.items.synced(),
        }
    }

    pub fn items(&self) -> Vec<SavedMovie> {
        self.items.get()
    }

    pub fn len(&self) -> usize {
        self.items.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: u64) -> bool {
        self.items.with(|items| items.iter().any(|m| m.movie.id == id))
    }

    /// Add `movie` if absent, remove it if present. Returns whether it is
    /// now in the collection.
    pub fn toggle(&self, movie: &MovieSummary) -> bool {
        let present = self.contains(movie.id);
        let id = movie.id;
        let written = self.items.update(|items| {
            if present {
                items.iter().filter(|m| m.movie.id != id).cloned().collect()
            } else {
                let mut next = items.clone();
                next.push(SavedMovie {
                    movie: movie.clone(),
                    date_added: Utc::now().timestamp_millis(),
                });
                next
            }
        });
        // A failed write leaves the collection as it was.
        present != written
    }

    pub fn remove(&self, id: u64) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.items
            .update(|items| items.iter().filter(|m| m.movie.id != id).cloned().collect())
    }

    pub fn clear(&self) -> bool {
        self.items.remove()
    }

    pub fn sorted(&self, key: SortKey, descending: bool) -> Vec<SavedMovie> {
        let mut items = self.items();
        items.sort_by(|a, b| {
            let ord = match key {
                SortKey::DateAdded => a.date_added.cmp(&b.date_added),
                SortKey::Title => a.movie.title.to_lowercase().cmp(&b.movie.title.to_lowercase()),
                SortKey::Rating => a
                    .movie
                    .vote_average
                    .partial_cmp(&b.movie.vote_average)
                    .unwrap_or(Ordering::Equal),
                SortKey::Year => a.movie.release_year().cmp(&b.movie.release_year()),
            };
            if descending { ord.reverse() } else { ord }
        });
        items
    }

    pub fn average_rating(&self) -> Option<f64> {
        self.items.with(|items| {
            (!items.is_empty()).then(|| {
                items.iter().map(|m| m.movie.vote_average).sum::<f64>() / items.len() as f64
            })
        })
    }
}

/// Collection flags for one movie.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Membership {
    pub is_favorite: bool,
    pub is_in_watchlist: bool,
}

impl Membership {
    pub fn of(id: u64, favorites: &Collection, watchlist: &Collection) -> Self {
        Self {
            is_favorite: favorites.contains(id),
            is_in_watchlist: watchlist.contains(id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn movie(id: u64, title: &str) -> MovieSummary {
        serde_json::from_value(serde_json::json!({ "id": id, "title": title })).unwrap()
    }

    #[test]
    fn toggling_twice_removes() {
        let store = LocalStore::memory();
        let favorites = Collection::favorites(&store);
        let x = movie(42, "X");

        assert!(favorites.toggle(&x));
        let items = favorites.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].movie.id, 42);
        assert_eq!(items[0].movie.title, "X");
        assert!(items[0].date_added > 0);

        assert!(!favorites.toggle(&x));
        assert!(favorites.is_empty());
    }

    #[test]
    fn ids_stay_unique() {
        let store = LocalStore::memory();
        let watchlist = Collection::watchlist(&store);
        for id in [1, 2, 1, 3, 1] {
            watchlist.toggle(&movie(id, "m"));
        }
        let ids: Vec<u64> = watchlist.items().iter().map(|m| m.movie.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn persists_with_date_added_field() {
        let store = LocalStore::memory();
        Collection::favorites(&store).toggle(&movie(7, "Se7en"));

        let raw: serde_json::Value = store.read(keys::FAVORITES, serde_json::Value::Null);
        assert_eq!(raw[0]["id"], 7);
        assert!(raw[0]["dateAdded"].as_i64().is_some());

        let reopened = Collection::favorites(&store);
        assert!(reopened.contains(7));
    }

    #[test]
    fn failed_write_reports_unchanged() {
        let store = LocalStore::new(MemoryBackend::with_quota(32));
        let favorites = Collection::favorites(&store);
        assert!(!favorites.toggle(&movie(1, "A Very Long Title That Will Not Fit")));
        assert!(favorites.is_empty());
    }

    #[test]
    fn membership_and_sorting() {
        let store = LocalStore::memory();
        let favorites = Collection::favorites(&store);
        let watchlist = Collection::watchlist(&store);
        favorites.toggle(&movie(1, "beta"));
        favorites.toggle(&movie(2, "Alpha"));
        watchlist.toggle(&movie(2, "Alpha"));

        assert_eq!(
            Membership::of(2, &favorites, &watchlist),
            Membership {
                is_favorite: true,
                is_in_watchlist: true
            }
        );
        assert!(!Membership::of(1, &favorites, &watchlist).is_in_watchlist);

        let titles: Vec<String> = favorites
            .sorted(SortKey::Title, false)
            .into_iter()
            .map(|m| m.movie.title)
            .collect();
        assert_eq!(titles, ["Alpha", "beta"]);
    }
}
