//! Search history and query suggestions.

use super::{LocalStore, Persisted, keys};
use crate::utils::fold;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const MAX_HISTORY: usize = 20;
pub const MIN_QUERY_LEN: usize = 2;

const MAX_HISTORY_SUGGESTIONS: usize = 5;
const MAX_POPULAR_SUGGESTIONS: usize = 4;
const MAX_SUGGESTIONS: usize = 8;

pub const POPULAR_SEARCHES: &[&str] = &[
    "Spider-Man",
    "Batman",
    "Avengers",
    "Marvel",
    "Disney",
    "Horror movies",
    "Comedy",
    "Action",
    "Thriller",
    "Sci-fi",
    "Christopher Nolan",
    "Martin Scorsese",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredEntry")]
pub struct HistoryEntry {
    pub query: String,
    /// Milliseconds since the Unix epoch; 0 for legacy entries.
    pub timestamp: i64,
    #[serde(rename = "resultCount")]
    pub result_count: u64,
}

/// Older history stored bare query strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Legacy(String),
    Full {
        query: String,
        #[serde(default)]
        timestamp: i64,
        #[serde(rename = "resultCount", default)]
        result_count: u64,
    },
}

impl From<StoredEntry> for HistoryEntry {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Legacy(query) => Self {
                query,
                timestamp: 0,
                result_count: 0,
            },
            StoredEntry::Full {
                query,
                timestamp,
                result_count,
            } => Self {
                query,
                timestamp,
                result_count,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    History,
    Popular,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Suggestion {
    pub query: String,
    pub kind: SuggestionKind,
    pub result_count: Option<u64>,
}

pub struct SearchHistory {
    entries: Persisted<Vec<HistoryEntry>>,
}

impl SearchHistory {
    pub fn new(store: &LocalStore) -> Self {
        Self {
            entries: Persisted::new(store, keys::SEARCH_HISTORY, Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.get()
    }

    pub fn len(&self) -> usize {
        self.entries.with(Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move `query` to the front, replacing any earlier entry for it.
    /// Queries shorter than two characters are ignored.
    pub fn record(&self, query: &str, result_count: u64) -> bool {
        let query = query.trim();
        if query.chars().count() < MIN_QUERY_LEN {
            return false;
        }
        let entry = HistoryEntry {
            query: query.to_owned(),
            timestamp: Utc::now().timestamp_millis(),
            result_count,
        };
        self.entries.update(|current| {
            std::iter::once(entry)
                .chain(current.iter().filter(|e| e.query != query).cloned())
                .take(MAX_HISTORY)
                .collect()
        })
    }

    pub fn clear(&self) -> bool {
        self.entries.remove()
    }

    pub fn suggestions(&self, input: &str) -> Vec<Suggestion> {
        self.entries.with(|entries| suggest(entries, input))
    }
}

/// Up to five matching history entries followed by up to four matching
/// popular searches, eight at most.
pub fn suggest(history: &[HistoryEntry], input: &str) -> Vec<Suggestion> {
    let needle = fold(input.trim());
    if needle.is_empty() {
        return Vec::new();
    }

    let from_history = history
        .iter()
        .filter(|e| fold(&e.query).contains(&needle))
        .take(MAX_HISTORY_SUGGESTIONS)
        .map(|e| Suggestion {
            query: e.query.clone(),
            kind: SuggestionKind::History,
            result_count: Some(e.result_count),
        });

    let popular = POPULAR_SEARCHES
        .iter()
        .filter(|p| fold(p).contains(&needle))
        .take(MAX_POPULAR_SUGGESTIONS)
        .map(|p| Suggestion {
            query: (*p).to_owned(),
            kind: SuggestionKind::Popular,
            result_count: None,
        });

    from_history.chain(popular).take(MAX_SUGGESTIONS).collect()
}
