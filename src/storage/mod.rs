//! Local persistence: a synchronous JSON key-value store with opt-in change
//! notification between handles.
//!
//! Every handle created with [`LocalStore::handle`] shares the backend but
//! has its own origin, the way browser tabs share one origin's storage.
//! Writes are whole-value and last-write-wins; a subscriber is told about
//! writes made through *other* handles only.
//!
//! Values are stored in a versioned envelope (`{"v":1,"data":…}`). Bare
//! values written before the envelope existed are still read.

pub mod backend;
pub mod collections;
pub mod history;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};
pub use collections::{Collection, SavedMovie};
pub use history::{HistoryEntry, SearchHistory, Suggestion};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub mod keys {
    pub const FAVORITES: &str = "cinefetch_favorites";
    pub const WATCHLIST: &str = "cinefetch_watchlist";
    pub const SEARCH_HISTORY: &str = "cinefetch_search_history";
    pub const GENRES: &str = "cinefetch_genres";
}

pub const ENVELOPE_VERSION: u64 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode value: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("quota exceeded writing {key:?} ({needed} of {limit} bytes)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },
}

/// A change made through one handle, as seen by the others.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageEvent {
    /// `None` when the whole store was cleared.
    pub key: Option<String>,
    /// Raw stored text, `None` after a removal.
    pub new_value: Option<String>,
    origin: u64,
}

static NEXT_ORIGIN: AtomicU64 = AtomicU64::new(1);

const EVENT_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct LocalStore {
    backend: Arc<dyn StorageBackend>,
    events: broadcast::Sender<StorageEvent>,
    origin: u64,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct Envelope<'a, T> {
    v: u64,
    data: &'a T,
}

fn wrap<T: Serialize>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(&Envelope {
        v: ENVELOPE_VERSION,
        data: value,
    })?)
}

/// Decode a stored blob, accepting both the envelope and bare legacy values.
fn unwrap_envelope<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            warn!(key, error = %e, "stored value is not valid JSON, using default");
            return None;
        }
    };

    let payload = match value {
        Value::Object(mut map) if map.len() == 2 && map.contains_key("v") && map.contains_key("data") => {
            match map.get("v").and_then(Value::as_u64) {
                Some(ENVELOPE_VERSION) => map.remove("data").unwrap_or(Value::Null),
                version => {
                    warn!(key, ?version, "unsupported storage version, using default");
                    return None;
                }
            }
        }
        legacy => legacy,
    };

    match serde_path_to_error::deserialize(payload) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(key, path = %e.path(), error = %e.inner(), "stored value has unexpected shape, using default");
            None
        }
    }
}

impl LocalStore {
    pub fn new(backend: impl StorageBackend + 'static) -> Self {
        Self::from_arc(Arc::new(backend))
    }

    pub fn from_arc(backend: Arc<dyn StorageBackend>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            events,
            origin: NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn memory() -> Self {
        Self::new(MemoryBackend::new())
    }

    /// Another handle onto the same store with its own origin.
    pub fn handle(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            events: self.events.clone(),
            origin: NEXT_ORIGIN.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Read `key`, or `default` if it is absent or cannot be decoded.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.read_opt(key).unwrap_or(default)
    }

    pub fn read_opt<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.backend.get(key) {
            Ok(Some(raw)) => unwrap_envelope(key, &raw),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "storage read failed, using default");
                None
            }
        }
    }

    /// Store `value` under `key`. On failure the previous value stays in
    /// place and `false` is returned; the error is logged, never raised.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let result = wrap(value).and_then(|raw| {
            self.backend.set(key, &raw)?;
            Ok(raw)
        });
        match result {
            Ok(raw) => {
                debug!(key, bytes = raw.len(), "stored");
                self.notify(Some(key), Some(raw));
                true
            }
            Err(e) => {
                warn!(key, error = %e, "storage write failed, keeping previous value");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        match self.backend.remove(key) {
            Ok(()) => {
                self.notify(Some(key), None);
                true
            }
            Err(e) => {
                warn!(key, error = %e, "storage remove failed");
                false
            }
        }
    }

    pub fn clear_all(&self) -> bool {
        match self.backend.clear() {
            Ok(()) => {
                self.notify(None, None);
                true
            }
            Err(e) => {
                warn!(error = %e, "storage clear failed");
                false
            }
        }
    }

    /// Total length of all keys and stored values.
    pub fn storage_size(&self) -> usize {
        let Ok(keys) = self.backend.keys() else {
            return 0;
        };
        keys.iter()
            .filter_map(|k| {
                let value = self.backend.get(k).ok().flatten()?;
                Some(k.len() + value.len())
            })
            .sum()
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Changes made through other handles.
    pub fn subscribe(&self) -> StoreEvents {
        StoreEvents {
            rx: self.events.subscribe(),
            origin: self.origin,
        }
    }

    fn notify(&self, key: Option<&str>, new_value: Option<String>) {
        // No receivers is the common case.
        let _ = self.events.send(StorageEvent {
            key: key.map(str::to_owned),
            new_value,
            origin: self.origin,
        });
    }
}

/// Receiver that skips events originating from its own handle.
pub struct StoreEvents {
    rx: broadcast::Receiver<StorageEvent>,
    origin: u64,
}

impl StoreEvents {
    /// Next foreign event, or `None` once every handle is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.origin => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// A typed value persisted under one key, mirrored in memory.
pub struct Persisted<T> {
    store: LocalStore,
    key: String,
    default: T,
    value: Arc<watch::Sender<T>>,
    sync: Option<JoinHandle<()>>,
}

impl<T> Persisted<T>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(store: &LocalStore, key: impl Into<String>, default: T) -> Self {
        let key = key.into();
        let current = store.read(&key, default.clone());
        let (tx, _) = watch::channel(current);
        Self {
            store: store.clone(),
            key,
            default,
            value: Arc::new(tx),
            sync: None,
        }
    }

    /// Keep the in-memory value in step with writes from other handles.
    /// Requires a Tokio runtime.
    pub fn synced(mut self) -> Self {
        let mut events = self.store.subscribe();
        let value = self.value.clone();
        let key = self.key.clone();
        let default = self.default.clone();
        self.sync = Some(tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if event.key.as_deref().is_some_and(|k| k != key) {
                    continue;
                }
                let next = event
                    .new_value
                    .and_then(|raw| unwrap_envelope(&key, &raw))
                    .unwrap_or_else(|| default.clone());
                debug!(key = %key, "resynchronized from another handle");
                value.send_replace(next);
            }
        }));
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn get(&self) -> T {
        self.value.borrow().clone()
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.value.borrow())
    }

    /// Persist `value`; the in-memory copy changes only if the write succeeds.
    pub fn set(&self, value: T) -> bool {
        if !self.store.write(&self.key, &value) {
            return false;
        }
        self.value.send_replace(value);
        true
    }

    /// Read-modify-write of the whole value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) -> bool {
        let next = f(&self.value.borrow());
        self.set(next)
    }

    /// Drop the stored value and fall back to the default.
    pub fn remove(&self) -> bool {
        if !self.store.remove(&self.key) {
            return false;
        }
        self.value.send_replace(self.default.clone());
        true
    }

    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.value.subscribe()
    }
}

impl<T> Drop for Persisted<T> {
    fn drop(&mut self) {
        if let Some(task) = self.sync.take() {
            task.abort();
        }
    }
}
