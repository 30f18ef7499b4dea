use crate::tmdb::ErrorInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Idle,
    Pending,
    Succeeded,
    Failed,
}

/// What a coordinator exposes to subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct RequestState<T> {
    pub status: Status,
    /// Last successful value. Kept across later failures.
    pub data: Option<T>,
    pub error: Option<ErrorInfo>,
    /// 1-based attempt number of the current (or last) request; 0 before any.
    pub attempt: u32,
    pub generation: u64,
    /// Whether `data` was served from the TTL cache.
    pub from_cache: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

impl<T> Default for RequestState<T> {
    fn default() -> Self {
        Self {
            status: Status::Idle,
            data: None,
            error: None,
            attempt: 0,
            generation: 0,
            from_cache: false,
            updated_at: None,
        }
    }
}

impl<T> RequestState<T> {
    pub fn is_loading(&self) -> bool {
        self.status == Status::Pending
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}
