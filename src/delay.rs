//! Cancellable delays shared by debouncing and retry backoff.

use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("delay cancelled")]
pub struct Cancelled;

/// Wait for `duration`, returning early with [`Cancelled`] if `token` fires first.
pub async fn delay(duration: Duration, token: &CancellationToken) -> Result<(), Cancelled> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Spawn `task` to run after `duration` unless `token` is cancelled before then.
pub fn schedule<F, Fut>(duration: Duration, token: CancellationToken, task: F) -> JoinHandle<()>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        if delay(duration, &token).await.is_ok() {
            task().await;
        }
    })
}

/// Holds at most one pending timer. Arming a new one cancels the previous.
#[derive(Debug, Default)]
pub struct TimerSlot {
    current: Mutex<Option<CancellationToken>>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel whatever is pending and hand out the token for its replacement.
    pub fn arm(&self) -> CancellationToken {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        token
    }

    pub fn cancel(&self) {
        if let Some(token) = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }

    /// True while the most recently armed token is live. A timer that has
    /// already fired still counts until it is cancelled or replaced.
    pub fn is_pending(&self) -> bool {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }
}
