//! Per-surface request coordination.
//!
//! A coordinator owns exactly one logical request at a time. Starting a new
//! one bumps the generation and cancels the transport call of the previous
//! one; whatever the previous call eventually returns is compared against the
//! current generation and dropped unread if it is stale. Retries stay inside
//! one generation.

use super::retry::RetryPolicy;
use super::state::{RequestState, Status};
use crate::cache::{CacheKey, TtlCache};
use crate::delay::delay;
use crate::tmdb::{ApiError, ErrorInfo};
use chrono::Utc;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// How a single run interacts with the surface's TTL cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve a fresh hit without a network call; store the result on a miss.
    ReadWrite,
    /// Always go to the network, then store the result.
    Refresh,
    /// Neither read nor write. Used for cache-exempt pages.
    Bypass,
}

impl CacheMode {
    fn reads(self) -> bool {
        self == Self::ReadWrite
    }

    fn writes(self) -> bool {
        self != Self::Bypass
    }
}

/// How a run ended, from the point of view of the caller that issued it.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    Fresh(T),
    Cached(T),
    Failed(ApiError),
    /// A newer run started (or the coordinator was cancelled) before this one
    /// settled. The caller must not touch visible state.
    Superseded,
}

impl<T> Outcome<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fresh(v) | Self::Cached(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Fresh(v) | Self::Cached(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_superseded(&self) -> bool {
        matches!(self, Self::Superseded)
    }
}

pub struct RequestCoordinator<T> {
    surface: &'static str,
    cache: Option<TtlCache<T>>,
    policy: RetryPolicy,
    generation: AtomicU64,
    inflight: Mutex<Option<CancellationToken>>,
    state: watch::Sender<RequestState<T>>,
}

impl<T> RequestCoordinator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(surface: &'static str, cache: TtlCache<T>, policy: RetryPolicy) -> Self {
        Self::build(surface, Some(cache), policy)
    }

    /// A coordinator whose results are never cached.
    pub fn uncached(surface: &'static str, policy: RetryPolicy) -> Self {
        Self::build(surface, None, policy)
    }

    fn build(surface: &'static str, cache: Option<TtlCache<T>>, policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(RequestState::default());
        Self {
            surface,
            cache,
            policy,
            generation: AtomicU64::new(0),
            inflight: Mutex::new(None),
            state,
        }
    }

    pub fn surface(&self) -> &'static str {
        self.surface
    }

    pub fn cache(&self) -> Option<&TtlCache<T>> {
        self.cache.as_ref()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn subscribe(&self) -> watch::Receiver<RequestState<T>> {
        self.state.subscribe()
    }

    pub fn state(&self) -> RequestState<T> {
        self.state.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation() == generation
    }

    /// Start a new generation, aborting the transport call of the previous one.
    fn begin(&self) -> (u64, CancellationToken) {
        let token = CancellationToken::new();
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let previous = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }
        (generation, token)
    }

    /// Mark any in-flight run stale and abort its transport call.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(token) = self
            .inflight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
        self.state.send_if_modified(|s| {
            if s.status == Status::Pending {
                s.status = Status::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Apply `update` only if `generation` is still current. The check runs
    /// under the state lock, so a run that lost the race cannot overwrite a
    /// newer one. Returns whether the update was applied.
    fn publish(&self, generation: u64, update: impl FnOnce(&mut RequestState<T>)) -> bool {
        self.state.send_if_modified(|s| {
            if !self.is_current(generation) {
                return false;
            }
            update(s);
            s.generation = generation;
            true
        })
    }

    /// Settle immediately as failed without going to the network. Used for
    /// local validation errors; still supersedes anything in flight.
    pub fn reject(&self, err: ApiError) -> Outcome<T> {
        let (generation, _) = self.begin();
        debug!(surface = self.surface, error = %err, "request rejected before send");
        let info = ErrorInfo::from(&err);
        self.publish(generation, |s| {
            s.status = Status::Failed;
            s.error = Some(info);
            s.attempt = 0;
        });
        Outcome::Failed(err)
    }

    /// Run one logical request for `key`.
    ///
    /// `fetch` is invoked once per attempt. Transient failures are retried
    /// per the retry policy; the final result is written to the cache (when
    /// `mode` allows) together with the state, and only while this run is
    /// still the current generation.
    pub async fn run<F, Fut>(&self, key: CacheKey, mode: CacheMode, fetch: F) -> Outcome<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        if mode.reads()
            && let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key))
        {
            let (generation, _) = self.begin();
            debug!(surface = self.surface, %key, generation, "served from cache");
            let applied = self.publish(generation, |s| {
                s.status = Status::Succeeded;
                s.data = Some(hit.clone());
                s.error = None;
                s.attempt = 0;
                s.from_cache = true;
                s.updated_at = Some(Utc::now());
            });
            if !applied {
                return Outcome::Superseded;
            }
            return Outcome::Cached(hit);
        }

        let (generation, token) = self.begin();
        let started = self.publish(generation, |s| {
            s.status = Status::Pending;
            s.error = None;
            s.attempt = 1;
        });
        if !started {
            return Outcome::Superseded;
        }

        let mut retries = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(ApiError::Cancelled),
                result = fetch() => result,
            };

            if !self.is_current(generation) {
                debug!(surface = self.surface, %key, generation, "dropping stale response");
                return Outcome::Superseded;
            }

            let err = match result {
                Ok(value) => {
                    let applied = self.publish(generation, |s| {
                        if mode.writes()
                            && let Some(cache) = &self.cache
                        {
                            cache.set(key.clone(), value.clone());
                        }
                        s.status = Status::Succeeded;
                        s.data = Some(value.clone());
                        s.error = None;
                        s.from_cache = false;
                        s.updated_at = Some(Utc::now());
                    });
                    if !applied {
                        debug!(surface = self.surface, %key, generation, "dropping stale response");
                        return Outcome::Superseded;
                    }
                    return Outcome::Fresh(value);
                }
                Err(ApiError::Cancelled) => return Outcome::Superseded,
                Err(err) => err,
            };

            if err.is_retryable()
                && let Some(wait) = self.policy.delay_for(retries)
            {
                retries += 1;
                warn!(
                    surface = self.surface,
                    %key,
                    error = %err,
                    attempt = retries + 1,
                    max_attempts = self.policy.max_attempts(),
                    "request failed, retrying"
                );
                if delay(wait, &token).await.is_err()
                    || !self.publish(generation, |s| s.attempt = retries + 1)
                {
                    return Outcome::Superseded;
                }
                continue;
            }

            let info = ErrorInfo::from(&err);
            let applied = self.publish(generation, |s| {
                s.status = Status::Failed;
                s.error = Some(info);
            });
            if !applied {
                return Outcome::Superseded;
            }
            error!(
                surface = self.surface,
                %key,
                error = %err,
                attempts = retries + 1,
                "request failed"
            );
            return Outcome::Failed(err);
        }
    }
}

impl<T> Drop for RequestCoordinator<T> {
    fn drop(&mut self) {
        if let Some(token) = self
            .inflight
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    fn coordinator(policy: RetryPolicy) -> Arc<RequestCoordinator<u32>> {
        let cache = TtlCache::new("test", CachePolicy::new(Duration::from_secs(600), 10));
        Arc::new(RequestCoordinator::new("test", cache, policy))
    }

    fn key() -> CacheKey {
        CacheKey::raw("k")
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_skips_network() {
        let c = coordinator(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ApiError>(7)
        };

        assert!(matches!(c.run(key(), CacheMode::ReadWrite, fetch).await, Outcome::Fresh(7)));
        assert!(matches!(c.run(key(), CacheMode::ReadWrite, fetch).await, Outcome::Cached(7)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let state = c.state();
        assert_eq!(state.status, Status::Succeeded);
        assert!(state.from_cache);
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_bypasses_cache_read() {
        let c = coordinator(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let fetch = || async { Ok::<_, ApiError>(calls.fetch_add(1, Ordering::SeqCst)) };

        c.run(key(), CacheMode::ReadWrite, fetch).await;
        let out = c.run(key(), CacheMode::Refresh, fetch).await;
        assert!(matches!(out, Outcome::Fresh(1)));
        assert_eq!(c.cache().unwrap().get(&key()), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn bypass_does_not_store() {
        let c = coordinator(RetryPolicy::default());
        c.run(key(), CacheMode::Bypass, || async { Ok(3) }).await;
        assert!(c.cache().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_request_makes_three_attempts() {
        let c = coordinator(RetryPolicy::default().with_max_retries(2));
        let calls = AtomicU32::new(0);
        let mut rx = c.subscribe();

        let out = c
            .run(key(), CacheMode::ReadWrite, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ApiError::Server { status: 500 })
            })
            .await;

        assert!(matches!(out, Outcome::Failed(ApiError::Server { status: 500 })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let state = rx.borrow_and_update().clone();
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.attempt, 3);
        assert_eq!(
            state.error.unwrap().message,
            "Server error. Please try again later."
        );
    }

    #[tokio::test(start_paused = true)]
    async fn not_found_is_not_retried() {
        let c = coordinator(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let out = c
            .run(key(), CacheMode::ReadWrite, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ApiError::NotFound)
            })
            .await;
        assert!(matches!(out, Outcome::Failed(ApiError::NotFound)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_on_retry_within_same_generation() {
        let c = coordinator(RetryPolicy::default());
        let calls = AtomicU32::new(0);
        let out = c
            .run(key(), CacheMode::ReadWrite, || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ApiError::Timeout)
                } else {
                    Ok(9)
                }
            })
            .await;
        assert!(matches!(out, Outcome::Fresh(9)));
        let state = c.state();
        assert_eq!(state.generation, 1);
        assert_eq!(state.attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_response_is_never_observed() {
        let c = coordinator(RetryPolicy::default());

        let first = {
            let c = c.clone();
            tokio::spawn(async move {
                c.run(CacheKey::raw("slow"), CacheMode::Bypass, || async {
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Ok(1)
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = c
            .run(CacheKey::raw("fast"), CacheMode::Bypass, || async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(2)
            })
            .await;

        assert!(matches!(second, Outcome::Fresh(2)));
        assert!(first.await.unwrap().is_superseded());
        assert_eq!(c.state().data, Some(2));
        assert_eq!(c.state().generation, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_marks_inflight_stale() {
        let c = coordinator(RetryPolicy::default());
        let task = {
            let c = c.clone();
            tokio::spawn(async move {
                c.run(key(), CacheMode::ReadWrite, || async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(1)
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(c.state().status, Status::Pending);

        c.cancel();
        assert!(task.await.unwrap().is_superseded());
        assert_eq!(c.state().status, Status::Idle);
        assert!(c.cache().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn response_superseded_mid_fetch_is_not_published() {
        let c = coordinator(RetryPolicy::default());
        let out = c
            .run(key(), CacheMode::ReadWrite, || async {
                // A newer run takes over while this response is in hand.
                c.cancel();
                Ok(9)
            })
            .await;

        assert!(out.is_superseded());
        let state = c.state();
        assert_ne!(state.status, Status::Succeeded);
        assert!(state.data.is_none());
        assert!(c.cache().unwrap().is_empty());
    }

    #[test]
    fn publish_only_applies_to_current_generation() {
        let c = coordinator(RetryPolicy::default());
        let (old, _) = c.begin();
        let (current, _) = c.begin();

        assert!(!c.publish(old, |s| s.data = Some(1)));
        assert!(c.state().data.is_none());

        assert!(c.publish(current, |s| s.data = Some(2)));
        let state = c.state();
        assert_eq!(state.data, Some(2));
        assert_eq!(state.generation, current);
    }

    #[tokio::test(start_paused = true)]
    async fn reject_fails_without_fetching() {
        let c = coordinator(RetryPolicy::default());
        let out = c.reject(ApiError::Validation("Movie ID is required".into()));
        assert!(matches!(out, Outcome::Failed(ApiError::Validation(_))));
        let state = c.state();
        assert_eq!(state.status, Status::Failed);
        assert_eq!(state.error.unwrap().message, "Movie ID is required");
    }
}
