//! Keystroke debouncing for free-text search.
//!
//! Raw input is buffered behind a single timer; only a value that stays
//! unchanged for the full delay is emitted as the settled query.

use crate::delay::{TimerSlot, schedule};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::trace;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub struct Debouncer {
    delay: Duration,
    slot: TimerSlot,
    settled: Arc<watch::Sender<String>>,
    pending: Arc<AtomicBool>,
    settles: Arc<AtomicU64>,
}

impl Debouncer {
    pub fn new(delay: Duration, initial: impl Into<String>) -> Self {
        let (tx, _) = watch::channel(initial.into());
        Self {
            delay,
            slot: TimerSlot::new(),
            settled: Arc::new(tx),
            pending: Arc::new(AtomicBool::new(false)),
            settles: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Restart the quiet period with `raw` as the candidate value.
    pub fn submit(&self, raw: impl Into<String>) {
        let raw = raw.into();
        let token = self.slot.arm();
        self.pending.store(true, Ordering::Release);

        let settled = self.settled.clone();
        let pending = self.pending.clone();
        let settles = self.settles.clone();
        schedule(self.delay, token, move || async move {
            pending.store(false, Ordering::Release);
            settles.fetch_add(1, Ordering::AcqRel);
            trace!(query = %raw, "query settled");
            // Subscribers only wake when the settled value actually changes.
            settled.send_if_modified(|current| {
                if *current == raw {
                    false
                } else {
                    *current = raw;
                    true
                }
            });
        });
    }

    /// Emit `value` immediately, discarding any pending timer.
    pub fn flush(&self, value: impl Into<String>) {
        self.slot.cancel();
        self.pending.store(false, Ordering::Release);
        self.settles.fetch_add(1, Ordering::AcqRel);
        self.settled.send_replace(value.into());
    }

    /// Drop the pending timer without settling.
    pub fn cancel(&self) {
        self.slot.cancel();
        self.pending.store(false, Ordering::Release);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    pub fn settled(&self) -> String {
        self.settled.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.settled.subscribe()
    }

    /// Number of times a timer (or flush) has settled so far.
    pub fn settle_count(&self) -> u64 {
        self.settles.load(Ordering::Acquire)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.slot.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn burst_settles_once_with_last_value() {
        let d = Debouncer::new(DEFAULT_DEBOUNCE, "");
        let mut rx = d.subscribe();

        for partial in ["b", "ba", "bat", "batm", "batman"] {
            d.submit(partial);
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(d.is_pending());
        assert_eq!(d.settle_count(), 0);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(d.settle_count(), 1);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "batman");
        assert!(!d.is_pending());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(d.settle_count(), 1);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_settles_before_delay() {
        let d = Debouncer::new(Duration::from_millis(300), "");
        d.submit("dune");
        tokio::time::sleep(Duration::from_millis(299)).await;
        assert_eq!(d.settled(), "");
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(d.settled(), "dune");
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_value_does_not_notify() {
        let d = Debouncer::new(Duration::from_millis(300), "alien");
        let mut rx = d.subscribe();
        rx.borrow_and_update();

        d.submit("alien");
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(d.settle_count(), 1);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_and_flush() {
        let d = Debouncer::new(Duration::from_millis(300), "");
        d.submit("heat");
        d.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(d.settled(), "");

        d.submit("ignored");
        d.flush("heat");
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(d.settled(), "heat");
        assert_eq!(d.settle_count(), 1);
    }
}
