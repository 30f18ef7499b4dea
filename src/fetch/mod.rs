//! Request coordination: supersession by generation, retry with backoff,
//! and the cache check that precedes every network call.

pub mod coordinator;
pub mod retry;
pub mod state;

pub use coordinator::{CacheMode, Outcome, RequestCoordinator};
pub use retry::{Backoff, RetryPolicy};
pub use state::{RequestState, Status};
