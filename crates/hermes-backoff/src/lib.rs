//! Backoff sequencing and retry primitives, blocking and cooperative.

pub mod events;
pub mod retry;
pub mod sequence;

pub use events::RetryEvent;
pub use retry::{call_async, call_blocking, Retryer};
pub use sequence::{BackoffError, BackoffSequence, BackoffSpec};
