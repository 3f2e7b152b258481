//! Events emitted by the retry primitive.

use hermes_core::HermesEvent;
use std::time::{Duration, Instant};

/// Events emitted by [`crate::Retryer`].
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry attempt is about to be made after sleeping `delay`.
    Retry {
        name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    /// The operation succeeded, after `attempts` total tries.
    Success {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The backoff sequence was exhausted (max retries or timeout); the
    /// last error is surfaced to the caller.
    Exhausted {
        name: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The retry predicate rejected the error; it is surfaced immediately.
    IgnoredError { name: String, timestamp: Instant },
}

impl HermesEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            RetryEvent::Retry { name, .. }
            | RetryEvent::Success { name, .. }
            | RetryEvent::Exhausted { name, .. }
            | RetryEvent::IgnoredError { name, .. } => name,
        }
    }
}
