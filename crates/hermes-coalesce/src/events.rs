//! Events emitted by the compliant per-key serializer.

use hermes_core::HermesEvent;
use std::time::Instant;

/// Events emitted by [`crate::CompliantSerializer`].
#[derive(Debug, Clone)]
pub enum SerializerEvent {
    /// This call acquired the per-key lock and began running the payload.
    Acquired { key: String, timestamp: Instant },
    /// A newer call for the same key pre-empted this one's retry sleep.
    Superseded { key: String, timestamp: Instant },
    /// The payload succeeded after `attempts` tries.
    Completed {
        key: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The backoff sequence was exhausted; the last error is surfaced.
    Exhausted {
        key: String,
        timestamp: Instant,
        attempts: usize,
    },
}

impl HermesEvent for SerializerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SerializerEvent::Acquired { .. } => "acquired",
            SerializerEvent::Superseded { .. } => "superseded",
            SerializerEvent::Completed { .. } => "completed",
            SerializerEvent::Exhausted { .. } => "exhausted",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            SerializerEvent::Acquired { timestamp, .. }
            | SerializerEvent::Superseded { timestamp, .. }
            | SerializerEvent::Completed { timestamp, .. }
            | SerializerEvent::Exhausted { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            SerializerEvent::Acquired { key, .. }
            | SerializerEvent::Superseded { key, .. }
            | SerializerEvent::Completed { key, .. }
            | SerializerEvent::Exhausted { key, .. } => key,
        }
    }
}
