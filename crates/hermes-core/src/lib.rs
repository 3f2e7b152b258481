//! Core infrastructure shared by the Hermes telemetry agent.
//!
//! Every subsystem (backoff/retry, the compliant per-key serializer, the
//! process sampler, the resource handler) emits its own event enum through
//! the same listener plumbing, so observability hooks compose the same way
//! regardless of which subsystem raised them.

pub mod events;

pub use events::{EventListener, EventListeners, FnListener, HermesEvent};
