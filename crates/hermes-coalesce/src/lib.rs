//! Compliant per-key serializer used to coalesce redundant background
//! updates keyed by some identifier (e.g. a coordination-service node
//! path).
//!
//! Concurrent callers for the same key never run the payload in parallel.
//! Unlike a plain mutex, a newer caller pre-empts an older caller's retry
//! sleep for the same key rather than queuing behind it — writers for the
//! same key produce a newer-wins sequence, so under sustained contention
//! only one in-flight attempt executes the payload at a time.

pub mod events;
pub mod serializer;

pub use events::SerializerEvent;
pub use serializer::{CallOutcome, CompliantSerializer};
