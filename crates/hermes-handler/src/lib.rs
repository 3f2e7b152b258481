//! HTTP adapter exposing a local resource and a cluster-wide fan-out
//! aggregation of the same resource across peers.
//!
//! A [`ResourceHandler`] serves two endpoints for one resource name: the
//! local view (optionally framed for peer-to-peer splicing) and a
//! `_cluster` view that fans out to a configured peer set, bounded by a
//! process-global concurrency cap, and merges their raw JSON without a
//! decode/encode round-trip.

pub mod error;
pub mod events;
pub mod handler;
pub mod protocol;

pub use error::HermesError;
pub use events::HandlerEvent;
pub use handler::{FailureEntry, LocalSource, PeerListProvider, ResourceHandler};
pub use protocol::BODY_CONNECTOR;
