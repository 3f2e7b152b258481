//! Events emitted by the resource handler.

use hermes_core::HermesEvent;
use std::time::Instant;

/// Events emitted by [`crate::ResourceHandler`].
#[derive(Debug, Clone)]
pub enum HandlerEvent {
    /// A cluster fan-out completed.
    ClusterAggregated {
        resource: String,
        timestamp: Instant,
        peers_requested: usize,
        peers_failed: usize,
    },
    /// One peer request failed during fan-out.
    PeerFailed {
        resource: String,
        timestamp: Instant,
        host: String,
        message: String,
    },
}

impl HermesEvent for HandlerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HandlerEvent::ClusterAggregated { .. } => "cluster_aggregated",
            HandlerEvent::PeerFailed { .. } => "peer_failed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            HandlerEvent::ClusterAggregated { timestamp, .. } => *timestamp,
            HandlerEvent::PeerFailed { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            HandlerEvent::ClusterAggregated { resource, .. } => resource,
            HandlerEvent::PeerFailed { resource, .. } => resource,
        }
    }
}
