//! Events emitted by the process sampler.

use hermes_core::HermesEvent;
use std::time::{Duration, Instant};

/// Events emitted by [`crate::ProcessSampler`].
#[derive(Debug, Clone)]
pub enum ScrapeEvent {
    /// A scrape completed; `processes` is the number of samples returned.
    Completed {
        name: String,
        timestamp: Instant,
        processes: usize,
        elapsed: Duration,
    },
}

impl HermesEvent for ScrapeEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ScrapeEvent::Completed { .. } => "scrape_completed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            ScrapeEvent::Completed { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        match self {
            ScrapeEvent::Completed { name, .. } => name,
        }
    }
}
