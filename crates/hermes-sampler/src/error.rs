//! Errors raised constructing a [`crate::ProcessSampler`].

use thiserror::Error;

/// Raised only at construction time — once running, a scrape never fails
/// outright; a per-process read error is skipped rather than aborting
/// the whole scrape.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("failed to read system boot time: {0}")]
    BootTime(#[source] procfs::ProcError),
    #[error("failed to read the kernel clock tick rate: {0}")]
    TicksPerSecond(#[source] procfs::ProcError),
}
