//! Enumerates OS processes, joins them against the service catalog
//! (`hermes-catalog`), and computes per-process metrics including
//! hourly-normalized deltas against the previous sample.

pub mod error;
pub mod events;
pub mod model;
pub mod passwd;
pub mod proc_reader;
pub mod sampler;

pub use error::SamplerError;
pub use events::ScrapeEvent;
pub use model::ProcessSample;
pub use sampler::ProcessSampler;
