//! Errors raised contacting a peer during cluster fan-out.

use thiserror::Error;

/// A peer was unreachable, returned a non-2xx status, or returned a body
/// the handler could not split on the entity/failure delimiter. Never
/// fatal to the aggregated response: it becomes a `{host, message}`
/// failure entry instead of aborting the fan-out.
#[derive(Debug, Clone, Error)]
#[error("{host}: {message}")]
pub struct HermesError {
    pub host: String,
    pub message: String,
}

impl HermesError {
    pub fn new(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            message: message.into(),
        }
    }
}
