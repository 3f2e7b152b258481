//! Error types for service catalog discovery.

use thiserror::Error;

/// An external command failed, timed out, or returned output the resolver
/// could not parse. Always recovered locally: the offending discovery pass
/// contributes nothing and the resolver proceeds with whatever it already
/// collected.
#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("command `{command}` timed out after {timeout_secs}s")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("command `{command}` exited with status {status}")]
    NonZeroExit { command: String, status: String },

    #[error("failed to spawn command `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("could not parse output of command `{command}`")]
    Unparseable { command: String },
}
