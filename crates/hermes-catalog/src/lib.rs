//! Discovers managed-service PID mappings from the host's service manager
//! (systemd unit listings and main-PID lookups) and cgroup filesystem
//! (slice membership), and merges both into a `pid -> tags` catalog.
//!
//! Every external command carries a fixed timeout; a failed or unparseable
//! command degrades tag accuracy for its pass but never aborts discovery —
//! the resolver always returns whatever it could collect.

pub mod error;
pub mod resolver;
pub mod slice;
pub mod subprocess;
pub mod unit;

pub use error::SubprocessError;
pub use resolver::{CatalogConfig, ServiceCatalog, ServiceResolver};
