//! Environment-sourced configuration for the agent binary.
//!
//! Node IP discovery and secret retrieval are treated as external
//! collaborators (outside this agent's scope): both are read from the
//! environment rather than resolved here.

use std::net::{IpAddr, Ipv4Addr};

const DEFAULT_PORT: u16 = 4378;
const DEFAULT_HOST: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

#[derive(Debug, Clone)]
pub struct Config {
    /// This node's private address, reported in failure entries and
    /// used to detect the in-process leg of a cluster fan-out.
    pub host: String,
    /// Port the HTTP server binds.
    pub port: u16,
    /// Shared secret attached to outbound peer requests, if configured.
    pub secret: Option<String>,
    /// Default peer list for `_cluster` requests that omit `locations`.
    pub peers: Vec<String>,
}

impl Config {
    /// Reads `HERMES_HOST`, `HERMES_PORT` (default 4378), `HERMES_SECRET`,
    /// and `HERMES_PEERS` (comma-separated `host[:port]` entries).
    pub fn from_env() -> Self {
        let host = std::env::var("HERMES_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());

        let port = std::env::var("HERMES_PORT")
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let secret = std::env::var("HERMES_SECRET").ok().filter(|s| !s.is_empty());

        let peers = std::env::var("HERMES_PEERS")
            .ok()
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host,
            port,
            secret,
            peers,
        }
    }

    pub fn bind_addr(&self) -> IpAddr {
        // The HTTP listener binds every interface; `host` identifies this
        // node to peers, it is not necessarily the bind address.
        IpAddr::V4(Ipv4Addr::UNSPECIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peers_parses_a_comma_separated_list() {
        std::env::set_var("HERMES_PEERS", "10.0.2.15, 10.0.2.16:4378 ,");
        let config = Config::from_env();
        assert_eq!(config.peers, vec!["10.0.2.15", "10.0.2.16:4378"]);
        std::env::remove_var("HERMES_PEERS");
    }

    #[test]
    fn port_defaults_when_unset() {
        std::env::remove_var("HERMES_PORT");
        let config = Config::from_env();
        assert_eq!(config.port, DEFAULT_PORT);
    }
}
