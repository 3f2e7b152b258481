//! Adapters binding `hermes-sampler` and a static peer list to the
//! `hermes-handler` traits.

use async_trait::async_trait;
use hermes_handler::{LocalSource, PeerListProvider};
use hermes_sampler::{ProcessSample, ProcessSampler};

/// Wraps a [`ProcessSampler`] as the handler's local resource source.
/// A scrape never fails outright (individual processes are silently
/// omitted instead), so this never reports a failure message.
pub struct SamplerSource {
    sampler: ProcessSampler,
}

impl SamplerSource {
    pub fn new(sampler: ProcessSampler) -> Self {
        Self { sampler }
    }
}

#[async_trait]
impl LocalSource<ProcessSample> for SamplerSource {
    async fn sample(&self) -> (Vec<ProcessSample>, Vec<String>) {
        (self.sampler.sample().await, Vec::new())
    }
}

/// A fixed peer list read once at startup, covering every other node
/// in the cluster.
pub struct StaticPeerListProvider {
    peers: Vec<String>,
}

impl StaticPeerListProvider {
    pub fn new(peers: Vec<String>) -> Self {
        Self { peers }
    }
}

#[async_trait]
impl PeerListProvider for StaticPeerListProvider {
    async fn peers(&self) -> Vec<String> {
        self.peers.clone()
    }
}
