//! Per-node cluster telemetry agent.
//!
//! Binds a process sampler and a static peer list to the resource
//! handler template, then serves the bound router.

mod config;
mod peers;

use config::Config;
use hermes_catalog::{CatalogConfig, ServiceResolver};
use hermes_handler::ResourceHandler;
use hermes_sampler::{ProcessSample, ProcessSampler};
use peers::{SamplerSource, StaticPeerListProvider};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();

    let resolver = ServiceResolver::new(CatalogConfig::default());
    let sampler = ProcessSampler::new(config.host.clone(), resolver)
        .expect("failed to read process accounting from the kernel");

    let local: Arc<dyn hermes_handler::LocalSource<ProcessSample>> =
        Arc::new(SamplerSource::new(sampler));
    let peer_provider: Arc<dyn hermes_handler::PeerListProvider> =
        Arc::new(StaticPeerListProvider::new(config.peers.clone()));

    let handler = Arc::new(ResourceHandler::new(
        "processes",
        config.host.clone(),
        config.secret.clone(),
        local,
        peer_provider,
    ));

    let addr = SocketAddr::new(config.bind_addr(), config.port);
    let listener = TcpListener::bind(addr).await.expect("bind error");

    tracing::info!(host = %config.host, %addr, "hermes agent listening");
    tracing::info!("local:   GET http://{}/v2/processes", addr);
    tracing::info!("cluster: GET http://{}/v2/processes/_cluster", addr);

    axum::serve(listener, handler.router().into_make_service())
        .await
        .expect("server error");
}
