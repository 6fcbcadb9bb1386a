mod config;
mod dialer;
mod disk;
mod engine;
mod goodness;

use std::sync::Arc;

use kv_mux::{server, FramedStream, RequestHandle};
use kv_protocol::{request_pool, server_hooks, MsgpackCodec, Request, Response};
use kv_routing::{Forwarder, Selector};
use kv_storage::{DiskSpace, InfiniteDiskSpace, StorageEndpoint, StorageEndpointConfig};
use tokio::net::TcpListener;

use crate::config::NodeConfig;
use crate::dialer::TcpDialer;
use crate::disk::SoftLimitDiskSpace;
use crate::engine::MemoryEngine;
use crate::goodness::ConfiguredGoodness;

fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "kv-node.toml".to_string());
    let config = NodeConfig::load(&config_path)?;
    log::info!("loaded config from {config_path}");

    let engine = MemoryEngine::new();

    let disk: Arc<dyn DiskSpace> = match config.disk_soft_limit_bytes {
        Some(limit) => Arc::new(SoftLimitDiskSpace::new(limit)),
        None => Arc::new(InfiniteDiskSpace),
    };

    let mut endpoint_config = StorageEndpointConfig::new(engine);
    endpoint_config.disk = disk;

    if config.redirect_enabled {
        let dialer = Arc::new(TcpDialer::new(config.nodes.clone()));
        let forwarder = Arc::new(Forwarder::new(dialer, false));
        let goodness = Arc::new(ConfiguredGoodness::new(config.goodness.clone()));
        let nodes: Vec<String> = config.nodes.keys().cloned().collect();
        let selector = Arc::new(Selector::new(
            forwarder.clone(),
            goodness,
            nodes,
            config.min_goodness,
        ));
        endpoint_config.redirect_reader = Some(forwarder);
        endpoint_config.redirect_writer = Some(selector);
    }

    let endpoint = Arc::new(StorageEndpoint::spawn(endpoint_config));

    let listener = TcpListener::bind(&config.listen).await?;
    log::info!("listening on {}", config.listen);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("accept failed: {err:#}");
                continue;
            }
        };
        stream.set_nodelay(true).ok();
        log::info!("accepted connection from {peer}");

        let endpoint = endpoint.clone();
        tokio::spawn(async move {
            let requests = Arc::new(request_pool());
            let framed = FramedStream::spawn(
                stream,
                MsgpackCodec::<Request>::new(),
                MsgpackCodec::<Response>::new(),
                server_hooks(requests),
            );
            let mut handles = server::serve(framed);
            while let Some(handle) = handles.recv().await {
                let endpoint = endpoint.clone();
                tokio::spawn(async move {
                    relay_one(endpoint, handle).await;
                });
            }
            log::info!("connection from {peer} closed");
        });
    }
}

async fn relay_one(endpoint: Arc<StorageEndpoint>, handle: RequestHandle<Request, Response>) {
    if !endpoint.submit(handle).await {
        log::warn!("storage endpoint is no longer accepting requests");
    }
}
