use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use kv_mux::{Client, FramedStream};
use kv_protocol::{client_hooks, request_pool, response_pool, MsgpackCodec, Request, Response};
use kv_routing::Dialer;
use tokio::net::TcpStream;

/// Dials a peer node over plain TCP, framing traffic with [`MsgpackCodec`] the same
/// way the node's own listener does. Grounded on `multibe.go`'s `Dialer` callback,
/// realized here as the one concrete implementation the demo binary wires in.
pub struct TcpDialer {
    addresses: HashMap<String, String>,
}

impl TcpDialer {
    pub fn new(addresses: HashMap<String, String>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, node: &str) -> anyhow::Result<Arc<Client<Response, Request>>> {
        let address = self
            .addresses
            .get(node)
            .ok_or_else(|| anyhow::anyhow!("no dial address configured for node {node}"))?;

        let stream = TcpStream::connect(address).await?;
        stream.set_nodelay(true)?;

        let requests = Arc::new(request_pool());
        let responses = Arc::new(response_pool());
        let framed = FramedStream::spawn(
            stream,
            MsgpackCodec::<Response>::new(),
            MsgpackCodec::<Request>::new(),
            client_hooks(requests, responses),
        );
        Ok(Client::spawn(framed))
    }
}
