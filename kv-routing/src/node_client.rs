use std::sync::Arc;

use arc_swap::ArcSwapOption;
use kv_mux::{Client, PendingRequest};
use kv_protocol::{Request, Response};
use tokio::sync::Mutex;

use crate::dialer::Dialer;

/// A lazily (re)connected mux client to one named node.
///
/// Grounded on `multibe.go`'s `Client.reinstantiate`: a lock-free fast path reads the
/// cached connection and checks whether its stream has died; only a stale or absent
/// connection takes the `reconnect` mutex, and a connection is rechecked once more
/// after acquiring it so concurrent callers don't pile up separate dials.
pub struct NodeClient {
    dialer: Arc<dyn Dialer>,
    node: String,
    current: ArcSwapOption<Client<Response, Request>>,
    reconnect: Mutex<()>,
}

impl NodeClient {
    pub fn new(dialer: Arc<dyn Dialer>, node: String) -> Self {
        Self {
            dialer,
            node,
            current: ArcSwapOption::empty(),
            reconnect: Mutex::new(()),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    fn live(client: &Arc<Client<Response, Request>>) -> bool {
        client.latched_error().is_none()
    }

    async fn connection(&self) -> anyhow::Result<Arc<Client<Response, Request>>> {
        if let Some(client) = self.current.load_full() {
            if Self::live(&client) {
                return Ok(client);
            }
        }

        let _guard = self.reconnect.lock().await;
        if let Some(client) = self.current.load_full() {
            if Self::live(&client) {
                return Ok(client);
            }
        }

        let fresh = self.dialer.dial(&self.node).await?;
        self.current.store(Some(fresh.clone()));
        Ok(fresh)
    }

    /// Enqueues `msg` on this node's connection, reconnecting first if needed.
    /// Returns as soon as the request is sent; the caller awaits the returned
    /// [`PendingRequest`] separately to learn the outcome.
    pub async fn call(&self, msg: Request) -> anyhow::Result<PendingRequest<Response, Request>> {
        let client = self.connection().await?;
        client.call(msg, None).await
    }
}
