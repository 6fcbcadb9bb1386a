use std::sync::Arc;

use ahash::HashMap;
use arc_swap::ArcSwap;
use async_trait::async_trait;
use kv_mux::RequestHandle;
use kv_protocol::{Request, Response};
use kv_storage::RedirectReader;
use tokio::sync::Mutex;

use crate::dialer::Dialer;
use crate::node_client::NodeClient;
use crate::responses::error_response;

/// Copy-on-write `node name -> connection` table, growing lazily as nodes are first
/// addressed. Grounded on `multibe.go`'s `Forwarder`: `ndmap` there is a plain map
/// guarded only by `ndmpl` for writers and read without a lock (the source marks this
/// "TODO: Compiler-Barrier"); here the table itself is an [`ArcSwap`] so concurrent
/// readers always see a fully-built map with no such gap.
pub struct Forwarder {
    dialer: Arc<dyn Dialer>,
    read_only: bool,
    nodes: ArcSwap<HashMap<String, Arc<NodeClient>>>,
    create: Mutex<()>,
}

impl Forwarder {
    pub fn new(dialer: Arc<dyn Dialer>, read_only: bool) -> Self {
        Self {
            dialer,
            read_only,
            nodes: ArcSwap::from_pointee(HashMap::default()),
            create: Mutex::new(()),
        }
    }

    fn lookup(&self, node: &str) -> Option<Arc<NodeClient>> {
        self.nodes.load().get(node).cloned()
    }

    /// Returns the cached connection for `node`, creating one on first use unless
    /// this forwarder is read-only. Mirrors `Forwarder.Node`/`Forwarder.create`.
    pub async fn get_or_create(&self, node: &str) -> Option<Arc<NodeClient>> {
        if let Some(client) = self.lookup(node) {
            return Some(client);
        }
        if self.read_only {
            return None;
        }

        let _guard = self.create.lock().await;
        if let Some(client) = self.lookup(node) {
            return Some(client);
        }

        let fresh = Arc::new(NodeClient::new(self.dialer.clone(), node.to_string()));
        let mut updated = (*self.nodes.load_full()).clone();
        updated.insert(node.to_string(), fresh.clone());
        self.nodes.store(Arc::new(updated));
        Some(fresh)
    }
}

#[async_trait]
impl RedirectReader for Forwarder {
    /// Enqueues `req.message` on `target`'s connection and, once sent, spawns a task
    /// to await the reply and relay it back. Ownership of `req` is never handed back:
    /// on any failure (no route, send error, or the remote reply itself erroring) this
    /// replies with an `Error` response rather than returning `req` to the caller,
    /// matching spec §4.6's unconditional handoff.
    async fn redirect_read(&self, target: &str, req: RequestHandle<Request, Response>) {
        let Some(client) = self.get_or_create(target).await else {
            req.reply(error_response(&format!("no route to node {target}")))
                .await;
            return;
        };

        match client.call(req.message.clone(), None).await {
            Ok(pending) => {
                tokio::spawn(async move {
                    match pending.get().await {
                        Ok(resp) => {
                            req.reply(resp).await;
                        }
                        Err(e) => {
                            req.reply(error_response(&e.to_string())).await;
                        }
                    }
                });
            }
            Err(e) => {
                req.reply(error_response(&e.to_string())).await;
            }
        }
    }
}
