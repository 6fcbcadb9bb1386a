use std::sync::Arc;

use async_trait::async_trait;
use kv_mux::Client;
use kv_protocol::{Request, Response};

/// Opens a fresh mux client connection to a named node.
///
/// Grounded on `multibe.go`'s `type Dialer func(str string) (*rpcmux.Stream, error)`;
/// `kv-node` supplies the concrete implementation (dialing a TCP address configured
/// per node), so this crate stays transport-agnostic.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, node: &str) -> anyhow::Result<Arc<Client<Response, Request>>>;
}
