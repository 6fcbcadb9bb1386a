//! Redirection backends for the storage endpoint: a copy-on-write table of
//! per-node mux connections ([`Forwarder`]) and a goodness-ranked write target
//! picker ([`Selector`]) built on top of it.

pub mod dialer;
pub mod forwarder;
pub mod goodness;
pub mod node_client;
mod responses;
pub mod selector;

pub use dialer::Dialer;
pub use forwarder::Forwarder;
pub use goodness::NodeGoodness;
pub use node_client::NodeClient;
pub use selector::Selector;
