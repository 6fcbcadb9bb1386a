use std::sync::Arc;

use async_trait::async_trait;
use kv_protocol::Request;
use kv_storage::{RedirectOutcome, RedirectWriter};

use crate::forwarder::Forwarder;
use crate::goodness::NodeGoodness;

/// Picks a write-redirect target by goodness and forwards through a [`Forwarder`].
///
/// Grounded on `multibe.go`'s `Selector`. The candidate-replacement rule in
/// [`Selector::pick`] is carried over exactly as written there: a node replaces the
/// running pick whenever that pick hasn't cleared `min_goodness` yet (so any node is
/// provisionally accepted until one actually qualifies), or whenever the new node is
/// strictly better than a pick that already has. Kept verbatim rather than
/// rewritten as a plain running-max, per how it reads in the node this was ported
/// from.
pub struct Selector {
    forwarder: Arc<Forwarder>,
    goodness: Arc<dyn NodeGoodness>,
    nodes: Vec<String>,
    min_goodness: u64,
}

impl Selector {
    pub fn new(
        forwarder: Arc<Forwarder>,
        goodness: Arc<dyn NodeGoodness>,
        nodes: Vec<String>,
        min_goodness: u64,
    ) -> Self {
        Self {
            forwarder,
            goodness,
            nodes,
            min_goodness,
        }
    }

    fn pick(&self) -> Option<String> {
        let mut current = String::new();
        let mut goodness = 0u64;

        for node in &self.nodes {
            let cgn = self.goodness.request_goodness(node);
            if goodness <= self.min_goodness || current.is_empty() || goodness < cgn {
                current = node.clone();
                goodness = cgn;
            }
        }

        if goodness <= self.min_goodness || current.is_empty() {
            None
        } else {
            Some(current)
        }
    }
}

#[async_trait]
impl RedirectWriter for Selector {
    async fn redirect_write(
        &self,
        req: kv_mux::RequestHandle<Request, kv_protocol::Response>,
    ) -> RedirectOutcome {
        let Some(target) = self.pick() else {
            return RedirectOutcome::Declined { req };
        };

        let Some(client) = self.forwarder.get_or_create(&target).await else {
            return RedirectOutcome::Declined { req };
        };

        match client.call(req.message.clone(), None).await {
            Ok(pending) => {
                tokio::spawn(async move {
                    match pending.get().await {
                        Ok(resp) => {
                            req.reply(resp).await;
                        }
                        Err(e) => {
                            req.reply(crate::responses::error_response(&e.to_string()))
                                .await;
                        }
                    }
                });
                RedirectOutcome::Forwarded { target }
            }
            Err(_) => RedirectOutcome::Declined { req },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap as StdHashMap;

    use async_trait::async_trait;
    use kv_mux::Client;
    use kv_protocol::Response;

    use crate::dialer::Dialer;

    use super::*;

    struct UnreachableDialer;

    #[async_trait]
    impl Dialer for UnreachableDialer {
        async fn dial(&self, _node: &str) -> anyhow::Result<Arc<Client<Response, Request>>> {
            anyhow::bail!("not reachable in this test")
        }
    }

    struct MapGoodness(StdHashMap<&'static str, u64>);

    impl NodeGoodness for MapGoodness {
        fn request_goodness(&self, node: &str) -> u64 {
            self.0.get(node).copied().unwrap_or(0)
        }
    }

    fn selector(nodes: &[&'static str], scores: &[(&'static str, u64)], min_goodness: u64) -> Selector {
        let forwarder = Arc::new(Forwarder::new(Arc::new(UnreachableDialer), false));
        let goodness = Arc::new(MapGoodness(scores.iter().copied().collect()));
        Selector::new(
            forwarder,
            goodness,
            nodes.iter().map(|s| s.to_string()).collect(),
            min_goodness,
        )
    }

    #[test]
    fn picks_the_best_node_above_the_floor() {
        let s = selector(&["a", "b", "c"], &[("a", 3), ("b", 9), ("c", 6)], 5);
        assert_eq!(s.pick(), Some("b".to_string()));
    }

    #[test]
    fn declines_when_nothing_clears_the_floor() {
        let s = selector(&["a", "b"], &[("a", 1), ("b", 2)], 5);
        assert_eq!(s.pick(), None);
    }

    #[test]
    fn declines_on_an_empty_node_list() {
        let s = selector(&[], &[], 0);
        assert_eq!(s.pick(), None);
    }

    #[test]
    fn best_node_wins_regardless_of_position() {
        let below_then_above = selector(&["a", "b", "c"], &[("a", 2), ("b", 1), ("c", 9)], 5);
        let above_then_below = selector(&["c", "a", "b"], &[("a", 2), ("b", 1), ("c", 9)], 5);
        assert_eq!(below_then_above.pick(), Some("c".to_string()));
        assert_eq!(above_then_below.pick(), Some("c".to_string()));
    }
}
