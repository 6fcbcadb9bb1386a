use std::collections::HashMap;

use kv_routing::NodeGoodness;

/// Demo [`NodeGoodness`] oracle: serves a score out of a static table loaded from
/// config. A real deployment would derive this from live signal (queue depth,
/// remaining capacity, latency) rather than a fixed table.
pub struct ConfiguredGoodness {
    scores: HashMap<String, u64>,
}

impl ConfiguredGoodness {
    pub fn new(scores: HashMap<String, u64>) -> Self {
        Self { scores }
    }
}

impl NodeGoodness for ConfiguredGoodness {
    fn request_goodness(&self, node: &str) -> u64 {
        self.scores.get(node).copied().unwrap_or(0)
    }
}
