use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// On-disk configuration for a node, loaded from a TOML file.
///
/// Plain `Deserialize` struct plus a loader function — no bespoke config framework,
/// matching how small the rest of this crate's surface is.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Address this node's mux server listens on, e.g. `"0.0.0.0:7070"`.
    pub listen: String,
    /// Soft ceiling, in bytes, the demo disk-space oracle enforces before it starts
    /// rejecting `Put`s. `None` means unlimited.
    #[serde(default)]
    pub disk_soft_limit_bytes: Option<u64>,
    /// Whether write/read redirection is wired up at all. A single-node deployment
    /// with no peers can leave this `false`.
    #[serde(default)]
    pub redirect_enabled: bool,
    /// Floor a candidate node's goodness must clear for `Selector` to pick it.
    #[serde(default)]
    pub min_goodness: u64,
    /// `node name -> dial address` table used by the TCP dialer to reach peers.
    #[serde(default)]
    pub nodes: HashMap<String, String>,
    /// `node name -> goodness` table the demo [`NodeGoodness`](crate::goodness::ConfiguredGoodness)
    /// oracle serves. A node missing from this table scores `0`.
    #[serde(default)]
    pub goodness: HashMap<String, u64>,
}

impl NodeConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.as_ref().display()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.as_ref().display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_minimal_config() {
        let config: NodeConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:7070"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:7070");
        assert!(!config.redirect_enabled);
        assert_eq!(config.min_goodness, 0);
        assert!(config.nodes.is_empty());
    }

    #[test]
    fn parses_peers_and_limits() {
        let config: NodeConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:7070"
            disk_soft_limit_bytes = 1048576
            redirect_enabled = true
            min_goodness = 3

            [nodes]
            node-a = "10.0.0.1:7070"
            node-b = "10.0.0.2:7070"
            "#,
        )
        .unwrap();
        assert_eq!(config.disk_soft_limit_bytes, Some(1048576));
        assert!(config.redirect_enabled);
        assert_eq!(config.min_goodness, 3);
        assert_eq!(config.nodes.len(), 2);
        assert_eq!(config.nodes.get("node-a").unwrap(), "10.0.0.1:7070");
    }
}
