use serde::{Deserialize, Serialize};

/// Stable identity of a clock source, a member of the configured set `1..=node_count`.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, PartialOrd, Ord, Eq, Hash,
)]
#[serde(transparent)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// True when this id belongs to the configured set of `node_count` nodes.
    pub fn is_configured(&self, node_count: u32) -> bool {
        self.0 >= 1 && self.0 <= node_count
    }
}

/// All configured node ids in ascending order.
pub fn configured_ids(node_count: u32) -> impl Iterator<Item = NodeId> {
    (1..=node_count).map(NodeId)
}

impl From<u32> for NodeId {
    fn from(id: u32) -> Self {
        NodeId(id)
    }
}

impl std::str::FromStr for NodeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(NodeId)
            .map_err(|e| format!("Invalid node id '{}': {}", s, e))
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
