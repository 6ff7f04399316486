//! Seam between the voting engine and whatever delivers requests to nodes.
use std::collections::HashMap;

use async_trait::async_trait;

use super::pending::PendingReply;
use crate::node::NodeId;
use crate::protocol::Request;

/// Anything that can deliver requests to clock nodes and hand back
/// self-bounding reply handles
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Send a request to one node. Fails through the reply, never by blocking.
    async fn send(&self, node_id: NodeId, request: Request) -> PendingReply;

    /// Send a request to every node connected at the time of the call
    async fn broadcast(&self, request: Request) -> HashMap<NodeId, PendingReply>;
}
