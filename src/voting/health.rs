//! Per-node health bookkeeping for the voting engine.
use serde::Serialize;
use tracing::{info, warn};

use crate::node::NodeId;
use crate::protocol::Response;

pub const DEFAULT_WEIGHT: f64 = 1.0;
pub const MIN_WEIGHT: f64 = 0.0;
pub const MAX_WEIGHT: f64 = 10.0;

pub fn is_valid_weight(weight: f64) -> bool {
    (MIN_WEIGHT..=MAX_WEIGHT).contains(&weight)
}

/// What a failed exchange did to a node's health
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Still below the threshold; carries the new failure count
    MissedBeat(u32),
    /// The counter just reached the threshold
    Disconnected,
    /// Already at or past the threshold
    StillDisconnected,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHealth {
    pub node_id: NodeId,
    pub connected: bool,
    pub consecutive_failures: u32,
    pub last_response: Option<Response>,
    pub last_seen_millis: Option<i64>,
    pub weight: f64,
}

impl NodeHealth {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            connected: false,
            consecutive_failures: 0,
            last_response: None,
            last_seen_millis: None,
            weight: DEFAULT_WEIGHT,
        }
    }

    /// Record a reply. Returns true when this flips the node back to connected.
    pub fn record_success(&mut self, response: Response, now_millis: i64) -> bool {
        let reconnected = !self.connected;
        self.consecutive_failures = 0;
        self.connected = true;
        self.last_seen_millis = Some(now_millis);
        self.last_response = Some(response);
        if reconnected {
            info!("[Voting] node {} is connected", self.node_id);
        }
        reconnected
    }

    /// Record a timeout or communication failure. The disconnect transition
    /// is reported only on the failure that first reaches `threshold`.
    pub fn record_failure(&mut self, threshold: u32) -> FailureOutcome {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures < threshold {
            warn!(
                "[Voting] node {} missed a beat ({}/{})",
                self.node_id, self.consecutive_failures, threshold
            );
            FailureOutcome::MissedBeat(self.consecutive_failures)
        } else if self.consecutive_failures == threshold {
            self.connected = false;
            warn!(
                "[Voting] node {} marked disconnected after {} consecutive failures",
                self.node_id, threshold
            );
            FailureOutcome::Disconnected
        } else {
            self.connected = false;
            FailureOutcome::StillDisconnected
        }
    }

    pub fn clear_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn last_reported_millis(&self) -> Option<i64> {
        self.last_response
            .as_ref()
            .map(|response| response.timestamp_millis)
    }
}
