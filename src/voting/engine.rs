//! Voting Engine: sole owner of node health, weights and the published
//! system estimate.
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use super::estimate::{weighted_estimate, SystemEstimate};
use super::health::{is_valid_weight, FailureOutcome, NodeHealth, DEFAULT_WEIGHT};
use crate::error::{ClockVoteError, Result};
use crate::node::{configured_ids, wall_clock_millis, NodeId};
use crate::protocol::{Request, RequestKind, Response, ResponseStatus};
use crate::settings::VotingConfig;
use crate::transport::{Broadcaster, PendingReply};

/// Slack past the request timeout before a round stops waiting on a session
const ROUND_GRACE: Duration = Duration::from_millis(250);

/// What one voting round did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundOutcome {
    /// No node was connected; nothing changed
    Skipped,
    /// Nodes were polled but none returned an OK reading; prior estimate kept
    NoValidResponses { queried: usize },
    /// A new estimate was published
    Published(SystemEstimate),
}

#[derive(Debug)]
struct VotingState {
    health: BTreeMap<NodeId, NodeHealth>,
    weights: HashMap<NodeId, f64>,
    estimate: Option<SystemEstimate>,
    active_count: usize,
}

impl VotingState {
    fn new(node_count: u32) -> Self {
        Self {
            health: configured_ids(node_count)
                .map(|id| (id, NodeHealth::new(id)))
                .collect(),
            weights: HashMap::new(),
            estimate: None,
            active_count: 0,
        }
    }

    fn weight(&self, node_id: NodeId) -> f64 {
        self.weights.get(&node_id).copied().unwrap_or(DEFAULT_WEIGHT)
    }
}

#[derive(Clone)]
pub struct VotingEngine {
    config: VotingConfig,
    broadcaster: Arc<dyn Broadcaster>,
    state: Arc<Mutex<VotingState>>,
}

impl std::fmt::Debug for VotingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VotingEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl VotingEngine {
    pub fn new(config: VotingConfig, broadcaster: Arc<dyn Broadcaster>) -> Self {
        let state = VotingState::new(config.node_count);
        Self {
            config,
            broadcaster,
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn config(&self) -> &VotingConfig {
        &self.config
    }

    fn state(&self) -> Result<MutexGuard<'_, VotingState>> {
        self.state.lock().map_err(|e| {
            ClockVoteError::Concurrency(format!("Failed to acquire voting state lock: {}", e))
        })
    }

    /// Poll every connected node once and fold the replies into health and
    /// the published estimate.
    pub async fn run_round(&self) -> Result<RoundOutcome> {
        let replies = self.broadcaster.broadcast(Request::QueryTime).await;
        if replies.is_empty() {
            debug!("[Voting] no nodes connected, skipping round");
            return Ok(RoundOutcome::Skipped);
        }

        // every reply already self-bounds; this only caps a stalled session
        let deadline = Instant::now() + self.config.request_timeout + ROUND_GRACE;
        let mut outcomes = Vec::with_capacity(replies.len());
        for (node_id, reply) in replies {
            let outcome = match timeout_at(deadline, reply).await {
                Ok(result) => result,
                Err(_) => Err(ClockVoteError::Timeout(node_id)),
            };
            outcomes.push((node_id, outcome));
        }
        self.apply_round(outcomes, wall_clock_millis())
    }

    /// Apply one round's settled replies. The health table, weights and
    /// estimate are updated under a single lock, so readers never see a
    /// partial round.
    pub fn apply_round(
        &self,
        outcomes: Vec<(NodeId, Result<Response>)>,
        now_millis: i64,
    ) -> Result<RoundOutcome> {
        if outcomes.is_empty() {
            return Ok(RoundOutcome::Skipped);
        }
        let threshold = self.config.disconnect_threshold;
        let mut state = self.state()?;
        let queried = outcomes.len();
        let mut samples = Vec::new();

        for (node_id, outcome) in outcomes {
            let weight = state.weight(node_id);
            let Some(health) = state.health.get_mut(&node_id) else {
                warn!("[Voting] ignoring reply from unconfigured node {}", node_id);
                continue;
            };
            match outcome {
                Ok(response) => {
                    if response.status == ResponseStatus::Ok {
                        samples.push((response.timestamp_millis, weight));
                    } else {
                        debug!(
                            "[Voting] node {} replied {:?}, not counted",
                            node_id, response.status
                        );
                    }
                    health.record_success(response, now_millis);
                }
                Err(e) => {
                    if let FailureOutcome::StillDisconnected = health.record_failure(threshold) {
                        debug!("[Voting] node {} still unreachable: {}", node_id, e);
                    }
                }
            }
        }

        state.active_count = samples.len();
        let Some(value) = weighted_estimate(&samples) else {
            info!(
                "[Voting] no valid readings from {} node(s), keeping previous estimate",
                queried
            );
            return Ok(RoundOutcome::NoValidResponses { queried });
        };

        let estimate = SystemEstimate {
            value,
            computed_at: now_millis,
            contributing_count: samples.len(),
        };
        state.estimate = Some(estimate);
        info!(
            "[Voting] estimate {} ({:+}ms from local clock) from {} node(s)",
            value,
            value - now_millis,
            samples.len()
        );
        Ok(RoundOutcome::Published(estimate))
    }

    pub fn get_estimate(&self) -> Result<Option<SystemEstimate>> {
        Ok(self.state()?.estimate)
    }

    /// Estimate minus the wall clock at the moment of reading.
    pub fn get_deviation(&self) -> Result<Option<i64>> {
        Ok(self
            .get_estimate()?
            .map(|estimate| estimate.value - wall_clock_millis()))
    }

    pub fn get_active_count(&self) -> Result<usize> {
        Ok(self.state()?.active_count)
    }

    pub fn get_weight(&self, node_id: NodeId) -> Result<f64> {
        Ok(self.state()?.weight(node_id))
    }

    /// Replace a node's weight; takes effect the next time a round reads it.
    pub fn set_weight(&self, node_id: NodeId, weight: f64) -> Result<()> {
        if !is_valid_weight(weight) {
            return Err(ClockVoteError::InvalidWeight(weight));
        }
        if !node_id.is_configured(self.config.node_count) {
            return Err(ClockVoteError::UnknownNode(node_id));
        }
        self.state()?.weights.insert(node_id, weight);
        info!("[Voting] weight of node {} set to {}", node_id, weight);
        Ok(())
    }

    /// One entry per configured node, ascending by id.
    pub fn health_snapshot(&self) -> Result<Vec<NodeHealth>> {
        let state = self.state()?;
        Ok(state
            .health
            .values()
            .map(|health| NodeHealth {
                weight: state.weight(health.node_id),
                ..health.clone()
            })
            .collect())
    }

    pub fn node_health(&self, node_id: NodeId) -> Result<NodeHealth> {
        self.health_snapshot()?
            .into_iter()
            .find(|health| health.node_id == node_id)
            .ok_or(ClockVoteError::UnknownNode(node_id))
    }

    /// Forward a fault-control request to one node.
    pub async fn inject_fault(&self, node_id: NodeId, request: Request) -> Result<PendingReply> {
        if request.kind() == RequestKind::ResetFaults {
            // a manual reset is not charged for the round still in flight
            self.clear_failures(node_id)?;
        }
        info!("[Voting] sending {} to node {}", request, node_id);
        Ok(self.broadcaster.send(node_id, request).await)
    }

    pub async fn reset_faults(&self, node_id: NodeId) -> Result<PendingReply> {
        self.inject_fault(node_id, Request::ResetFaults).await
    }

    fn clear_failures(&self, node_id: NodeId) -> Result<()> {
        let mut state = self.state()?;
        if let Some(health) = state.health.get_mut(&node_id) {
            health.clear_failures();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    /// Answers every node with the same canned timestamp.
    struct StaticBroadcaster {
        connected: Vec<NodeId>,
        timestamp: i64,
    }

    #[async_trait]
    impl Broadcaster for StaticBroadcaster {
        async fn send(&self, node_id: NodeId, _request: Request) -> PendingReply {
            if self.connected.contains(&node_id) {
                PendingReply::ready(node_id, Ok(Response::ok(node_id, self.timestamp, "ok")))
            } else {
                PendingReply::ready(node_id, Err(ClockVoteError::NotConnected(node_id)))
            }
        }

        async fn broadcast(&self, request: Request) -> HashMap<NodeId, PendingReply> {
            let mut replies = HashMap::new();
            for node_id in &self.connected {
                replies.insert(*node_id, self.send(*node_id, request).await);
            }
            replies
        }
    }

    fn config() -> VotingConfig {
        VotingConfig {
            node_count: 4,
            request_timeout: Duration::from_millis(50),
            ..VotingConfig::default()
        }
    }

    fn engine(connected: &[u32], timestamp: i64) -> VotingEngine {
        let broadcaster = StaticBroadcaster {
            connected: connected.iter().copied().map(NodeId::new).collect(),
            timestamp,
        };
        VotingEngine::new(config(), Arc::new(broadcaster))
    }

    fn ok(id: u32, ts: i64) -> (NodeId, Result<Response>) {
        (NodeId::new(id), Ok(Response::ok(NodeId::new(id), ts, "time reported")))
    }

    #[tokio::test]
    async fn test_round_publishes_weighted_estimate() {
        let engine = engine(&[1, 2], 5000);
        let outcome = engine.run_round().await.unwrap();
        assert!(matches!(outcome, RoundOutcome::Published(e) if e.value == 5000 && e.contributing_count == 2));
        assert_eq!(engine.get_active_count().unwrap(), 2);
        assert!(engine.node_health(NodeId::new(1)).unwrap().connected);
        assert!(!engine.node_health(NodeId::new(3)).unwrap().connected);
    }

    #[tokio::test]
    async fn test_round_with_no_nodes_is_skipped() {
        let engine = engine(&[], 0);
        let before = engine.health_snapshot().unwrap();
        assert_eq!(engine.run_round().await.unwrap(), RoundOutcome::Skipped);
        assert_eq!(engine.health_snapshot().unwrap(), before);
        assert_eq!(engine.get_estimate().unwrap(), None);
    }

    #[test]
    fn test_weights_apply_to_the_average() {
        let engine = engine(&[], 0);
        engine.set_weight(NodeId::new(2), 3.0).unwrap();
        let outcome = engine.apply_round(vec![ok(1, 1000), ok(2, 2000)], 10).unwrap();
        assert!(matches!(outcome, RoundOutcome::Published(e) if e.value == 1750));
    }

    #[test]
    fn test_invalid_weight_leaves_table_unchanged() {
        let engine = engine(&[], 0);
        engine.set_weight(NodeId::new(1), 4.0).unwrap();
        assert!(matches!(
            engine.set_weight(NodeId::new(1), 10.5),
            Err(ClockVoteError::InvalidWeight(_))
        ));
        assert!(engine.set_weight(NodeId::new(1), -1.0).is_err());
        assert_eq!(engine.get_weight(NodeId::new(1)).unwrap(), 4.0);
        assert_eq!(engine.get_weight(NodeId::new(2)).unwrap(), DEFAULT_WEIGHT);
        assert!(matches!(
            engine.set_weight(NodeId::new(9), 1.0),
            Err(ClockVoteError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_non_ok_replies_keep_prior_estimate() {
        let engine = engine(&[], 0);
        engine.apply_round(vec![ok(1, 1234)], 1).unwrap();

        let crashed = Response::new(NodeId::new(1), 9999, ResponseStatus::Crashed, "crashed");
        let outcome = engine
            .apply_round(vec![(NodeId::new(1), Ok(crashed))], 2)
            .unwrap();
        assert_eq!(outcome, RoundOutcome::NoValidResponses { queried: 1 });

        let estimate = engine.get_estimate().unwrap().unwrap();
        assert_eq!(estimate.value, 1234);
        assert_eq!(estimate.computed_at, 1);
        assert_eq!(engine.get_active_count().unwrap(), 0);
        // a CRASHED reply is still a reply
        assert_eq!(engine.node_health(NodeId::new(1)).unwrap().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_reset_clears_failures_immediately() {
        let engine = engine(&[1], 0);
        engine.apply_round(vec![ok(1, 1)], 1).unwrap();
        engine
            .apply_round(vec![(NodeId::new(1), Err(ClockVoteError::Timeout(NodeId::new(1))))], 2)
            .unwrap();
        assert_eq!(engine.node_health(NodeId::new(1)).unwrap().consecutive_failures, 1);

        let reply = engine.reset_faults(NodeId::new(1)).await.unwrap();
        assert_eq!(engine.node_health(NodeId::new(1)).unwrap().consecutive_failures, 0);
        assert!(reply.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_fault_to_absent_node_is_not_connected() {
        let engine = engine(&[1], 0);
        let reply = engine
            .inject_fault(NodeId::new(2), Request::InjectCrash)
            .await
            .unwrap();
        assert!(matches!(reply.await, Err(ClockVoteError::NotConnected(_))));
    }
}
