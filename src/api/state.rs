use crate::coordinator::Coordinator;
use crate::transport::ConnectionManager;
use crate::voting::VotingEngine;

/// Handles the HTTP handlers read from and forward to
#[derive(Clone, Debug)]
pub struct ControlState {
    pub engine: VotingEngine,
    pub manager: ConnectionManager,
}

impl ControlState {
    pub fn new(engine: VotingEngine, manager: ConnectionManager) -> Self {
        Self { engine, manager }
    }
}

impl From<&Coordinator> for ControlState {
    fn from(coordinator: &Coordinator) -> Self {
        Self::new(coordinator.engine().clone(), coordinator.manager().clone())
    }
}
