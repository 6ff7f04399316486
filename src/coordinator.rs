//! Coordinator process wiring: node listener, Connection Manager, Voting
//! Engine and its round driver, plus the ordered shutdown of all of them.
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::Result;
use crate::settings::Settings;
use crate::transport::{ConnectionManager, NodeListener};
use crate::voting::{spawn_round_driver, VotingEngine};

pub struct Coordinator {
    manager: ConnectionManager,
    engine: VotingEngine,
    node_addr: SocketAddr,
    listener_stop: watch::Sender<bool>,
    listener_task: JoinHandle<()>,
    driver_stop: watch::Sender<bool>,
    driver_task: JoinHandle<()>,
}

impl Coordinator {
    pub async fn start(settings: Settings) -> Result<Self> {
        settings.validate()?;

        let listener = NodeListener::bind(settings.nodes_socket_addr()?).await?;
        let node_addr = listener.local_addr();

        let manager = ConnectionManager::new(settings.connection_config());
        let engine = VotingEngine::new(settings.voting_config(), Arc::new(manager.clone()));

        let (listener_stop, listener_rx) = watch::channel(false);
        let listener_task = listener.spawn(manager.clone(), listener_rx);

        let (driver_stop, driver_rx) = watch::channel(false);
        let driver_task = spawn_round_driver(engine.clone(), driver_rx);

        info!(
            "[Coordinator] started for {} node(s), listening on {}",
            settings.node_count, node_addr
        );
        Ok(Self {
            manager,
            engine,
            node_addr,
            listener_stop,
            listener_task,
            driver_stop,
            driver_task,
        })
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn engine(&self) -> &VotingEngine {
        &self.engine
    }

    /// Address clock nodes dial; useful when bound to port 0.
    pub fn node_addr(&self) -> SocketAddr {
        self.node_addr
    }

    /// Stop accepting, close every session, then stop the round driver.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.listener_stop.send(true);
        if let Err(e) = self.listener_task.await {
            warn!("[Coordinator] listener task ended abnormally: {}", e);
        }

        self.manager.close_all().await?;

        let _ = self.driver_stop.send(true);
        if let Err(e) = self.driver_task.await {
            warn!("[Coordinator] round driver ended abnormally: {}", e);
        }
        info!("[Coordinator] shut down");
        Ok(())
    }
}
