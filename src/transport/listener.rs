//! TCP accept loop for inbound clock node connections.
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::manager::ConnectionManager;
use crate::error::Result;
use crate::transport_error;

/// Pause after a failed accept; errors like EMFILE repeat until resources free up.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct NodeListener {
    local_addr: SocketAddr,
    listener: TcpListener,
}

impl NodeListener {
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| transport_error!("Socket creation failed: {}", e))?;
        Ok(Self {
            local_addr,
            listener,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections until `shutdown` flips to true. Each connection is
    /// handed to the manager on its own task so a slow registration never
    /// blocks the loop.
    pub fn spawn(
        self,
        manager: ConnectionManager,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("[Listener] accepting clock nodes on {}", self.local_addr);
            loop {
                tokio::select! {
                    accepted = self.listener.accept() => {
                        let (stream, peer_addr) = match accepted {
                            Ok(conn) => conn,
                            Err(e) => {
                                error!("[Listener] accept failed: {}", e);
                                tokio::select! {
                                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => continue,
                                    changed = shutdown.changed() => {
                                        if changed.is_err() || *shutdown.borrow() {
                                            break;
                                        }
                                        continue;
                                    }
                                }
                            }
                        };
                        if let Err(e) = stream.set_nodelay(true) {
                            warn!("[Listener] set_nodelay failed for {}: {}", peer_addr, e);
                        }
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            match manager.accept(stream).await {
                                Ok(node_id) => info!("[Listener] node {} registered from {}", node_id, peer_addr),
                                Err(e) => warn!("[Listener] rejected connection from {}: {}", peer_addr, e),
                            }
                        });
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("[Listener] stopped");
        })
    }
}
