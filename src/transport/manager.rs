//! Connection Manager: the single owner of the session table.
//!
//! Callers hold a cheap `ConnectionManager` handle; every read or mutation of
//! the table is a command processed by one actor task.
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::pending::{PendingReply, ReplySender};
use super::session::{split_stream, Session, SessionHandle};
use super::traits::Broadcaster;
use crate::error::{ClockVoteError, Result};
use crate::node::{wall_clock_millis, NodeId};
use crate::protocol::{self, Request};
use crate::settings::ConnectionConfig;
use crate::{concurrency_error, transport_error};

/// Public view of one installed session
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub node_id: NodeId,
    pub registered_at_millis: i64,
}

#[derive(Debug)]
pub(crate) enum ManagerCommand {
    Register {
        session: SessionHandle,
        resp_chan: oneshot::Sender<Result<()>>,
    },
    Send {
        node_id: NodeId,
        request: Request,
        reply: ReplySender,
    },
    Broadcast {
        request: Request,
        resp_chan: oneshot::Sender<HashMap<NodeId, PendingReply>>,
    },
    ListSessions {
        resp_chan: oneshot::Sender<Vec<SessionInfo>>,
    },
    SessionClosed {
        node_id: NodeId,
        generation: u64,
    },
    CloseAll {
        resp_chan: oneshot::Sender<Vec<oneshot::Receiver<()>>>,
    },
}

#[derive(Clone, Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    commands: mpsc::Sender<ManagerCommand>,
    next_generation: Arc<AtomicU64>,
}

impl ConnectionManager {
    /// Create the manager and spawn its actor task.
    pub fn new(config: ConnectionConfig) -> Self {
        let (commands, command_rx) = mpsc::channel(1000);
        tokio::spawn(ManagerActor::new().run(command_rx));
        Self {
            config,
            commands,
            next_generation: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Read the registration line from a freshly accepted transport, install
    /// a session for the announced node (superseding any previous one) and
    /// start its reader loop.
    pub async fn accept<S>(&self, stream: S) -> Result<NodeId>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut lines, writer) = split_stream(stream);

        let line = timeout(self.config.registration_timeout, lines.next_line())
            .await
            .map_err(|_| transport_error!("no registration within {:?}", self.config.registration_timeout))??
            .ok_or_else(|| transport_error!("stream closed before registration"))?;
        let registration = protocol::decode_response(&line)?;
        let node_id = registration.node_id;
        if !registration.is_ok() {
            return Err(transport_error!(
                "node {} registered with status {:?}",
                node_id,
                registration.status
            ));
        }
        if !node_id.is_configured(self.config.node_count) {
            return Err(transport_error!(
                "node id {} outside configured set 1..={}",
                node_id,
                self.config.node_count
            ));
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let handle = SessionHandle {
            node_id,
            generation,
            registered_at_millis: wall_clock_millis(),
            commands: session_tx,
        };

        // Install before the reader starts so a fast disconnect cannot be
        // reported ahead of the registration.
        let (resp_tx, resp_rx) = oneshot::channel();
        self.command(ManagerCommand::Register {
            session: handle,
            resp_chan: resp_tx,
        })
        .await?;
        resp_rx
            .await
            .map_err(|_| concurrency_error!("manager dropped registration reply"))??;

        let session = Session::new(
            node_id,
            generation,
            lines,
            writer,
            self.config.request_timeout,
        );
        tokio::spawn(session.run(session_rx, self.commands.clone()));
        Ok(node_id)
    }

    /// Queue a request for one node. The returned reply settles exactly once.
    pub async fn send(&self, node_id: NodeId, request: Request) -> PendingReply {
        let (reply, pending) = PendingReply::channel(node_id);
        if self
            .commands
            .send(ManagerCommand::Send {
                node_id,
                request,
                reply,
            })
            .await
            .is_err()
        {
            // the dropped reply sender settles `pending` as ConnectionClosed
            warn!("[Manager] actor stopped, cannot send {} to {}", request, node_id);
        }
        pending
    }

    /// Send the same request to every node with a live session right now.
    pub async fn broadcast(&self, request: Request) -> HashMap<NodeId, PendingReply> {
        let (resp_tx, resp_rx) = oneshot::channel();
        if self
            .command(ManagerCommand::Broadcast {
                request,
                resp_chan: resp_tx,
            })
            .await
            .is_err()
        {
            return HashMap::new();
        }
        resp_rx.await.unwrap_or_default()
    }

    pub async fn sessions(&self) -> Vec<SessionInfo> {
        let (resp_tx, resp_rx) = oneshot::channel();
        if self
            .command(ManagerCommand::ListSessions { resp_chan: resp_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        resp_rx.await.unwrap_or_default()
    }

    pub async fn list_connected_ids(&self) -> BTreeSet<NodeId> {
        self.sessions()
            .await
            .into_iter()
            .map(|info| info.node_id)
            .collect()
    }

    pub async fn is_connected(&self, node_id: NodeId) -> bool {
        self.list_connected_ids().await.contains(&node_id)
    }

    /// Close every live session and refuse new registrations. Returns once
    /// each closed session has rejected its outstanding requests.
    pub async fn close_all(&self) -> Result<()> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.command(ManagerCommand::CloseAll { resp_chan: resp_tx })
            .await?;
        let acks = resp_rx
            .await
            .map_err(|_| concurrency_error!("manager dropped close reply"))?;
        for ack in acks {
            let _ = ack.await;
        }
        Ok(())
    }

    async fn command(&self, command: ManagerCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| concurrency_error!("connection manager has stopped"))
    }
}

#[async_trait]
impl Broadcaster for ConnectionManager {
    async fn send(&self, node_id: NodeId, request: Request) -> PendingReply {
        ConnectionManager::send(self, node_id, request).await
    }

    async fn broadcast(&self, request: Request) -> HashMap<NodeId, PendingReply> {
        ConnectionManager::broadcast(self, request).await
    }
}

struct ManagerActor {
    sessions: HashMap<NodeId, SessionHandle>,
    accepting: bool,
}

impl ManagerActor {
    fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            accepting: true,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<ManagerCommand>) {
        while let Some(command) = commands.recv().await {
            self.handle(command);
        }
        debug!("[Manager] command channel closed, exiting");
    }

    fn handle(&mut self, command: ManagerCommand) {
        match command {
            ManagerCommand::Register { session, resp_chan } => {
                let result = self.install(session);
                let _ = resp_chan.send(result);
            }
            ManagerCommand::Send {
                node_id,
                request,
                reply,
            } => match self.sessions.get(&node_id) {
                Some(session) => session.request(request, reply),
                None => {
                    let _ = reply.send(Err(ClockVoteError::NotConnected(node_id)));
                }
            },
            ManagerCommand::Broadcast { request, resp_chan } => {
                let replies = self
                    .sessions
                    .values()
                    .map(|session| {
                        let (reply, pending) = PendingReply::channel(session.node_id);
                        session.request(request, reply);
                        (session.node_id, pending)
                    })
                    .collect();
                let _ = resp_chan.send(replies);
            }
            ManagerCommand::ListSessions { resp_chan } => {
                let mut infos: Vec<SessionInfo> = self
                    .sessions
                    .values()
                    .map(|session| SessionInfo {
                        node_id: session.node_id,
                        registered_at_millis: session.registered_at_millis,
                    })
                    .collect();
                infos.sort_by_key(|info| info.node_id);
                let _ = resp_chan.send(infos);
            }
            ManagerCommand::SessionClosed {
                node_id,
                generation,
            } => {
                // a superseded session reports after its replacement is installed
                if matches!(self.sessions.get(&node_id), Some(s) if s.generation == generation) {
                    self.sessions.remove(&node_id);
                    info!("[Manager] node {} disconnected", node_id);
                }
            }
            ManagerCommand::CloseAll { resp_chan } => {
                self.accepting = false;
                let acks = self
                    .sessions
                    .drain()
                    .map(|(_, session)| {
                        let (done_tx, done_rx) = oneshot::channel();
                        session.close(Some(done_tx));
                        done_rx
                    })
                    .collect();
                info!("[Manager] all sessions closed");
                let _ = resp_chan.send(acks);
            }
        }
    }

    fn install(&mut self, session: SessionHandle) -> Result<()> {
        if !self.accepting {
            return Err(transport_error!(
                "shutting down, refusing node {}",
                session.node_id
            ));
        }
        let node_id = session.node_id;
        if let Some(previous) = self.sessions.insert(node_id, session) {
            info!(
                "[Manager] node {} re-registered, superseding session {}",
                node_id, previous.generation
            );
            previous.close(None);
        } else {
            info!("[Manager] node {} connected", node_id);
        }
        Ok(())
    }
}

