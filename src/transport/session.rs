//! One live connection to a clock node.
//!
//! A session task exclusively owns the line reader and the pending slots.
//! Writes go through a writer task fed in slot order, so a peer that stops
//! reading can stall the writer but never the reader or the deadlines.
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use super::manager::ManagerCommand;
use super::pending::{PendingSlots, ReplySender};
use crate::error::ClockVoteError;
use crate::node::NodeId;
use crate::protocol::{self, Message, Request};

/// Commands accepted by a session task
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Request {
        request: Request,
        reply: ReplySender,
    },
    /// Tear the session down; `done` fires once every pending request is rejected.
    Close { done: Option<oneshot::Sender<()>> },
}

/// What the manager keeps for each installed session
#[derive(Clone, Debug)]
pub(crate) struct SessionHandle {
    pub node_id: NodeId,
    pub generation: u64,
    pub registered_at_millis: i64,
    pub commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Forward a request; if the session task is already gone the reply
    /// channel is dropped, which the caller observes as `ConnectionClosed`.
    pub fn request(&self, request: Request, reply: ReplySender) {
        if let Err(mpsc::error::SendError(SessionCommand::Request { reply, .. })) = self
            .commands
            .send(SessionCommand::Request { request, reply })
        {
            let _ = reply.send(Err(ClockVoteError::ConnectionClosed(self.node_id)));
        }
    }

    pub fn close(&self, done: Option<oneshot::Sender<()>>) {
        let _ = self.commands.send(SessionCommand::Close { done });
    }
}

pub(crate) struct Session<R> {
    node_id: NodeId,
    generation: u64,
    lines: Lines<BufReader<R>>,
    outbound: mpsc::UnboundedSender<Request>,
    writer_task: Option<JoinHandle<()>>,
    pending: PendingSlots,
    request_timeout: Duration,
}

impl<R> Session<R>
where
    R: AsyncRead + Unpin,
{
    /// Must be called from within a tokio runtime; spawns the writer task.
    pub fn new<W>(
        node_id: NodeId,
        generation: u64,
        lines: Lines<BufReader<R>>,
        writer: W,
        request_timeout: Duration,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(write_loop(node_id, writer, outbound_rx));
        Self {
            node_id,
            generation,
            lines,
            outbound,
            writer_task: Some(writer_task),
            pending: PendingSlots::new(node_id),
            request_timeout,
        }
    }

    /// Run until the stream fails or ends, or the manager closes the session,
    /// then reject whatever is still pending and report back to the manager.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<SessionCommand>,
        manager: mpsc::Sender<ManagerCommand>,
    ) {
        let node_id = self.node_id;
        let mut close_ack = None;

        loop {
            let next_deadline = self.pending.next_deadline();
            tokio::select! {
                line = self.lines.next_line() => match line {
                    Ok(Some(line)) => self.handle_line(&line),
                    Ok(None) => {
                        info!("[Session<{}>] stream ended", node_id);
                        break;
                    }
                    Err(e) => {
                        warn!("[Session<{}>] read failed: {}", node_id, e);
                        break;
                    }
                },
                command = commands.recv() => match command {
                    Some(SessionCommand::Request { request, reply }) => {
                        // armed on receipt, independent of how long the write takes
                        let deadline = Instant::now() + self.request_timeout;
                        self.pending.push(reply, deadline);
                        if self.outbound.send(request).is_err() {
                            warn!("[Session<{}>] writer gone, cannot send {}", node_id, request);
                            break;
                        }
                    }
                    Some(SessionCommand::Close { done }) => {
                        debug!("[Session<{}>] closed by manager", node_id);
                        close_ack = done;
                        break;
                    }
                    None => break,
                },
                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    let expired = self.pending.expire(Instant::now());
                    if expired > 0 {
                        debug!("[Session<{}>] {} request(s) timed out", node_id, expired);
                    }
                }
                _ = Self::writer_finished(&mut self.writer_task) => {
                    self.writer_task = None;
                    warn!("[Session<{}>] writer stopped", node_id);
                    break;
                }
            }
        }

        self.teardown(&mut commands).await;
        if let Some(done) = close_ack {
            let _ = done.send(());
        }
        let _ = manager
            .send(ManagerCommand::SessionClosed {
                node_id,
                generation: self.generation,
            })
            .await;
    }

    async fn writer_finished(writer_task: &mut Option<JoinHandle<()>>) {
        match writer_task {
            Some(task) => {
                let _ = task.await;
            }
            None => std::future::pending().await,
        }
    }

    fn handle_line(&mut self, line: &str) {
        match protocol::decode_message(line) {
            Ok(Message::Request(request)) => {
                warn!(
                    "[Session<{}>] protocol violation: node sent a request ({}), dropped",
                    self.node_id, request
                );
            }
            Ok(Message::Response(response)) => {
                if response.node_id != self.node_id {
                    warn!(
                        "[Session<{}>] reply claims node id {}",
                        self.node_id, response.node_id
                    );
                }
                if let Err(unmatched) = self.pending.resolve_next(response) {
                    warn!(
                        "[Session<{}>] protocol violation: reply with no pending request, dropped: {:?}",
                        self.node_id, unmatched
                    );
                }
            }
            Err(e) => {
                warn!("[Session<{}>] dropping undecodable line: {}", self.node_id, e);
            }
        }
    }

    async fn teardown(&mut self, commands: &mut mpsc::UnboundedReceiver<SessionCommand>) {
        // Unwritten requests are rejected below, so the writer need not drain.
        // Aborting also frees a writer stuck on a peer that stopped reading.
        if let Some(writer_task) = self.writer_task.take() {
            writer_task.abort();
            let _ = writer_task.await;
        }
        commands.close();
        // requests that raced with the teardown never reached the wire
        while let Ok(command) = commands.try_recv() {
            match command {
                SessionCommand::Request { reply, .. } => {
                    let _ = reply.send(Err(ClockVoteError::ConnectionClosed(self.node_id)));
                }
                SessionCommand::Close { done } => {
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                }
            }
        }
        let rejected = self.pending.close_all();
        info!(
            "[Session<{}>] torn down, {} pending request(s) rejected",
            self.node_id, rejected
        );
    }
}

/// Write queued requests in order until the queue closes or a write fails.
async fn write_loop<W>(node_id: NodeId, mut writer: W, mut outbound: mpsc::UnboundedReceiver<Request>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(request) = outbound.recv().await {
        if let Err(e) = protocol::write_message(&mut writer, &request).await {
            warn!("[Session<{}>] write of {} failed: {}", node_id, request, e);
            return;
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("[Session<{}>] shutdown of writer failed: {}", node_id, e);
    }
}

/// Split a stream into the reader/writer pair a session owns.
pub(crate) fn split_stream<S>(
    stream: S,
) -> (
    Lines<BufReader<tokio::io::ReadHalf<S>>>,
    tokio::io::WriteHalf<S>,
)
where
    S: AsyncRead + AsyncWrite,
{
    let (read_half, write_half) = tokio::io::split(stream);
    (BufReader::new(read_half).lines(), write_half)
}
