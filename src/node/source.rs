//! Clock source node: dials the coordinator, announces itself, and answers
//! requests one at a time in the order they arrive.
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, error, info, warn};

use super::clock::VirtualClock;
use super::NodeId;
use crate::error::Result;
use crate::protocol::{self, Request, Response, ResponseStatus};

/// Why a single connection ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disconnect {
    /// The coordinator closed the stream
    EndOfStream,
    /// Read or write failed
    IoError,
}

#[derive(Debug)]
pub struct ClockSource {
    node_id: NodeId,
    clock: VirtualClock,
    crashed: bool,
}

impl ClockSource {
    pub fn new(node_id: NodeId) -> Self {
        Self::with_clock(node_id, VirtualClock::new())
    }

    pub fn with_clock(node_id: NodeId, clock: VirtualClock) -> Self {
        Self {
            node_id,
            clock,
            crashed: false,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    pub fn is_crashed(&self) -> bool {
        self.crashed
    }

    /// Unsolicited announcement sent first on every connection.
    pub fn registration(&self) -> Response {
        Response::ok(
            self.node_id,
            self.clock.now_millis(),
            format!("node {} connected", self.node_id),
        )
    }

    fn reply(&self, status: ResponseStatus, message: impl Into<String>) -> Response {
        Response::new(self.node_id, self.clock.now_millis(), status, message)
    }

    /// Apply one request. `None` means the node stays silent.
    pub fn handle(&mut self, request: Request) -> Option<Response> {
        if self.crashed && request != Request::ResetFaults {
            debug!("[Node<{}>] crashed, ignoring {}", self.node_id, request);
            return None;
        }

        let response = match request {
            Request::QueryTime => self.reply(ResponseStatus::Ok, "time reported"),
            Request::Ping => self.reply(ResponseStatus::Ok, "pong"),
            Request::InjectCrash => {
                self.crashed = true;
                warn!("[Node<{}>] CRASHED", self.node_id);
                self.reply(ResponseStatus::Crashed, "crashed")
            }
            Request::InjectOffset(offset_ms) => {
                self.clock.set_offset(offset_ms);
                info!("[Node<{}>] time offset injected: {}ms", self.node_id, offset_ms);
                self.reply(ResponseStatus::Ok, format!("offset set to {}ms", offset_ms))
            }
            Request::ResetFaults => {
                self.clock.clear_offset();
                self.crashed = false;
                info!("[Node<{}>] faults reset", self.node_id);
                self.reply(ResponseStatus::Ok, "faults reset")
            }
        };
        Some(response)
    }

    /// Decode and apply one wire line. Undecodable requests get an `ERROR` reply
    /// so that the coordinator's positional matching stays aligned.
    pub fn handle_line(&mut self, line: &str) -> Option<Response> {
        match protocol::decode_request(line) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!("[Node<{}>] bad request line: {}", self.node_id, e);
                if self.crashed {
                    None
                } else {
                    Some(self.reply(ResponseStatus::Error, "unknown request type"))
                }
            }
        }
    }

    /// Serve one established connection until it drops.
    pub async fn serve<S>(&mut self, stream: S) -> Disconnect
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (read_half, mut write_half) = tokio::io::split(stream);

        if let Err(e) = protocol::write_message(&mut write_half, &self.registration()).await {
            error!("[Node<{}>] registration failed: {}", self.node_id, e);
            return Disconnect::IoError;
        }

        let mut lines = BufReader::new(read_half).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return Disconnect::EndOfStream,
                Err(e) => {
                    error!("[Node<{}>] read failed: {}", self.node_id, e);
                    return Disconnect::IoError;
                }
            };

            if let Some(response) = self.handle_line(&line) {
                if let Err(e) = protocol::write_message(&mut write_half, &response).await {
                    error!("[Node<{}>] write failed: {}", self.node_id, e);
                    return Disconnect::IoError;
                }
            }
        }
    }

    async fn connect(&self, coordinator: &str) -> Result<TcpStream> {
        let stream = TcpStream::connect(coordinator).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    /// Connect and serve forever, reconnecting after `backoff` on any disconnect.
    /// Returns once the node has crashed and its connection has dropped.
    pub async fn run(mut self, coordinator: String, backoff: Duration) {
        info!("[Node<{}>] starting, drift {}ms", self.node_id, self.clock.drift_ms());

        loop {
            match self.connect(&coordinator).await {
                Ok(stream) => {
                    info!("[Node<{}>] connected to {}", self.node_id, coordinator);
                    let reason = self.serve(stream).await;
                    info!("[Node<{}>] disconnected: {:?}", self.node_id, reason);
                }
                Err(e) => {
                    warn!("[Node<{}>] connection to {} failed: {}", self.node_id, coordinator, e);
                }
            }

            if self.crashed {
                info!("[Node<{}>] crashed - terminating", self.node_id);
                return;
            }

            tokio::time::sleep(backoff).await;
            info!("[Node<{}>] reconnecting...", self.node_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> ClockSource {
        ClockSource::with_clock(NodeId::new(5), VirtualClock::with_drift(0))
    }

    #[test]
    fn test_query_and_ping_answer_ok() {
        let mut node = source();
        let reply = node.handle(Request::QueryTime).unwrap();
        assert_eq!(reply.status, ResponseStatus::Ok);
        assert_eq!(reply.node_id, NodeId::new(5));
        assert!(node.handle(Request::Ping).unwrap().is_ok());
    }

    #[test]
    fn test_crash_answers_once_then_goes_silent() {
        let mut node = source();
        let reply = node.handle(Request::InjectCrash).unwrap();
        assert_eq!(reply.status, ResponseStatus::Crashed);
        assert!(node.is_crashed());

        assert!(node.handle(Request::QueryTime).is_none());
        assert!(node.handle(Request::Ping).is_none());
        assert!(node.handle(Request::InjectCrash).is_none());
        assert!(node.handle(Request::InjectOffset(5)).is_none());
        assert!(node.handle_line("garbage").is_none());
    }

    #[test]
    fn test_reset_recovers_from_crash_and_offset() {
        let mut node = source();
        node.handle(Request::InjectOffset(1_000));
        assert_eq!(node.clock().offset_ms(), 1_000);
        node.handle(Request::InjectCrash);

        let reply = node.handle(Request::ResetFaults).unwrap();
        assert!(reply.is_ok());
        assert!(!node.is_crashed());
        assert_eq!(node.clock().offset_ms(), 0);
        assert!(node.handle(Request::QueryTime).unwrap().is_ok());
    }

    #[test]
    fn test_reset_is_idempotent() {
        let mut node = source();
        assert!(node.handle(Request::ResetFaults).unwrap().is_ok());
        assert!(node.handle(Request::ResetFaults).unwrap().is_ok());
        assert!(!node.is_crashed());
        assert_eq!(node.clock().offset_ms(), 0);
    }

    #[test]
    fn test_bad_line_gets_error_reply() {
        let mut node = source();
        let reply = node.handle_line(r#"{"kind":"SELF_DESTRUCT"}"#).unwrap();
        assert_eq!(reply.status, ResponseStatus::Error);
    }

    #[tokio::test]
    async fn test_serve_registers_then_answers_in_order() {
        let (coordinator, node_side) = tokio::io::duplex(4096);
        let mut node = source();
        let task = tokio::spawn(async move { node.serve(node_side).await });

        let (read_half, mut write_half) = tokio::io::split(coordinator);
        let mut lines = BufReader::new(read_half).lines();

        let registration = protocol::decode_response(&lines.next_line().await.unwrap().unwrap())
            .unwrap();
        assert_eq!(registration.node_id, NodeId::new(5));
        assert!(registration.is_ok());

        protocol::write_message(&mut write_half, &Request::InjectOffset(42)).await.unwrap();
        protocol::write_message(&mut write_half, &Request::Ping).await.unwrap();

        let first = protocol::decode_response(&lines.next_line().await.unwrap().unwrap()).unwrap();
        let second = protocol::decode_response(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(first.message, "offset set to 42ms");
        assert_eq!(second.message, "pong");

        drop(write_half);
        drop(lines);
        assert_eq!(task.await.unwrap(), Disconnect::EndOfStream);
    }
}
