//! Outstanding requests on one connection.
//!
//! Replies carry no correlation id, so they are matched to requests by
//! position. Each request owns a slot in FIFO order plus one entry in a
//! per-connection deadline heap. A timed-out slot is made inert in place
//! (its reply channel is taken and rejected) and later replies are matched to
//! the oldest slot that is still live.
use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::{ClockVoteError, Result};
use crate::node::NodeId;
use crate::protocol::Response;

pub type ReplySender = oneshot::Sender<Result<Response>>;

/// The eventual outcome of one request: a `Response`, `Timeout`,
/// `ConnectionClosed`, or `NotConnected`. Resolved exactly once.
#[derive(Debug)]
pub struct PendingReply {
    node_id: NodeId,
    rx: oneshot::Receiver<Result<Response>>,
}

impl PendingReply {
    /// A reply slot and the handle that awaits it.
    pub fn channel(node_id: NodeId) -> (ReplySender, PendingReply) {
        let (tx, rx) = oneshot::channel();
        (tx, PendingReply { node_id, rx })
    }

    /// An already-settled reply.
    pub fn ready(node_id: NodeId, result: Result<Response>) -> Self {
        let (tx, reply) = Self::channel(node_id);
        let _ = tx.send(result);
        reply
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }
}

impl Future for PendingReply {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let node_id = self.node_id;
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // the owning session went away without settling this request
            Poll::Ready(Err(_)) => Poll::Ready(Err(ClockVoteError::ConnectionClosed(node_id))),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    reply: Option<ReplySender>,
}

impl Slot {
    fn is_live(&self) -> bool {
        self.reply.is_some()
    }
}

#[derive(Debug)]
pub struct PendingSlots {
    node_id: NodeId,
    next_seq: u64,
    slots: VecDeque<Slot>,
    deadlines: BinaryHeap<Reverse<(Instant, u64)>>,
}

impl PendingSlots {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            next_seq: 0,
            slots: VecDeque::new(),
            deadlines: BinaryHeap::new(),
        }
    }

    /// Enqueue a request's reply channel at the tail with its own deadline.
    pub fn push(&mut self, reply: ReplySender, deadline: Instant) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push_back(Slot {
            seq,
            reply: Some(reply),
        });
        self.deadlines.push(Reverse((deadline, seq)));
        seq
    }

    /// Hand a reply to the oldest live slot. Gives the response back when no
    /// request is outstanding.
    pub fn resolve_next(&mut self, response: Response) -> std::result::Result<u64, Response> {
        self.drop_inert_front();
        match self.slots.pop_front() {
            Some(Slot {
                seq,
                reply: Some(reply),
            }) => {
                // the caller may have stopped waiting; the slot is settled either way
                let _ = reply.send(Ok(response));
                self.compact();
                Ok(seq)
            }
            _ => Err(response),
        }
    }

    /// Earliest armed deadline, possibly for a slot that has since settled.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.peek().map(|Reverse((deadline, _))| *deadline)
    }

    /// Reject every live slot whose deadline is at or before `now` with `Timeout`.
    /// Returns how many requests timed out.
    pub fn expire(&mut self, now: Instant) -> usize {
        let mut expired = 0;
        while let Some(Reverse((deadline, seq))) = self.deadlines.peek().copied() {
            if deadline > now {
                break;
            }
            self.deadlines.pop();
            if let Some(slot) = self.slots.iter_mut().find(|slot| slot.seq == seq) {
                if let Some(reply) = slot.reply.take() {
                    let _ = reply.send(Err(ClockVoteError::Timeout(self.node_id)));
                    expired += 1;
                }
            }
        }
        self.drop_inert_front();
        self.compact();
        expired
    }

    /// Reject everything still outstanding with `ConnectionClosed`.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for slot in self.slots.drain(..) {
            if let Some(reply) = slot.reply {
                let _ = reply.send(Err(ClockVoteError::ConnectionClosed(self.node_id)));
                closed += 1;
            }
        }
        self.deadlines.clear();
        closed
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    fn drop_inert_front(&mut self) {
        while matches!(self.slots.front(), Some(slot) if !slot.is_live()) {
            self.slots.pop_front();
        }
    }

    // Stale heap entries belong to slots that already settled.
    fn compact(&mut self) {
        if self.slots.is_empty() {
            self.deadlines.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn response(ts: i64) -> Response {
        Response::ok(NodeId::new(1), ts, "time reported")
    }

    #[tokio::test]
    async fn test_replies_resolve_in_fifo_order() {
        let mut slots = PendingSlots::new(NodeId::new(1));
        let deadline = Instant::now() + Duration::from_secs(5);
        let (tx_a, a) = PendingReply::channel(NodeId::new(1));
        let (tx_b, b) = PendingReply::channel(NodeId::new(1));
        slots.push(tx_a, deadline);
        slots.push(tx_b, deadline);

        assert!(slots.resolve_next(response(100)).is_ok());
        assert!(slots.resolve_next(response(200)).is_ok());

        assert_eq!(a.await.unwrap().timestamp_millis, 100);
        assert_eq!(b.await.unwrap().timestamp_millis, 200);
        assert_eq!(slots.live_count(), 0);
        assert_eq!(slots.next_deadline(), None);
    }

    #[tokio::test]
    async fn test_reply_without_pending_request_is_returned() {
        let mut slots = PendingSlots::new(NodeId::new(1));
        let unmatched = slots.resolve_next(response(1)).unwrap_err();
        assert_eq!(unmatched.timestamp_millis, 1);
    }

    #[tokio::test]
    async fn test_timeout_settles_only_its_own_slot() {
        let mut slots = PendingSlots::new(NodeId::new(1));
        let now = Instant::now();
        let (tx_a, a) = PendingReply::channel(NodeId::new(1));
        let (tx_b, b) = PendingReply::channel(NodeId::new(1));
        slots.push(tx_a, now + Duration::from_millis(10));
        slots.push(tx_b, now + Duration::from_secs(10));

        assert_eq!(slots.expire(now + Duration::from_millis(20)), 1);
        assert!(matches!(a.await, Err(ClockVoteError::Timeout(_))));

        // the next reply goes to the live slot, not the timed-out one
        assert!(slots.resolve_next(response(300)).is_ok());
        assert_eq!(b.await.unwrap().timestamp_millis, 300);
    }

    #[tokio::test]
    async fn test_out_of_order_deadline_marks_slot_inert_in_place() {
        let mut slots = PendingSlots::new(NodeId::new(1));
        let now = Instant::now();
        let (tx_a, a) = PendingReply::channel(NodeId::new(1));
        let (tx_b, b) = PendingReply::channel(NodeId::new(1));
        let (tx_c, c) = PendingReply::channel(NodeId::new(1));
        slots.push(tx_a, now + Duration::from_secs(10));
        slots.push(tx_b, now + Duration::from_millis(5));
        slots.push(tx_c, now + Duration::from_secs(10));

        assert_eq!(slots.expire(now + Duration::from_millis(6)), 1);
        assert_eq!(slots.live_count(), 2);

        assert!(slots.resolve_next(response(1)).is_ok());
        assert!(slots.resolve_next(response(3)).is_ok());
        assert_eq!(a.await.unwrap().timestamp_millis, 1);
        assert!(matches!(b.await, Err(ClockVoteError::Timeout(_))));
        assert_eq!(c.await.unwrap().timestamp_millis, 3);
    }

    #[tokio::test]
    async fn test_settled_slot_never_times_out() {
        let mut slots = PendingSlots::new(NodeId::new(1));
        let now = Instant::now();
        let (tx_a, a) = PendingReply::channel(NodeId::new(1));
        slots.push(tx_a, now + Duration::from_millis(1));
        assert!(slots.resolve_next(response(9)).is_ok());
        assert_eq!(slots.expire(now + Duration::from_secs(1)), 0);
        assert_eq!(a.await.unwrap().timestamp_millis, 9);
    }

    #[tokio::test]
    async fn test_close_all_rejects_each_once() {
        let mut slots = PendingSlots::new(NodeId::new(2));
        let deadline = Instant::now() + Duration::from_secs(5);
        let (tx_a, a) = PendingReply::channel(NodeId::new(2));
        let (tx_b, b) = PendingReply::channel(NodeId::new(2));
        slots.push(tx_a, deadline);
        slots.push(tx_b, deadline);

        assert_eq!(slots.close_all(), 2);
        assert_eq!(slots.close_all(), 0);
        assert!(matches!(a.await, Err(ClockVoteError::ConnectionClosed(_))));
        assert!(matches!(b.await, Err(ClockVoteError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_dropped_sender_reads_as_connection_closed() {
        let (tx, reply) = PendingReply::channel(NodeId::new(4));
        drop(tx);
        assert!(matches!(
            reply.await,
            Err(ClockVoteError::ConnectionClosed(id)) if id == NodeId::new(4)
        ));
    }
}
