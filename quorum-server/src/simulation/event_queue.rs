//! Per-node request queue of the simulated network.

use super::RequestKey;
use crate::error::{ServerError, ServerResult};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use quorum_core::PeerId;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::{Notify, oneshot};

/// Inbound requests of one simulated node, the callers waiting for their
/// replies, and the node's fault-injection switches.
pub struct EventQueue<Req, Rep> {
    id: PeerId,
    requests: Mutex<VecDeque<Req>>,
    /// Wakes takers blocked on an empty queue.
    notify: Notify,
    replies: DashMap<RequestKey, oneshot::Sender<ServerResult<Rep>>>,
    closed: AtomicBool,
    /// Block sends of requests addressed to this node.
    block_send_request_to: AtomicBool,
    /// Drop requests sent by this node when they are taken.
    block_take_request_from: AtomicBool,
    /// Delay taking requests addressed to this node.
    delay_take_request_to: AtomicU64,
    /// Delay taking requests sent by this node.
    delay_take_request_from: AtomicU64,
}

impl<Req, Rep> EventQueue<Req, Rep> {
    pub(crate) fn new(id: PeerId) -> Self {
        Self {
            id,
            requests: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            replies: DashMap::new(),
            closed: AtomicBool::new(false),
            block_send_request_to: AtomicBool::new(false),
            block_take_request_from: AtomicBool::new(false),
            delay_take_request_to: AtomicU64::new(0),
            delay_take_request_from: AtomicU64::new(0),
        }
    }

    /// The node this queue belongs to.
    pub fn id(&self) -> &PeerId {
        &self.id
    }

    /// Number of requests waiting to be taken.
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Whether no request is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of callers waiting for a reply from this node.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    /// Whether the node has been shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn push(&self, request: Req) -> ServerResult<()> {
        {
            let mut requests = self.requests.lock();
            if self.is_closed() {
                return Err(ServerError::Shutdown(self.id.clone()));
            }
            requests.push_back(request);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next request.
    ///
    /// Fails with `Shutdown` once the queue is closed.
    pub(crate) async fn pop(&self) -> ServerResult<Req> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return Err(ServerError::Shutdown(self.id.clone()));
            }
            let next = self.requests.lock().pop_front();
            if let Some(request) = next {
                return Ok(request);
            }
            notified.await;
        }
    }

    /// Register a caller waiting for the reply to `key`.
    pub(crate) fn register_reply(
        &self,
        key: RequestKey,
    ) -> ServerResult<oneshot::Receiver<ServerResult<Rep>>> {
        match self.replies.entry(key) {
            Entry::Occupied(e) => Err(ServerError::InvalidArgument(format!(
                "request {} is already in flight to {}",
                e.key(),
                self.id
            ))),
            Entry::Vacant(e) => {
                let (tx, rx) = oneshot::channel();
                e.insert(tx);
                Ok(rx)
            }
        }
    }

    /// Hand `reply` to the caller waiting on `key`.
    ///
    /// Returns `false` if nobody is waiting, e.g. after a timeout.
    pub(crate) fn complete_reply(&self, key: &RequestKey, reply: ServerResult<Rep>) -> bool {
        match self.replies.remove(key) {
            Some((_, tx)) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub(crate) fn remove_reply(&self, key: &RequestKey) {
        self.replies.remove(key);
    }

    /// Drop queued requests, release waiting callers and wake all takers.
    pub(crate) fn close(&self) {
        {
            let mut requests = self.requests.lock();
            self.closed.store(true, Ordering::SeqCst);
            requests.clear();
        }
        self.replies.clear();
        self.notify.notify_waiters();
    }

    /// Block or unblock sends addressed to this node.
    pub fn set_block_send_request_to(&self, block: bool) {
        self.block_send_request_to.store(block, Ordering::SeqCst);
    }

    /// Whether sends addressed to this node are blocked.
    pub fn block_send_request_to(&self) -> bool {
        self.block_send_request_to.load(Ordering::SeqCst)
    }

    /// Drop, or stop dropping, requests sent by this node.
    pub fn set_block_take_request_from(&self, block: bool) {
        self.block_take_request_from.store(block, Ordering::SeqCst);
    }

    /// Whether requests sent by this node are dropped.
    pub fn block_take_request_from(&self) -> bool {
        self.block_take_request_from.load(Ordering::SeqCst)
    }

    /// Delay, in milliseconds, before this node takes its next request.
    pub fn set_delay_take_request_to(&self, ms: u64) {
        self.delay_take_request_to.store(ms, Ordering::SeqCst);
    }

    /// Current delay before this node takes a request.
    pub fn delay_take_request_to(&self) -> u64 {
        self.delay_take_request_to.load(Ordering::SeqCst)
    }

    /// Delay, in milliseconds, applied when a request sent by this node is
    /// taken.
    pub fn set_delay_take_request_from(&self, ms: u64) {
        self.delay_take_request_from.store(ms, Ordering::SeqCst);
    }

    /// Current delay for requests sent by this node.
    pub fn delay_take_request_from(&self) -> u64 {
        self.delay_take_request_from.load(Ordering::SeqCst)
    }
}

impl<Req, Rep> std::fmt::Debug for EventQueue<Req, Rep> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("id", &self.id)
            .field("requests", &self.len())
            .field("pending_replies", &self.pending_replies())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
