//! Request/reply exchange between simulated nodes.

use super::{EventQueue, RpcMessage, fault};
use crate::config::SimulationConfig;
use crate::error::{ServerError, ServerResult};
use dashmap::DashMap;
use quorum_core::PeerId;
use rand::Rng;
use std::sync::Arc;

/// The simulated network: one [`EventQueue`] per registered node.
pub struct SimulatedRequestReply<Req, Rep> {
    config: SimulationConfig,
    queues: DashMap<PeerId, Arc<EventQueue<Req, Rep>>>,
}

impl<Req: RpcMessage, Rep: RpcMessage> SimulatedRequestReply<Req, Rep> {
    /// Create an empty network.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            queues: DashMap::new(),
        }
    }

    /// The network configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Register a node with a fresh queue, replacing any previous one.
    pub fn add_peer(&self, id: impl Into<PeerId>) {
        let id = id.into();
        let queue = Arc::new(EventQueue::new(id.clone()));
        if let Some(old) = self.queues.insert(id.clone(), queue) {
            old.close();
        }
        tracing::debug!(node = %id, "registered simulated node");
    }

    /// Remove a node. Its workers stop taking requests and callers waiting
    /// on it fail with `NodeNotFound`.
    pub fn shutdown(&self, id: &PeerId) {
        if let Some((_, queue)) = self.queues.remove(id) {
            queue.close();
            tracing::debug!(node = %id, "shut down simulated node");
        }
    }

    /// Remove every node.
    pub fn clear(&self) {
        for id in self.node_ids() {
            self.shutdown(&id);
        }
    }

    /// The queue of `id`, if registered.
    pub fn queue(&self, id: &PeerId) -> Option<Arc<EventQueue<Req, Rep>>> {
        self.queues.get(id).map(|q| Arc::clone(q.value()))
    }

    /// Registered node ids, sorted.
    pub fn node_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.queues.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Send `request` to its replier and wait for the reply.
    ///
    /// # Errors
    ///
    /// - `NodeNotFound` if the replier is not registered or is shut down
    ///   while the request is outstanding
    /// - `Timeout` if no reply arrives within the configured reply timeout
    /// - `InvalidArgument` if a request with the same key is in flight
    /// - the error the replier's handler produced
    pub async fn send_request(&self, request: Req) -> ServerResult<Rep> {
        let dest = request.replier_id().clone();
        let queue = self
            .queue(&dest)
            .ok_or_else(|| ServerError::NodeNotFound(dest.clone()))?;

        fault::block_while(self.config.block_poll_interval(), || {
            queue.block_send_request_to() && !queue.is_closed()
        })
        .await;

        let key = request.request_key();
        let reply = queue.register_reply(key.clone())?;
        if queue.push(request).is_err() {
            queue.remove_reply(&key);
            return Err(ServerError::NodeNotFound(dest));
        }
        tracing::debug!(to = %dest, request = %key, "sent request");

        match tokio::time::timeout(self.config.reply_timeout(), reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ServerError::NodeNotFound(dest)),
            Err(_) => {
                queue.remove_reply(&key);
                tracing::debug!(to = %dest, request = %key, "request timed out");
                Err(ServerError::timeout(
                    format!("request {key} to {dest}"),
                    self.config.reply_timeout_ms,
                ))
            }
        }
    }

    /// Take the next request addressed to `id`.
    ///
    /// Requests from a node whose `block_take_request_from` switch is on are
    /// dropped, and the next request is taken instead.
    ///
    /// # Errors
    ///
    /// - `Shutdown` if `id` is not registered or is shut down while waiting
    /// - `InvariantViolation` if the queue holds a request for another node
    pub async fn take_request(&self, id: &PeerId) -> ServerResult<Req> {
        let queue = self
            .queue(id)
            .ok_or_else(|| ServerError::Shutdown(id.clone()))?;

        fault::delay(queue.delay_take_request_to()).await;
        loop {
            let request = queue.pop().await?;
            if request.replier_id() != id {
                return Err(ServerError::invariant(format!(
                    "{} took request {} addressed to {}",
                    id,
                    request.request_key(),
                    request.replier_id()
                )));
            }

            if let Some(from) = self.queue(request.requestor_id()) {
                if from.block_take_request_from() {
                    tracing::debug!(node = %id, request = %request.request_key(), "dropped request");
                    continue;
                }
                fault::delay(from.delay_take_request_from()).await;
            }
            return Ok(request);
        }
    }

    /// Deliver the outcome of `request` to the caller waiting for it.
    ///
    /// A reply nobody waits for any more (timed out, or the node was shut
    /// down) is discarded.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if `reply` does not answer `request`.
    pub async fn send_reply(&self, request: &Req, reply: ServerResult<Rep>) -> ServerResult<()> {
        if let Ok(reply) = &reply {
            if reply.requestor_id() != request.requestor_id()
                || reply.replier_id() != request.replier_id()
            {
                return Err(ServerError::invariant(format!(
                    "reply {}->{} does not match request {}->{}",
                    reply.replier_id(),
                    reply.requestor_id(),
                    request.requestor_id(),
                    request.replier_id()
                )));
            }
        }

        fault::delay(latency_sample(self.config.simulate_latency_ms)).await;

        let key = request.request_key();
        let delivered = self
            .queue(request.replier_id())
            .map(|queue| queue.complete_reply(&key, reply))
            .unwrap_or(false);
        if !delivered {
            tracing::debug!(request = %key, "discarded reply without waiter");
        }
        Ok(())
    }
}

impl<Req, Rep> std::fmt::Debug for SimulatedRequestReply<Req, Rep> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedRequestReply")
            .field("config", &self.config)
            .field("nodes", &self.queues.len())
            .finish()
    }
}

/// Random reply latency around a tenth of `latency_ms`, spread by a third
/// of that either way.
fn latency_sample(latency_ms: u64) -> u64 {
    if latency_ms == 0 {
        return 0;
    }
    let expected = latency_ms / 10;
    let half_range = expected / 3;
    if half_range == 0 {
        return expected;
    }
    rand::thread_rng().gen_range(0..2 * half_range) + expected - half_range
}
