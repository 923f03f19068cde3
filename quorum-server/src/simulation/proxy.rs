//! Peer proxies backed by the simulated network.

use super::{RpcMessage, SimulatedRequestReply};
use crate::error::{ServerError, ServerResult};
use quorum_core::{LifeCycleState, Peer, PeerId, Proxy, ProxyFactory, ProxyFuture, QuorumError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A connection from a local node to one peer over the simulated network.
pub struct SimulatedProxy<Req, Rep> {
    local_id: PeerId,
    peer: Peer,
    rpc: Arc<SimulatedRequestReply<Req, Rep>>,
    closed: AtomicBool,
}

impl<Req: RpcMessage, Rep: RpcMessage> SimulatedProxy<Req, Rep> {
    /// The node requests are sent from.
    pub fn local_id(&self) -> &PeerId {
        &self.local_id
    }

    /// The peer requests are sent to.
    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    /// Whether the proxy has been closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send `request` to the peer and wait for the reply.
    ///
    /// A peer missing from the network is reported as a connection error
    /// so that the proxy map rebuilds the proxy.
    pub async fn send(&self, request: Req) -> ServerResult<Rep> {
        if self.is_closed() {
            return Err(QuorumError::AlreadyClosed {
                name: format!("{}->{}", self.local_id, self.peer.id()),
                state: LifeCycleState::Closed,
            }
            .into());
        }
        if request.requestor_id() != &self.local_id || request.replier_id() != self.peer.id() {
            return Err(ServerError::InvalidArgument(format!(
                "request {}->{} sent through proxy {}->{}",
                request.requestor_id(),
                request.replier_id(),
                self.local_id,
                self.peer.id()
            )));
        }

        match self.rpc.send_request(request).await {
            Err(ServerError::NodeNotFound(id)) => {
                Err(QuorumError::connection(id, "peer is not alive").into())
            }
            other => other,
        }
    }
}

impl<Req: RpcMessage, Rep: RpcMessage> Proxy for SimulatedProxy<Req, Rep> {
    fn close(&self) -> ProxyFuture<'_, ()> {
        Box::pin(async move {
            self.closed.store(true, Ordering::SeqCst);
            tracing::debug!(from = %self.local_id, to = %self.peer.id(), "closed simulated proxy");
            Ok(())
        })
    }
}

impl<Req, Rep> std::fmt::Debug for SimulatedProxy<Req, Rep> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedProxy")
            .field("local_id", &self.local_id)
            .field("peer", &self.peer)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Creates [`SimulatedProxy`] handles for one local node.
///
/// Creation fails with a connection error while the peer is not registered
/// with the network.
pub struct SimulatedProxyFactory<Req, Rep> {
    local_id: PeerId,
    rpc: Arc<SimulatedRequestReply<Req, Rep>>,
}

impl<Req: RpcMessage, Rep: RpcMessage> SimulatedProxyFactory<Req, Rep> {
    /// Create a factory for proxies sending from `local_id`.
    pub fn new(local_id: impl Into<PeerId>, rpc: Arc<SimulatedRequestReply<Req, Rep>>) -> Self {
        Self {
            local_id: local_id.into(),
            rpc,
        }
    }
}

impl<Req: RpcMessage, Rep: RpcMessage> ProxyFactory<SimulatedProxy<Req, Rep>>
    for SimulatedProxyFactory<Req, Rep>
{
    fn create(&self, peer: Peer) -> ProxyFuture<'static, SimulatedProxy<Req, Rep>> {
        let local_id = self.local_id.clone();
        let rpc = Arc::clone(&self.rpc);
        Box::pin(async move {
            if rpc.queue(peer.id()).is_none() {
                return Err(QuorumError::connection(
                    peer.id(),
                    "not registered with the simulated network",
                ));
            }
            tracing::debug!(from = %local_id, to = %peer, "connected simulated proxy");
            Ok(SimulatedProxy {
                local_id,
                peer,
                rpc,
                closed: AtomicBool::new(false),
            })
        })
    }
}
