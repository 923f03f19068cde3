//! In-memory network simulator with fault injection.
//!
//! Every simulated node owns an [`EventQueue`]. Callers send requests
//! through [`SimulatedRequestReply::send_request`] and wait for the reply;
//! each node runs a [`RequestHandler`] whose workers take requests from the
//! node's queue, hand them to a [`HandlerImpl`] and send the reply back.
//!
//! Faults are switched per node on its queue: blocking sends to a node,
//! dropping requests sent by a node, and delaying deliveries either way.

mod event_queue;
pub mod fault;
mod handler;
mod proxy;
mod request_reply;

pub use event_queue::EventQueue;
pub use handler::{HandlerFuture, HandlerImpl, RequestHandler};
pub use proxy::{SimulatedProxy, SimulatedProxyFactory};
pub use request_reply::SimulatedRequestReply;

use quorum_core::PeerId;
use std::fmt;

/// A message exchanged between simulated nodes.
pub trait RpcMessage: Send + Sync + 'static {
    /// The node that sent the request.
    fn requestor_id(&self) -> &PeerId;

    /// The node the request is addressed to.
    fn replier_id(&self) -> &PeerId;

    /// Call id, unique per requestor.
    fn call_id(&self) -> u64;

    /// Identity used to match the reply to the request.
    fn request_key(&self) -> RequestKey {
        RequestKey::new(self.requestor_id().clone(), self.call_id())
    }
}

/// Identity of a request: who sent it and under which call id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
    requestor: PeerId,
    call_id: u64,
}

impl RequestKey {
    /// Create a request key.
    pub fn new(requestor: impl Into<PeerId>, call_id: u64) -> Self {
        Self {
            requestor: requestor.into(),
            call_id,
        }
    }

    /// The sending node.
    pub fn requestor(&self) -> &PeerId {
        &self.requestor
    }

    /// The call id.
    pub fn call_id(&self) -> u64 {
        self.call_id
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.requestor, self.call_id)
    }
}
