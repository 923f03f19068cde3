//! Per-peer connection handles.
//!
//! A [`Proxy`] is whatever a node uses to talk to one peer: a gRPC channel,
//! a TCP client, or a simulated link in tests. Proxies are produced by a
//! [`ProxyFactory`] and cached per peer by the [`PeerProxyMap`].

mod map;

pub use map::PeerProxyMap;

use crate::error::QuorumResult;
use crate::peer::Peer;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by proxy operations.
pub type ProxyFuture<'a, T> = Pin<Box<dyn Future<Output = QuorumResult<T>> + Send + 'a>>;

/// A closeable connection handle to a single peer.
pub trait Proxy: Send + Sync + 'static {
    /// Release the underlying connection.
    ///
    /// Called at most once per handle by the proxy map.
    fn close(&self) -> ProxyFuture<'_, ()>;
}

/// Creates connection handles for peers.
///
/// Any `Fn(Peer) -> impl Future<Output = QuorumResult<P>>` closure is a
/// factory, which keeps test setups short.
pub trait ProxyFactory<P: Proxy>: Send + Sync + 'static {
    /// Connect to `peer`.
    fn create(&self, peer: Peer) -> ProxyFuture<'static, P>;
}

impl<P, F, Fut> ProxyFactory<P> for F
where
    P: Proxy,
    F: Fn(Peer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = QuorumResult<P>> + Send + 'static,
{
    fn create(&self, peer: Peer) -> ProxyFuture<'static, P> {
        Box::pin(self(peer))
    }
}
