//! Map from peer id to the peer and its lazily created proxy.

use super::{Proxy, ProxyFactory};
use crate::error::{QuorumError, QuorumResult};
use crate::lifecycle::{LifeCycle, LifeCycleState};
use crate::peer::{Peer, PeerId};
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// A peer together with its (possibly not yet created) proxy.
struct PeerAndProxy<P> {
    peer: Peer,
    /// Cached proxy; read without the create lock on the fast path.
    proxy: RwLock<Option<Arc<P>>>,
    /// Serializes creation so the factory runs at most once per entry.
    create_lock: Mutex<()>,
    lifecycle: LifeCycle,
}

impl<P: Proxy> PeerAndProxy<P> {
    fn new(peer: Peer) -> Self {
        let lifecycle = LifeCycle::new(peer.to_string());
        Self {
            peer,
            proxy: RwLock::new(None),
            create_lock: Mutex::new(()),
            lifecycle,
        }
    }

    fn cached(&self) -> Option<Arc<P>> {
        self.proxy.read().clone()
    }

    async fn get_proxy(&self, name: &str, factory: &dyn ProxyFactory<P>) -> QuorumResult<Arc<P>> {
        if let Some(proxy) = self.cached() {
            return Ok(proxy);
        }

        let _guard = self.create_lock.lock().await;
        if let Some(proxy) = self.cached() {
            return Ok(proxy);
        }

        let current = self.lifecycle.current_state();
        if current.is_closing_or_closed() {
            return Err(QuorumError::AlreadyClosed {
                name: format!("{name}: proxy for {}", self.peer),
                state: current,
            });
        }
        // A cancelled attempt leaves the entry in Starting.
        if current != LifeCycleState::Starting {
            self.lifecycle.transition(LifeCycleState::Starting)?;
        }

        match factory.create(self.peer.clone()).await {
            Ok(proxy) => {
                let proxy = Arc::new(proxy);
                *self.proxy.write() = Some(Arc::clone(&proxy));
                self.lifecycle.transition(LifeCycleState::Running)?;
                tracing::debug!(name, peer = %self.peer.id(), "created proxy");
                Ok(proxy)
            }
            Err(e) => {
                self.lifecycle
                    .compare_and_transition(LifeCycleState::Starting, LifeCycleState::New);
                tracing::debug!(name, peer = %self.peer.id(), error = %e, "failed to create proxy");
                Err(e)
            }
        }
    }

    /// Close the entry and hand back its proxy, if one was created.
    ///
    /// Waits for an in-flight creation on this entry to finish first.
    async fn set_null_proxy_and_close(&self) -> Option<Arc<P>> {
        let _guard = self.create_lock.lock().await;
        let mut taken = None;
        self.lifecycle
            .check_state_and_close(|| taken = self.proxy.write().take());
        taken
    }
}

/// A map from peer id to peer and its proxy.
///
/// Proxies are created on first use through the injected [`ProxyFactory`]
/// and cached until [`reset_proxy`](Self::reset_proxy) or
/// [`close`](Self::close). Lookups for different peers never contend on a
/// shared lock; creating or closing one peer's proxy never blocks another.
pub struct PeerProxyMap<P: Proxy> {
    name: String,
    peers: DashMap<PeerId, Arc<PeerAndProxy<P>>>,
    factory: Box<dyn ProxyFactory<P>>,
    closed: AtomicBool,
}

impl<P: Proxy> PeerProxyMap<P> {
    /// Create an empty map that builds proxies with `factory`.
    pub fn new(name: impl Into<String>, factory: impl ProxyFactory<P>) -> Self {
        Self {
            name: name.into(),
            peers: DashMap::new(),
            factory: Box::new(factory),
            closed: AtomicBool::new(false),
        }
    }

    /// Name used in log lines and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register every peer that is not registered yet. Does not connect.
    pub fn add_peers(&self, peers: impl IntoIterator<Item = Peer>) {
        for peer in peers {
            self.compute_if_absent(peer);
        }
    }

    /// Register `peer` unless its id is already present.
    pub fn compute_if_absent(&self, peer: Peer) {
        self.peers
            .entry(peer.id().clone())
            .or_insert_with(|| Arc::new(PeerAndProxy::new(peer)));
    }

    /// Get the proxy for `id`, creating it if needed.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the peer was never registered
    /// - `AlreadyClosed` if the map or the peer's entry is closed
    /// - whatever the factory returns if creation fails; the entry stays
    ///   empty and the next call retries
    pub async fn get_proxy(&self, id: &PeerId) -> QuorumResult<Arc<P>> {
        if self.is_closed() {
            return Err(QuorumError::AlreadyClosed {
                name: self.name.clone(),
                state: LifeCycleState::Closed,
            });
        }

        let entry = self
            .peers
            .get(id)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| QuorumError::NotFound {
                name: self.name.clone(),
                id: id.clone(),
                peers: self.peer_ids(),
            })?;

        entry.get_proxy(&self.name, self.factory.as_ref()).await
    }

    /// Drop the cached proxy for `id` so the next call reconnects.
    ///
    /// The entry is swapped for a fresh one atomically, so concurrent
    /// callers see either the old proxy or a new entry, never a missing
    /// peer. The old proxy is closed after the swap, outside the registry.
    pub async fn reset_proxy(&self, id: &PeerId) {
        tracing::debug!(name = %self.name, peer = %id, "reset proxy");

        // Checked under the shard guard: close() sets the flag before it
        // snapshots the entries, so an entry swapped in here is either seen
        // by close() or never inserted.
        let old = match self.peers.get_mut(id) {
            Some(_) if self.is_closed() => return,
            Some(mut slot) => {
                let fresh = Arc::new(PeerAndProxy::new(slot.peer.clone()));
                std::mem::replace(slot.value_mut(), fresh)
            }
            None => return,
        };

        if let Some(proxy) = old.set_null_proxy_and_close().await {
            self.close_proxy(proxy, &old.peer).await;
        }
    }

    /// Reset the proxy for `id` if `e` calls for it.
    ///
    /// Returns `true` if the proxy was reset (because `reconnect` is set or
    /// the error is connection-level), `false` if the call was a no-op.
    pub async fn handle_exception(&self, id: &PeerId, e: &QuorumError, reconnect: bool) -> bool {
        if reconnect || e.should_reconnect() {
            self.reset_proxy(id).await;
            return true;
        }
        false
    }

    /// Close every entry and its proxy.
    ///
    /// Proxies are closed concurrently. Close failures are logged and
    /// otherwise ignored. Calling this more than once is harmless.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let entries: Vec<_> = self.peers.iter().map(|e| Arc::clone(e.value())).collect();
        tracing::debug!(name = %self.name, peers = entries.len(), "closing proxy map");

        join_all(entries.iter().map(|pp| async move {
            if let Some(proxy) = pp.set_null_proxy_and_close().await {
                self.close_proxy(proxy, &pp.peer).await;
            }
        }))
        .await;
    }

    async fn close_proxy(&self, proxy: Arc<P>, peer: &Peer) {
        tracing::debug!(name = %self.name, peer = %peer, "closing proxy");
        if let Err(e) = proxy.close().await {
            tracing::warn!(
                name = %self.name,
                peer = %peer,
                error = %e,
                "Failed to close proxy"
            );
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Registered peer ids, sorted.
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<_> = self.peers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// The registered peer for `id`.
    pub fn peer(&self, id: &PeerId) -> Option<Peer> {
        self.peers.get(id).map(|e| e.peer.clone())
    }

    /// Lifecycle state of the entry for `id`.
    pub fn state(&self, id: &PeerId) -> Option<LifeCycleState> {
        self.peers.get(id).map(|e| e.lifecycle.current_state())
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &PeerId) -> bool {
        self.peers.contains_key(id)
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peers are registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl<P: Proxy> std::fmt::Debug for PeerProxyMap<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerProxyMap")
            .field("name", &self.name)
            .field("peers", &self.peer_ids())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
