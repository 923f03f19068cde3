//! Core building blocks shared by every quorum node.
//!
//! This crate owns the node-local plumbing that sits underneath a consensus
//! implementation but is independent of the algorithm itself:
//!
//! - **Peers**: immutable identities of the other members of a group
//! - **Lifecycle**: a small validated state machine reused by long-lived
//!   components (proxies, state machines)
//! - **Proxy map**: one lazily created, replaceable connection handle per peer
//! - **Exit supervision**: the single place where unrecoverable defects are
//!   escalated to process termination
//! - **Logging**: `tracing` subscriber setup
//!
//! # Example
//!
//! ```ignore
//! use quorum_core::{Peer, PeerProxyMap};
//!
//! let proxies = PeerProxyMap::new("s1->peers", |peer: Peer| async move {
//!     MyClient::connect(peer.address()).await
//! });
//! proxies.add_peers([Peer::new("s2", "127.0.0.1:6002")]);
//!
//! let client = proxies.get_proxy(&"s2".into()).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod exit;
pub mod lifecycle;
pub mod logging;
pub mod peer;
pub mod proxy;

pub use error::{QuorumError, QuorumResult};
pub use lifecycle::{LifeCycle, LifeCycleState};
pub use peer::{Peer, PeerId};
pub use proxy::{PeerProxyMap, Proxy, ProxyFactory, ProxyFuture};
