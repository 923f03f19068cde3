//! Error types for peer and lifecycle operations.

use crate::lifecycle::LifeCycleState;
use crate::peer::PeerId;
use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type QuorumResult<T> = std::result::Result<T, QuorumError>;

/// Errors raised by the peer proxy map and lifecycle bookkeeping.
#[derive(Debug, Error)]
pub enum QuorumError {
    /// The peer was never registered with the proxy map.
    #[error("{name}: peer {id} not found: peers={peers:?}")]
    NotFound {
        /// Name of the component that performed the lookup.
        name: String,
        /// The unknown peer.
        id: PeerId,
        /// Peers registered at the time of the lookup.
        peers: Vec<PeerId>,
    },

    /// The component is shutting down or already shut down.
    #[error("{name} is already {state}")]
    AlreadyClosed {
        /// Name of the closed component.
        name: String,
        /// The state observed when the call was rejected.
        state: LifeCycleState,
    },

    /// A connection to a peer could not be established or broke.
    #[error("Connection to {peer} failed: {cause}")]
    Connection {
        /// The peer the connection was for.
        peer: PeerId,
        /// Reason for the failure.
        cause: String,
    },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A lifecycle transition that the state table does not allow.
    #[error("{name}: illegal transition {from} -> {to}")]
    InvalidTransition {
        /// Name of the lifecycle owner.
        name: String,
        /// State before the attempted transition.
        from: LifeCycleState,
        /// Requested target state.
        to: LifeCycleState,
    },

    /// An operation did not complete in time.
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// The calling task was asked to stop.
    #[error("Interrupted: {0}")]
    Interrupted(String),
}

impl QuorumError {
    /// Create a connection error for the given peer.
    pub fn connection(peer: impl Into<PeerId>, cause: impl Into<String>) -> Self {
        Self::Connection {
            peer: peer.into(),
            cause: cause.into(),
        }
    }

    /// Whether this failure means the cached connection is unusable and
    /// should be rebuilt before the next attempt.
    pub fn should_reconnect(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::AlreadyClosed { .. } => true,
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::AddrNotAvailable
            ),
            _ => false,
        }
    }

    /// Whether this error signals a requested shutdown rather than a fault.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconnect_classification() {
        assert!(QuorumError::connection("s1", "refused").should_reconnect());
        assert!(
            QuorumError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
                .should_reconnect()
        );
        assert!(
            QuorumError::AlreadyClosed {
                name: "proxy".into(),
                state: LifeCycleState::Closed,
            }
            .should_reconnect()
        );

        assert!(!QuorumError::Timeout(3000).should_reconnect());
        assert!(
            !QuorumError::Io(io::Error::new(io::ErrorKind::InvalidData, "bad frame"))
                .should_reconnect()
        );
    }

    #[test]
    fn not_found_lists_known_peers() {
        let err = QuorumError::NotFound {
            name: "s0".into(),
            id: "s9".into(),
            peers: vec!["s1".into(), "s2".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("s9"));
        assert!(msg.contains("s1"));
    }
}
