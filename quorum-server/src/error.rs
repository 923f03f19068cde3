//! Error types for state machine and simulated transport operations.

use quorum_core::{PeerId, QuorumError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = std::result::Result<T, ServerError>;

/// Errors that can occur while applying the log or moving requests between
/// simulated nodes.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Error from the core peer/lifecycle layer.
    #[error(transparent)]
    Core(#[from] QuorumError),

    /// No node with this id is registered with the transport.
    #[error("Node {0} not found")]
    NodeNotFound(PeerId),

    /// A request did not receive its reply in time.
    #[error("{what} timed out after {timeout_ms}ms")]
    Timeout {
        /// Description of the request that timed out.
        what: String,
        /// The timeout that elapsed.
        timeout_ms: u64,
    },

    /// The node's request queue has been shut down.
    #[error("Node {0} is shut down")]
    Shutdown(PeerId),

    /// A broken internal invariant. Always a bug.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The caller supplied an unusable argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Failure reported by application state machine code.
    #[error("State machine error: {0}")]
    StateMachine(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal error, such as a panicking request handler.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Create a timeout error.
    pub fn timeout(what: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            what: what.into(),
            timeout_ms,
        }
    }

    /// Create an invariant violation and log it.
    pub fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("Invariant violation: {}", message);
        Self::InvariantViolation(message)
    }

    /// Whether the error indicates a defect that must not be retried or
    /// carried back to a caller as an ordinary failure.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvariantViolation(_) | Self::Internal(_))
    }

    /// Whether the error means the local node is going away.
    pub fn is_shutdown(&self) -> bool {
        match self {
            Self::Shutdown(_) => true,
            Self::Core(e) => e.is_interrupted(),
            _ => false,
        }
    }

    /// Whether the error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Core(QuorumError::Timeout(_)))
    }

    /// Whether the error is an unknown-node or unknown-peer lookup.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound(_) | Self::Core(QuorumError::NotFound { .. })
        )
    }
}
