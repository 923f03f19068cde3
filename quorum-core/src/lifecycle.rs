//! Validated lifecycle state machine.
//!
//! Long-lived components (peer proxies, state machines) move through a fixed
//! set of states. Every transition is checked against a table so that, for
//! example, a closed proxy can never be restarted:
//!
//! ```text
//! New ──► Starting ──► Running ──► Pausing ──► Paused
//!  │        │  ▲          │           │          │
//!  │        ▼  └──────────┼───────────┼──────────┘ (Paused ─► Starting)
//!  │     Exception        │           │
//!  ▼        ▼             ▼           ▼
//! Closing ◄──────────────────────────────────────── (from any live state)
//!  │
//!  ▼
//! Closed
//! ```
//!
//! A failed start returns from `Starting` to `New` so that the owner may try
//! again.

use crate::error::{QuorumError, QuorumResult};
use parking_lot::Mutex;
use std::fmt;

/// States of a [`LifeCycle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifeCycleState {
    /// Created but never started.
    New,
    /// Start in progress.
    Starting,
    /// Started and serving.
    Running,
    /// Pause in progress.
    Pausing,
    /// Paused; may be restarted.
    Paused,
    /// Failed while running.
    Exception,
    /// Close in progress.
    Closing,
    /// Closed for good.
    Closed,
}

impl LifeCycleState {
    /// Whether the state is `Closing` or `Closed`.
    pub fn is_closing_or_closed(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }

    /// Whether the state is `Pausing` or `Paused`.
    pub fn is_pausing_or_paused(self) -> bool {
        matches!(self, Self::Pausing | Self::Paused)
    }

    /// Whether moving from `self` to `to` is allowed.
    pub fn is_valid_transition(self, to: Self) -> bool {
        use LifeCycleState::*;
        matches!(
            (self, to),
            (New, Starting | Closing)
                | (Starting, New | Running | Closing | Exception)
                | (Running, Closing | Pausing | Exception)
                | (Pausing, Paused | Closing | Exception)
                | (Paused, Starting | Closing)
                | (Exception, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for LifeCycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "NEW",
            Self::Starting => "STARTING",
            Self::Running => "RUNNING",
            Self::Pausing => "PAUSING",
            Self::Paused => "PAUSED",
            Self::Exception => "EXCEPTION",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        };
        f.write_str(s)
    }
}

/// A named, thread-safe lifecycle.
#[derive(Debug)]
pub struct LifeCycle {
    name: String,
    state: Mutex<LifeCycleState>,
}

impl LifeCycle {
    /// Create a lifecycle in the `New` state.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(LifeCycleState::New),
        }
    }

    /// Name used in log lines and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The current state.
    pub fn current_state(&self) -> LifeCycleState {
        *self.state.lock()
    }

    /// Move to `to`, failing if the table does not allow it.
    pub fn transition(&self, to: LifeCycleState) -> QuorumResult<()> {
        let mut state = self.state.lock();
        let from = *state;
        if !from.is_valid_transition(to) {
            return Err(QuorumError::InvalidTransition {
                name: self.name.clone(),
                from,
                to,
            });
        }
        *state = to;
        tracing::trace!(name = %self.name, %from, %to, "lifecycle transition");
        Ok(())
    }

    /// Move from `from` to `to` only if the current state is `from`.
    ///
    /// Returns whether the transition happened.
    pub fn compare_and_transition(&self, from: LifeCycleState, to: LifeCycleState) -> bool {
        let mut state = self.state.lock();
        if *state != from || !from.is_valid_transition(to) {
            return false;
        }
        *state = to;
        tracing::trace!(name = %self.name, %from, %to, "lifecycle transition");
        true
    }

    /// Close from whatever live state the lifecycle is in.
    ///
    /// Runs `on_close` between `Closing` and `Closed`. Returns `false`
    /// without calling `on_close` if the lifecycle was already closing or
    /// closed.
    pub fn check_state_and_close(&self, on_close: impl FnOnce()) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_closing_or_closed() {
                return false;
            }
            *state = LifeCycleState::Closing;
        }
        on_close();
        *self.state.lock() = LifeCycleState::Closed;
        tracing::trace!(name = %self.name, "lifecycle closed");
        true
    }

    /// Fail with [`QuorumError::AlreadyClosed`] if closing or closed.
    pub fn assert_not_closed(&self) -> QuorumResult<()> {
        let current = self.current_state();
        if current.is_closing_or_closed() {
            return Err(QuorumError::AlreadyClosed {
                name: self.name.clone(),
                state: current,
            });
        }
        Ok(())
    }
}

impl fmt::Display for LifeCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.current_state())
    }
}
