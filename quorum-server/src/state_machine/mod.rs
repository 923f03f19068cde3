//! Application of the agreed log to an application state machine.
//!
//! Applications implement [`StateMachine`] on a type that embeds a
//! [`BaseStateMachine`] and override only the hooks they care about. The
//! defaults keep the last-applied position current, echo entry payloads
//! back as results, and answer stale reads once the requested index has
//! been applied.
//!
//! ```ignore
//! struct Counter {
//!     base: BaseStateMachine,
//!     value: AtomicI64,
//! }
//!
//! impl StateMachine for Counter {
//!     fn base(&self) -> &BaseStateMachine {
//!         &self.base
//!     }
//!
//!     fn apply_transaction(&self, trx: TransactionContext) -> StateMachineFuture<'_, Message> {
//!         Box::pin(async move {
//!             let entry = trx.log_entry().ok_or_else(|| ServerError::InvalidArgument("no entry".into()))?;
//!             let value = self.value.fetch_add(1, Ordering::SeqCst) + 1;
//!             self.base.update_last_applied_term_index(entry.term, entry.index)?;
//!             Ok(Message::from(value.to_string()))
//!         })
//!     }
//! }
//! ```

mod applied;
mod base;
mod storage;
mod transaction;

pub use applied::AppliedIndexTracker;
pub use base::BaseStateMachine;
pub use storage::{
    NoopStateMachineStorage, RaftStorage, SnapshotInfo, SnapshotRetentionPolicy,
    StateMachineStorage,
};
pub use transaction::TransactionContext;

use crate::error::{ServerError, ServerResult};
use crate::protocol::{ClientRequest, GroupId, INVALID_LOG_INDEX, Message, TermIndex};
use quorum_core::{LifeCycleState, PeerId};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by asynchronous state machine hooks.
pub type StateMachineFuture<'a, T> = Pin<Box<dyn Future<Output = ServerResult<T>> + Send + 'a>>;

/// A replicated application state machine.
///
/// Every method except [`base`](Self::base) has a default implementation.
pub trait StateMachine: Send + Sync + 'static {
    /// The embedded bookkeeping shared by all state machines.
    fn base(&self) -> &BaseStateMachine;

    /// Snapshot storage. Defaults to a storage that never holds snapshots.
    fn storage(&self) -> &dyn StateMachineStorage {
        &NoopStateMachineStorage
    }

    /// Bind the state machine to a server and group and start it.
    ///
    /// A storage IO failure returns the state machine to `New` so it can be
    /// initialized again; any other failure leaves it in `Exception`.
    fn initialize(
        &self,
        server_id: PeerId,
        group_id: GroupId,
        storage: &RaftStorage,
    ) -> ServerResult<()> {
        let base = self.base();
        base.lifecycle().transition(LifeCycleState::Starting)?;
        base.set_ids(server_id.clone(), group_id);

        if let Err(e) = self.storage().init(storage) {
            let to = if matches!(e, ServerError::Io(_)) {
                LifeCycleState::New
            } else {
                LifeCycleState::Exception
            };
            base.lifecycle()
                .compare_and_transition(LifeCycleState::Starting, to);
            tracing::warn!(server = %server_id, group = %group_id, error = %e, "Failed to initialize state machine");
            return Err(e);
        }

        base.lifecycle().transition(LifeCycleState::Running)?;
        tracing::info!(server = %server_id, group = %group_id, "state machine initialized");
        Ok(())
    }

    /// Stop applying entries, e.g. before installing a snapshot.
    fn pause(&self) -> ServerResult<()> {
        let lifecycle = self.base().lifecycle();
        lifecycle.transition(LifeCycleState::Pausing)?;
        lifecycle.transition(LifeCycleState::Paused)?;
        Ok(())
    }

    /// Resume after [`pause`](Self::pause), reloading from the latest snapshot.
    fn reinitialize(&self) -> ServerResult<()> {
        let lifecycle = self.base().lifecycle();
        lifecycle.transition(LifeCycleState::Starting)?;
        lifecycle.transition(LifeCycleState::Running)?;
        Ok(())
    }

    /// Close the state machine. Closing twice is harmless.
    fn close(&self) -> ServerResult<()> {
        if self.base().lifecycle().check_state_and_close(|| {}) {
            tracing::info!(server = ?self.server_id(), "state machine closed");
        }
        Ok(())
    }

    /// Build the transaction for a client request on the leader.
    fn start_transaction(&self, request: ClientRequest) -> ServerResult<TransactionContext> {
        Ok(TransactionContext::new().with_client_request(request))
    }

    /// Called before the transaction is appended to the log.
    fn pre_append_transaction(&self, trx: TransactionContext) -> ServerResult<TransactionContext> {
        Ok(trx)
    }

    /// Called when a started transaction will not be appended.
    fn cancel_transaction(&self, trx: TransactionContext) -> ServerResult<TransactionContext> {
        Ok(trx)
    }

    /// Called for each committed transaction, in log order, before
    /// [`apply_transaction`](Self::apply_transaction).
    fn apply_transaction_serial(
        &self,
        trx: TransactionContext,
    ) -> ServerResult<TransactionContext> {
        Ok(trx)
    }

    /// Apply a committed transaction.
    ///
    /// The default advances the last-applied position to the entry and
    /// returns the entry's payload.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the transaction carries no log entry
    /// - `InvariantViolation` if the entry is behind the last applied one
    fn apply_transaction(&self, trx: TransactionContext) -> StateMachineFuture<'_, Message> {
        Box::pin(async move {
            let entry = trx.log_entry().ok_or_else(|| {
                ServerError::InvalidArgument("transaction has no log entry".to_string())
            })?;
            self.base()
                .update_last_applied_term_index(entry.term, entry.index)?;
            Ok(entry.data.clone())
        })
    }

    /// Record that `(term, index)` was consumed without an application
    /// transaction, e.g. a configuration or no-op entry.
    fn notify_index_update(&self, term: i64, index: i64) -> ServerResult<()> {
        self.base().update_last_applied_term_index(term, index)?;
        Ok(())
    }

    /// Called on a leader that steps down with transactions still pending.
    fn notify_not_leader(&self, _pending: &[TransactionContext]) -> ServerResult<()> {
        Ok(())
    }

    /// Answer a read-only request against the current state.
    fn query(&self, _request: Message) -> StateMachineFuture<'_, Message> {
        Box::pin(async { Ok(Message::empty()) })
    }

    /// Answer a read-only request once the entry at `min_index` is applied.
    fn query_stale(&self, request: Message, min_index: i64) -> StateMachineFuture<'_, Message> {
        Box::pin(async move {
            self.base().applied().wait_for(min_index).await;
            self.query(request).await
        })
    }

    /// Write a snapshot and return the index it covers.
    ///
    /// The default takes no snapshot and returns [`INVALID_LOG_INDEX`].
    fn take_snapshot(&self) -> StateMachineFuture<'_, i64> {
        Box::pin(async { Ok(INVALID_LOG_INDEX) })
    }

    /// The most recent snapshot held by [`storage`](Self::storage).
    fn latest_snapshot(&self) -> Option<SnapshotInfo> {
        self.storage().latest_snapshot()
    }

    /// The last applied log position.
    fn last_applied_term_index(&self) -> TermIndex {
        self.base().applied().last_applied()
    }

    /// Current lifecycle state.
    fn lifecycle_state(&self) -> LifeCycleState {
        self.base().lifecycle().current_state()
    }

    /// The server this state machine belongs to, once initialized.
    fn server_id(&self) -> Option<PeerId> {
        self.base().server_id()
    }

    /// The group this state machine belongs to, once initialized.
    fn group_id(&self) -> Option<GroupId> {
        self.base().group_id()
    }
}
