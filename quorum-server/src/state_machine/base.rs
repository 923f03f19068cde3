//! Bookkeeping shared by every state machine.

use super::{AppliedIndexTracker, StateMachine};
use crate::error::ServerResult;
use crate::protocol::GroupId;
use parking_lot::RwLock;
use quorum_core::{LifeCycle, PeerId};

/// Lifecycle, identity and last-applied position of a state machine.
///
/// Used on its own it is a state machine that applies nothing and echoes
/// every entry back.
#[derive(Debug)]
pub struct BaseStateMachine {
    lifecycle: LifeCycle,
    applied: AppliedIndexTracker,
    ids: RwLock<Option<(PeerId, GroupId)>>,
}

impl BaseStateMachine {
    /// Create an uninitialized state machine.
    pub fn new() -> Self {
        Self {
            lifecycle: LifeCycle::new("StateMachine"),
            applied: AppliedIndexTracker::new(),
            ids: RwLock::new(None),
        }
    }

    /// The lifecycle.
    pub fn lifecycle(&self) -> &LifeCycle {
        &self.lifecycle
    }

    /// The last-applied cursor and its pending reads.
    pub fn applied(&self) -> &AppliedIndexTracker {
        &self.applied
    }

    /// Advance the last-applied position. See [`AppliedIndexTracker::update`].
    pub fn update_last_applied_term_index(&self, term: i64, index: i64) -> ServerResult<bool> {
        self.applied.update(term, index)
    }

    /// Record the server and group this state machine serves.
    pub fn set_ids(&self, server_id: PeerId, group_id: GroupId) {
        *self.ids.write() = Some((server_id, group_id));
    }

    /// The server id, once set.
    pub fn server_id(&self) -> Option<PeerId> {
        self.ids.read().as_ref().map(|(server, _)| server.clone())
    }

    /// The group id, once set.
    pub fn group_id(&self) -> Option<GroupId> {
        self.ids.read().as_ref().map(|(_, group)| *group)
    }
}

impl Default for BaseStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMachine for BaseStateMachine {
    fn base(&self) -> &BaseStateMachine {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use crate::protocol::{ClientRequest, INVALID_LOG_INDEX, LogEntry, Message, TermIndex};
    use crate::state_machine::{RaftStorage, TransactionContext};
    use quorum_core::LifeCycleState;
    use std::sync::Arc;
    use std::time::Duration;

    fn running() -> BaseStateMachine {
        let sm = BaseStateMachine::new();
        sm.initialize("s1".into(), GroupId::random(), &RaftStorage::new("/tmp/quorum"))
            .unwrap();
        sm
    }

    #[test]
    fn initialize_starts_and_records_ids() {
        let sm = BaseStateMachine::new();
        assert_eq!(sm.lifecycle_state(), LifeCycleState::New);
        assert_eq!(sm.server_id(), None);

        let group = GroupId::random();
        sm.initialize("s1".into(), group, &RaftStorage::new("/tmp/quorum"))
            .unwrap();
        assert_eq!(sm.lifecycle_state(), LifeCycleState::Running);
        assert_eq!(sm.server_id(), Some(PeerId::from("s1")));
        assert_eq!(sm.group_id(), Some(group));
        assert_eq!(sm.last_applied_term_index(), TermIndex::INITIAL);
    }

    #[tokio::test]
    async fn apply_echoes_payload_and_advances() {
        let sm = running();
        let trx = TransactionContext::for_log_entry(LogEntry::new(1, 0, "hello"));
        let reply = sm.apply_transaction(trx).await.unwrap();
        assert_eq!(reply, Message::from("hello"));
        assert_eq!(sm.last_applied_term_index(), TermIndex::new(1, 0));
    }

    #[tokio::test]
    async fn apply_without_entry_is_invalid() {
        let sm = running();
        let request = ClientRequest::new("c1", "s1", GroupId::random(), 1, "x");
        let trx = sm.start_transaction(request).unwrap();
        let err = sm.apply_transaction(trx).await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn apply_behind_cursor_is_invariant_violation() {
        let sm = running();
        sm.notify_index_update(1, 5).unwrap();
        let trx = TransactionContext::for_log_entry(LogEntry::new(1, 3, "late"));
        let err = sm.apply_transaction(trx).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(sm.last_applied_term_index().index(), 5);
    }

    #[tokio::test]
    async fn query_stale_waits_for_index() {
        let sm = Arc::new(running());
        let read = {
            let sm = Arc::clone(&sm);
            tokio::spawn(async move { sm.query_stale(Message::from("q"), 2).await })
        };
        while sm.applied().pending_reads() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(!read.is_finished());

        sm.notify_index_update(1, 2).unwrap();
        let reply = tokio::time::timeout(Duration::from_secs(1), read)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(reply.is_empty());

        // Already applied: answered without registering a waiter.
        sm.query_stale(Message::from("q"), 1).await.unwrap();
        assert_eq!(sm.applied().pending_reads(), 0);
    }

    #[tokio::test]
    async fn defaults_take_no_snapshot() {
        let sm = running();
        assert_eq!(sm.take_snapshot().await.unwrap(), INVALID_LOG_INDEX);
        assert!(sm.latest_snapshot().is_none());
    }

    #[test]
    fn pause_reinitialize_close() {
        let sm = running();
        sm.pause().unwrap();
        assert_eq!(sm.lifecycle_state(), LifeCycleState::Paused);
        assert!(sm.pause().is_err());

        sm.reinitialize().unwrap();
        assert_eq!(sm.lifecycle_state(), LifeCycleState::Running);

        sm.close().unwrap();
        sm.close().unwrap();
        assert_eq!(sm.lifecycle_state(), LifeCycleState::Closed);
    }
}
