//! Last-applied cursor and the reads waiting on it.

use crate::error::{ServerError, ServerResult};
use crate::protocol::TermIndex;
use futures::FutureExt;
use futures::future::Shared;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// A read waiting for the cursor to reach its index.
///
/// Every caller waiting for the same index shares one receiver.
struct PendingRead {
    tx: oneshot::Sender<()>,
    rx: Shared<oneshot::Receiver<()>>,
}

impl PendingRead {
    fn new() -> Self {
        let (tx, rx) = oneshot::channel();
        Self { tx, rx: rx.shared() }
    }
}

struct Inner {
    applied: TermIndex,
    pending: BTreeMap<i64, PendingRead>,
}

impl Inner {
    /// Complete, in index order, every pending read at or below the cursor.
    fn complete_reads(&mut self) {
        let index = self.applied.index();
        let remaining = match index.checked_add(1) {
            Some(next) => self.pending.split_off(&next),
            None => BTreeMap::new(),
        };
        let ready = std::mem::replace(&mut self.pending, remaining);
        for (_, read) in ready {
            let _ = read.tx.send(());
        }
    }
}

/// Tracks the last applied log position and releases stale reads once the
/// position they need has been applied.
///
/// Moving the cursor and completing the reads it satisfies happen under one
/// lock, so a read never observes its future completing before the cursor
/// reached its index, and no read registered at or below the cursor is left
/// waiting.
pub struct AppliedIndexTracker {
    inner: Mutex<Inner>,
}

impl AppliedIndexTracker {
    /// Create a tracker positioned before the first entry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                applied: TermIndex::INITIAL,
                pending: BTreeMap::new(),
            }),
        }
    }

    /// The last applied position.
    pub fn last_applied(&self) -> TermIndex {
        self.inner.lock().applied
    }

    /// Move the cursor to `(term, index)`.
    ///
    /// Returns whether the cursor changed. Reads at or below the cursor are
    /// completed in both cases.
    ///
    /// # Errors
    ///
    /// `InvariantViolation` if the new position is behind the current one.
    /// The cursor is left unchanged.
    pub fn update(&self, term: i64, index: i64) -> ServerResult<bool> {
        let next = TermIndex::new(term, index);
        let mut inner = self.inner.lock();
        let changed = match next.cmp(&inner.applied) {
            Ordering::Less => {
                return Err(ServerError::invariant(format!(
                    "applied index moved backward: {} -> {}",
                    inner.applied, next
                )));
            }
            Ordering::Equal => false,
            Ordering::Greater => {
                tracing::trace!(from = %inner.applied, to = %next, "applied index updated");
                inner.applied = next;
                true
            }
        };
        inner.complete_reads();
        Ok(changed)
    }

    /// Wait until the cursor index is at least `min_index`.
    ///
    /// Resolves immediately if it already is. Resolves early, without error,
    /// if the tracker is dropped.
    pub async fn wait_for(&self, min_index: i64) {
        let waiter = {
            let mut inner = self.inner.lock();
            if inner.applied.index() >= min_index {
                return;
            }
            inner
                .pending
                .entry(min_index)
                .or_insert_with(PendingRead::new)
                .rx
                .clone()
        };
        let _ = waiter.await;
    }

    /// Number of distinct indices with reads waiting on them.
    pub fn pending_reads(&self) -> usize {
        self.inner.lock().pending.len()
    }
}

impl Default for AppliedIndexTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppliedIndexTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AppliedIndexTracker")
            .field("applied", &inner.applied)
            .field("pending", &inner.pending.len())
            .finish()
    }
}
