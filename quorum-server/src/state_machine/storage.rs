//! Snapshot storage collaborators of a state machine.

use crate::error::ServerResult;
use crate::protocol::TermIndex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Handle to the server's storage directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftStorage {
    root: PathBuf,
}

impl RaftStorage {
    /// Create a handle rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The storage root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Metadata of a snapshot held by the state machine storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotInfo {
    /// Last log position included in the snapshot.
    pub term_index: TermIndex,
    /// Files making up the snapshot.
    pub files: Vec<PathBuf>,
}

impl SnapshotInfo {
    /// Create snapshot metadata.
    pub fn new(term_index: TermIndex, files: Vec<PathBuf>) -> Self {
        Self { term_index, files }
    }

    /// Index of the last entry covered by the snapshot.
    pub fn index(&self) -> i64 {
        self.term_index.index()
    }
}

/// How many snapshots to keep when cleaning up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRetentionPolicy {
    /// Number of most recent snapshots to retain.
    pub num_snapshots_retained: usize,
}

impl Default for SnapshotRetentionPolicy {
    fn default() -> Self {
        Self {
            num_snapshots_retained: 1,
        }
    }
}

/// Where a state machine keeps its snapshots.
pub trait StateMachineStorage: Send + Sync {
    /// Prepare the storage under the server's storage directory.
    fn init(&self, storage: &RaftStorage) -> ServerResult<()>;

    /// The most recent snapshot, if any.
    fn latest_snapshot(&self) -> Option<SnapshotInfo>;

    /// Erase all snapshots.
    fn format(&self) -> ServerResult<()>;

    /// Remove snapshots beyond what `policy` retains.
    fn cleanup_old_snapshots(&self, policy: &SnapshotRetentionPolicy) -> ServerResult<()>;
}

/// Storage for state machines that never take snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopStateMachineStorage;

impl StateMachineStorage for NoopStateMachineStorage {
    fn init(&self, _storage: &RaftStorage) -> ServerResult<()> {
        Ok(())
    }

    fn latest_snapshot(&self) -> Option<SnapshotInfo> {
        None
    }

    fn format(&self) -> ServerResult<()> {
        Ok(())
    }

    fn cleanup_old_snapshots(&self, _policy: &SnapshotRetentionPolicy) -> ServerResult<()> {
        Ok(())
    }
}
