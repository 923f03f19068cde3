//! Protocol value types shared by the state machine and the transport.

use bytes::Bytes;
use quorum_core::PeerId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Index used where no log entry applies, e.g. "no snapshot taken".
pub const INVALID_LOG_INDEX: i64 = -1;

/// A position in the replicated log.
///
/// Ordered by term first, then by index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TermIndex {
    term: i64,
    index: i64,
}

impl TermIndex {
    /// The position before any entry has been applied.
    pub const INITIAL: TermIndex = TermIndex {
        term: 0,
        index: INVALID_LOG_INDEX,
    };

    /// Create a term-index pair.
    pub const fn new(term: i64, index: i64) -> Self {
        Self { term, index }
    }

    /// The term.
    pub fn term(&self) -> i64 {
        self.term
    }

    /// The log index.
    pub fn index(&self) -> i64 {
        self.index
    }
}

impl Default for TermIndex {
    fn default() -> Self {
        Self::INITIAL
    }
}

impl fmt::Display for TermIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(t:{}, i:{})", self.term, self.index)
    }
}

/// Identifier of a replication group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Create a random group id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

/// Opaque application payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Message(Bytes);

impl Message {
    /// An empty message.
    pub fn empty() -> Self {
        Self(Bytes::new())
    }

    /// The payload bytes.
    pub fn content(&self) -> &Bytes {
        &self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&'static str> for Message {
    fn from(s: &'static str) -> Self {
        Self(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self(Bytes::from(s))
    }
}

/// A committed log entry handed to the state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Term the entry was created in.
    pub term: i64,
    /// Position of the entry in the log.
    pub index: i64,
    /// Application payload.
    pub data: Message,
}

impl LogEntry {
    /// Create a log entry.
    pub fn new(term: i64, index: i64, data: impl Into<Message>) -> Self {
        Self {
            term,
            index,
            data: data.into(),
        }
    }

    /// The entry's position as a term-index pair.
    pub fn term_index(&self) -> TermIndex {
        TermIndex::new(self.term, self.index)
    }
}

/// A request submitted by a client to a server of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRequest {
    /// The client that sent the request.
    pub client_id: PeerId,
    /// The server the request is addressed to.
    pub server_id: PeerId,
    /// The group the request is for.
    pub group_id: GroupId,
    /// Client-assigned call id, unique per client.
    pub call_id: u64,
    /// Application payload.
    pub message: Message,
}

impl ClientRequest {
    /// Create a client request.
    pub fn new(
        client_id: impl Into<PeerId>,
        server_id: impl Into<PeerId>,
        group_id: GroupId,
        call_id: u64,
        message: impl Into<Message>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            server_id: server_id.into(),
            group_id,
            call_id,
            message: message.into(),
        }
    }
}
