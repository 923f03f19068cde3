//! Per-request context carried from submission through application.

use crate::protocol::{ClientRequest, LogEntry, Message};

/// Context of one transaction.
///
/// Created by `start_transaction` on the leader from a client request, or
/// from a log entry on followers. The state machine may attach its own
/// payload in `state_machine_context`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionContext {
    client_request: Option<ClientRequest>,
    log_entry: Option<LogEntry>,
    state_machine_context: Option<Message>,
    exception: Option<String>,
}

impl TransactionContext {
    /// An empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a committed entry, as seen by followers.
    pub fn for_log_entry(entry: LogEntry) -> Self {
        Self::new().with_log_entry(entry)
    }

    /// Attach the originating client request.
    pub fn with_client_request(mut self, request: ClientRequest) -> Self {
        self.client_request = Some(request);
        self
    }

    /// Attach the log entry the transaction was written as.
    pub fn with_log_entry(mut self, entry: LogEntry) -> Self {
        self.log_entry = Some(entry);
        self
    }

    /// Attach state-machine-private data.
    pub fn with_state_machine_context(mut self, context: impl Into<Message>) -> Self {
        self.state_machine_context = Some(context.into());
        self
    }

    /// Record a failure that should be reported instead of applying.
    pub fn with_exception(mut self, exception: impl Into<String>) -> Self {
        self.exception = Some(exception.into());
        self
    }

    /// The originating client request.
    pub fn client_request(&self) -> Option<&ClientRequest> {
        self.client_request.as_ref()
    }

    /// The log entry.
    pub fn log_entry(&self) -> Option<&LogEntry> {
        self.log_entry.as_ref()
    }

    /// State-machine-private data.
    pub fn state_machine_context(&self) -> Option<&Message> {
        self.state_machine_context.as_ref()
    }

    /// The recorded failure, if any.
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }
}
