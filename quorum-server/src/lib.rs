//! State machine application and simulated transport for quorum nodes.
//!
//! # Architecture
//!
//! ```text
//!   client request ──► StateMachine::start_transaction
//!                             │
//!                  (replicated and committed elsewhere)
//!                             │
//!   committed entry ──► StateMachine::apply_transaction ──► AppliedIndexTracker
//!                                                               │
//!   stale read ──► StateMachine::query_stale ── waits for ──────┘
//!
//!   PeerProxyMap<SimulatedProxy> ──► SimulatedRequestReply ──► EventQueue (per node)
//!                                            ▲                      │
//!                                            └── RequestHandler ◄───┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use quorum_server::{SimulationConfig, SimulatedRequestReply, RequestHandler};
//!
//! let rpc = Arc::new(SimulatedRequestReply::new(SimulationConfig::default()));
//! rpc.add_peer("s1");
//! rpc.add_peer("s2");
//!
//! let handler = RequestHandler::new("s2", "rpc", Arc::clone(&rpc), Arc::new(MyServer::new()));
//! handler.start();
//!
//! let reply = rpc.send_request(MyRequest::new("s1", "s2", 1)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod protocol;
pub mod simulation;
pub mod state_machine;

pub use config::SimulationConfig;
pub use error::{ServerError, ServerResult};
pub use protocol::{ClientRequest, GroupId, INVALID_LOG_INDEX, LogEntry, Message, TermIndex};
pub use simulation::{
    EventQueue, HandlerImpl, RequestHandler, RequestKey, RpcMessage, SimulatedProxy,
    SimulatedProxyFactory, SimulatedRequestReply,
};
pub use state_machine::{
    AppliedIndexTracker, BaseStateMachine, StateMachine, StateMachineFuture, TransactionContext,
};
