//! Common test utilities for quorum-server tests.

use quorum_core::logging::{TracingConfig, init_tracing};
use quorum_core::{PeerId, exit};
use quorum_server::simulation::HandlerFuture;
use quorum_server::{
    HandlerImpl, RequestHandler, RpcMessage, ServerError, SimulatedRequestReply, SimulationConfig,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Install a debug-level subscriber once per test binary.
#[allow(dead_code)]
pub fn init_test_tracing() {
    let _ = init_tracing(&TracingConfig::for_tests("debug"));
}

/// A request between test nodes. The body selects the server behavior.
#[derive(Debug, Clone)]
pub struct TestRequest {
    pub from: PeerId,
    pub to: PeerId,
    pub call_id: u64,
    pub body: String,
}

impl TestRequest {
    pub fn new(from: &str, to: &str, call_id: u64, body: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            call_id,
            body: body.into(),
        }
    }
}

impl RpcMessage for TestRequest {
    fn requestor_id(&self) -> &PeerId {
        &self.from
    }

    fn replier_id(&self) -> &PeerId {
        &self.to
    }

    fn call_id(&self) -> u64 {
        self.call_id
    }
}

/// A reply to a [`TestRequest`].
#[derive(Debug, Clone)]
pub struct TestReply {
    pub requestor: PeerId,
    pub replier: PeerId,
    pub call_id: u64,
    pub body: String,
}

impl TestReply {
    pub fn answer(request: &TestRequest, body: impl Into<String>) -> Self {
        Self {
            requestor: request.from.clone(),
            replier: request.to.clone(),
            call_id: request.call_id,
            body: body.into(),
        }
    }
}

impl RpcMessage for TestReply {
    fn requestor_id(&self) -> &PeerId {
        &self.requestor
    }

    fn replier_id(&self) -> &PeerId {
        &self.replier
    }

    fn call_id(&self) -> u64 {
        self.call_id
    }
}

pub type TestRpc = SimulatedRequestReply<TestRequest, TestReply>;

/// Server logic driven by the request body:
///
/// - `fail`: recoverable error sent back to the caller
/// - `ignore`: no reply
/// - `panic`: the handler panics
/// - `break`: fatal invariant violation
/// - `stop-and-break`: marks the server stopped, then a fatal error
/// - `mismatch`: a reply addressed to another node
/// - `slow:<ms>`: sleeps, then echoes
/// - anything else: echoes `echo:<body>`
#[derive(Debug)]
pub struct EchoServer {
    alive: AtomicBool,
    served: AtomicUsize,
}

#[allow(dead_code)]
impl EchoServer {
    pub fn new() -> Self {
        Self {
            alive: AtomicBool::new(true),
            served: AtomicUsize::new(0),
        }
    }

    pub fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }
}

impl HandlerImpl<TestRequest, TestReply> for EchoServer {
    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn handle_request<'a>(
        &'a self,
        request: &'a TestRequest,
    ) -> HandlerFuture<'a, Option<TestReply>> {
        Box::pin(async move {
            self.served.fetch_add(1, Ordering::SeqCst);
            match request.body.as_str() {
                "fail" => Err(ServerError::StateMachine("rejected".to_string())),
                "ignore" => Ok(None),
                "panic" => panic!("boom"),
                "break" => Err(ServerError::InvariantViolation("broken".to_string())),
                "stop-and-break" => {
                    self.stop();
                    Err(ServerError::InvariantViolation("broken while stopping".to_string()))
                }
                "mismatch" => {
                    let mut reply = TestReply::answer(request, "wrong");
                    reply.requestor = "elsewhere".into();
                    Ok(Some(reply))
                }
                body => {
                    if let Some(ms) = body.strip_prefix("slow:") {
                        let ms = ms.parse().unwrap_or(0);
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                    }
                    Ok(Some(TestReply::answer(request, format!("echo:{body}"))))
                }
            }
        })
    }
}

/// A simulated network with an [`EchoServer`] behind every node.
#[allow(dead_code)]
pub struct TestNetwork {
    pub rpc: Arc<TestRpc>,
    pub servers: Vec<(PeerId, Arc<EchoServer>)>,
    pub handlers: Vec<RequestHandler<TestRequest, TestReply, EchoServer>>,
}

#[allow(dead_code)]
impl TestNetwork {
    /// Register `ids` and start a handler for each of them.
    pub fn start(ids: &[&str], config: SimulationConfig) -> Self {
        exit::disable_system_exit();

        let rpc = Arc::new(TestRpc::new(config));
        let mut servers = Vec::with_capacity(ids.len());
        let mut handlers = Vec::with_capacity(ids.len());
        for id in ids {
            rpc.add_peer(*id);
            let server = Arc::new(EchoServer::new());
            let handler = RequestHandler::new(*id, "test", Arc::clone(&rpc), Arc::clone(&server));
            handler.start();
            servers.push((PeerId::from(*id), server));
            handlers.push(handler);
        }

        Self {
            rpc,
            servers,
            handlers,
        }
    }

    /// A network where the listed nodes are registered but nobody serves.
    pub fn without_handlers(ids: &[&str], config: SimulationConfig) -> Self {
        let rpc = Arc::new(TestRpc::new(config));
        for id in ids {
            rpc.add_peer(*id);
        }
        Self {
            rpc,
            servers: Vec::new(),
            handlers: Vec::new(),
        }
    }

    pub fn server(&self, id: &str) -> &Arc<EchoServer> {
        &self
            .servers
            .iter()
            .find(|(peer, _)| peer.as_str() == id)
            .expect("unknown server")
            .1
    }

    pub fn handler(&self, id: &str) -> &RequestHandler<TestRequest, TestReply, EchoServer> {
        self.handlers
            .iter()
            .find(|h| h.server_id().as_str() == id)
            .expect("unknown handler")
    }

    /// Stop every server and join the workers.
    pub async fn stop(self) {
        for (_, server) in &self.servers {
            server.stop();
        }
        for handler in &self.handlers {
            handler.shutdown();
            handler.interrupt_and_join().await;
        }
    }
}
