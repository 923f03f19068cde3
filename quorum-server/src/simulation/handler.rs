//! Worker tasks that serve one simulated node's requests.

use super::{RpcMessage, SimulatedRequestReply};
use crate::error::{ServerError, ServerResult};
use futures::FutureExt;
use parking_lot::Mutex;
use quorum_core::{PeerId, exit};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Boxed future returned by [`HandlerImpl::handle_request`].
pub type HandlerFuture<'a, T> = Pin<Box<dyn Future<Output = ServerResult<T>> + Send + 'a>>;

/// How long [`RequestHandler::interrupt_and_join`] waits for each worker.
const JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Server-side logic of a simulated node.
pub trait HandlerImpl<Req, Rep>: Send + Sync + 'static {
    /// Whether the node is still serving. Workers stop once this is false.
    fn is_alive(&self) -> bool;

    /// Handle one request.
    ///
    /// `Ok(None)` sends no reply. Errors are sent back to the caller, except
    /// fatal ones, which terminate the process.
    fn handle_request<'a>(&'a self, request: &'a Req) -> HandlerFuture<'a, Option<Rep>>;
}

/// Runs a fixed number of worker tasks that take requests addressed to one
/// node and answer them with a [`HandlerImpl`].
pub struct RequestHandler<Req, Rep, H> {
    worker: Arc<Worker<Req, Rep, H>>,
    handler_count: usize,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

struct Worker<Req, Rep, H> {
    server_id: PeerId,
    name: String,
    rpc: Arc<SimulatedRequestReply<Req, Rep>>,
    handler: Arc<H>,
    _marker: PhantomData<fn() -> (Req, Rep)>,
}

impl<Req, Rep, H> RequestHandler<Req, Rep, H>
where
    Req: RpcMessage,
    Rep: RpcMessage,
    H: HandlerImpl<Req, Rep>,
{
    /// Create a handler for `server_id` with as many workers as the
    /// network's `handler_count`. Workers start on [`start`](Self::start).
    pub fn new(
        server_id: impl Into<PeerId>,
        name: impl Into<String>,
        rpc: Arc<SimulatedRequestReply<Req, Rep>>,
        handler: Arc<H>,
    ) -> Self {
        let handler_count = rpc.config().handler_count;
        Self {
            worker: Arc::new(Worker {
                server_id: server_id.into(),
                name: name.into(),
                rpc,
                handler,
                _marker: PhantomData,
            }),
            handler_count,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// The node this handler serves.
    pub fn server_id(&self) -> &PeerId {
        &self.worker.server_id
    }

    /// The network this handler takes requests from.
    pub fn rpc(&self) -> &Arc<SimulatedRequestReply<Req, Rep>> {
        &self.worker.rpc
    }

    /// Spawn the worker tasks. Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock();
        for i in 0..self.handler_count {
            let worker = Arc::clone(&self.worker);
            tasks.push(tokio::spawn(async move { worker.run(i).await }));
        }
        tracing::info!(
            node = %self.worker.server_id,
            name = %self.worker.name,
            workers = self.handler_count,
            "started request handler"
        );
    }

    /// Shut the node down on the network. Workers blocked on an empty queue
    /// return.
    pub fn shutdown(&self) {
        self.worker.rpc.shutdown(&self.worker.server_id);
    }

    /// Abort the workers and wait up to one second for each to finish.
    pub async fn interrupt_and_join(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock());
        for task in &tasks {
            task.abort();
        }
        for (i, task) in tasks.into_iter().enumerate() {
            if tokio::time::timeout(JOIN_TIMEOUT, task).await.is_err() {
                tracing::warn!(
                    node = %self.worker.server_id,
                    worker = i,
                    "worker did not stop within {:?}",
                    JOIN_TIMEOUT
                );
            }
        }
    }

    /// Number of worker tasks that have not finished.
    pub fn running_workers(&self) -> usize {
        self.tasks.lock().iter().filter(|t| !t.is_finished()).count()
    }
}

impl<Req, Rep, H> Worker<Req, Rep, H>
where
    Req: RpcMessage,
    Rep: RpcMessage,
    H: HandlerImpl<Req, Rep>,
{
    async fn run(&self, i: usize) {
        let me = WorkerName {
            server_id: &self.server_id,
            name: &self.name,
            i,
        };

        while self.handler.is_alive() {
            let result = match self.rpc.take_request(&self.server_id).await {
                Ok(request) => self.handle(request).await,
                Err(e) => Err(e),
            };
            let Err(e) = result else { continue };

            if e.is_shutdown() {
                tracing::info!("{} is interrupted: {}", me, e);
                break;
            }
            // Recoverable handler errors were already sent to the caller;
            // anything reaching here is fatal.
            if !self.handler.is_alive() {
                tracing::info!("{} is stopped", me);
                break;
            }
            exit::terminate(1, format!("{me} is terminating"), &e);
            break;
        }
        tracing::debug!("{} exited", me);
    }

    /// Handle one request and reply. Only fatal errors and reply failures
    /// are returned; handler errors are sent to the caller.
    async fn handle(&self, request: Req) -> ServerResult<()> {
        let outcome = AssertUnwindSafe(self.handler.handle_request(&request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ServerError::Internal(panic_message(panic.as_ref()))));

        match outcome {
            Ok(Some(reply)) => self.rpc.send_reply(&request, Ok(reply)).await,
            Ok(None) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!(request = %request.request_key(), error = %e, "handler failed");
                self.rpc.send_reply(&request, Err(e)).await
            }
        }
    }
}

struct WorkerName<'a> {
    server_id: &'a PeerId,
    name: &'a str,
    i: usize,
}

impl fmt::Display for WorkerName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.server_id, self.name, self.i)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
