//! Request handler supervision tests.
//!
//! Fatal handler failures terminate the process. Terminations are recorded
//! process-wide, so this binary holds a single sequential test.

mod common;

use common::{TestNetwork, TestRequest};
use quorum_core::exit;
use quorum_server::SimulationConfig;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_fatal_failures_terminate() {
    common::init_test_tracing();
    let net = TestNetwork::start(&["s1", "s2", "s3", "s4"], SimulationConfig::default());
    exit::clear_first_exit();

    // A panicking handler never replies; the caller times out.
    let err = net
        .rpc
        .send_request(TestRequest::new("client", "s1", 1, "panic"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    let record = exit::first_exit().expect("panic did not terminate");
    assert_eq!(record.status, 1);
    assert_eq!(record.message, "s1.test0 is terminating");
    assert_eq!(net.handler("s1").running_workers(), 0);

    // A broken invariant in the handler.
    exit::clear_first_exit();
    net.rpc
        .send_request(TestRequest::new("client", "s2", 1, "break"))
        .await
        .unwrap_err();
    assert_eq!(exit::first_exit().unwrap().message, "s2.test0 is terminating");
    assert_eq!(net.handler("s2").running_workers(), 0);

    // A reply that does not answer its request.
    exit::clear_first_exit();
    net.rpc
        .send_request(TestRequest::new("client", "s3", 1, "mismatch"))
        .await
        .unwrap_err();
    assert_eq!(exit::first_exit().unwrap().message, "s3.test0 is terminating");

    // A server that stopped before failing exits quietly.
    exit::clear_first_exit();
    net.rpc
        .send_request(TestRequest::new("client", "s4", 1, "stop-and-break"))
        .await
        .unwrap_err();
    assert!(!exit::is_terminated());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(net.handler("s4").running_workers(), 0);

    net.stop().await;
}
