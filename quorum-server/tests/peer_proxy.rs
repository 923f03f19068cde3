//! Peer proxy map over the simulated network.
//!
//! Tests connecting to peers lazily, rebuilding proxies after a peer
//! restarts and closing all proxies.

mod common;

use common::{TestNetwork, TestReply, TestRequest};
use quorum_core::{LifeCycleState, Peer, PeerId, PeerProxyMap, QuorumError};
use quorum_server::{
    RequestHandler, ServerError, SimulatedProxy, SimulatedProxyFactory, SimulationConfig,
};
use std::sync::Arc;

type TestProxyMap = PeerProxyMap<SimulatedProxy<TestRequest, TestReply>>;

fn proxy_map(net: &TestNetwork, local: &str, peers: &[&str]) -> TestProxyMap {
    let map = PeerProxyMap::new(
        format!("{local}->peers"),
        SimulatedProxyFactory::new(local, Arc::clone(&net.rpc)),
    );
    map.add_peers(
        peers
            .iter()
            .map(|id| Peer::new(*id, format!("sim://{id}"))),
    );
    map
}

/// Send through the map, resetting the proxy on connection failures.
async fn send(
    map: &TestProxyMap,
    to: &str,
    request: TestRequest,
) -> Result<TestReply, ServerError> {
    let id = PeerId::from(to);
    let proxy = map.get_proxy(&id).await?;
    match proxy.send(request).await {
        Err(ServerError::Core(e)) => {
            map.handle_exception(&id, &e, false).await;
            Err(ServerError::Core(e))
        }
        other => other,
    }
}

#[tokio::test]
async fn test_send_through_proxies() {
    let net = TestNetwork::start(&["s1", "s2", "s3"], SimulationConfig::default());
    let map = proxy_map(&net, "s1", &["s2", "s3"]);
    assert_eq!(map.state(&"s2".into()), Some(LifeCycleState::New));

    for (call_id, to) in [(1, "s2"), (2, "s3"), (3, "s2")] {
        let reply = send(&map, to, TestRequest::new("s1", to, call_id, "hi"))
            .await
            .unwrap();
        assert_eq!(reply.replier.as_str(), to);
        assert_eq!(reply.body, "echo:hi");
    }
    assert_eq!(map.state(&"s2".into()), Some(LifeCycleState::Running));
    assert_eq!(net.server("s2").served(), 2);

    let s2 = map.get_proxy(&"s2".into()).await.unwrap();
    assert_eq!(s2.local_id().as_str(), "s1");
    assert_eq!(s2.peer().address(), "sim://s2");

    map.close().await;
    net.stop().await;
}

#[tokio::test]
async fn test_misaddressed_request_is_rejected() {
    let net = TestNetwork::start(&["s1", "s2", "s3"], SimulationConfig::default());
    let map = proxy_map(&net, "s1", &["s2", "s3"]);

    let err = send(&map, "s2", TestRequest::new("s1", "s3", 1, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::InvalidArgument(_)));
    assert_eq!(net.server("s3").served(), 0);

    map.close().await;
    net.stop().await;
}

#[tokio::test]
async fn test_unregistered_peer_fails_to_connect() {
    let net = TestNetwork::start(&["s1"], SimulationConfig::default());
    let map = proxy_map(&net, "s1", &["s2"]);

    let err = map.get_proxy(&"s2".into()).await.unwrap_err();
    assert!(matches!(err, QuorumError::Connection { .. }));
    assert_eq!(map.state(&"s2".into()), Some(LifeCycleState::New));

    let err = map.get_proxy(&"s9".into()).await.unwrap_err();
    assert!(matches!(err, QuorumError::NotFound { .. }));

    map.close().await;
    net.stop().await;
}

#[tokio::test]
async fn test_restarted_peer_gets_new_proxy() {
    let mut net = TestNetwork::start(&["s1", "s2"], SimulationConfig::default());
    let map = proxy_map(&net, "s1", &["s2"]);

    send(&map, "s2", TestRequest::new("s1", "s2", 1, "before"))
        .await
        .unwrap();
    let before = map.get_proxy(&"s2".into()).await.unwrap();

    // s2 goes away: the send fails as a connection error and the proxy is
    // reset.
    net.handler("s2").shutdown();
    let err = send(&map, "s2", TestRequest::new("s1", "s2", 2, "down"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Core(QuorumError::Connection { .. })));
    assert!(before.is_closed());
    assert_eq!(map.state(&"s2".into()), Some(LifeCycleState::New));

    // s2 comes back with a new handler.
    net.rpc.add_peer("s2");
    let server = Arc::new(common::EchoServer::new());
    let handler = RequestHandler::new("s2", "test", Arc::clone(&net.rpc), Arc::clone(&server));
    handler.start();
    net.servers.push(("s2".into(), Arc::clone(&server)));
    net.handlers.push(handler);

    let reply = send(&map, "s2", TestRequest::new("s1", "s2", 3, "after"))
        .await
        .unwrap();
    assert_eq!(reply.body, "echo:after");
    let after = map.get_proxy(&"s2".into()).await.unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
    assert_eq!(server.served(), 1);

    map.close().await;
    net.stop().await;
}

#[tokio::test]
async fn test_close_closes_every_proxy() {
    let net = TestNetwork::start(&["s1", "s2", "s3"], SimulationConfig::default());
    let map = proxy_map(&net, "s1", &["s2", "s3"]);
    let s2 = map.get_proxy(&"s2".into()).await.unwrap();
    let s3 = map.get_proxy(&"s3".into()).await.unwrap();

    map.close().await;
    map.close().await;
    assert!(s2.is_closed());
    assert!(s3.is_closed());

    // Callers still holding a proxy see it closed.
    let err = s2
        .send(TestRequest::new("s1", "s2", 1, "late"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Core(QuorumError::AlreadyClosed { .. })));

    let err = map.get_proxy(&"s2".into()).await.unwrap_err();
    assert!(matches!(err, QuorumError::AlreadyClosed { .. }));

    net.stop().await;
}
