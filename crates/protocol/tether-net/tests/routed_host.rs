//! Routed connects over mock host and routing collaborators.

use futures::{AsyncReadExt, AsyncWriteExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tether_net::{
    BoxedStream, ErrorKind, Host, NetStream, NetworkError, PeerInfo, RoutedHost,
    RoutedHostConfig, StreamHandler, StreamProtocol, TEMP_ADDR_TTL,
};
use tether_test_utils::{init_tracing, ma, test_keypair, MockHost, MockRouting};
use tokio_util::sync::CancellationToken;

fn peer() -> libp2p::PeerId {
    test_keypair().1
}

// =============================================================================
// TEST: Connect short-circuits and address sources
// =============================================================================

#[tokio::test]
async fn test_connected_peer_skips_routing() {
    let target = peer();
    let host = MockHost::new().with_connected_peer(target);
    let routing = MockRouting::new();
    let routed = RoutedHost::wrap(host.clone(), routing.clone());

    routed
        .connect(&CancellationToken::new(), PeerInfo::from_id(target))
        .await
        .unwrap();

    assert_eq!(routing.lookup_count(), 0);
    assert_eq!(host.connect_count(), 0);
}

#[tokio::test]
async fn test_given_addrs_are_cached_and_used() {
    let target = peer();
    let addr = ma("/ip4/10.0.0.1/tcp/4001");
    let host = MockHost::new();
    let routing = MockRouting::new();
    let routed = RoutedHost::wrap(host.clone(), routing.clone());

    routed
        .connect(
            &CancellationToken::new(),
            PeerInfo::new(target, vec![addr.clone()]),
        )
        .await
        .unwrap();

    assert_eq!(routing.lookup_count(), 0);
    assert_eq!(host.peerstore().addrs(&target), vec![addr.clone()]);
    assert_eq!(host.connect_calls(), vec![PeerInfo::new(target, vec![addr])]);
    assert!(host.is_connected(&target));
}

#[tokio::test]
async fn test_cached_addrs_avoid_lookup() {
    let target = peer();
    let cached = ma("/ip4/10.0.0.2/tcp/4001");
    let host = MockHost::new();
    host.peerstore().add_addrs(&target, &[cached.clone()], TEMP_ADDR_TTL);
    let routing = MockRouting::new();
    let routed = RoutedHost::wrap(host.clone(), routing.clone());

    routed
        .connect(&CancellationToken::new(), PeerInfo::from_id(target))
        .await
        .unwrap();

    assert_eq!(routing.lookup_count(), 0);
    assert_eq!(host.connect_calls()[0].addrs, vec![cached]);
}

#[tokio::test]
async fn test_routing_resolves_unknown_peer() {
    let target = peer();
    let found = vec![ma("/ip4/10.0.0.3/tcp/4001"), ma("/ip6/::1/tcp/4001")];
    let host = MockHost::new();
    let routing = MockRouting::new().with_response(target, PeerInfo::new(target, found.clone()));
    let routed = RoutedHost::wrap(host.clone(), routing.clone());

    routed
        .connect(&CancellationToken::new(), PeerInfo::from_id(target))
        .await
        .unwrap();

    assert_eq!(routing.lookups(), vec![target]);
    assert_eq!(host.connect_calls(), vec![PeerInfo::new(target, found.clone())]);
    assert_eq!(host.peerstore().addrs(&target), found);
}

#[tokio::test]
async fn test_resolved_addrs_expire() {
    let target = peer();
    let host = MockHost::new().with_connect_failure("unreachable");
    let routing = MockRouting::new()
        .with_response(target, PeerInfo::new(target, vec![ma("/ip4/10.0.0.4/tcp/1")]));
    let config = RoutedHostConfig::new().with_address_ttl(Duration::from_millis(50));
    let routed = RoutedHost::new(host.clone(), routing.clone(), config);
    let cancel = CancellationToken::new();

    assert!(routed.connect(&cancel, PeerInfo::from_id(target)).await.is_err());
    // Still cached: no second lookup.
    assert!(routed.connect(&cancel, PeerInfo::from_id(target)).await.is_err());
    assert_eq!(routing.lookup_count(), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(routed.connect(&cancel, PeerInfo::from_id(target)).await.is_err());
    assert_eq!(routing.lookup_count(), 2);
}

// =============================================================================
// TEST: Routing failures
// =============================================================================

#[tokio::test]
async fn test_wrong_peer_from_routing_is_rejected() {
    init_tracing();
    let target = peer();
    let impostor = peer();
    let host = MockHost::new();
    let routing = MockRouting::new().with_response(
        target,
        PeerInfo::new(impostor, vec![ma("/ip4/10.6.6.6/tcp/4001")]),
    );
    let routed = RoutedHost::wrap(host.clone(), routing);

    let err = routed
        .connect(&CancellationToken::new(), PeerInfo::from_id(target))
        .await
        .unwrap_err();

    match err {
        NetworkError::RoutingWrongPeer { wanted, got } => {
            assert_eq!(wanted, target);
            assert_eq!(got, impostor);
        }
        other => panic!("expected wrong peer, got {}", other),
    }
    assert_eq!(host.connect_count(), 0);
    assert!(host.peerstore().addrs(&target).is_empty());
    assert!(host.peerstore().addrs(&impostor).is_empty());
}

#[tokio::test]
async fn test_routing_failure_is_wrapped() {
    let target = peer();
    let host = MockHost::new();
    let routing = MockRouting::new();
    let routed = RoutedHost::wrap(host.clone(), routing.clone());

    let err = routed
        .connect(&CancellationToken::new(), PeerInfo::from_id(target))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::RoutingLookupFailed);
    assert!(matches!(err, NetworkError::RoutingLookup { peer, .. } if peer == target));
    assert_eq!(routing.lookup_count(), 1);
    assert_eq!(host.connect_count(), 0);
}

#[tokio::test]
async fn test_cancel_during_lookup() {
    let target = peer();
    let host = MockHost::new();
    let routing = MockRouting::new()
        .with_response(target, PeerInfo::new(target, vec![ma("/ip4/10.0.0.5/tcp/1")]))
        .with_delay(Duration::from_secs(30));
    let routed = RoutedHost::wrap(host.clone(), routing);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = routed
        .connect(&cancel, PeerInfo::from_id(target))
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(host.connect_count(), 0);
}

#[tokio::test]
async fn test_base_connect_error_passes_through() {
    let target = peer();
    let host = MockHost::new().with_connect_failure("refused");
    let routed = RoutedHost::wrap(host, MockRouting::new());

    let err = routed
        .connect(
            &CancellationToken::new(),
            PeerInfo::new(target, vec![ma("/ip4/10.0.0.6/tcp/1")]),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NetworkError::ConnectionFailed(ref m) if m == "refused"));
}

// =============================================================================
// TEST: Everything else is forwarded
// =============================================================================

#[tokio::test]
async fn test_surface_is_forwarded() {
    let local = peer();
    let listen = vec![ma("/ip4/127.0.0.1/tcp/4001")];
    let host = MockHost::with_local_peer_id(local).with_listen_addrs(listen.clone());
    let routed = RoutedHost::wrap(host.clone(), MockRouting::new());

    assert_eq!(routed.id(), local);
    assert_eq!(routed.addrs(), listen);

    let protocol = StreamProtocol::new("/echo/1.0.0");
    let received: Arc<Mutex<Vec<libp2p::PeerId>>> = Arc::default();
    let sink = received.clone();
    let handler: StreamHandler = Arc::new(move |stream: BoxedStream| {
        sink.lock().unwrap().push(stream.remote_peer());
    });

    routed.set_stream_handler(protocol.clone(), handler);
    assert!(host.has_handler(&protocol));
    let remote = peer();
    assert!(host.deliver_inbound(protocol.clone(), remote).is_some());
    assert_eq!(*received.lock().unwrap(), vec![remote]);

    routed.remove_stream_handler(&protocol);
    assert!(!host.has_handler(&protocol));

    routed.close().await.unwrap();
    assert!(host.is_closed());
}

#[tokio::test]
async fn test_new_stream_is_metered() {
    let target = peer();
    let host = MockHost::new().with_connected_peer(target);
    let routed = RoutedHost::wrap(host.clone(), MockRouting::new());
    let protocol = StreamProtocol::new("/echo/1.0.0");
    let cancel = CancellationToken::new();

    let mut stream = routed
        .new_stream(&cancel, protocol.clone(), target)
        .await
        .unwrap();
    let mut remote = host.take_remote_stream().unwrap();

    stream.write_all(b"ping").await.unwrap();
    let mut buf = [0u8; 4];
    remote.read_exact(&mut buf).await.unwrap();
    remote.write_all(b"pong!").await.unwrap();
    let mut buf = [0u8; 5];
    stream.read_exact(&mut buf).await.unwrap();

    let stats = host.bandwidth().stats_for_protocol(&protocol);
    assert_eq!(stats.total_out, 4);
    assert_eq!(stats.total_in, 5);
    assert_eq!(host.bandwidth().stats_for_peer(&target).total_out, 4);

    // The reporter handed out by the routed host is the base host's.
    let reporter = routed.bandwidth_reporter();
    reporter.log_sent_stream(1, &protocol, &target);
    assert_eq!(host.bandwidth().totals().total_out, 5);

    let unconnected = routed.new_stream(&cancel, protocol, peer()).await;
    assert!(unconnected.is_err());
}
