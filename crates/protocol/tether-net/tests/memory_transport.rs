//! Dialer over the in-memory transport.
//!
//! Exercises sub-transport registration, the wrap hook and the full secure
//! sequence without touching the OS network stack.

use futures::{AsyncReadExt, AsyncWriteExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tether_net::{
    BoxedConnection, DialConfig, Dialer, ErrorKind, SubDialer, TransportRegistry, WrapFn,
};
use tether_test_utils::{init_tracing, memory_pair, test_keypair, MemoryHub};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn test_secure_dial_over_memory() {
    init_tracing();
    let hub = MemoryHub::new();
    let mut listener = hub.listen();
    let (dialer, upgrader) = memory_pair(&hub, DialConfig::default());
    let listen_peer = upgrader.local_peer();
    let addr = listener.multiaddr().clone();

    let accept = tokio::spawn(async move {
        let raw = listener.accept().await.unwrap();
        upgrader.upgrade(raw).await
    });

    let mut conn = dialer
        .dial(&CancellationToken::new(), &addr, listen_peer)
        .await
        .expect("dial");
    assert!(conn.is_secure());
    assert_eq!(conn.remote_peer(), Some(listen_peer));
    assert_eq!(
        conn.remote_public_key().map(|k| k.to_peer_id()),
        Some(listen_peer)
    );

    let mut accepted = accept.await.unwrap().expect("upgrade");
    assert_eq!(accepted.remote_peer(), Some(dialer.local_peer()));

    accepted.write_all(b"over memory").await.unwrap();
    accepted.flush().await.unwrap();
    let mut buf = [0u8; 11];
    conn.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"over memory");
}

#[tokio::test]
async fn test_wrap_hook_sees_every_raw_connection() {
    let hub = MemoryHub::new();
    let mut listener = hub.listen();
    let (dialer, upgrader) = memory_pair(&hub, DialConfig::insecure());
    let listen_peer = upgrader.local_peer();
    let addr = listener.multiaddr().clone();

    let wrapped = Arc::new(AtomicUsize::new(0));
    let counter = wrapped.clone();
    let wrap: WrapFn = Arc::new(move |conn: BoxedConnection| {
        counter.fetch_add(1, Ordering::SeqCst);
        conn
    });
    let dialer = dialer.with_wrapper(wrap);

    let accept = tokio::spawn(async move {
        for _ in 0..2 {
            let raw = listener.accept().await.unwrap();
            upgrader.upgrade(raw).await.unwrap();
        }
    });

    let cancel = CancellationToken::new();
    dialer.dial(&cancel, &addr, listen_peer).await.unwrap();
    dialer.dial(&cancel, &addr, listen_peer).await.unwrap();
    accept.await.unwrap();

    assert_eq!(wrapped.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_first_matching_sub_dialer_wins() {
    let first = MemoryHub::new();
    let second = MemoryHub::new();
    let first_dialer = first.dialer();
    let second_dialer = second.dialer();

    let mut registry = TransportRegistry::new();
    registry.add(Arc::new(first_dialer.clone()));
    registry.add(Arc::new(second_dialer.clone()));
    assert_eq!(registry.len(), 2);

    let (key, _) = test_keypair();
    let dialer =
        Dialer::with_keypair(key, Arc::new(DialConfig::default())).with_transports(registry);

    // Nothing listens on the first hub, so the dial fails there.
    let (_, remote) = test_keypair();
    let err = dialer
        .dial(&CancellationToken::new(), &second.listen().multiaddr().clone(), remote)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransportDialFailed);
    assert_eq!(first_dialer.dial_count(), 1);
    assert_eq!(second_dialer.dial_count(), 0);
}

#[tokio::test]
async fn test_memory_address_without_memory_transport() {
    let hub = MemoryHub::new();
    let listener = hub.listen();

    // Only the TCP fallback is registered.
    let (key, _) = test_keypair();
    let dialer = Dialer::with_keypair(key, Arc::new(DialConfig::default()));
    let (_, remote) = test_keypair();

    let err = dialer
        .dial(&CancellationToken::new(), listener.multiaddr(), remote)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoTransport);
}

#[tokio::test]
async fn test_custom_fallback() {
    let hub = MemoryHub::new();
    let mut listener = hub.listen();
    let fallback = hub.dialer();
    assert_eq!(fallback.name(), "memory");

    let config = Arc::new(DialConfig::insecure());
    let (key, _) = test_keypair();
    let dialer = Dialer::with_keypair(key, config.clone())
        .with_transports(TransportRegistry::with_fallback(Arc::new(fallback.clone())));
    let (listen_key, listen_peer) = test_keypair();
    let upgrader = tether_net::InboundUpgrader::new(listen_peer, Some(listen_key), config);
    let addr = listener.multiaddr().clone();

    let accept = tokio::spawn(async move {
        let raw = listener.accept().await.unwrap();
        upgrader.upgrade(raw).await
    });

    let conn = dialer
        .dial(&CancellationToken::new(), &addr, listen_peer)
        .await
        .unwrap();
    assert!(!conn.is_secure());
    assert!(accept.await.unwrap().is_ok());
    assert_eq!(fallback.dial_count(), 1);
}
