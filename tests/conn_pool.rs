//! Connection pool registry and the built-in TCP pool.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use upstream_core::config::{HostConfig, LbPolicy};
use upstream_core::conn_pool::{tcp, PoolRegistry, PoolState, StreamResetReason};
use upstream_core::{HealthFlagRegistry, RequestContext, UpstreamError, UpstreamHost};

mod common;

use common::{cluster_config, eventually, manager, CapturingListener, CollectingReceiver};

#[test]
fn unregistered_protocol_is_rejected() {
    let registry = PoolRegistry::new();
    let health = HealthFlagRegistry::new();
    let host = UpstreamHost::new("web", "10.0.0.1:80", &health).into_ref();

    let err = registry.get_or_create(&host, &"foo".into()).unwrap_err();
    assert_eq!(err, UpstreamError::UnknownProtocol("foo".into()));
    assert!(registry.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_construct_once() {
    let registry = Arc::new(PoolRegistry::new());
    let constructed = common::register_mock(&registry, "mock");
    let health = HealthFlagRegistry::new();
    let host = UpstreamHost::new("web", "10.0.0.1:80", &health).into_ref();

    let mut tasks = Vec::new();
    for _ in 0..32 {
        let registry = registry.clone();
        let host = host.clone();
        tasks.push(tokio::spawn(async move {
            registry.get_or_create(&host, &"mock".into()).unwrap()
        }));
    }

    let mut pools = Vec::new();
    for task in tasks {
        pools.push(task.await.unwrap());
    }
    assert_eq!(constructed.load(Ordering::SeqCst), 1);
    assert!(pools.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(registry.supports_multiplexing(&"mock".into()), Some(true));
}

#[tokio::test]
async fn tcp_pool_round_trip() {
    let (backend, _server) = common::start_echo_backend().await;
    let pools = Arc::new(PoolRegistry::new());
    tcp::register(&pools);
    assert_eq!(pools.supports_multiplexing(&tcp::TCP_PROTOCOL.into()), Some(false));

    let m = manager(pools);
    m.add_cluster(&cluster_config(
        "echo",
        "tcp",
        LbPolicy::Random,
        vec![HostConfig::new(backend.to_string())],
    ));

    let pool = m.conn_pool_for("echo", &RequestContext::new()).await.unwrap();
    assert_eq!(pool.state(), PoolState::Ready);
    assert_eq!(pool.host().address_string(), backend.to_string());

    let receiver = Arc::new(CollectingReceiver::default());
    let listener = CapturingListener::default();
    pool.new_stream(receiver.clone(), &listener);
    let stream = listener.take_stream().expect("stream delivered");

    stream.send(Bytes::from_static(b"ping")).await.unwrap();
    assert!(eventually(|| receiver.data() == b"ping").await);

    let host = pool.host();
    assert_eq!(host.stats().rq_active(), 1);
    drop(stream);
    assert_eq!(host.stats().rq_active(), 0);
    assert_eq!(host.stats().cx_total(), 1);

    // Same key, same pool; already initialised.
    let again = m.conn_pool_for("echo", &RequestContext::new()).await.unwrap();
    assert!(Arc::ptr_eq(&pool, &again));
    assert_eq!(host.stats().cx_total(), 1);
}

#[tokio::test]
async fn refused_connection_fails_init() {
    let backend = common::closed_port().await;
    let pools = Arc::new(PoolRegistry::new());
    tcp::register(&pools);
    let m = manager(pools.clone());
    m.add_cluster(&cluster_config(
        "dead",
        "tcp",
        LbPolicy::Random,
        vec![HostConfig::new(backend.to_string())],
    ));

    let err = m.conn_pool_for("dead", &RequestContext::new()).await.unwrap_err();
    assert!(matches!(err, UpstreamError::ConnectionInitFailed { ref address, .. } if *address == backend.to_string()));
    assert!(err.is_retryable());

    let pool = pools.get(&backend.to_string(), &"tcp".into()).unwrap();
    assert_eq!(pool.state(), PoolState::Uninitialized);
    assert_eq!(pool.host().stats().cx_connect_fail(), 1);

    // Rejected, not queued.
    let listener = CapturingListener::default();
    pool.new_stream(Arc::new(CollectingReceiver::default()), &listener);
    assert!(listener.take_stream().is_none());
    assert!(matches!(
        listener.error(),
        Some(UpstreamError::PoolNotReady { state: PoolState::Uninitialized, .. })
    ));
}

#[tokio::test]
async fn shutdown_drains_then_closes() {
    let (backend, _server) = common::start_echo_backend().await;
    let pools = Arc::new(PoolRegistry::new());
    tcp::register(&pools);
    let m = manager(pools.clone());
    m.add_cluster(&cluster_config(
        "echo",
        "tcp",
        LbPolicy::Random,
        vec![HostConfig::new(backend.to_string())],
    ));

    let pool = m.conn_pool_for("echo", &RequestContext::new()).await.unwrap();
    let receiver = Arc::new(CollectingReceiver::default());
    let first = CapturingListener::default();
    pool.new_stream(receiver.clone(), &first);
    let stream = first.take_stream().unwrap();

    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Draining);

    let late = CapturingListener::default();
    pool.new_stream(Arc::new(CollectingReceiver::default()), &late);
    assert!(matches!(
        late.error(),
        Some(UpstreamError::PoolNotReady { state: PoolState::Draining, .. })
    ));

    // In-flight stream still works while draining.
    stream.send(Bytes::from_static(b"still here")).await.unwrap();
    assert!(eventually(|| receiver.data() == b"still here").await);

    drop(stream);
    assert_eq!(pool.state(), PoolState::Closed);

    // A closed pool is replaced by a fresh one.
    let replacement = m.conn_pool_for("echo", &RequestContext::new()).await.unwrap();
    assert!(!Arc::ptr_eq(&pool, &replacement));
    assert_eq!(replacement.state(), PoolState::Ready);
    replacement.close();
    assert_eq!(replacement.state(), PoolState::Closed);
}

#[tokio::test]
async fn peer_close_resets_streams_and_allows_reinit() {
    let backend = common::start_hangup_backend().await;
    let pools = Arc::new(PoolRegistry::new());
    tcp::register(&pools);
    let m = manager(pools);
    m.add_cluster(&cluster_config(
        "flaky",
        "tcp",
        LbPolicy::Random,
        vec![HostConfig::new(backend.to_string())],
    ));

    let pool = m.conn_pool_for("flaky", &RequestContext::new()).await.unwrap();
    let receiver = Arc::new(CollectingReceiver::default());
    let listener = CapturingListener::default();
    pool.new_stream(receiver.clone(), &listener);
    let _stream = listener.take_stream().unwrap();

    assert!(eventually(|| receiver.resets() == vec![StreamResetReason::ConnectionTerminated]).await);
    assert!(eventually(|| pool.state() == PoolState::Uninitialized).await);

    assert!(pool.check_and_init(Duration::from_millis(500)).await);
    assert_eq!(pool.state(), PoolState::Ready);
}

#[tokio::test]
async fn cancelled_init_leaves_pool_uninitialized() {
    let pools = PoolRegistry::new();
    tcp::register(&pools);
    let health = HealthFlagRegistry::new();
    // Non-routable: connect either hangs or fails fast, never succeeds.
    let host = UpstreamHost::new("web", "10.255.255.1:9", &health).into_ref();
    let pool = pools.get_or_create(&host, &"tcp".into()).unwrap();

    let init = pool.check_and_init(Duration::from_secs(30));
    let _ = tokio::time::timeout(Duration::from_millis(100), init).await;
    assert_eq!(pool.state(), PoolState::Uninitialized);

    pool.shutdown();
    assert_eq!(pool.state(), PoolState::Closed);
    assert!(!pool.check_and_init(Duration::from_millis(10)).await);
}

#[tokio::test]
async fn update_hosts_rebinds_live_pool() {
    let (backend, _server) = common::start_echo_backend().await;
    let pools = Arc::new(PoolRegistry::new());
    tcp::register(&pools);
    let m = manager(pools);
    m.add_cluster(&cluster_config(
        "echo",
        "tcp",
        LbPolicy::Random,
        vec![HostConfig::new(backend.to_string())],
    ));
    let pool = m.conn_pool_for("echo", &RequestContext::new()).await.unwrap();

    let renamed = HostConfig {
        hostname: Some("echo-renamed".into()),
        ..HostConfig::new(backend.to_string())
    };
    m.update_hosts("echo", &[renamed]).unwrap();

    assert_eq!(pool.host().hostname(), "echo-renamed");
    assert_eq!(pool.state(), PoolState::Ready);

    let again = m.conn_pool_for("echo", &RequestContext::new()).await.unwrap();
    assert!(Arc::ptr_eq(&pool, &again));

    // Removing the host drains its pool.
    m.update_hosts("echo", &[]).unwrap();
    assert_eq!(pool.state(), PoolState::Closed);
    assert!(matches!(
        m.conn_pool_for("echo", &RequestContext::new()).await,
        Err(UpstreamError::NoHealthyUpstream { .. })
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn streams_racing_close_are_reset_or_rejected() {
    let (backend, _server) = common::start_echo_backend().await;
    let pools = PoolRegistry::new();
    tcp::register(&pools);
    let health = HealthFlagRegistry::new();
    let host = UpstreamHost::new("echo", &backend.to_string(), &health).into_ref();

    for _ in 0..200 {
        let pool = pools.get_or_create(&host, &"tcp".into()).unwrap();
        assert!(pool.check_and_init(Duration::from_millis(500)).await);

        let closer = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.close())
        };

        let mut delivered = Vec::new();
        let mut rejected = 0;
        for _ in 0..50 {
            let receiver = Arc::new(CollectingReceiver::default());
            let listener = CapturingListener::default();
            pool.new_stream(receiver.clone(), &listener);
            match listener.take_stream() {
                Some(stream) => delivered.push((stream, receiver)),
                None => {
                    assert!(matches!(listener.error(), Some(UpstreamError::PoolNotReady { .. })));
                    rejected += 1;
                }
            }
        }
        closer.join().unwrap();

        assert_eq!(delivered.len() + rejected, 50);
        assert_eq!(pool.state(), PoolState::Closed);
        // Every stream handed out before the close saw it.
        for (_stream, receiver) in &delivered {
            assert_eq!(receiver.resets(), vec![StreamResetReason::PoolClosed]);
        }
    }
}

#[test]
fn tcp_pool_never_claims_tls() {
    let pools = PoolRegistry::new();
    tcp::register(&pools);
    let health = HealthFlagRegistry::new();
    let host = UpstreamHost::new("web", "10.0.0.1:443", &health)
        .with_tls(true)
        .into_ref();
    assert!(host.support_tls());

    let pool = pools.get_or_create(&host, &"tcp".into()).unwrap();
    assert!(!pool.support_tls());
}
