//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use upstream_core::cluster::{HostRef, UpstreamHost};
use upstream_core::config::{ClusterConfig, HostConfig, LbPolicy, SubsetFallback};
use upstream_core::conn_pool::{
    ConnectionPool, PoolEventListener, PoolLifecycle, PoolRegistry, PoolState, ProtocolName,
    StreamReceiver, StreamResetReason, UpstreamStream,
};
use upstream_core::{ClusterManager, HealthFlagRegistry, UpstreamError};

/// `n` distinct addresses from 10.0.0.0/16.
pub fn ip_pool(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| format!("10.0.{}.{}:80", i / 250, i % 250 + 1))
        .collect()
}

pub fn hosts(registry: &HealthFlagRegistry, cluster: &str, addresses: &[String]) -> Vec<HostRef> {
    addresses
        .iter()
        .map(|a| UpstreamHost::new(cluster, a, registry).into_ref())
        .collect()
}

pub fn cluster_config(name: &str, protocol: &str, lb_policy: LbPolicy, hosts: Vec<HostConfig>) -> ClusterConfig {
    ClusterConfig {
        name: name.to_string(),
        protocol: protocol.into(),
        lb_policy,
        subset_fallback: SubsetFallback::AnyEndpoint,
        hosts,
    }
}

pub fn weighted(address: &str, weight: u32) -> HostConfig {
    HostConfig {
        weight,
        ..HostConfig::new(address)
    }
}

pub fn manager(pools: Arc<PoolRegistry>) -> ClusterManager {
    ClusterManager::new(
        Arc::new(HealthFlagRegistry::new()),
        pools,
        Duration::from_millis(500),
    )
}

/// Stream handed out by [`MockConnPool`].
#[derive(Debug)]
pub struct MockStream {
    id: u64,
    lifecycle: Arc<PoolLifecycle>,
}

#[async_trait]
impl UpstreamStream for MockStream {
    fn id(&self) -> u64 {
        self.id
    }

    async fn send(&self, _data: Bytes) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.lifecycle.release_stream();
    }
}

/// In-memory pool that never touches the network.
#[derive(Debug)]
pub struct MockConnPool {
    protocol: ProtocolName,
    host: Mutex<HostRef>,
    lifecycle: Arc<PoolLifecycle>,
    next_id: AtomicU64,
}

impl MockConnPool {
    pub fn new(protocol: &str, host: HostRef) -> Self {
        Self {
            protocol: protocol.into(),
            host: Mutex::new(host),
            lifecycle: Arc::new(PoolLifecycle::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

#[async_trait]
impl ConnectionPool for MockConnPool {
    fn protocol(&self) -> &ProtocolName {
        &self.protocol
    }

    fn host(&self) -> HostRef {
        self.host.lock().clone()
    }

    fn update_host(&self, host: HostRef) {
        *self.host.lock() = host;
    }

    fn support_tls(&self) -> bool {
        false
    }

    fn state(&self) -> PoolState {
        self.lifecycle.state()
    }

    async fn check_and_init(&self, _timeout: Duration) -> bool {
        self.lifecycle.mark_ready();
        self.lifecycle.state() == PoolState::Ready
    }

    fn new_stream(&self, _receiver: Arc<dyn StreamReceiver>, listener: &dyn PoolEventListener) {
        let host = self.host();
        match self.lifecycle.try_acquire_stream() {
            Ok(()) => {
                let stream = MockStream {
                    id: self.next_id.fetch_add(1, Ordering::Relaxed),
                    lifecycle: self.lifecycle.clone(),
                };
                listener.on_ready(Box::new(stream), host);
            }
            Err(state) => listener.on_failure(
                UpstreamError::PoolNotReady {
                    address: host.address_string().to_string(),
                    state,
                },
                host,
            ),
        }
    }

    fn shutdown(&self) {
        self.lifecycle.shutdown();
    }

    fn close(&self) {
        self.lifecycle.close();
    }
}

/// Register `protocol` as a [`MockConnPool`] factory; the counter tracks constructions.
pub fn register_mock(registry: &PoolRegistry, protocol: &'static str) -> Arc<AtomicUsize> {
    let constructed = Arc::new(AtomicUsize::new(0));
    let counter = constructed.clone();
    registry.register_pool_factory(protocol, move |host: HostRef| -> Arc<dyn ConnectionPool> {
        counter.fetch_add(1, Ordering::SeqCst);
        Arc::new(MockConnPool::new(protocol, host))
    });
    registry.register_conn_pool_factory(protocol, true);
    constructed
}

/// Collects everything delivered to one stream.
#[derive(Default)]
pub struct CollectingReceiver {
    data: Mutex<Vec<u8>>,
    resets: Mutex<Vec<StreamResetReason>>,
}

impl CollectingReceiver {
    pub fn data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn resets(&self) -> Vec<StreamResetReason> {
        self.resets.lock().clone()
    }
}

impl StreamReceiver for CollectingReceiver {
    fn on_data(&self, data: Bytes) {
        self.data.lock().extend_from_slice(&data);
    }

    fn on_reset(&self, reason: StreamResetReason) {
        self.resets.lock().push(reason);
    }
}

/// Captures the outcome of `new_stream`.
#[derive(Default)]
pub struct CapturingListener {
    stream: Mutex<Option<Box<dyn UpstreamStream>>>,
    error: Mutex<Option<UpstreamError>>,
}

impl CapturingListener {
    pub fn take_stream(&self) -> Option<Box<dyn UpstreamStream>> {
        self.stream.lock().take()
    }

    pub fn error(&self) -> Option<UpstreamError> {
        self.error.lock().clone()
    }
}

impl PoolEventListener for CapturingListener {
    fn on_ready(&self, stream: Box<dyn UpstreamStream>, _host: HostRef) {
        *self.stream.lock() = Some(stream);
    }

    fn on_failure(&self, error: UpstreamError, _host: HostRef) {
        *self.error.lock() = Some(error);
    }
}

/// Local TCP backend echoing every byte back.
pub async fn start_echo_backend() -> (SocketAddr, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = vec![0u8; 4096];
                loop {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if socket.write_all(&buf[..n]).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            });
        }
    });
    (addr, handle)
}

/// Local TCP backend that accepts and immediately hangs up.
pub async fn start_hangup_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::time::sleep(Duration::from_millis(100)).await;
            drop(socket);
        }
    });
    addr
}

/// An address nothing listens on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
