//! Raw TCP connection pool.
//!
//! # Responsibilities
//! - Connect lazily on `check_and_init`, bounded by the caller's timeout
//! - Hand out streams sharing the pool's single connection
//! - Deliver inbound bytes to the oldest open stream
//! - Fall back to `Uninitialized` when the upstream closes the connection
//!
//! # Design Decisions
//! - Initialisation is serialised by an async mutex; the connection is only
//!   published after the connect succeeded, so a cancelled init leaves nothing
//!   half-built
//! - Writers share the write half behind an async mutex; the read half is
//!   owned by one reader task per connection
//! - The pending queue is sealed under its lock when the connection dies, so
//!   a stream is either reset with the others or never admitted
//! - Only plaintext TCP is dialled; `support_tls` is always `false`

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::{ArcSwap, ArcSwapOption};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use crate::cluster::host::HostRef;
use crate::cluster::stats::RequestGuard;
use crate::conn_pool::{
    ConnectionPool, PoolEventListener, PoolLifecycle, PoolRegistry, PoolState, ProtocolName,
    StreamReceiver, StreamResetReason, UpstreamStream,
};
use crate::error::UpstreamError;

/// Protocol name the TCP pool registers under.
pub const TCP_PROTOCOL: &str = "tcp";

const READ_CHUNK: usize = 8 * 1024;

/// Register the TCP pool factory (non-multiplexing) with `registry`.
pub fn register(registry: &PoolRegistry) {
    registry.register_pool_factory(TCP_PROTOCOL, |host: HostRef| -> Arc<dyn ConnectionPool> {
        Arc::new(TcpConnPool::new(host))
    });
    registry.register_conn_pool_factory(TCP_PROTOCOL, false);
}

struct PendingStream {
    id: u64,
    receiver: Arc<dyn StreamReceiver>,
}

/// Streams waiting for upstream bytes, oldest first.
#[derive(Default)]
struct PendingQueue {
    streams: VecDeque<PendingStream>,
    closed: bool,
}

impl PendingQueue {
    /// Refuse further streams and hand back the ones still waiting.
    fn seal(&mut self) -> Vec<PendingStream> {
        self.closed = true;
        self.streams.drain(..).collect()
    }
}

type SharedQueue = Arc<Mutex<PendingQueue>>;

/// One established upstream connection.
struct TcpConnection {
    address: String,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: SharedQueue,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl TcpConnection {
    fn start(stream: TcpStream, address: String, lifecycle: Arc<PoolLifecycle>) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        let pending = SharedQueue::default();
        let reader = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            lifecycle,
            address.clone(),
        ));
        Arc::new(Self {
            address,
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Stop reading and reset every pending stream.
    fn terminate(&self, reason: StreamResetReason) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        let drained = self.pending.lock().seal();
        for stream in drained {
            stream.receiver.on_reset(reason);
        }
    }

    /// Queue a stream for inbound bytes. Fails once the connection is gone.
    fn admit(&self, stream: PendingStream) -> bool {
        let mut pending = self.pending.lock();
        if pending.closed {
            return false;
        }
        pending.streams.push_back(stream);
        true
    }
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    pending: SharedQueue,
    lifecycle: Arc<PoolLifecycle>,
    address: String,
) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::debug!(address = %address, "Upstream closed connection");
                break;
            }
            Ok(n) => {
                let data = buf.split().freeze();
                let receiver = pending.lock().streams.front().map(|p| p.receiver.clone());
                match receiver {
                    Some(receiver) => receiver.on_data(data),
                    None => tracing::debug!(address = %address, bytes = n, "Dropping unsolicited upstream data"),
                }
            }
            Err(e) => {
                tracing::warn!(address = %address, error = %e, "Upstream read failed");
                break;
            }
        }
    }

    let drained = pending.lock().seal();
    for stream in drained {
        stream.receiver.on_reset(StreamResetReason::ConnectionTerminated);
    }
    if lifecycle.reset() {
        tracing::info!(address = %address, "Connection lost, pool needs re-initialisation");
    }
}

/// Stream handed out by [`TcpConnPool`].
pub struct TcpUpstreamStream {
    id: u64,
    connection: Arc<TcpConnection>,
    lifecycle: Arc<PoolLifecycle>,
    _request: RequestGuard,
}

#[async_trait]
impl UpstreamStream for TcpUpstreamStream {
    fn id(&self) -> u64 {
        self.id
    }

    async fn send(&self, data: Bytes) -> io::Result<()> {
        let mut writer = self.connection.writer.lock().await;
        writer.write_all(&data).await
    }
}

impl Drop for TcpUpstreamStream {
    fn drop(&mut self) {
        self.connection.pending.lock().streams.retain(|p| p.id != self.id);
        if self.lifecycle.release_stream() {
            tracing::debug!(address = %self.connection.address, "Pool drained, closing connection");
            self.connection.terminate(StreamResetReason::PoolClosed);
        }
    }
}

impl fmt::Debug for TcpUpstreamStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpUpstreamStream")
            .field("id", &self.id)
            .field("address", &self.connection.address)
            .finish()
    }
}

/// Connection pool over a single raw TCP connection.
pub struct TcpConnPool {
    protocol: ProtocolName,
    host: ArcSwap<HostRef>,
    lifecycle: Arc<PoolLifecycle>,
    init_lock: tokio::sync::Mutex<()>,
    connection: ArcSwapOption<TcpConnection>,
    next_stream_id: AtomicU64,
}

impl TcpConnPool {
    /// Build an idle pool; no I/O happens until `check_and_init`.
    pub fn new(host: HostRef) -> Self {
        Self {
            protocol: ProtocolName::new(TCP_PROTOCOL),
            host: ArcSwap::from_pointee(host),
            lifecycle: Arc::new(PoolLifecycle::new()),
            init_lock: tokio::sync::Mutex::new(()),
            connection: ArcSwapOption::empty(),
            next_stream_id: AtomicU64::new(1),
        }
    }

    /// Streams currently open on this pool.
    pub fn active_streams(&self) -> usize {
        self.lifecycle.active_streams()
    }

    fn release_connection(&self, reason: StreamResetReason) {
        if let Some(conn) = self.connection.swap(None) {
            conn.terminate(reason);
        }
    }

    /// Give back a slot taken by `try_acquire_stream` without handing out a stream.
    fn release_unused_slot(&self) {
        if self.lifecycle.release_stream() {
            self.release_connection(StreamResetReason::PoolClosed);
        }
    }

    fn reject(&self, state: PoolState, host: HostRef, listener: &dyn PoolEventListener) {
        let error = UpstreamError::PoolNotReady {
            address: host.address_string().to_string(),
            state,
        };
        tracing::debug!(address = %host.address_string(), state = %state, "Stream rejected");
        listener.on_failure(error, host);
    }
}

#[async_trait]
impl ConnectionPool for TcpConnPool {
    fn protocol(&self) -> &ProtocolName {
        &self.protocol
    }

    fn host(&self) -> HostRef {
        HostRef::clone(&self.host.load())
    }

    fn update_host(&self, host: HostRef) {
        tracing::debug!(
            address = %host.address_string(),
            hostname = %host.hostname(),
            "Pool rebound to new host"
        );
        self.host.store(Arc::new(host));
    }

    fn support_tls(&self) -> bool {
        false
    }

    fn state(&self) -> PoolState {
        self.lifecycle.state()
    }

    async fn check_and_init(&self, timeout: Duration) -> bool {
        match self.lifecycle.state() {
            PoolState::Ready => return true,
            PoolState::Draining | PoolState::Closed => return false,
            PoolState::Uninitialized => {}
        }

        let _guard = self.init_lock.lock().await;
        // Someone else may have finished while we waited.
        match self.lifecycle.state() {
            PoolState::Ready => return true,
            PoolState::Draining | PoolState::Closed => return false,
            PoolState::Uninitialized => {}
        }

        let host = self.host();
        let address = host.address_string().to_string();
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(address.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                tracing::warn!(address = %address, error = %e, "Upstream connect failed");
                host.stats().record_connect_failure();
                return false;
            }
            Err(_) => {
                tracing::warn!(address = %address, timeout_ms = timeout.as_millis() as u64, "Upstream connect timed out");
                host.stats().record_connect_failure();
                return false;
            }
        };
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(address = %address, error = %e, "Failed to set TCP_NODELAY");
        }

        let conn = TcpConnection::start(stream, address.clone(), self.lifecycle.clone());
        if let Some(stale) = self.connection.swap(Some(conn)) {
            stale.terminate(StreamResetReason::ConnectionTerminated);
        }
        if !self.lifecycle.mark_ready() {
            // Shut down while connecting.
            self.release_connection(StreamResetReason::PoolClosed);
            return false;
        }

        host.stats().record_connection();
        tracing::info!(address = %address, "Connection pool ready");
        true
    }

    fn new_stream(&self, receiver: Arc<dyn StreamReceiver>, listener: &dyn PoolEventListener) {
        let host = self.host();
        if let Err(state) = self.lifecycle.try_acquire_stream() {
            self.reject(state, host, listener);
            return;
        }

        let connection = match self.connection.load_full() {
            Some(conn) => conn,
            None => {
                self.release_unused_slot();
                self.reject(PoolState::Uninitialized, host, listener);
                return;
            }
        };

        let id = self.next_stream_id.fetch_add(1, Ordering::Relaxed);
        if !connection.admit(PendingStream { id, receiver }) {
            // Closed or lost after admission; the connection is already gone.
            self.release_unused_slot();
            let state = match self.lifecycle.state() {
                PoolState::Ready => PoolState::Uninitialized,
                state => state,
            };
            self.reject(state, host, listener);
            return;
        }

        let stream = TcpUpstreamStream {
            id,
            connection,
            lifecycle: self.lifecycle.clone(),
            _request: host.stats().start_request(),
        };
        listener.on_ready(Box::new(stream), host);
    }

    fn shutdown(&self) {
        let state = self.lifecycle.shutdown();
        tracing::info!(address = %self.host().address_string(), state = %state, "Connection pool shutting down");
        if state == PoolState::Closed {
            self.release_connection(StreamResetReason::PoolClosed);
        }
    }

    fn close(&self) {
        let previous = self.lifecycle.close();
        if previous != PoolState::Closed {
            tracing::info!(address = %self.host().address_string(), "Connection pool closed");
        }
        self.release_connection(StreamResetReason::PoolClosed);
    }
}

impl fmt::Debug for TcpConnPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnPool")
            .field("address", &self.host().address_string())
            .field("state", &self.lifecycle.state())
            .field("active_streams", &self.lifecycle.active_streams())
            .finish()
    }
}
