//! Connection registry
//!
//! Maps peer transport address to the live connection handle. Handlers
//! register on accept and unregister on teardown; the heartbeat monitor
//! snapshots it and evicts unresponsive peers. The map lock is only held
//! for the mutation or copy itself, never across I/O.

use futures::SinkExt;
use parking_lot::RwLock;
use sigrelay_net::{Frame, FrameCodec, FrameError};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Write half of a connection, type-erased
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connection-level write errors
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Connection closed")]
    Closed,
    #[error("Write timed out after {0:?}")]
    Timeout(Duration),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

struct ConnectionInner {
    id: u64,
    addr: SocketAddr,
    connected_at: Instant,
    writer: Mutex<FramedWrite<BoxedWriter, FrameCodec>>,
    closed: CancellationToken,
}

/// Shared handle to one live connection
#[derive(Clone)]
pub struct ConnectionHandle {
    inner: Arc<ConnectionInner>,
}

impl ConnectionHandle {
    pub fn new(id: u64, addr: SocketAddr, writer: BoxedWriter, codec: FrameCodec) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                id,
                addr,
                connected_at: Instant::now(),
                writer: Mutex::new(FramedWrite::new(writer, codec)),
                closed: CancellationToken::new(),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.inner.addr
    }

    pub fn connected_at(&self) -> Instant {
        self.inner.connected_at
    }

    /// Write one frame
    pub async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::Closed);
        }
        let mut writer = self.inner.writer.lock().await;
        writer.send(frame).await?;
        Ok(())
    }

    /// Write a heartbeat probe under a deadline
    pub async fn probe(&self, deadline: Duration) -> Result<(), ConnectionError> {
        tokio::time::timeout(deadline, self.send(Frame::Heartbeat))
            .await
            .map_err(|_| ConnectionError::Timeout(deadline))?
    }

    /// Mark closed; the owning handler stops reading
    pub fn close(&self) {
        self.inner.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// Resolves once [`close`](Self::close) has been called
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.inner.closed.cancelled()
    }

    /// Close and shut down the write side
    pub async fn shutdown(&self) {
        self.close();
        let mut writer = self.inner.writer.lock().await;
        let _ = writer.get_mut().shutdown().await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.inner.id)
            .field("addr", &self.inner.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Registry of live connections
#[derive(Default)]
pub struct Registry {
    connections: RwLock<HashMap<SocketAddr, ConnectionHandle>>,
    next_id: AtomicU64,
    registered_total: AtomicU64,
    evicted_total: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a connection id
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Register a connection under its address.
    ///
    /// A stale entry for the same address is replaced and closed.
    pub fn register(&self, handle: ConnectionHandle) {
        let stale = self.connections.write().insert(handle.addr(), handle);
        self.registered_total.fetch_add(1, Ordering::Relaxed);
        if let Some(stale) = stale {
            stale.close();
        }
    }

    /// Remove `addr` if it still belongs to connection `id`
    pub fn unregister(&self, addr: SocketAddr, id: u64) -> bool {
        self.remove_if_current(addr, id).is_some()
    }

    /// Remove and close an unresponsive connection
    pub fn evict(&self, addr: SocketAddr, id: u64) -> bool {
        match self.remove_if_current(addr, id) {
            Some(handle) => {
                handle.close();
                self.evicted_total.fetch_add(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    fn remove_if_current(&self, addr: SocketAddr, id: u64) -> Option<ConnectionHandle> {
        let mut connections = self.connections.write();
        match connections.get(&addr) {
            Some(handle) if handle.id() == id => connections.remove(&addr),
            _ => None,
        }
    }

    /// Copy of all live handles
    pub fn snapshot(&self) -> Vec<ConnectionHandle> {
        self.connections.read().values().cloned().collect()
    }

    /// Close every connection and empty the registry
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.connections.write().drain().map(|(_, h)| h).collect();
        for handle in &drained {
            handle.close();
        }
        drained.len()
    }

    pub fn get(&self, addr: &SocketAddr) -> Option<ConnectionHandle> {
        self.connections.read().get(addr).cloned()
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.connections.read().contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.read().is_empty()
    }

    pub fn registered_total(&self) -> u64 {
        self.registered_total.load(Ordering::Relaxed)
    }

    pub fn evicted_total(&self) -> u64 {
        self.evicted_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    pub(crate) fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    /// Handle backed by an in-memory pipe; returns the peer end
    pub(crate) fn pipe_handle(registry: &Registry, port: u16) -> (ConnectionHandle, DuplexStream) {
        let (ours, theirs) = duplex(1024);
        let handle = ConnectionHandle::new(
            registry.next_id(),
            addr(port),
            Box::new(ours),
            FrameCodec::new(),
        );
        (handle, theirs)
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = Registry::new();
        let (handle, _peer) = pipe_handle(&registry, 1000);

        registry.register(handle.clone());
        assert!(registry.contains(&addr(1000)));
        assert_eq!(registry.len(), 1);

        assert!(registry.unregister(addr(1000), handle.id()));
        assert!(registry.is_empty());
        assert!(!registry.unregister(addr(1000), handle.id()));
        assert_eq!(registry.registered_total(), 1);
    }

    #[tokio::test]
    async fn test_stale_unregister_keeps_new_connection() {
        let registry = Registry::new();
        let (old, _p1) = pipe_handle(&registry, 2000);
        let (new, _p2) = pipe_handle(&registry, 2000);

        registry.register(old.clone());
        registry.register(new.clone());
        assert!(old.is_closed());
        assert!(!new.is_closed());

        // The old handler tearing down must not remove the new entry
        assert!(!registry.unregister(addr(2000), old.id()));
        assert_eq!(registry.get(&addr(2000)).unwrap().id(), new.id());
    }

    #[tokio::test]
    async fn test_evict_closes_handle() {
        let registry = Registry::new();
        let (handle, _peer) = pipe_handle(&registry, 3000);
        registry.register(handle.clone());

        assert!(registry.evict(addr(3000), handle.id()));
        assert!(handle.is_closed());
        assert!(!registry.contains(&addr(3000)));
        assert_eq!(registry.evicted_total(), 1);

        // closed() resolves immediately once closed
        handle.closed().await;
        assert!(matches!(
            handle.send(Frame::Heartbeat).await,
            Err(ConnectionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_snapshot_is_detached() {
        let registry = Registry::new();
        let mut peers = Vec::new();
        for port in 0..4 {
            let (handle, peer) = pipe_handle(&registry, 4000 + port);
            registry.register(handle);
            peers.push(peer);
        }

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 4);

        // Mutating while iterating the copy is safe
        for handle in &snapshot {
            registry.unregister(handle.addr(), handle.id());
        }
        assert!(registry.is_empty());
        assert_eq!(snapshot.len(), 4);
    }

    #[tokio::test]
    async fn test_probe_writes_heartbeat_byte() {
        let registry = Registry::new();
        let (handle, mut peer) = pipe_handle(&registry, 5000);

        handle.probe(Duration::from_secs(1)).await.unwrap();
        let mut byte = [0u8; 1];
        peer.read_exact(&mut byte).await.unwrap();
        assert_eq!(byte, [0x02]);
    }

    #[tokio::test]
    async fn test_probe_fails_when_peer_gone() {
        let registry = Registry::new();
        let (handle, peer) = pipe_handle(&registry, 6000);
        drop(peer);
        assert!(matches!(
            handle.probe(Duration::from_secs(1)).await,
            Err(ConnectionError::Frame(FrameError::Io(_)))
        ));
    }

    #[tokio::test]
    async fn test_close_all() {
        let registry = Registry::new();
        let (a, _pa) = pipe_handle(&registry, 7000);
        let (b, _pb) = pipe_handle(&registry, 7001);
        registry.register(a.clone());
        registry.register(b.clone());

        assert_eq!(registry.close_all(), 2);
        assert!(registry.is_empty());
        assert!(a.is_closed() && b.is_closed());
    }
}
