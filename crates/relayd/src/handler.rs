//! Per-connection read loop
//!
//! `Accepted -> Registered -> Reading -> (Dispatch | Rejected) -> Reading | Closed`
//!
//! Authentication and decode failures are per-message: the packet is
//! dropped and the connection keeps reading. Transport failures, eviction
//! and shutdown close the connection.

use crate::registry::{ConnectionHandle, Registry};
use crate::relay::{Relay, RelayAction};
use futures::StreamExt;
use sigrelay_net::{Frame, FrameCodec, FrameError};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Read-side settings for a connection
#[derive(Debug, Clone)]
pub struct HandlerSettings {
    pub read_buffer_bytes: usize,
    pub max_frame_bytes: usize,
    pub idle_timeout: Option<Duration>,
}

impl Default for HandlerSettings {
    fn default() -> Self {
        Self {
            read_buffer_bytes: 4096,
            max_frame_bytes: sigrelay_net::framing::DEFAULT_MAX_FRAME_BYTES,
            idle_timeout: None,
        }
    }
}

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed its side
    Eof,
    /// Read or framing failure
    Transport(String),
    /// Reply could not be written
    WriteFailed(String),
    /// Closed by the heartbeat monitor or a newer registration
    Evicted,
    IdleTimeout,
    Shutdown,
}

/// Drive one connection until it closes.
///
/// The handle is registered before the first read and unregistered before
/// the write side is shut down.
pub async fn handle_connection<R>(
    reader: R,
    handle: ConnectionHandle,
    registry: Arc<Registry>,
    relay: Arc<Relay>,
    settings: HandlerSettings,
    shutdown: CancellationToken,
) -> CloseReason
where
    R: AsyncRead + Unpin,
{
    let peer = handle.addr();
    registry.register(handle.clone());
    debug!(peer = %peer, conn_id = handle.id(), "connection registered");

    let codec = FrameCodec::with_max_frame_bytes(settings.max_frame_bytes);
    let mut frames = FramedRead::with_capacity(reader, codec, settings.read_buffer_bytes);

    let reason = loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break CloseReason::Shutdown,
            _ = handle.closed() => break CloseReason::Evicted,
            next = next_frame(&mut frames, settings.idle_timeout) => next,
        };

        let frame = match next {
            Err(_) => break CloseReason::IdleTimeout,
            Ok(None) => break CloseReason::Eof,
            Ok(Some(Err(e))) => break CloseReason::Transport(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        let payload = match frame {
            Frame::Heartbeat => {
                relay.record_heartbeat();
                continue;
            }
            Frame::Packet(payload) => payload,
        };

        match relay.process_packet(peer, &payload) {
            RelayAction::Reply(reply) => {
                // Eviction or shutdown interrupts a stalled write
                let sent = tokio::select! {
                    _ = shutdown.cancelled() => break CloseReason::Shutdown,
                    _ = handle.closed() => break CloseReason::Evicted,
                    sent = handle.send(Frame::packet(&reply)) => sent,
                };
                if let Err(e) = sent {
                    break CloseReason::WriteFailed(e.to_string());
                }
            }
            RelayAction::Drop(_) => {}
        }
    };

    registry.unregister(peer, handle.id());
    handle.shutdown().await;
    info!(peer = %peer, conn_id = handle.id(), reason = ?reason, "connection closed");
    reason
}

type NextFrame = Option<Result<Frame, FrameError>>;

async fn next_frame<R>(
    frames: &mut FramedRead<R, FrameCodec>,
    idle_timeout: Option<Duration>,
) -> Result<NextFrame, tokio::time::error::Elapsed>
where
    R: AsyncRead + Unpin,
{
    match idle_timeout {
        Some(limit) => tokio::time::timeout(limit, frames.next()).await,
        None => Ok(frames.next().await),
    }
}
