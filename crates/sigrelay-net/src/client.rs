//! Relay client
//!
//! A conformant peer: sends (usually signed) packets and reads the relay's
//! acknowledgements, transparently skipping heartbeat probes.

use crate::framing::{Frame, FrameCodec, FrameError};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use sigrelay_core::{DecodeError, Packet};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio_util::codec::Framed;
use tracing::trace;

/// Client errors
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Timed out waiting for reply")]
    Timeout,
}

/// Connection to a relay
pub struct RelayClient {
    framed: Framed<TcpStream, FrameCodec>,
    peer_addr: SocketAddr,
    heartbeats_seen: u64,
}

impl RelayClient {
    /// Connect to a relay
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr()?;
        Ok(Self {
            framed: Framed::new(stream, FrameCodec::new()),
            peer_addr,
            heartbeats_seen: 0,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.framed.get_ref().local_addr()?)
    }

    /// Heartbeat probes received so far
    pub fn heartbeats_seen(&self) -> u64 {
        self.heartbeats_seen
    }

    /// Send a packet
    pub async fn send(&mut self, packet: &Packet) -> Result<(), ClientError> {
        self.framed.send(Frame::packet(packet)).await?;
        Ok(())
    }

    /// Send an arbitrary payload inside a packet frame
    pub async fn send_raw(&mut self, payload: impl Into<Bytes>) -> Result<(), ClientError> {
        self.framed.send(Frame::Packet(payload.into())).await?;
        Ok(())
    }

    pub async fn send_heartbeat(&mut self) -> Result<(), ClientError> {
        self.framed.send(Frame::Heartbeat).await?;
        Ok(())
    }

    /// Receive the next packet, skipping heartbeats
    pub async fn recv(&mut self) -> Result<Packet, ClientError> {
        loop {
            match self.framed.next().await {
                None => return Err(ClientError::ConnectionClosed),
                Some(Err(e)) => return Err(e.into()),
                Some(Ok(Frame::Heartbeat)) => {
                    self.heartbeats_seen += 1;
                    trace!("heartbeat from {}", self.peer_addr);
                }
                Some(Ok(Frame::Packet(bytes))) => return Ok(Packet::decode(&bytes)?),
            }
        }
    }

    /// Receive with a deadline
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Packet, ClientError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Send a packet and wait for one reply
    pub async fn request(
        &mut self,
        packet: &Packet,
        timeout: Duration,
    ) -> Result<Packet, ClientError> {
        self.send(packet).await?;
        self.recv_timeout(timeout).await
    }
}
