//! Message framing for the relay transport
//!
//! TCP has no message boundaries, so each encoded packet is length-prefixed.
//! Heartbeat probes travel outside that envelope as a single raw byte.
//!
//! Wire format:
//! - Packet: 4 bytes length (big-endian) + N bytes encoded packet. N may
//!   be zero; that is the encoding of the default packet.
//! - Heartbeat: the single byte `0x02`
//!
//! Frame lengths are capped below `0x0100_0000`, so the first byte of a
//! valid length prefix is always `0x00`. A `0x02` at a frame boundary is
//! therefore always a heartbeat.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sigrelay_core::{Packet, PacketKind};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Raw heartbeat probe byte
pub const HEARTBEAT_BYTE: u8 = PacketKind::Heartbeat as u8;

/// Default maximum frame size (1 MiB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Hard cap on frame size; keeps the prefix's high byte at zero
pub const ABSOLUTE_MAX_FRAME_BYTES: usize = 0x00FF_FFFF;

const LENGTH_PREFIX_BYTES: usize = 4;

/// Framing errors
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame too large: {0} bytes (max {1})")]
    TooLarge(usize, usize),
    #[error("Invalid frame prefix byte 0x{0:02x}")]
    BadPrefix(u8),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A framed message
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Liveness probe, no payload
    Heartbeat,
    /// One encoded packet
    Packet(Bytes),
}

impl Frame {
    /// Frame an encoded packet
    pub fn packet(packet: &Packet) -> Self {
        Self::Packet(Bytes::from(packet.encode()))
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat)
    }
}

/// Codec for length-prefixed packets and heartbeat bytes
#[derive(Clone, Debug)]
pub struct FrameCodec {
    max_frame_bytes: usize,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Create codec with a custom frame limit (capped at [`ABSOLUTE_MAX_FRAME_BYTES`])
    pub fn with_max_frame_bytes(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes: max_frame_bytes.min(ABSOLUTE_MAX_FRAME_BYTES),
        }
    }

    pub fn max_frame_bytes(&self) -> usize {
        self.max_frame_bytes
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(&first) = src.first() else {
            return Ok(None);
        };

        if first == HEARTBEAT_BYTE {
            src.advance(1);
            return Ok(Some(Frame::Heartbeat));
        }
        if first != 0 {
            return Err(FrameError::BadPrefix(first));
        }

        if src.len() < LENGTH_PREFIX_BYTES {
            return Ok(None);
        }

        // Peek at length
        let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

        if length > self.max_frame_bytes {
            return Err(FrameError::TooLarge(length, self.max_frame_bytes));
        }

        // Need full frame
        let total = LENGTH_PREFIX_BYTES + length;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(LENGTH_PREFIX_BYTES);
        let payload = src.split_to(length).freeze();

        Ok(Some(Frame::Packet(payload)))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            Frame::Heartbeat => dst.put_u8(HEARTBEAT_BYTE),
            Frame::Packet(payload) => {
                if payload.len() > self.max_frame_bytes {
                    return Err(FrameError::TooLarge(payload.len(), self.max_frame_bytes));
                }
                dst.reserve(LENGTH_PREFIX_BYTES + payload.len());
                dst.put_u32(payload.len() as u32);
                dst.put_slice(&payload);
            }
        }
        Ok(())
    }
}
