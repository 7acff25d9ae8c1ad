//! Networking primitives for the SigRelay protocol
//!
//! This crate provides:
//! - Length-prefixed packet framing with out-of-band heartbeat probes
//! - An async client that speaks the relay protocol

pub mod client;
pub mod framing;

pub use client::{ClientError, RelayClient};
pub use framing::{Frame, FrameCodec, FrameError, HEARTBEAT_BYTE};
