//! SigRelay Core Library
//!
//! This crate provides the packet model, its canonical wire encoding, and
//! the signature engine used to authenticate packets.
//!
//! # Modules
//!
//! - [`packet`]: The `Packet` type and its signature state
//! - [`wire`]: Canonical tagged binary encoding and the signable form
//! - [`crypto`]: Packet signing and verification (ed25519)
//! - [`error`]: Error types

pub mod crypto;
pub mod error;
pub mod packet;
pub mod wire;

#[cfg(test)]
mod test_vectors;

pub use crypto::{authenticate, sign, verify, KeyPair, PUBLIC_KEY_LENGTH, SIGNATURE_LENGTH};
pub use error::{AuthError, AuthErrorKind, DecodeError, Error, Result};
pub use packet::{Packet, PacketKind, SignatureState};
