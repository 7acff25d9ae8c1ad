//! Error types for SigRelay

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// SigRelay error types
#[derive(Debug, Error)]
pub enum Error {
    /// Packet bytes could not be decoded
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Packet failed authentication
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Signing key seed was not 32 hex-encoded bytes
    #[error("invalid key seed: {0}")]
    InvalidSeed(String),
}

/// Wire decoding errors.
///
/// Every malformed input maps to one of these; decoding never panics and
/// never substitutes a zero-valued packet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message truncated")]
    Truncated,

    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    #[error("invalid field number {0}")]
    InvalidFieldNumber(u64),

    #[error("unsupported wire type {0}")]
    InvalidWireType(u8),

    #[error("field {field} has wire type {found}, expected {expected}")]
    WireTypeMismatch { field: u32, expected: u8, found: u8 },

    #[error("field {0} is not valid UTF-8")]
    InvalidUtf8(&'static str),

    #[error("field {0} value out of range")]
    ValueOutOfRange(&'static str),
}

/// Packet authentication failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Neither `sig` nor `pk` is present
    #[error("packet is unsigned")]
    Unsigned,

    /// Exactly one of `sig` / `pk` is present
    #[error("packet is partially signed (sig: {has_sig}, pk: {has_pk})")]
    PartiallySigned { has_sig: bool, has_pk: bool },

    #[error("public key is {len} bytes, expected 32")]
    MalformedPublicKey { len: usize },

    #[error("signature is {len} bytes, expected 64")]
    MalformedSignature { len: usize },

    /// Right length, but not a point on the curve
    #[error("public key is not a valid ed25519 point")]
    InvalidPublicKey,

    /// Well-formed key material, signature does not verify
    #[error("signature verification failed")]
    InvalidSignature,
}

/// Audit category of an [`AuthError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    Unsigned,
    Malformed,
    Cryptographic,
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Unsigned => AuthErrorKind::Unsigned,
            Self::PartiallySigned { .. }
            | Self::MalformedPublicKey { .. }
            | Self::MalformedSignature { .. }
            | Self::InvalidPublicKey => AuthErrorKind::Malformed,
            Self::InvalidSignature => AuthErrorKind::Cryptographic,
        }
    }
}

impl std::fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unsigned => "unsigned",
            Self::Malformed => "malformed-key-material",
            Self::Cryptographic => "invalid-signature",
        };
        f.write_str(s)
    }
}
