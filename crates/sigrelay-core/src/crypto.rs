//! Packet signatures (ed25519)
//!
//! Signatures always cover [`Packet::signable_bytes`], the canonical
//! encoding with `sig` and `pk` cleared. Key material is length-checked
//! before any curve operation so malformed input is reported separately
//! from a failed verification.

use crate::error::{AuthError, Error, Result};
use crate::packet::{Packet, SignatureState};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;

pub const PUBLIC_KEY_LENGTH: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;
pub const SIGNATURE_LENGTH: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// Authenticate a packet against the public key it carries.
pub fn authenticate(packet: &Packet) -> std::result::Result<(), AuthError> {
    match packet.signature_state() {
        SignatureState::Unsigned => return Err(AuthError::Unsigned),
        SignatureState::Partial => {
            return Err(AuthError::PartiallySigned {
                has_sig: !packet.sig.is_empty(),
                has_pk: !packet.pk.is_empty(),
            })
        }
        SignatureState::Signed => {}
    }

    let public_key: &[u8; PUBLIC_KEY_LENGTH] =
        packet
            .pk
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedPublicKey {
                len: packet.pk.len(),
            })?;
    let signature: &[u8; SIGNATURE_LENGTH] =
        packet
            .sig
            .as_slice()
            .try_into()
            .map_err(|_| AuthError::MalformedSignature {
                len: packet.sig.len(),
            })?;

    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|_| AuthError::InvalidPublicKey)?;
    let signature = Signature::from_bytes(signature);

    verifying_key
        .verify(&packet.signable_bytes(), &signature)
        .map_err(|_| AuthError::InvalidSignature)
}

/// True only if the packet carries a valid signature by its own `pk`.
pub fn verify(packet: &Packet) -> bool {
    authenticate(packet).is_ok()
}

/// Sign the signable form of a packet.
pub fn sign(packet: &Packet, signing_key: &SigningKey) -> [u8; SIGNATURE_LENGTH] {
    signing_key.sign(&packet.signable_bytes()).to_bytes()
}

/// Ed25519 keypair for packet signing
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Create from seed bytes (for deterministic testing)
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create from a 64-character hex seed
    pub fn from_hex_seed(seed_hex: &str) -> Result<Self> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|e| Error::InvalidSeed(e.to_string()))?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidSeed(format!("expected 32 bytes, got {}", bytes.len())))?;
        Ok(Self::from_seed(&seed))
    }

    /// Get the public key bytes
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        self.signing_key.sign(message).to_bytes()
    }

    /// Return a copy of `packet` carrying this key's `pk` and a fresh `sig`.
    pub fn sign_packet(&self, packet: &Packet) -> Packet {
        let mut signed = packet.unsigned();
        signed.sig = sign(&signed, &self.signing_key).to_vec();
        signed.pk = self.public_key().to_vec();
        signed
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &hex::encode(self.public_key()))
            .finish_non_exhaustive()
    }
}
