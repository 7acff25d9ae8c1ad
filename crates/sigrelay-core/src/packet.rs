//! Packet model (the only domain entity carried over a relay connection)

use crate::error::DecodeError;
use crate::wire;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Source identifier the relay puts on its acknowledgements.
pub const SERVER_SRC: &str = "server";
/// Body of every acknowledgement.
pub const ACK_BODY: &[u8] = b"done";

/// Known packet type tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum PacketKind {
    /// Application data
    Data = 0,
    /// Acknowledgement of a data packet
    Ack = 1,
    /// Heartbeat probe
    Heartbeat = 2,
}

impl TryFrom<u32> for PacketKind {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Data),
            1 => Ok(Self::Ack),
            2 => Ok(Self::Heartbeat),
            other => Err(other),
        }
    }
}

/// Whether a packet carries signature material
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureState {
    /// Neither `sig` nor `pk`
    Unsigned,
    /// Both `sig` and `pk`
    Signed,
    /// Exactly one of them; malformed
    Partial,
}

/// A relay packet.
///
/// Field order here matches wire field numbers 1..=10. `fee`, `ttl` and
/// `scar` are carried untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Packet {
    /// Raw type tag; see [`PacketKind`]
    #[serde(rename = "type")]
    pub kind: u32,
    /// Correlation identifier
    pub id: String,
    pub src: String,
    pub dst: String,
    pub body: Vec<u8>,
    pub fee: u64,
    pub ttl: u64,
    pub scar: Vec<u8>,
    /// Detached ed25519 signature over [`Packet::signable_bytes`]
    pub sig: Vec<u8>,
    /// Signer's ed25519 public key
    pub pk: Vec<u8>,
}

impl Packet {
    /// Create an unsigned data packet
    pub fn data(
        id: impl Into<String>,
        src: impl Into<String>,
        dst: impl Into<String>,
        body: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind: PacketKind::Data as u32,
            id: id.into(),
            src: src.into(),
            dst: dst.into(),
            body: body.into(),
            ..Default::default()
        }
    }

    /// Build the acknowledgement for a request.
    pub fn ack(request: &Packet) -> Self {
        Self {
            kind: PacketKind::Ack as u32,
            id: request.id.clone(),
            src: SERVER_SRC.to_string(),
            body: ACK_BODY.to_vec(),
            ..Default::default()
        }
    }

    /// Known type tag, if any
    pub fn packet_kind(&self) -> Option<PacketKind> {
        PacketKind::try_from(self.kind).ok()
    }

    pub fn signature_state(&self) -> SignatureState {
        match (self.sig.is_empty(), self.pk.is_empty()) {
            (true, true) => SignatureState::Unsigned,
            (false, false) => SignatureState::Signed,
            _ => SignatureState::Partial,
        }
    }

    /// True iff both `sig` and `pk` are present
    pub fn is_signed(&self) -> bool {
        self.signature_state() == SignatureState::Signed
    }

    /// Copy of this packet with `sig` and `pk` cleared
    pub fn unsigned(&self) -> Self {
        Self {
            sig: Vec::new(),
            pk: Vec::new(),
            ..self.clone()
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        wire::encode(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        wire::decode(bytes)
    }

    /// The exact bytes covered by `sig`.
    pub fn signable_bytes(&self) -> Vec<u8> {
        wire::signable_bytes(self)
    }

    /// Body for log output
    pub fn body_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_state() {
        let mut packet = Packet::data("1", "a", "b", "x");
        assert_eq!(packet.signature_state(), SignatureState::Unsigned);

        packet.sig = vec![1; 64];
        assert_eq!(packet.signature_state(), SignatureState::Partial);
        assert!(!packet.is_signed());

        packet.pk = vec![2; 32];
        assert_eq!(packet.signature_state(), SignatureState::Signed);

        packet.sig.clear();
        assert_eq!(packet.signature_state(), SignatureState::Partial);
    }

    #[test]
    fn test_ack_fields() {
        let mut request = Packet::data("abc", "peer1", "server", "hello");
        request.fee = 7;
        request.sig = vec![1; 64];
        request.pk = vec![2; 32];

        let ack = Packet::ack(&request);
        assert_eq!(ack.id, "abc");
        assert_eq!(ack.packet_kind(), Some(PacketKind::Ack));
        assert_eq!(ack.src, "server");
        assert_eq!(ack.body, b"done");
        assert!(ack.dst.is_empty());
        assert_eq!(ack.fee, 0);
        assert_eq!(ack.signature_state(), SignatureState::Unsigned);
    }

    #[test]
    fn test_unknown_kind_preserved() {
        let packet = Packet {
            kind: 77,
            ..Default::default()
        };
        assert_eq!(packet.packet_kind(), None);
        assert_eq!(PacketKind::try_from(77), Err(77));
    }

    #[test]
    fn test_unsigned_clears_only_signature() {
        let mut packet = Packet::data("1", "a", "b", "x");
        packet.scar = vec![9];
        packet.sig = vec![1; 64];
        packet.pk = vec![2; 32];

        let cleared = packet.unsigned();
        assert!(cleared.sig.is_empty());
        assert!(cleared.pk.is_empty());
        assert_eq!(cleared.scar, vec![9]);
        assert_eq!(cleared.body, packet.body);
    }

    #[test]
    fn test_json_uses_type_key() {
        let packet = Packet::data("1", "a", "b", "x");
        let json = serde_json::to_value(&packet).unwrap();
        assert_eq!(json["type"], 0);
        assert!(json.get("kind").is_none());
    }
}
