//! Packet dispatch: decode, authenticate, acknowledge

use parking_lot::RwLock;
use sigrelay_core::{authenticate, AuthError, AuthErrorKind, DecodeError, KeyPair, Packet};
use std::net::SocketAddr;
use tracing::{info, warn};

/// Why an inbound packet was dropped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    Decode(DecodeError),
    Auth(AuthError),
}

/// Result of processing one inbound packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Write this packet back on the same connection
    Reply(Packet),
    /// Drop silently; the connection stays open
    Drop(Rejection),
}

/// Relay statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub packets_received: u64,
    pub packets_dispatched: u64,
    pub decode_errors: u64,
    pub rejected_unsigned: u64,
    pub rejected_malformed: u64,
    pub rejected_invalid: u64,
    pub heartbeats_received: u64,
}

impl RelayStats {
    pub fn rejected_total(&self) -> u64 {
        self.rejected_unsigned + self.rejected_malformed + self.rejected_invalid
    }
}

/// Per-packet handler shared by all connections
pub struct Relay {
    /// Signs acknowledgements when present
    identity: Option<KeyPair>,
    stats: RwLock<RelayStats>,
}

impl Relay {
    pub fn new(identity: Option<KeyPair>) -> Self {
        Self {
            identity,
            stats: RwLock::new(RelayStats::default()),
        }
    }

    /// Process one encoded packet received from `peer`
    pub fn process_packet(&self, peer: SocketAddr, payload: &[u8]) -> RelayAction {
        self.stats.write().packets_received += 1;

        let packet = match Packet::decode(payload) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(peer = %peer, len = payload.len(), error = %e, "dropping undecodable packet");
                self.stats.write().decode_errors += 1;
                return RelayAction::Drop(Rejection::Decode(e));
            }
        };

        if let Err(e) = authenticate(&packet) {
            self.record_rejection(peer, &packet, &e);
            return RelayAction::Drop(Rejection::Auth(e));
        }

        info!(
            peer = %peer,
            src = %packet.src,
            packet_type = packet.kind,
            body = %packet.body_lossy(),
            dst = %packet.dst,
            "dispatching verified packet"
        );
        self.stats.write().packets_dispatched += 1;

        RelayAction::Reply(self.acknowledge(&packet))
    }

    fn record_rejection(&self, peer: SocketAddr, packet: &Packet, error: &AuthError) {
        let kind = error.kind();
        match kind {
            AuthErrorKind::Unsigned => {
                warn!(peer = %peer, src = %packet.src, id = %packet.id, "rejected unsigned packet")
            }
            AuthErrorKind::Malformed => warn!(
                peer = %peer,
                src = %packet.src,
                id = %packet.id,
                reason = %error,
                "rejected packet with malformed key material"
            ),
            AuthErrorKind::Cryptographic => warn!(
                peer = %peer,
                src = %packet.src,
                id = %packet.id,
                pk = %hex::encode(&packet.pk),
                "rejected packet with invalid signature"
            ),
        }

        let mut stats = self.stats.write();
        match kind {
            AuthErrorKind::Unsigned => stats.rejected_unsigned += 1,
            AuthErrorKind::Malformed => stats.rejected_malformed += 1,
            AuthErrorKind::Cryptographic => stats.rejected_invalid += 1,
        }
    }

    fn acknowledge(&self, request: &Packet) -> Packet {
        let ack = Packet::ack(request);
        match &self.identity {
            Some(identity) => identity.sign_packet(&ack),
            None => ack,
        }
    }

    /// Count a heartbeat byte sent by a peer
    pub fn record_heartbeat(&self) {
        self.stats.write().heartbeats_received += 1;
    }

    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.identity.as_ref().map(KeyPair::public_key)
    }

    /// Get relay statistics
    pub fn stats(&self) -> RelayStats {
        self.stats.read().clone()
    }
}
