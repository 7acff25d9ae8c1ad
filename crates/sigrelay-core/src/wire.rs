//! Canonical wire encoding for packets
//!
//! Packets use a tag-based binary encoding compatible with Protocol Buffers
//! (proto3 scalar semantics):
//! - Each field is `key = (field_number << 3) | wire_type` as a varint,
//!   followed by the value
//! - Fields are always written in ascending field-number order
//! - Zero / empty values are omitted
//! - Unknown field numbers are skipped on decode
//!
//! The signable form is the same encoding with `sig` and `pk` cleared, so
//! signer and verifier agree byte-for-byte.

use crate::error::DecodeError;
use crate::packet::Packet;

/// Stable field numbers
pub mod field {
    pub const TYPE: u32 = 1;
    pub const ID: u32 = 2;
    pub const SRC: u32 = 3;
    pub const DST: u32 = 4;
    pub const BODY: u32 = 5;
    pub const FEE: u32 = 6;
    pub const TTL: u32 = 7;
    pub const SCAR: u32 = 8;
    pub const SIG: u32 = 9;
    pub const PK: u32 = 10;
}

pub const WIRE_VARINT: u8 = 0;
pub const WIRE_FIXED64: u8 = 1;
pub const WIRE_LEN: u8 = 2;
pub const WIRE_FIXED32: u8 = 5;

/// Largest field number protobuf allows
const MAX_FIELD_NUMBER: u64 = (1 << 29) - 1;
const MAX_VARINT_LEN: usize = 10;

/// Encode a packet to canonical bytes.
pub fn encode(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len_hint(packet));
    encode_fields(packet, true, &mut buf);
    buf
}

/// Encode the signable form (`sig` and `pk` cleared).
///
/// Cleared fields are omitted by the encoding, so this equals
/// `encode(&packet.unsigned())` without the clone.
pub fn signable_bytes(packet: &Packet) -> Vec<u8> {
    let mut buf = Vec::with_capacity(encoded_len_hint(packet));
    encode_fields(packet, false, &mut buf);
    buf
}

fn encode_fields(packet: &Packet, with_signature: bool, buf: &mut Vec<u8>) {
    put_uint(buf, field::TYPE, u64::from(packet.kind));
    put_bytes(buf, field::ID, packet.id.as_bytes());
    put_bytes(buf, field::SRC, packet.src.as_bytes());
    put_bytes(buf, field::DST, packet.dst.as_bytes());
    put_bytes(buf, field::BODY, &packet.body);
    put_uint(buf, field::FEE, packet.fee);
    put_uint(buf, field::TTL, packet.ttl);
    put_bytes(buf, field::SCAR, &packet.scar);
    if with_signature {
        put_bytes(buf, field::SIG, &packet.sig);
        put_bytes(buf, field::PK, &packet.pk);
    }
}

fn encoded_len_hint(packet: &Packet) -> usize {
    // 2 bytes of key + length per field is enough for typical packets
    10 * 2
        + 3 * MAX_VARINT_LEN
        + packet.id.len()
        + packet.src.len()
        + packet.dst.len()
        + packet.body.len()
        + packet.scar.len()
        + packet.sig.len()
        + packet.pk.len()
}

pub fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

fn put_key(buf: &mut Vec<u8>, field_number: u32, wire_type: u8) {
    put_varint(buf, (u64::from(field_number) << 3) | u64::from(wire_type));
}

fn put_uint(buf: &mut Vec<u8>, field_number: u32, value: u64) {
    if value != 0 {
        put_key(buf, field_number, WIRE_VARINT);
        put_varint(buf, value);
    }
}

fn put_bytes(buf: &mut Vec<u8>, field_number: u32, value: &[u8]) {
    if !value.is_empty() {
        put_key(buf, field_number, WIRE_LEN);
        put_varint(buf, value.len() as u64);
        buf.extend_from_slice(value);
    }
}

/// Decode a packet from canonical bytes.
///
/// When a field appears more than once the last occurrence wins. Empty
/// input is the encoding of the default packet.
pub fn decode(bytes: &[u8]) -> Result<Packet, DecodeError> {
    let mut reader = Reader::new(bytes);
    let mut packet = Packet::default();

    while !reader.is_empty() {
        let key = reader.varint()?;
        let field_number = key >> 3;
        let wire_type = (key & 0x7) as u8;

        if field_number == 0 || field_number > MAX_FIELD_NUMBER {
            return Err(DecodeError::InvalidFieldNumber(field_number));
        }
        let field_number = field_number as u32;

        match field_number {
            field::TYPE => {
                expect_wire(field_number, WIRE_VARINT, wire_type)?;
                packet.kind = u32::try_from(reader.varint()?)
                    .map_err(|_| DecodeError::ValueOutOfRange("type"))?;
            }
            field::ID => packet.id = reader.string(field_number, wire_type, "id")?,
            field::SRC => packet.src = reader.string(field_number, wire_type, "src")?,
            field::DST => packet.dst = reader.string(field_number, wire_type, "dst")?,
            field::BODY => packet.body = reader.bytes(field_number, wire_type)?,
            field::FEE => {
                expect_wire(field_number, WIRE_VARINT, wire_type)?;
                packet.fee = reader.varint()?;
            }
            field::TTL => {
                expect_wire(field_number, WIRE_VARINT, wire_type)?;
                packet.ttl = reader.varint()?;
            }
            field::SCAR => packet.scar = reader.bytes(field_number, wire_type)?,
            field::SIG => packet.sig = reader.bytes(field_number, wire_type)?,
            field::PK => packet.pk = reader.bytes(field_number, wire_type)?,
            _ => reader.skip(wire_type)?,
        }
    }

    Ok(packet)
}

fn expect_wire(field: u32, expected: u8, found: u8) -> Result<(), DecodeError> {
    if expected != found {
        return Err(DecodeError::WireTypeMismatch {
            field,
            expected,
            found,
        });
    }
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = *self.buf.get(self.pos).ok_or(DecodeError::Truncated)?;
            self.pos += 1;
            // The tenth byte carries only bit 63
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(DecodeError::VarintOverflow);
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(DecodeError::VarintOverflow)
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or(DecodeError::Truncated)?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn len_delimited(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = usize::try_from(self.varint()?).map_err(|_| DecodeError::Truncated)?;
        self.take(len)
    }

    fn bytes(&mut self, field: u32, wire_type: u8) -> Result<Vec<u8>, DecodeError> {
        expect_wire(field, WIRE_LEN, wire_type)?;
        Ok(self.len_delimited()?.to_vec())
    }

    fn string(
        &mut self,
        field: u32,
        wire_type: u8,
        name: &'static str,
    ) -> Result<String, DecodeError> {
        expect_wire(field, WIRE_LEN, wire_type)?;
        let raw = self.len_delimited()?;
        std::str::from_utf8(raw)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8(name))
    }

    /// Skip an unknown field's value
    fn skip(&mut self, wire_type: u8) -> Result<(), DecodeError> {
        match wire_type {
            WIRE_VARINT => self.varint().map(drop),
            WIRE_FIXED64 => self.take(8).map(drop),
            WIRE_LEN => self.len_delimited().map(drop),
            WIRE_FIXED32 => self.take(4).map(drop),
            other => Err(DecodeError::InvalidWireType(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_packet() -> Packet {
        Packet {
            kind: 0,
            id: "abc".into(),
            src: "peer1".into(),
            dst: "server".into(),
            body: b"hello".to_vec(),
            fee: 300,
            ttl: u64::MAX,
            scar: vec![0, 1, 2],
            sig: vec![7; 64],
            pk: vec![8; 32],
        }
    }

    #[test]
    fn test_roundtrip_full_and_default_fields() {
        let packet = full_packet();
        assert_eq!(decode(&encode(&packet)).unwrap(), packet);

        let sparse = Packet {
            kind: 2,
            ..Default::default()
        };
        assert_eq!(decode(&encode(&sparse)).unwrap(), sparse);
    }

    #[test]
    fn test_known_encoding() {
        let packet = Packet::data("abc", "peer1", "server", "hello");
        let expected = hex::decode("12036162631a05706565723122067365727665722a0568656c6c6f").unwrap();
        assert_eq!(encode(&packet), expected);

        let ack = Packet::ack(&packet);
        let expected = hex::decode("080112036162631a067365727665722a04646f6e65").unwrap();
        assert_eq!(encode(&ack), expected);
    }

    #[test]
    fn test_varint_multibyte() {
        let mut buf = Vec::new();
        put_varint(&mut buf, 300);
        assert_eq!(buf, vec![0xac, 0x02]);

        buf.clear();
        put_varint(&mut buf, u64::MAX);
        assert_eq!(buf.len(), 10);
    }

    #[test]
    fn test_signable_bytes_excludes_signature() {
        let packet = full_packet();
        let signable = signable_bytes(&packet);
        assert_eq!(signable, encode(&packet.unsigned()));
        assert_ne!(signable, encode(&packet));

        // Independent of the signature contents
        let mut resigned = packet.clone();
        resigned.sig = vec![1; 64];
        resigned.pk = vec![2; 32];
        assert_eq!(signable_bytes(&resigned), signable);
    }

    #[test]
    fn test_field_order_is_fixed() {
        // Encoding the same fields in reverse still decodes, but re-encoding
        // yields the canonical ascending order.
        let mut reversed = Vec::new();
        put_bytes(&mut reversed, field::DST, b"server");
        put_bytes(&mut reversed, field::SRC, b"peer1");
        put_bytes(&mut reversed, field::ID, b"abc");
        put_bytes(&mut reversed, field::BODY, b"hello");

        let packet = decode(&reversed).unwrap();
        assert_eq!(packet, Packet::data("abc", "peer1", "server", "hello"));
        assert_ne!(encode(&packet), reversed);
    }

    #[test]
    fn test_unknown_fields_skipped() {
        let mut buf = encode(&Packet::data("abc", "a", "b", "x"));
        put_key(&mut buf, 15, WIRE_VARINT);
        put_varint(&mut buf, 99);
        put_key(&mut buf, 16, WIRE_LEN);
        put_varint(&mut buf, 3);
        buf.extend_from_slice(b"xyz");
        put_key(&mut buf, 17, WIRE_FIXED32);
        buf.extend_from_slice(&[0; 4]);
        put_key(&mut buf, 18, WIRE_FIXED64);
        buf.extend_from_slice(&[0; 8]);

        let packet = decode(&buf).unwrap();
        assert_eq!(packet, Packet::data("abc", "a", "b", "x"));
    }

    #[test]
    fn test_last_value_wins() {
        let mut buf = Vec::new();
        put_bytes(&mut buf, field::ID, b"first");
        put_bytes(&mut buf, field::ID, b"second");
        assert_eq!(decode(&buf).unwrap().id, "second");
    }

    #[test]
    fn test_empty_input_is_default_packet() {
        assert!(encode(&Packet::default()).is_empty());
        assert_eq!(decode(&[]), Ok(Packet::default()));
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = encode(&full_packet());
        for cut in 1..bytes.len() {
            let result = decode(&bytes[..cut]);
            assert!(
                matches!(result, Err(DecodeError::Truncated)) || result.is_ok(),
                "cut at {cut}: {result:?}"
            );
        }
        // Cutting inside the body payload is always a truncation
        assert_eq!(decode(&bytes[..bytes.len() - 1]), Err(DecodeError::Truncated));

        // Length prefix claims more than is present
        assert_eq!(decode(&[0x12, 0x05, b'a']), Err(DecodeError::Truncated));
        // Dangling continuation bit
        assert_eq!(decode(&[0x08, 0x80]), Err(DecodeError::Truncated));
    }

    #[test]
    fn test_rejects_varint_overflow() {
        let mut buf = vec![0x08];
        buf.extend_from_slice(&[0xff; 11]);
        assert_eq!(decode(&buf), Err(DecodeError::VarintOverflow));
    }

    #[test]
    fn test_rejects_varint_above_u64() {
        let mut max = Vec::new();
        put_key(&mut max, field::FEE, WIRE_VARINT);
        put_varint(&mut max, u64::MAX);
        assert_eq!(max.len(), 11);
        assert_eq!(decode(&max).unwrap().fee, u64::MAX);

        // Same ten bytes with bit 64 set in the last one
        let mut lossy = max.clone();
        *lossy.last_mut().unwrap() = 0x03;
        assert_eq!(decode(&lossy), Err(DecodeError::VarintOverflow));
    }

    #[test]
    fn test_rejects_field_zero() {
        assert_eq!(decode(&[0x00, 0x01]), Err(DecodeError::InvalidFieldNumber(0)));
    }

    #[test]
    fn test_rejects_group_wire_types() {
        // field 20, wire type 3 (start group)
        let mut buf = Vec::new();
        put_key(&mut buf, 20, 3);
        assert_eq!(decode(&buf), Err(DecodeError::InvalidWireType(3)));
    }

    #[test]
    fn test_rejects_wire_type_mismatch() {
        let mut buf = Vec::new();
        put_key(&mut buf, field::ID, WIRE_VARINT);
        put_varint(&mut buf, 1);
        assert_eq!(
            decode(&buf),
            Err(DecodeError::WireTypeMismatch {
                field: field::ID,
                expected: WIRE_LEN,
                found: WIRE_VARINT
            })
        );
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let mut buf = Vec::new();
        put_bytes(&mut buf, field::SRC, &[0xff, 0xfe]);
        assert_eq!(decode(&buf), Err(DecodeError::InvalidUtf8("src")));

        // Body is opaque and accepts any bytes
        let mut buf = Vec::new();
        put_bytes(&mut buf, field::BODY, &[0xff, 0xfe]);
        assert_eq!(decode(&buf).unwrap().body, vec![0xff, 0xfe]);
    }

    #[test]
    fn test_rejects_type_out_of_range() {
        let mut buf = Vec::new();
        put_key(&mut buf, field::TYPE, WIRE_VARINT);
        put_varint(&mut buf, u64::from(u32::MAX) + 1);
        assert_eq!(decode(&buf), Err(DecodeError::ValueOutOfRange("type")));
    }
}
