//! Whole-packet encode/decode.
//!
//! A [`Packet`] is the transport unit: a validated 12-byte header plus raw
//! payload bytes. The payload is deliberately untyped here so framing and
//! routing never pay for message decoding; [`crate::messages`] turns payloads
//! into typed messages at the dispatch boundary.

use bytes::{BufMut, Bytes};

use crate::{
    error::ProtocolError,
    header::{self, PacketHeader},
};

/// One framed packet: header plus raw payload bytes.
///
/// # Invariants
///
/// - `header.size() == PacketHeader::SIZE + payload.len()` — enforced by
///   [`Packet::new`] and verified by [`Packet::decode`].
/// - `header.size() <= PacketHeader::MAX_PACKET_SIZE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Validated packet header.
    pub header: PacketHeader,
    /// Raw payload bytes (possibly ciphered; see [`crate::cipher`]).
    pub payload: Bytes,
}

impl Packet {
    /// Build a packet from opcode, client id and payload bytes.
    ///
    /// The header size field is derived from the payload length, so a
    /// mismatched size cannot be constructed through this path.
    ///
    /// # Panics
    ///
    /// Panics if the total size would exceed
    /// [`PacketHeader::MAX_PACKET_SIZE`]. Outbound payloads are produced by
    /// the message encoders, all of which are bounded well below the limit.
    #[must_use]
    pub fn new(opcode: u16, client_id: u16, payload: impl Into<Bytes>) -> Self {
        let payload = payload.into();
        let total = PacketHeader::SIZE + payload.len();
        assert!(
            total <= PacketHeader::MAX_PACKET_SIZE as usize,
            "outbound packet exceeds protocol limit: {total} bytes"
        );

        let mut header = PacketHeader::new(opcode, client_id, total as u16);

        let mut image = Vec::with_capacity(total);
        image.extend_from_slice(&header.to_bytes());
        image.extend_from_slice(&payload);
        header.set_checksum(header::compute_checksum(&image));

        Self { header, payload }
    }

    /// Opcode as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        self.header.opcode()
    }

    /// Total wire size in bytes.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        PacketHeader::SIZE + self.payload.len()
    }

    /// Serialize to wire bytes.
    ///
    /// The checksum was fixed at construction over the payload exactly as
    /// it appears on the wire, so callers that cipher the payload must do
    /// so before building the packet.
    pub fn encode(&self, dst: &mut impl BufMut) {
        dst.put_slice(&self.header.to_bytes());
        dst.put_slice(&self.payload);
    }

    /// Serialize to a fresh byte vector.
    #[must_use]
    pub fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.wire_size());
        self.encode(&mut out);
        out
    }

    /// Decode a packet from exactly one packet's worth of wire bytes.
    ///
    /// Verifies the size bounds, that the buffer length matches the header
    /// claim, and the checksum.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::IncompleteHeader`] / [`ProtocolError::BadSize`]
    ///   from header parsing
    /// - [`ProtocolError::BadSize`] if the buffer length disagrees with the
    ///   header size field
    /// - [`ProtocolError::BadChecksum`] on checksum mismatch
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let header = *PacketHeader::from_prefix(bytes)?;

        if bytes.len() != header.size() as usize {
            return Err(ProtocolError::BadSize { size: header.size() });
        }

        header::verify_checksum(bytes)?;

        Ok(Self { header, payload: Bytes::copy_from_slice(&bytes[PacketHeader::SIZE..]) })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn round_trip_with_payload() {
        let packet = Packet::new(0x0366, 7, vec![1, 2, 3, 4, 5, 6]);
        let wire = packet.encode_to_vec();

        let parsed = Packet::decode(&wire).expect("decodes");
        assert_eq!(parsed.opcode(), 0x0366);
        assert_eq!(parsed.header.client_id(), 7);
        assert_eq!(&parsed.payload[..], &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn empty_payload_round_trip() {
        let packet = Packet::new(0x0176, 0, Vec::new());
        let wire = packet.encode_to_vec();
        assert_eq!(wire.len(), PacketHeader::SIZE);

        let parsed = Packet::decode(&wire).expect("decodes");
        assert!(parsed.payload.is_empty());
    }

    #[test]
    fn reject_length_disagreement() {
        let packet = Packet::new(0x0366, 7, vec![0u8; 8]);
        let mut wire = packet.encode_to_vec();
        wire.push(0xAA); // extra trailing byte

        assert!(matches!(Packet::decode(&wire), Err(ProtocolError::BadSize { .. })));
    }

    #[test]
    fn reject_flipped_checksum() {
        let packet = Packet::new(0x0366, 7, vec![9u8; 10]);
        let mut wire = packet.encode_to_vec();
        wire[6] ^= 0x01;

        assert!(matches!(Packet::decode(&wire), Err(ProtocolError::BadChecksum { .. })));
    }

    proptest! {
        #[test]
        fn encode_decode_identity(
            opcode in any::<u16>(),
            client_id in any::<u16>(),
            payload in prop::collection::vec(any::<u8>(), 0..512),
        ) {
            let packet = Packet::new(opcode, client_id, payload);
            let wire = packet.encode_to_vec();
            let parsed = Packet::decode(&wire).expect("round trip");

            prop_assert_eq!(parsed.opcode(), opcode);
            prop_assert_eq!(parsed.header.client_id(), client_id);
            prop_assert_eq!(parsed.payload, packet.payload);
        }
    }
}
