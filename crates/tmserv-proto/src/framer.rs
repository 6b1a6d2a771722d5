//! Incremental packet framing.
//!
//! The framer accumulates raw socket bytes and yields complete packets one
//! at a time: peek the header, reject impossible sizes immediately, wait for
//! the full packet, then consume exactly `size` bytes. The sequence of
//! packets produced is independent of how the byte stream was chunked across
//! reads.
//!
//! Any error from the framer is terminal for the stream. The protocol has no
//! resynchronization marker, so after a bad size or checksum the remaining
//! bytes cannot be trusted to align with a packet boundary.

use bytes::{Buf, BytesMut};

use crate::{
    error::ProtocolError,
    header::PacketHeader,
    packet::Packet,
};

/// Streaming packet extractor for one connection direction.
#[derive(Debug, Default)]
pub struct Framer {
    buf: BytesMut,
}

impl Framer {
    /// Create an empty framer.
    #[must_use]
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(PacketHeader::MAX_PACKET_SIZE as usize) }
    }

    /// Append raw bytes received from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed as packets.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Extract the next complete packet, if one is buffered.
    ///
    /// Returns `Ok(None)` when more bytes are needed.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::BadSize`] if the header claims an impossible size
    /// - [`ProtocolError::BadChecksum`] if the packet fails verification
    ///
    /// After an error the framer must be discarded along with its
    /// connection.
    pub fn next_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        if self.buf.len() < PacketHeader::SIZE {
            return Ok(None);
        }

        let size = PacketHeader::from_prefix(&self.buf)?.size() as usize;

        if self.buf.len() < size {
            return Ok(None);
        }

        let wire = self.buf.copy_to_bytes(size);
        Packet::decode(&wire).map(Some)
    }

    /// Drain every currently-complete packet.
    ///
    /// Convenience for tests and batch processing; the server's read loop
    /// calls [`Self::next_packet`] directly so it can stop at the first
    /// error.
    pub fn drain(&mut self) -> Result<Vec<Packet>, ProtocolError> {
        let mut out = Vec::new();
        while let Some(packet) = self.next_packet()? {
            out.push(packet);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn sample_packets() -> Vec<Packet> {
        vec![
            Packet::new(0x0176, 1, vec![0xAA; 6]),
            Packet::new(0x0366, 1, vec![0x01, 0x02, 0x03, 0x04]),
            Packet::new(0x0333, 1, vec![0x55; 146]),
            Packet::new(0x0FDE, 1, Vec::new()),
        ]
    }

    fn wire_for(packets: &[Packet]) -> Vec<u8> {
        let mut wire = Vec::new();
        for p in packets {
            p.encode(&mut wire);
        }
        wire
    }

    #[test]
    fn extracts_multiple_packets_from_one_push() {
        let packets = sample_packets();
        let mut framer = Framer::new();
        framer.push(&wire_for(&packets));

        let out = framer.drain().expect("clean stream");
        assert_eq!(out, packets);
        assert_eq!(framer.buffered(), 0);
    }

    #[test]
    fn partial_header_yields_none() {
        let mut framer = Framer::new();
        framer.push(&[0x10, 0x00, 0x66]);
        assert_eq!(framer.next_packet().expect("no error yet"), None);
    }

    #[test]
    fn partial_body_yields_none_until_complete() {
        let packet = Packet::new(0x0366, 9, vec![7u8; 12]);
        let wire = packet.encode_to_vec();

        let mut framer = Framer::new();
        framer.push(&wire[..wire.len() - 1]);
        assert_eq!(framer.next_packet().expect("waiting"), None);

        framer.push(&wire[wire.len() - 1..]);
        assert_eq!(framer.next_packet().expect("complete"), Some(packet));
    }

    #[test]
    fn bad_size_is_immediate() {
        let mut framer = Framer::new();
        let mut wire = vec![0u8; 12];
        wire[0..2].copy_from_slice(&5u16.to_le_bytes());
        framer.push(&wire);

        assert_eq!(framer.next_packet(), Err(ProtocolError::BadSize { size: 5 }));
    }

    #[test]
    fn corrupted_packet_fails_checksum() {
        let mut wire = Packet::new(0x0366, 9, vec![7u8; 12]).encode_to_vec();
        wire[15] ^= 0x80;

        let mut framer = Framer::new();
        framer.push(&wire);
        assert!(matches!(framer.next_packet(), Err(ProtocolError::BadChecksum { .. })));
    }

    proptest! {
        /// The packet sequence must not depend on read chunking.
        #[test]
        fn chunking_invariance(
            payload_lens in prop::collection::vec(0usize..64, 1..8),
            cuts in prop::collection::vec(any::<prop::sample::Index>(), 0..16),
        ) {
            let packets: Vec<Packet> = payload_lens
                .iter()
                .enumerate()
                .map(|(i, len)| Packet::new(0x0366, i as u16, vec![i as u8; *len]))
                .collect();
            let wire = wire_for(&packets);

            // Whole-stream reference
            let mut reference = Framer::new();
            reference.push(&wire);
            let expected = reference.drain().expect("reference stream");

            // Arbitrary chunk boundaries
            let mut offsets: Vec<usize> = cuts.iter().map(|ix| ix.index(wire.len() + 1)).collect();
            offsets.push(0);
            offsets.push(wire.len());
            offsets.sort_unstable();
            offsets.dedup();

            let mut framer = Framer::new();
            let mut got = Vec::new();
            for pair in offsets.windows(2) {
                framer.push(&wire[pair[0]..pair[1]]);
                got.extend(framer.drain().expect("chunked stream"));
            }

            prop_assert_eq!(got, expected);
        }
    }
}
