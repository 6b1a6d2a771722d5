//! Packet header with zero-copy parsing.
//!
//! The header is a fixed 12-byte packed structure, little-endian on the wire
//! like every multi-byte field in this protocol. Fields are stored as raw
//! byte arrays so the struct has no alignment requirements and any 12-byte
//! pattern is a valid (if not necessarily sensible) header.
//!
//! The checksum covers the 16-bit words from word offset 6 through
//! `size / 2 - 1` with the checksum field zeroed during computation. Word
//! offset 6 is the first payload word, so coverage is payload-only; a
//! trailing odd byte is not summed. This matches the original client's
//! documented behavior exactly.

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::ProtocolError;

/// Fixed 12-byte packet header (little-endian).
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct PacketHeader {
    size: [u8; 2],
    opcode: [u8; 2],
    client_id: [u8; 2],
    checksum: [u8; 2],
    reserved: [u8; 4],
}

impl PacketHeader {
    /// Size of the serialized header (12 bytes).
    pub const SIZE: usize = 12;

    /// Smallest legal packet: a bare header.
    pub const MIN_PACKET_SIZE: u16 = Self::SIZE as u16;

    /// Largest legal packet, header included.
    pub const MAX_PACKET_SIZE: u16 = 8192;

    /// Create a header for an opcode with the given total packet size.
    ///
    /// The checksum field starts zeroed; [`Packet::encode`] fills it in.
    ///
    /// [`Packet::encode`]: crate::packet::Packet::encode
    #[must_use]
    pub fn new(opcode: u16, client_id: u16, size: u16) -> Self {
        Self {
            size: size.to_le_bytes(),
            opcode: opcode.to_le_bytes(),
            client_id: client_id.to_le_bytes(),
            checksum: [0; 2],
            reserved: [0; 4],
        }
    }

    /// Parse a header from the front of a byte slice (zero-copy).
    ///
    /// Validates the size bounds only; opcode and checksum validation happen
    /// at framing time when the whole packet is available.
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::IncompleteHeader`] if fewer than 12 bytes
    /// - [`ProtocolError::BadSize`] if `size` is outside `[12, 8192]`
    pub fn from_prefix(bytes: &[u8]) -> Result<&Self, ProtocolError> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::IncompleteHeader(bytes.len()))?
            .0;

        let size = header.size();
        if size < Self::MIN_PACKET_SIZE || size > Self::MAX_PACKET_SIZE {
            return Err(ProtocolError::BadSize { size });
        }

        Ok(header)
    }

    /// Serialize to raw bytes.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(IntoBytes::as_bytes(self));
        out
    }

    /// Total packet size in bytes, header included.
    #[must_use]
    pub fn size(&self) -> u16 {
        u16::from_le_bytes(self.size)
    }

    /// Packet kind as raw u16.
    #[must_use]
    pub fn opcode(&self) -> u16 {
        u16::from_le_bytes(self.opcode)
    }

    /// Client id echo field.
    #[must_use]
    pub fn client_id(&self) -> u16 {
        u16::from_le_bytes(self.client_id)
    }

    /// Checksum carried in the header.
    #[must_use]
    pub fn checksum(&self) -> u16 {
        u16::from_le_bytes(self.checksum)
    }

    /// Overwrite the checksum field.
    pub fn set_checksum(&mut self, checksum: u16) {
        self.checksum = checksum.to_le_bytes();
    }

    /// Overwrite the client id field.
    pub fn set_client_id(&mut self, client_id: u16) {
        self.client_id = client_id.to_le_bytes();
    }
}

impl std::fmt::Debug for PacketHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketHeader")
            .field("size", &self.size())
            .field("opcode", &format_args!("{:#06x}", self.opcode()))
            .field("client_id", &self.client_id())
            .field("checksum", &format_args!("{:#06x}", self.checksum()))
            .finish()
    }
}

impl PartialEq for PacketHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for PacketHeader {}

/// Compute the checksum over a complete packet image.
///
/// `packet` must contain the full packet (header and payload). The checksum
/// field itself (word 3) is treated as zero regardless of its current
/// content, so callers do not need to clear it first.
#[must_use]
pub fn compute_checksum(packet: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let words = packet.len() / 2;

    for word in 6..words {
        let at = word * 2;
        sum = sum.wrapping_add(u32::from(u16::from_le_bytes([packet[at], packet[at + 1]])));
    }

    (sum & 0xFFFF) as u16
}

/// Verify the checksum of a complete packet image against its header field.
///
/// # Errors
///
/// [`ProtocolError::BadChecksum`] on mismatch.
pub fn verify_checksum(packet: &[u8]) -> Result<(), ProtocolError> {
    debug_assert!(packet.len() >= PacketHeader::SIZE);

    let header = u16::from_le_bytes([packet[6], packet[7]]);
    let computed = compute_checksum(packet);

    if header == computed { Ok(()) } else { Err(ProtocolError::BadChecksum { header, computed }) }
}
