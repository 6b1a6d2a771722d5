//! Protocol error types.
//!
//! Every parse failure is typed so the dispatcher can map it to a close
//! reason and a counter without string matching. All protocol errors are
//! fatal for the connection that produced them: once framing or checksum
//! state is suspect the stream cannot be re-synchronized.

use thiserror::Error;

/// Errors produced by the wire codec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Header `size` field is outside `[12, 8192]`.
    #[error("bad packet size: {size}")]
    BadSize {
        /// Size claimed by the header
        size: u16,
    },

    /// Checksum field does not match the computed word sum.
    #[error("bad checksum: header {header:#06x}, computed {computed:#06x}")]
    BadChecksum {
        /// Checksum carried in the header
        header: u16,
        /// Checksum computed over the packet
        computed: u16,
    },

    /// Opcode is not in the catalogue.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// Packet size does not match the fixed size registered for its opcode.
    #[error("size mismatch for opcode {opcode:#06x}: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Opcode of the offending packet
        opcode: u16,
        /// Registered fixed size
        expected: u16,
        /// Size carried in the header
        actual: u16,
    },

    /// Payload is shorter than the message layout requires.
    #[error("truncated payload for opcode {opcode:#06x}: need {needed} bytes, have {available}")]
    TruncatedPayload {
        /// Opcode of the offending packet
        opcode: u16,
        /// Bytes the layout requires
        needed: usize,
        /// Bytes actually present
        available: usize,
    },

    /// Payload decoded but its content is not a valid message.
    ///
    /// On a session with the cipher enabled this is the signature of a
    /// desynchronized seed: the bytes deciphered into garbage.
    #[error("invalid payload for opcode {opcode:#06x}: {detail}")]
    InvalidPayload {
        /// Opcode of the offending packet
        opcode: u16,
        /// What was wrong with the content
        detail: &'static str,
    },

    /// Fewer bytes available than a complete header.
    #[error("incomplete header: {0} bytes")]
    IncompleteHeader(usize),
}

impl ProtocolError {
    /// Whether this failure indicates a probable cipher seed desync rather
    /// than a malformed packet.
    #[must_use]
    pub fn is_desync_candidate(&self) -> bool {
        matches!(self, Self::InvalidPayload { .. })
    }
}
