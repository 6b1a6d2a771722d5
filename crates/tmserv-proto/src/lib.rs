//! Wire codec for the legacy game client protocol.
//!
//! Every packet on the wire is a 12-byte packed little-endian header followed
//! by an opcode-specific payload. This crate owns everything below the
//! dispatcher: header layout and checksum ([`header`]), whole-packet
//! encode/decode ([`packet`]), incremental stream framing ([`framer`]), the
//! payload obfuscation cipher ([`cipher`]), the opcode catalogue ([`opcode`])
//! and the per-message byte layouts ([`messages`]).
//!
//! Layouts are bit-exact with the original client. Payload codecs are written
//! as explicit byte-level encode/decode functions rather than struct casts so
//! the wire format stays portable and reviewable in one place per message.

pub mod cipher;
pub mod error;
pub mod framer;
pub mod header;
pub mod messages;
pub mod opcode;
pub mod packet;

pub use cipher::PacketCipher;
pub use error::ProtocolError;
pub use framer::Framer;
pub use header::PacketHeader;
pub use messages::{ClientMessage, ServerMessage};
pub use opcode::Opcode;
pub use packet::Packet;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
