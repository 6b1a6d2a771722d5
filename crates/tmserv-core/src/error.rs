//! Session error types and the close-reason taxonomy.

use thiserror::Error;

use crate::session::LifecycleState;

/// Why a session was (or is being) closed.
///
/// Mirrors the error taxonomy: protocol violations, flow-control verdicts,
/// lifecycle outcomes and resource exhaustion. Every close records exactly
/// one of these for logging and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Packet checksum did not verify.
    BadChecksum,
    /// Header size outside protocol bounds or disagreeing with the stream.
    BadSize,
    /// Opcode not in the catalogue.
    UnknownOpcode,
    /// Opcode valid but not permitted in the session's lifecycle state.
    WrongStateOpcode,
    /// Payload deciphered into garbage; cipher seeds have lost sync.
    DesyncedCrypto,
    /// Too many violations inside the flood window.
    FloodDetected,
    /// Outbound queue overflowed.
    SendOverflow,
    /// Inbound ring buffer overflowed.
    ReceiveOverflow,
    /// Handshake not completed in time.
    HandshakeTimeout,
    /// No activity within the idle window.
    IdleTimeout,
    /// Same account logged in from another connection; this is the older one.
    DuplicateLogin,
    /// Credentials rejected.
    AuthFailed,
    /// Account or IP is banned.
    Banned,
    /// Server is at its connection limit.
    ServerFull,
    /// Client asked to leave.
    ClientLogout,
    /// Peer closed the socket or transport errored.
    TransportClosed,
    /// Server is shutting down.
    ServerShutdown,
}

impl CloseReason {
    /// Short stable label for logs and counters.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::BadChecksum => "bad_checksum",
            Self::BadSize => "bad_size",
            Self::UnknownOpcode => "unknown_opcode",
            Self::WrongStateOpcode => "wrong_state_opcode",
            Self::DesyncedCrypto => "desynced_crypto",
            Self::FloodDetected => "flood_detected",
            Self::SendOverflow => "send_overflow",
            Self::ReceiveOverflow => "receive_overflow",
            Self::HandshakeTimeout => "handshake_timeout",
            Self::IdleTimeout => "idle_timeout",
            Self::DuplicateLogin => "duplicate_login",
            Self::AuthFailed => "auth_failed",
            Self::Banned => "banned",
            Self::ServerFull => "server_full",
            Self::ClientLogout => "client_logout",
            Self::TransportClosed => "transport_closed",
            Self::ServerShutdown => "server_shutdown",
        }
    }

    /// Whether the client should still receive a result packet carrying
    /// this reason before the socket closes.
    ///
    /// Protocol-level corruption gets nothing: the stream is untrusted and
    /// the client could not decode a reply reliably anyway.
    #[must_use]
    pub fn delivers_result(self) -> bool {
        !matches!(
            self,
            Self::BadChecksum
                | Self::BadSize
                | Self::UnknownOpcode
                | Self::DesyncedCrypto
                | Self::ReceiveOverflow
                | Self::SendOverflow
                | Self::TransportClosed
        )
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors from the session lifecycle state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// A transition was requested that the current state does not permit.
    #[error("invalid transition: cannot {operation} from {state:?}")]
    InvalidTransition {
        /// State the session was in
        state: LifecycleState,
        /// Operation that was attempted
        operation: &'static str,
    },

    /// Account identity is immutable once set.
    #[error("account identity already bound")]
    AccountAlreadyBound,

    /// World entry requires a selected character.
    #[error("no character selected")]
    NoCharacterSelected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_corruption_gets_no_result_packet() {
        assert!(!CloseReason::BadChecksum.delivers_result());
        assert!(!CloseReason::DesyncedCrypto.delivers_result());
        assert!(!CloseReason::SendOverflow.delivers_result());
    }

    #[test]
    fn lifecycle_closes_deliver_results() {
        assert!(CloseReason::AuthFailed.delivers_result());
        assert!(CloseReason::DuplicateLogin.delivers_result());
        assert!(CloseReason::Banned.delivers_result());
        assert!(CloseReason::FloodDetected.delivers_result());
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(CloseReason::FloodDetected.label(), "flood_detected");
        assert_eq!(CloseReason::IdleTimeout.to_string(), "idle_timeout");
    }
}
