//! Server error types.

use thiserror::Error;

use tmserv_proto::ProtocolError;

/// Errors surfaced by the server driver and runtime.
///
/// Most client misbehavior never becomes a `ServerError`: it is converted
/// into a close action with a recorded reason. These errors are for faults
/// of the server's own machinery.
#[derive(Error, Debug)]
pub enum ServerError {
    /// An event referenced a session the registry does not know.
    ///
    /// Usually benign: the session was closed while the event was in
    /// flight. The driver logs and drops the event.
    #[error("session not found: {0}")]
    SessionNotFound(u32),

    /// Wire codec failure while building an outbound packet.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Configuration is unusable (bad bind address, missing catalog).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failure (bind, accept).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Template or spawn catalog failed to load.
    #[error("catalog error: {0}")]
    Catalog(#[from] tmserv_world::template::CatalogError),
}
