//! Transport-independent session machinery.
//!
//! Everything between the raw socket and the dispatcher that does not touch
//! I/O: the per-connection ring buffer ([`ring`]), the lifecycle state
//! machine ([`session`]), per-opcode rate and flood control ([`rate`]), and
//! the [`env::Environment`] abstraction that keeps time and randomness out
//! of protocol logic so every test can be deterministic.
//!
//! State machines here follow the action pattern: methods take the current
//! time as a parameter and return data describing what the caller should do.
//! No clocks are read and no sockets are written inside this crate.

pub mod env;
pub mod error;
pub mod rate;
pub mod ring;
pub mod session;

pub use env::Environment;
pub use error::{CloseReason, SessionError};
pub use rate::{BanList, RateConfig, RateControl, RateVerdict};
pub use ring::RingBuffer;
pub use session::{LifecycleState, Session, SessionConfig};
