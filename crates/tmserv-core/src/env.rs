//! Environment abstraction for deterministic testing.
//!
//! Decouples session and world logic from system resources (time,
//! randomness). Production uses real monotonic time and OS entropy; tests
//! drive virtual clocks and seeded randomness so every run is reproducible.

use std::time::Duration;

/// Abstract environment providing time and randomness.
///
/// Implementations must guarantee that `now()` never goes backwards within
/// one execution context.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulations use a
    /// virtual clock with the same arithmetic.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Wall-clock seconds since the Unix epoch.
    ///
    /// Only the world clock (day/night gating) consumes this; protocol
    /// logic never does.
    fn wall_clock_secs(&self) -> u64;

    /// Fill the buffer with random bytes.
    ///
    /// Production implementations use OS entropy; simulation environments
    /// must produce the same sequence for the same seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u32`, for cipher keys.
    fn random_u32(&self) -> u32 {
        let mut bytes = [0u8; 4];
        self.random_bytes(&mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Random `u64`, for ids and seeds.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_le_bytes(bytes)
    }
}
