//! Server configuration.

use tmserv_core::rate::FloodPolicy;
use tmserv_core::session::SessionConfig;

/// Protocol version advertised in the `Initial` packet.
pub const PROTOCOL_VERSION: u16 = 1;

/// Driver-level configuration (no I/O concerns).
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Maximum concurrent sessions.
    pub max_connections: usize,
    /// Per-session lifecycle timeouts.
    pub session: SessionConfig,
    /// Flood escalation policy.
    pub flood: FloodPolicy,
    /// Soft-ban TTL after a flood close, in milliseconds.
    pub ban_ttl_ms: u64,
    /// Simulation step in milliseconds.
    pub tick_ms: u64,
    /// Radius for area-scoped broadcast (chat, combat, movement).
    pub view_radius: u16,
    /// Interval between server keep-alives to in-game sessions.
    pub keepalive_interval_ms: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            session: SessionConfig::default(),
            flood: FloodPolicy::default(),
            ban_ttl_ms: 600_000,
            tick_ms: 100,
            view_radius: 16,
            keepalive_interval_ms: 15_000,
        }
    }
}

/// Runtime configuration for the production server.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Listen address, e.g. `0.0.0.0:8281`.
    pub bind_address: String,
    /// Path to the mob template catalog (JSON).
    pub mob_templates_path: Option<String>,
    /// Path to the spawn group configuration (JSON).
    pub spawn_config_path: Option<String>,
    /// Driver configuration.
    pub driver: DriverConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8281".to_string(),
            mob_templates_path: None,
            spawn_config_path: None,
            driver: DriverConfig::default(),
        }
    }
}
