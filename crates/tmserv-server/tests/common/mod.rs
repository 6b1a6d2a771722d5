//! Shared driver-test harness.
//!
//! Runs the sans-IO driver against a virtual clock and deterministic
//! randomness, with helpers that play the client side of the protocol:
//! building wire packets, walking the login flow, and simulating the
//! deferred collaborator actions the runtime would execute.

use std::net::SocketAddr;
use std::ops::Sub;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tmserv_core::CloseReason;
use tmserv_core::env::Environment;
use tmserv_proto::messages::{BodyWriter, NAME_LENGTH, CHAT_MESSAGE_LENGTH};
use tmserv_proto::{Opcode, Packet};
use tmserv_server::{
    AuthOutcome, CharacterBlob, CharacterSummary, DriverConfig, ServerAction, ServerDriver,
    ServerEvent,
};
use tmserv_world::{TemplateCatalog, World, WorldClock};
use tmserv_world::entity::{CombatStats, Vitals};
use tmserv_world::spawn::{SpawnGroupConfig, WeightedTemplate};
use tmserv_world::template::MobTemplate;

/// Virtual monotonic instant in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualInstant(pub u64);

impl Sub for VirtualInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

/// Deterministic environment with a manually advanced clock.
#[derive(Clone)]
pub struct TestEnv {
    clock_ms: Arc<AtomicU64>,
    rng_state: Arc<AtomicU64>,
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            clock_ms: Arc::new(AtomicU64::new(0)),
            rng_state: Arc::new(AtomicU64::new(0x9E37_79B9_7F4A_7C15)),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.clock_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Environment for TestEnv {
    type Instant = VirtualInstant;

    fn now(&self) -> VirtualInstant {
        VirtualInstant(self.clock_ms.load(Ordering::SeqCst))
    }

    fn wall_clock_secs(&self) -> u64 {
        self.clock_ms.load(Ordering::SeqCst) / 1000
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // xorshift64*: deterministic, good enough for test cipher keys.
        for byte in buffer.iter_mut() {
            let mut x = self.rng_state.load(Ordering::SeqCst);
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;
            self.rng_state.store(x, Ordering::SeqCst);
            *byte = (x.wrapping_mul(0x2545_F491_4F6C_DD1D) >> 56) as u8;
        }
    }
}

/// A wolf-like template for spawn scenarios.
pub fn wolf_template() -> MobTemplate {
    MobTemplate {
        id: 101,
        name: "Gray Wolf".to_string(),
        level: 12,
        max_hp: 300,
        max_mp: 0,
        attack: 40,
        defense: 10,
        move_speed: 4,
        attack_range: 1,
        sight_range: 8,
        attack_cooldown_ms: 1500,
        flee_hp_percent: 0,
        aggressive: true,
        calls_for_help: false,
        drops: Vec::new(),
    }
}

/// A spawn group around (100, 100) on map 1.
pub fn wolf_group(max_count: usize) -> SpawnGroupConfig {
    SpawnGroupConfig {
        id: 1,
        map: 1,
        x: 100,
        y: 100,
        radius: 8,
        max_count,
        min_respawn_ms: 5000,
        max_respawn_ms: 10_000,
        templates: vec![WeightedTemplate { template_id: 101, weight: 1 }],
        active_phase: None,
    }
}

/// Driver under test plus its virtual environment.
pub struct TestServer {
    pub env: TestEnv,
    pub driver: ServerDriver<TestEnv>,
}

impl Default for TestServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TestServer {
    pub fn new() -> Self {
        Self::with_world(World::new(TemplateCatalog::default(), Vec::new(), WorldClock::default()))
    }

    pub fn with_world(world: World) -> Self {
        let env = TestEnv::new();
        let driver = ServerDriver::new(
            env.clone(),
            DriverConfig::default(),
            world,
            Box::new(tmserv_world::DefaultResolver),
        );
        Self { env, driver }
    }

    pub fn peer(octet: u8) -> SocketAddr {
        format!("203.0.113.{octet}:40000").parse().expect("addr")
    }

    pub fn event(&mut self, event: ServerEvent) -> Vec<ServerAction> {
        self.driver.process_event(event).expect("driver event")
    }

    pub fn connect(&mut self, session_id: u32) -> Vec<ServerAction> {
        self.connect_from(session_id, Self::peer(session_id as u8))
    }

    pub fn connect_from(&mut self, session_id: u32, peer: SocketAddr) -> Vec<ServerAction> {
        self.event(ServerEvent::ConnectionAccepted { session_id, peer })
    }

    pub fn packet(&mut self, session_id: u32, packet: Packet) -> Vec<ServerAction> {
        self.event(ServerEvent::PacketReceived { session_id, packet })
    }

    pub fn tick(&mut self) -> Vec<ServerAction> {
        self.env.advance(100);
        self.event(ServerEvent::Tick)
    }

    /// Drive a session to `CharacterSelect` via the deferred auth flow.
    pub fn authenticate(&mut self, session_id: u32, account: &str) -> Vec<ServerAction> {
        self.authenticate_with_permission(session_id, account, 0)
    }

    pub fn authenticate_with_permission(
        &mut self,
        session_id: u32,
        account: &str,
        permission: u8,
    ) -> Vec<ServerAction> {
        let actions = self.packet(session_id, account_login(account, "pw", 1));
        let deferred = actions
            .iter()
            .any(|a| matches!(a, ServerAction::Authenticate { session_id: sid, .. } if *sid == session_id));
        assert!(deferred, "expected a deferred auth action, got {actions:?}");

        self.event(ServerEvent::AuthCompleted {
            session_id,
            account: account.to_string(),
            outcome: AuthOutcome::Ok { account_id: 42, permission },
            roster: vec![CharacterSummary {
                name: account.to_string(),
                class_id: 0,
                level: 1,
            }],
        })
    }

    /// Drive a session all the way to `InGame` at a position.
    pub fn login(&mut self, session_id: u32, account: &str, x: u16, y: u16) -> Vec<ServerAction> {
        self.login_with_permission(session_id, account, x, y, 0)
    }

    pub fn login_with_permission(
        &mut self,
        session_id: u32,
        account: &str,
        x: u16,
        y: u16,
        permission: u8,
    ) -> Vec<ServerAction> {
        self.connect(session_id);
        self.authenticate_with_permission(session_id, account, permission);

        let actions = self.packet(session_id, character_login(account));
        let deferred = actions
            .iter()
            .any(|a| matches!(a, ServerAction::LoadCharacter { session_id: sid, .. } if *sid == session_id));
        assert!(deferred, "expected a deferred load action, got {actions:?}");

        self.event(ServerEvent::CharacterLoaded {
            session_id,
            character: Some(CharacterBlob {
                name: account.to_string(),
                class_id: 0,
                level: 10,
                map: 1,
                x,
                y,
                vitals: Vitals::full(500, 100),
                stats: CombatStats { attack: 50, defense: 20, level: 10 },
                guild: None,
            }),
        })
    }

    /// Character entity id assigned to a session.
    pub fn char_id(&self, session_id: u32) -> u16 {
        self.driver
            .registry()
            .get(session_id)
            .and_then(|e| e.character.as_ref())
            .map(|c| c.char_id)
            .expect("session has a character")
    }
}

/// Packets delivered by `Send` actions, in order.
pub fn sends(actions: &[ServerAction]) -> Vec<(u32, Packet)> {
    actions
        .iter()
        .filter_map(|a| match a {
            ServerAction::Send { session_id, packet } => Some((*session_id, packet.clone())),
            _ => None,
        })
        .collect()
}

/// Packets sent to one session, in order.
pub fn sends_to(actions: &[ServerAction], session_id: u32) -> Vec<Packet> {
    sends(actions)
        .into_iter()
        .filter_map(|(sid, p)| (sid == session_id).then_some(p))
        .collect()
}

/// Close actions in order.
pub fn closes(actions: &[ServerAction]) -> Vec<(u32, CloseReason)> {
    actions
        .iter()
        .filter_map(|a| match a {
            ServerAction::Close { session_id, reason } => Some((*session_id, *reason)),
            _ => None,
        })
        .collect()
}

/// Build an `AccountLogin` packet.
pub fn account_login(account: &str, password: &str, version: u16) -> Packet {
    let mut w = BodyWriter::new();
    w.fixed_str(account, NAME_LENGTH);
    w.fixed_str(password, NAME_LENGTH);
    w.u16(version);
    w.reserved(2);
    Packet::new(Opcode::AccountLogin.to_u16(), 0, w.finish())
}

/// Build a `CharacterLogin` packet.
pub fn character_login(name: &str) -> Packet {
    let mut w = BodyWriter::new();
    w.fixed_str(name, NAME_LENGTH);
    w.reserved(2);
    Packet::new(Opcode::CharacterLogin.to_u16(), 0, w.finish())
}

/// Build a `Move` packet.
pub fn move_packet(pos: (u16, u16), dest: (u16, u16)) -> Packet {
    let mut w = BodyWriter::new();
    w.u16(pos.0);
    w.u16(pos.1);
    w.u16(dest.0);
    w.u16(dest.1);
    w.u16(2);
    w.u16(0);
    Packet::new(Opcode::Move.to_u16(), 0, w.finish())
}

/// Build a local `Chat` packet.
pub fn chat_local(message: &str) -> Packet {
    let mut w = BodyWriter::new();
    w.u16(0); // Local
    w.fixed_str("", NAME_LENGTH);
    w.fixed_str(message, CHAT_MESSAGE_LENGTH);
    Packet::new(Opcode::Chat.to_u16(), 0, w.finish())
}

/// Build an `Attack` packet.
pub fn attack_packet(target_id: u16) -> Packet {
    let mut w = BodyWriter::new();
    w.u16(target_id);
    w.u16(0);
    w.reserved(4);
    Packet::new(Opcode::Attack.to_u16(), 0, w.finish())
}

/// Build a `KeepAlive` packet.
pub fn keep_alive(client_time: u32) -> Packet {
    let mut w = BodyWriter::new();
    w.u32(client_time);
    w.reserved(2);
    Packet::new(Opcode::KeepAlive.to_u16(), 0, w.finish())
}
