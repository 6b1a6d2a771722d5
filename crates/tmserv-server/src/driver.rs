//! Server driver.
//!
//! The sans-IO heart of the server: consumes [`ServerEvent`]s (accepted
//! connections, framed packets, collaborator results, ticks) and returns
//! [`ServerAction`]s for the runtime to execute. All session, world and
//! flow-control state lives here; no sockets, clocks or threads do.
//!
//! The inbound pipeline for one packet: opcode catalogue check, fixed-size
//! check, lifecycle-state gate, rate gate, payload decode, handler. Every
//! rejection is typed, counted and either dropped or converted into a close
//! with a recorded [`CloseReason`].

use std::net::SocketAddr;

use rand::SeedableRng;
use rand::rngs::StdRng;
use tmserv_core::env::Environment;
use tmserv_core::rate::{BanList, FlowCounters, RateVerdict};
use tmserv_core::session::{LifecycleState, Session, SessionTimeout};
use tmserv_core::CloseReason;
use tmserv_proto::messages::{self, game, session as session_msgs};
use tmserv_proto::opcode::InboundSize;
use tmserv_proto::{Opcode, Packet, ProtocolError, ServerMessage};
use tmserv_world::{CombatResolver, TickClock, World, WorldEvent};
use tmserv_world::entity::MOB_ID_BASE;

use crate::broadcast::BroadcastRouter;
use crate::config::{DriverConfig, PROTOCOL_VERSION};
use crate::dispatch::{self, DispatchTable, HandlerResult};
use crate::error::ServerError;
use crate::registry::SessionRegistry;
use crate::services::{AuthOutcome, CharacterBlob, CharacterSummary};

/// Log levels carried out of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Noisy per-connection detail.
    Debug,
    /// Session lifecycle milestones.
    Info,
    /// Client misbehavior and recoverable faults.
    Warn,
    /// Server-side faults.
    Error,
}

/// Events the driver consumes.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// The runtime accepted a socket and assigned a session id.
    ConnectionAccepted {
        /// Runtime-assigned session id.
        session_id: u32,
        /// Peer address.
        peer: SocketAddr,
    },
    /// A complete, checksum-valid, deciphered packet arrived.
    PacketReceived {
        /// Source session.
        session_id: u32,
        /// The packet.
        packet: Packet,
    },
    /// Framing or checksum failed on a session's stream.
    FramingFailed {
        /// Source session.
        session_id: u32,
        /// The codec error.
        error: ProtocolError,
    },
    /// The socket is gone (peer closed, transport error, drain finished).
    ConnectionClosed {
        /// The session.
        session_id: u32,
    },
    /// A session's outbound queue overflowed.
    OutboundOverflow {
        /// The session.
        session_id: u32,
    },
    /// The auth collaborator finished a deferred verification.
    AuthCompleted {
        /// The session that logged in.
        session_id: u32,
        /// Account name as submitted.
        account: String,
        /// Collaborator verdict.
        outcome: AuthOutcome,
        /// Character roster (empty unless the verdict was `Ok`).
        roster: Vec<CharacterSummary>,
    },
    /// The character store finished a deferred load.
    CharacterLoaded {
        /// The session entering the world.
        session_id: u32,
        /// Loaded character, `None` if absent or not owned.
        character: Option<CharacterBlob>,
    },
    /// Fixed-step scheduler pulse.
    Tick,
}

/// Actions the runtime executes on the driver's behalf.
#[derive(Debug, Clone)]
pub enum ServerAction {
    /// Queue a packet on a session's outbound queue.
    Send {
        /// Destination session.
        session_id: u32,
        /// Packet to deliver.
        packet: Packet,
    },
    /// Install cipher state for a session's streams.
    ///
    /// Emitted right after the `Initial` packet; everything after it is
    /// ciphered in both directions.
    EnableCipher {
        /// The session.
        session_id: u32,
        /// Negotiated 32-bit key.
        key: u32,
        /// Initial rolling seed.
        seed: u8,
    },
    /// Begin closing a session: stop reading, drain outbound, close.
    Close {
        /// The session.
        session_id: u32,
        /// Recorded reason.
        reason: CloseReason,
    },
    /// Run the auth collaborator off-thread and feed back
    /// [`ServerEvent::AuthCompleted`].
    Authenticate {
        /// The requesting session.
        session_id: u32,
        /// Submitted account name.
        account: String,
        /// Submitted password.
        password: String,
    },
    /// Run the character store off-thread and feed back
    /// [`ServerEvent::CharacterLoaded`].
    LoadCharacter {
        /// The requesting session.
        session_id: u32,
        /// Owning account.
        account_id: u32,
        /// Character name.
        name: String,
    },
    /// Persist a character snapshot off-thread. Fire and forget.
    SaveCharacter {
        /// Owning account.
        account_id: u32,
        /// Snapshot to persist.
        blob: CharacterBlob,
    },
    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message.
        message: String,
    },
}

/// Snapshot of the driver's exported metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriverStats {
    /// Live sessions.
    pub sessions: usize,
    /// Sessions in the `InGame` state.
    pub in_game: usize,
    /// Protocol/flow counters.
    pub counters: FlowCounters,
    /// Swallowed AI faults.
    pub ai_errors: u64,
    /// Drift of the most recent tick.
    pub tick_drift_ms: u64,
    /// Ticks skipped for catch-up since start.
    pub ticks_skipped: u64,
}

/// The sans-IO server core.
pub struct ServerDriver<E: Environment> {
    env: E,
    start: E::Instant,
    pub(crate) config: DriverConfig,
    pub(crate) registry: SessionRegistry<E::Instant>,
    pub(crate) world: World,
    pub(crate) router: BroadcastRouter,
    pub(crate) resolver: Box<dyn CombatResolver>,
    dispatch: DispatchTable<E>,
    bans: BanList,
    pub(crate) counters: FlowCounters,
    clock: TickClock,
    pub(crate) rng: StdRng,
}

impl<E: Environment> ServerDriver<E> {
    /// Create a driver around a world and combat resolver.
    pub fn new(env: E, config: DriverConfig, world: World, resolver: Box<dyn CombatResolver>) -> Self {
        let start = env.now();
        let rng = StdRng::seed_from_u64(env.random_u64());
        let clock = TickClock::new(config.tick_ms, 0);
        let router = BroadcastRouter::new(config.view_radius);
        let bans = BanList::new(config.ban_ttl_ms);

        Self {
            env,
            start,
            config,
            registry: SessionRegistry::new(),
            world,
            router,
            resolver,
            dispatch: dispatch::build_table(),
            bans,
            counters: FlowCounters::default(),
            clock,
            rng,
        }
    }

    /// Milliseconds since driver start.
    pub(crate) fn now_ms(&self) -> u64 {
        (self.env.now() - self.start).as_millis() as u64
    }

    /// Metrics snapshot.
    #[must_use]
    pub fn stats(&self) -> DriverStats {
        let in_game = self
            .registry
            .ids()
            .into_iter()
            .filter(|&id| {
                self.registry
                    .get(id)
                    .is_some_and(|e| e.session.state() == LifecycleState::InGame)
            })
            .count();

        DriverStats {
            sessions: self.registry.len(),
            in_game,
            counters: self.counters,
            ai_errors: self.world.spawner.ai_errors,
            tick_drift_ms: self.clock.last_drift_ms(),
            ticks_skipped: self.clock.total_skipped(),
        }
    }

    /// Read-only session registry access (tests, runtime diagnostics).
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry<E::Instant> {
        &self.registry
    }

    /// Read-only world access (tests, runtime diagnostics).
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Process one event, producing actions for the runtime.
    pub fn process_event(&mut self, event: ServerEvent) -> Result<Vec<ServerAction>, ServerError> {
        match event {
            ServerEvent::ConnectionAccepted { session_id, peer } => {
                Ok(self.on_connection_accepted(session_id, peer))
            },
            ServerEvent::PacketReceived { session_id, packet } => {
                Ok(self.on_packet(session_id, packet))
            },
            ServerEvent::FramingFailed { session_id, error } => {
                Ok(self.on_framing_failed(session_id, &error))
            },
            ServerEvent::ConnectionClosed { session_id } => Ok(self.on_connection_closed(session_id)),
            ServerEvent::OutboundOverflow { session_id } => {
                let mut actions = Vec::new();
                self.close_session(session_id, CloseReason::SendOverflow, &mut actions);
                Ok(actions)
            },
            ServerEvent::AuthCompleted { session_id, account, outcome, roster } => {
                Ok(self.on_auth_completed(session_id, &account, outcome, roster))
            },
            ServerEvent::CharacterLoaded { session_id, character } => {
                Ok(self.on_character_loaded(session_id, character))
            },
            ServerEvent::Tick => Ok(self.on_tick()),
        }
    }

    fn on_connection_accepted(&mut self, session_id: u32, peer: SocketAddr) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        let now_ms = self.now_ms();

        if self.bans.is_banned(peer.ip(), now_ms) {
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!("rejected banned peer {peer}"),
            });
            actions.push(ServerAction::Close { session_id, reason: CloseReason::Banned });
            return actions;
        }

        if self.registry.len() >= self.config.max_connections {
            actions.push(ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("connection limit reached, rejecting {peer}"),
            });
            actions.push(ServerAction::Close { session_id, reason: CloseReason::ServerFull });
            return actions;
        }

        let mut session = Session::new(self.env.now(), self.config.session.clone());
        let key = self.env.random_u32();
        let seed = (self.env.random_u32() & 0xFF) as u8;

        // The Initial packet itself travels in the clear; the client only
        // has the key after reading it.
        if session.handshake_sent().is_err() {
            // Fresh sessions always start in Accepted.
            return actions;
        }
        if !self.registry.create(session_id, peer, session, key, seed, self.config.flood) {
            actions.push(ServerAction::Log {
                level: LogLevel::Error,
                message: format!("duplicate runtime session id {session_id}"),
            });
            actions.push(ServerAction::Close { session_id, reason: CloseReason::TransportClosed });
            return actions;
        }

        let client_id = self.registry.get(session_id).map_or(0, |e| e.client_id);
        let initial = ServerMessage::Initial(session_msgs::Initial {
            version: PROTOCOL_VERSION,
            cipher_key: key,
            cipher_seed: seed,
        });

        actions.push(ServerAction::Send { session_id, packet: initial.into_packet(client_id) });
        actions.push(ServerAction::EnableCipher { session_id, key, seed });
        actions.push(ServerAction::Log {
            level: LogLevel::Debug,
            message: format!("session {session_id} accepted from {peer}"),
        });
        actions
    }

    fn on_packet(&mut self, session_id: u32, packet: Packet) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        let now = self.env.now();
        let now_ms = self.now_ms();

        let Some(entry) = self.registry.get_mut(session_id) else {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("packet for unknown session {session_id}"),
            }];
        };

        // Inbound packets for a closing session are dropped silently.
        if matches!(entry.session.state(), LifecycleState::Closing | LifecycleState::Closed) {
            return actions;
        }

        entry.session.touch(now);
        entry.stats.packets_received += 1;

        let raw_opcode = packet.opcode();
        let Some(opcode) = Opcode::from_u16(raw_opcode) else {
            self.counters.invalid_packets += 1;
            self.close_session(session_id, CloseReason::UnknownOpcode, &mut actions);
            return actions;
        };

        match opcode.inbound_size() {
            InboundSize::Fixed(expected) if packet.wire_size() != usize::from(expected) => {
                self.counters.invalid_packets += 1;
                actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!(
                        "session {session_id}: size mismatch for {opcode:?}: got {}, expected {expected}",
                        packet.wire_size()
                    ),
                });
                self.close_session(session_id, CloseReason::BadSize, &mut actions);
                return actions;
            },
            InboundSize::ServerOnly => {
                self.counters.invalid_packets += 1;
                self.close_session(session_id, CloseReason::UnknownOpcode, &mut actions);
                return actions;
            },
            InboundSize::Fixed(_) | InboundSize::Variable => {},
        }

        // First valid packet acknowledges the protocol handshake.
        let entry = match self.registry.get_mut(session_id) {
            Some(entry) => entry,
            None => return actions,
        };
        if entry.session.state() == LifecycleState::HandshakeSent {
            let _ = entry.session.protocol_acknowledged();
        }

        if !entry.session.allows(opcode) {
            self.counters.invalid_packets += 1;
            actions.push(ServerAction::Log {
                level: LogLevel::Warn,
                message: format!(
                    "session {session_id}: {opcode:?} not permitted in {:?}",
                    entry.session.state()
                ),
            });
            self.register_violation(session_id, now_ms, &mut actions);
            return actions;
        }

        let Some(handler_entry) = self.dispatch.get(opcode) else {
            // Every allowed opcode is registered at boot; reaching this is
            // a server bug, not client misbehavior.
            return vec![ServerAction::Log {
                level: LogLevel::Error,
                message: format!("no handler registered for {opcode:?}"),
            }];
        };
        let rate = handler_entry.rate;
        let handler = handler_entry.handler;

        let entry = match self.registry.get_mut(session_id) {
            Some(entry) => entry,
            None => return actions,
        };
        match entry.rate.check(raw_opcode, rate, now_ms) {
            RateVerdict::Allowed => {},
            RateVerdict::Throttled => {
                self.counters.throttled_packets += 1;
                return actions;
            },
            RateVerdict::FloodDetected => {
                self.counters.throttled_packets += 1;
                self.flood_close(session_id, &mut actions);
                return actions;
            },
        }

        let message = match messages::decode_client(&packet) {
            Ok(message) => message,
            Err(error) => {
                self.counters.invalid_packets += 1;
                let reason = if error.is_desync_candidate() {
                    CloseReason::DesyncedCrypto
                } else {
                    CloseReason::BadSize
                };
                actions.push(ServerAction::Log {
                    level: LogLevel::Warn,
                    message: format!("session {session_id}: payload decode failed: {error}"),
                });
                self.close_session(session_id, reason, &mut actions);
                return actions;
            },
        };

        match handler(self, session_id, message, &mut actions) {
            HandlerResult::Ok | HandlerResult::Deferred => {},
            HandlerResult::CloseConnection(reason) => {
                self.close_session(session_id, reason, &mut actions);
            },
        }
        actions
    }

    fn on_framing_failed(&mut self, session_id: u32, error: &ProtocolError) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        let reason = match error {
            ProtocolError::BadChecksum { .. } => {
                self.counters.checksum_errors += 1;
                CloseReason::BadChecksum
            },
            ProtocolError::UnknownOpcode(_) => {
                self.counters.invalid_packets += 1;
                CloseReason::UnknownOpcode
            },
            ProtocolError::InvalidPayload { .. } => {
                self.counters.invalid_packets += 1;
                CloseReason::DesyncedCrypto
            },
            ProtocolError::BadSize { .. }
            | ProtocolError::SizeMismatch { .. }
            | ProtocolError::TruncatedPayload { .. }
            | ProtocolError::IncompleteHeader(_) => {
                self.counters.invalid_packets += 1;
                CloseReason::BadSize
            },
        };

        actions.push(ServerAction::Log {
            level: LogLevel::Warn,
            message: format!("session {session_id}: framing failed: {error}"),
        });
        self.close_session(session_id, reason, &mut actions);
        actions
    }

    fn on_connection_closed(&mut self, session_id: u32) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        self.detach_character(session_id, &mut actions);

        if let Some(entry) = self.registry.remove(session_id) {
            let reason = entry.session.close_reason().unwrap_or(CloseReason::TransportClosed);
            actions.push(ServerAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "session {session_id} closed: {reason} (rx {}, tx {})",
                    entry.stats.packets_received, entry.stats.packets_sent
                ),
            });
        }
        actions
    }

    fn on_auth_completed(
        &mut self,
        session_id: u32,
        account: &str,
        outcome: AuthOutcome,
        roster: Vec<CharacterSummary>,
    ) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        let Some(entry) = self.registry.get_mut(session_id) else { return actions };
        entry.auth_in_flight = false;
        if entry.session.state() != LifecycleState::AwaitingAuth {
            return actions;
        }
        let client_id = entry.client_id;

        match outcome {
            AuthOutcome::Ok { account_id, permission } => {
                // Duplicate login: the older session loses.
                if let Some(older) = self.registry.bind_account(session_id, account) {
                    actions.push(ServerAction::Log {
                        level: LogLevel::Info,
                        message: format!(
                            "account {account} already online as session {older}, displacing"
                        ),
                    });
                    self.close_session(older, CloseReason::DuplicateLogin, &mut actions);
                }

                let Some(entry) = self.registry.get_mut(session_id) else { return actions };
                let identity = tmserv_core::session::AccountIdentity {
                    account_id,
                    name: account.to_string(),
                    permission,
                };
                if entry.session.authenticate(identity).is_err() {
                    self.close_session(session_id, CloseReason::AuthFailed, &mut actions);
                    return actions;
                }

                let response =
                    ServerMessage::AccountLoginResponse(session_msgs::AccountLoginResponse {
                        result: 0,
                        permission,
                        notice: "Welcome".to_string(),
                    });
                actions.push(ServerAction::Send {
                    session_id,
                    packet: response.into_packet(client_id),
                });

                let list = ServerMessage::CharacterList(session_msgs::CharacterList {
                    characters: roster
                        .into_iter()
                        .map(|c| session_msgs::CharacterSummary {
                            name: c.name,
                            class_id: c.class_id,
                            level: c.level,
                        })
                        .collect(),
                });
                actions.push(ServerAction::Send { session_id, packet: list.into_packet(client_id) });

                if let Some(entry) = self.registry.get_mut(session_id) {
                    let _ = entry.session.character_list_sent();
                }
                actions.push(ServerAction::Log {
                    level: LogLevel::Info,
                    message: format!("session {session_id} authenticated as {account}"),
                });
            },
            AuthOutcome::BadCredentials | AuthOutcome::MaintenanceLock | AuthOutcome::Banned => {
                let (result, reason) = match outcome {
                    AuthOutcome::BadCredentials => (1, CloseReason::AuthFailed),
                    AuthOutcome::Banned => (2, CloseReason::Banned),
                    _ => (3, CloseReason::AuthFailed),
                };

                // The result code reaches the client before the close so it
                // can show a meaningful message.
                let response =
                    ServerMessage::AccountLoginResponse(session_msgs::AccountLoginResponse {
                        result,
                        permission: 0,
                        notice: String::new(),
                    });
                actions.push(ServerAction::Send {
                    session_id,
                    packet: response.into_packet(client_id),
                });
                self.close_session(session_id, reason, &mut actions);
            },
        }
        actions
    }

    fn on_character_loaded(
        &mut self,
        session_id: u32,
        character: Option<CharacterBlob>,
    ) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        let Some(entry) = self.registry.get_mut(session_id) else { return actions };
        entry.load_in_flight = false;
        if entry.session.state() != LifecycleState::CharacterSelect {
            return actions;
        }
        let client_id = entry.client_id;

        let Some(blob) = character else {
            let response = ServerMessage::CharacterLoginResponse(
                session_msgs::CharacterLoginResponse::failure(1),
            );
            actions.push(ServerAction::Send { session_id, packet: response.into_packet(client_id) });
            return actions;
        };

        self.enter_world(session_id, blob, &mut actions);
        actions
    }

    fn on_tick(&mut self) -> Vec<ServerAction> {
        let mut actions = Vec::new();
        let now_ms = self.now_ms();

        let Some(_report) = self.clock.poll(now_ms) else {
            return actions;
        };

        let players = self.registry.players_by_map();
        let wall_secs = self.env.wall_clock_secs();
        let events = self.world.tick(
            now_ms,
            wall_secs,
            &players,
            &self.registry,
            self.resolver.as_ref(),
            &mut self.rng,
        );
        for event in events {
            self.apply_world_event(event, now_ms, &mut actions);
        }

        self.run_session_timers(now_ms, &mut actions);
        actions
    }

    fn apply_world_event(
        &mut self,
        event: WorldEvent,
        now_ms: u64,
        actions: &mut Vec<ServerAction>,
    ) {
        match event {
            WorldEvent::MobSpawned { mob_id, template_id, position, hp, max_hp } => {
                let message = ServerMessage::EntitySpawn(game::EntitySpawn {
                    entity_id: mob_id,
                    template_id,
                    pos_x: position.x,
                    pos_y: position.y,
                    flags: 0,
                    hp,
                    max_hp,
                });
                self.broadcast_view(position.map, position.x, position.y, &message, None, actions);
            },
            WorldEvent::MobMoved { mob_id, position, speed } => {
                let message = ServerMessage::MoveNotify(game::MoveNotify {
                    entity_id: mob_id,
                    pos_x: position.x,
                    pos_y: position.y,
                    dest_x: position.x,
                    dest_y: position.y,
                    speed,
                });
                self.broadcast_view(position.map, position.x, position.y, &message, None, actions);
            },
            WorldEvent::MobAttacked { mob_id, target_id, result, position } => {
                let defender_hp = self.apply_damage_to_character(target_id, result.damage, now_ms);
                let message = ServerMessage::AttackResult(game::AttackResult {
                    attacker_id: mob_id,
                    defender_id: target_id,
                    damage: result.damage as u16,
                    flags: result.flags,
                    defender_hp,
                });
                self.broadcast_view(position.map, position.x, position.y, &message, None, actions);
            },
            WorldEvent::MobDied { mob_id, position, killer, loot } => {
                let message = ServerMessage::EntityDespawn(game::EntityDespawn {
                    entity_id: mob_id,
                    reason: 1,
                });
                self.broadcast_view(position.map, position.x, position.y, &message, None, actions);
                actions.push(ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!(
                        "mob {mob_id} died at ({},{}) killer={killer:?} loot={loot:?}",
                        position.x, position.y
                    ),
                });
            },
            WorldEvent::EffectExpired { mob_id, effect_type, position } => {
                let message = ServerMessage::EffectNotify(game::EffectNotify {
                    entity_id: mob_id,
                    effect_type,
                    magnitude: 0,
                    duration_ms: 0,
                });
                self.broadcast_view(position.map, position.x, position.y, &message, None, actions);
            },
        }
    }

    fn run_session_timers(&mut self, now_ms: u64, actions: &mut Vec<ServerAction>) {
        let now = self.env.now();

        for session_id in self.registry.ids() {
            let Some(entry) = self.registry.get_mut(session_id) else { continue };

            match entry.session.check_timeout(now) {
                Some(SessionTimeout::Handshake) => {
                    self.close_session(session_id, CloseReason::HandshakeTimeout, actions);
                    continue;
                },
                Some(SessionTimeout::Idle) => {
                    self.close_session(session_id, CloseReason::IdleTimeout, actions);
                    continue;
                },
                Some(SessionTimeout::DrainExpired) => {
                    entry.session.finalize_close();
                    actions.extend(self.on_connection_closed(session_id));
                    continue;
                },
                None => {},
            }

            // Keep-alive emission to in-game sessions; the echo feeds RTT.
            let Some(entry) = self.registry.get_mut(session_id) else { continue };
            if entry.session.state() == LifecycleState::InGame {
                let due = entry
                    .last_keepalive
                    .is_none_or(|(_, sent)| now_ms.saturating_sub(sent) >= self.config.keepalive_interval_ms);
                if due {
                    let value = now_ms as u32;
                    entry.last_keepalive = Some((value, now_ms));
                    let client_id = entry.client_id;
                    entry.stats.packets_sent += 1;
                    let message =
                        ServerMessage::KeepAlive(session_msgs::KeepAlive { client_time: value });
                    actions.push(ServerAction::Send {
                        session_id,
                        packet: message.into_packet(client_id),
                    });
                }
            }
        }
    }

    /// World entry after a successful character load.
    pub(crate) fn enter_world(
        &mut self,
        session_id: u32,
        blob: CharacterBlob,
        actions: &mut Vec<ServerAction>,
    ) {
        use tmserv_world::entity::Position;

        let Some(entry) = self.registry.get_mut(session_id) else { return };
        let client_id = entry.client_id;
        let char_id = entry.client_id;

        let identity = tmserv_core::session::CharacterIdentity {
            char_id,
            name: blob.name.clone(),
        };
        if entry.session.begin_world_entry(identity).is_err() {
            return;
        }

        let position = Position { map: blob.map, x: blob.x, y: blob.y };
        let record = crate::registry::CharacterRecord {
            char_id,
            name: blob.name.clone(),
            class_id: blob.class_id,
            level: blob.level,
            position,
            vitals: blob.vitals,
            stats: blob.stats,
            guild: blob.guild,
            gold: 1000,
        };
        self.registry.bind_character(session_id, record);

        let response = ServerMessage::CharacterLoginResponse(session_msgs::CharacterLoginResponse {
            result: 0,
            char_id,
            pos_x: position.x,
            pos_y: position.y,
            map_id: position.map,
            level: blob.level,
            hp: blob.vitals.hp,
            max_hp: blob.vitals.max_hp,
            mp: blob.vitals.mp,
            max_mp: blob.vitals.max_mp,
        });
        actions.push(ServerAction::Send { session_id, packet: response.into_packet(client_id) });

        // Entry packets are queued; the session is now eligible for area
        // and broadcast routing.
        if let Some(entry) = self.registry.get_mut(session_id) {
            let _ = entry.session.complete_world_entry();
        }

        // Announce the newcomer to the neighborhood, then the neighborhood
        // to the newcomer.
        let spawn = ServerMessage::EntitySpawn(game::EntitySpawn {
            entity_id: char_id,
            template_id: 0,
            pos_x: position.x,
            pos_y: position.y,
            flags: 0,
            hp: blob.vitals.hp,
            max_hp: blob.vitals.max_hp,
        });
        self.broadcast_view(position.map, position.x, position.y, &spawn, Some(session_id), actions);

        let nearby = self.world.area.query_radius(
            position.map,
            position.x,
            position.y,
            self.config.view_radius,
        );
        for other in nearby {
            let message = if other < MOB_ID_BASE {
                let Some(other_session) = self.registry.session_by_char_id(other) else { continue };
                if other_session == session_id {
                    continue;
                }
                let Some(other_entry) = self.registry.get(other_session) else { continue };
                let Some(other_char) = other_entry.character.as_ref() else { continue };
                ServerMessage::EntitySpawn(game::EntitySpawn {
                    entity_id: other,
                    template_id: 0,
                    pos_x: other_char.position.x,
                    pos_y: other_char.position.y,
                    flags: 0,
                    hp: other_char.vitals.hp,
                    max_hp: other_char.vitals.max_hp,
                })
            } else {
                let Some(mob) = self.world.spawner.mob(other) else { continue };
                if !mob.is_alive() {
                    continue;
                }
                ServerMessage::EntitySpawn(game::EntitySpawn {
                    entity_id: other,
                    template_id: mob.template.id,
                    pos_x: mob.position.x,
                    pos_y: mob.position.y,
                    flags: 0,
                    hp: mob.vitals.hp,
                    max_hp: mob.vitals.max_hp,
                })
            };
            actions.push(ServerAction::Send {
                session_id,
                packet: message.into_packet(client_id),
            });
        }

        self.world.area.update(char_id, position);
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("session {session_id} entered the world as {}", blob.name),
        });
    }

    /// Apply mob damage to a character; returns hit points afterwards.
    fn apply_damage_to_character(&mut self, char_id: u16, damage: u32, _now_ms: u64) -> u32 {
        let Some(session_id) = self.registry.session_by_char_id(char_id) else { return 0 };
        let Some(entry) = self.registry.get_mut(session_id) else { return 0 };
        let Some(character) = entry.character.as_mut() else { return 0 };

        character.vitals.hp = character.vitals.hp.saturating_sub(damage);
        let hp = character.vitals.hp;
        if hp == 0 {
            // Downed characters stop drawing aggro; the AI's next threat
            // refresh drops them.
            self.world.spawner.forget_entity(char_id);
        }
        hp
    }

    /// Area broadcast helper used by handlers and world-event conversion.
    pub(crate) fn broadcast_view(
        &mut self,
        map: u16,
        x: u16,
        y: u16,
        message: &ServerMessage,
        except: Option<u32>,
        actions: &mut Vec<ServerAction>,
    ) {
        let deliveries =
            self.router.to_view(&self.registry, &self.world.area, map, x, y, message, except);
        for (session_id, packet) in deliveries {
            if let Some(entry) = self.registry.get_mut(session_id) {
                entry.stats.packets_sent += 1;
            }
            actions.push(ServerAction::Send { session_id, packet });
        }
    }

    /// Direct send helper for handlers.
    pub(crate) fn send_to(
        &mut self,
        session_id: u32,
        message: ServerMessage,
        actions: &mut Vec<ServerAction>,
    ) {
        for (sid, packet) in self.router.send(&self.registry, session_id, message) {
            if let Some(entry) = self.registry.get_mut(sid) {
                entry.stats.packets_sent += 1;
            }
            actions.push(ServerAction::Send { session_id: sid, packet });
        }
    }

    /// Record a flood-budget violation; closes and bans on threshold.
    pub(crate) fn register_violation(
        &mut self,
        session_id: u32,
        now_ms: u64,
        actions: &mut Vec<ServerAction>,
    ) {
        let Some(entry) = self.registry.get_mut(session_id) else { return };
        if entry.rate.record_violation(now_ms) == RateVerdict::FloodDetected {
            self.flood_close(session_id, actions);
        }
    }

    fn flood_close(&mut self, session_id: u32, actions: &mut Vec<ServerAction>) {
        let now_ms = self.now_ms();
        if let Some(entry) = self.registry.get(session_id) {
            self.bans.ban(entry.peer.ip(), now_ms);
            actions.push(ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("session {session_id} flooding, banning {}", entry.peer.ip()),
            });
        }
        self.close_session(session_id, CloseReason::FloodDetected, actions);
    }

    /// Transition a session to `Closing` and tell the runtime.
    pub(crate) fn close_session(
        &mut self,
        session_id: u32,
        reason: CloseReason,
        actions: &mut Vec<ServerAction>,
    ) {
        let now = self.env.now();
        self.detach_character(session_id, actions);

        let Some(entry) = self.registry.get_mut(session_id) else {
            actions.push(ServerAction::Close { session_id, reason });
            return;
        };
        if matches!(entry.session.state(), LifecycleState::Closing | LifecycleState::Closed) {
            return;
        }

        entry.session.begin_close(reason, now);
        actions.push(ServerAction::Close { session_id, reason });
    }

    /// Pull a character out of the world: area index, threat tables, and a
    /// despawn notification for observers. Idempotent.
    fn detach_character(&mut self, session_id: u32, actions: &mut Vec<ServerAction>) {
        let Some(record) = self.registry.unbind_character(session_id) else { return };
        let (char_id, position) = (record.char_id, record.position);

        // Snapshot for the character store before the record is dropped.
        if let Some(account_id) =
            self.registry.get(session_id).and_then(|e| e.session.account()).map(|a| a.account_id)
        {
            actions.push(ServerAction::SaveCharacter {
                account_id,
                blob: CharacterBlob {
                    name: record.name.clone(),
                    class_id: record.class_id,
                    level: record.level,
                    map: position.map,
                    x: position.x,
                    y: position.y,
                    vitals: record.vitals,
                    stats: record.stats,
                    guild: record.guild,
                },
            });
        }

        let message =
            ServerMessage::EntityDespawn(game::EntityDespawn { entity_id: char_id, reason: 2 });
        self.broadcast_view(position.map, position.x, position.y, &message, Some(session_id), actions);

        self.world.area.remove(char_id);
        self.world.spawner.forget_entity(char_id);
    }
}
