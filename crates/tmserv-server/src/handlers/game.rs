//! Movement, combat, chat and GM commands.

use tmserv_core::env::Environment;
use tmserv_proto::messages::game;
use tmserv_proto::{ClientMessage, ServerMessage};
use tmserv_world::WorldEvent;
use tmserv_world::entity::{MOB_ID_BASE, Position};

use crate::dispatch::HandlerResult;
use crate::driver::{LogLevel, ServerAction, ServerDriver};

/// Farthest a single move request may jump, in tiles.
const MAX_MOVE_DISTANCE: u16 = 32;

/// Reach of a plain melee attack, in tiles.
const MELEE_RANGE: u16 = 2;

/// Reach of a skill-tagged attack, in tiles.
const SKILL_RANGE: u16 = 8;

impl<E: Environment> ServerDriver<E> {
    /// `Move`: validate, update the area index, notify observers.
    pub(crate) fn handle_move(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::Move(request) = message else { return HandlerResult::Ok };
        let now_ms = self.now_ms();

        let Some(entry) = self.registry.get(session_id) else { return HandlerResult::Ok };
        let Some(character) = entry.character.as_ref() else { return HandlerResult::Ok };
        let (char_id, from) = (character.char_id, character.position);

        let dest = Position { map: from.map, x: request.dest_x, y: request.dest_y };
        if from.distance(&dest) > MAX_MOVE_DISTANCE {
            // Teleport-distance jump: reject and count it against the
            // flood budget.
            actions.push(ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("session {session_id}: move jump of {} tiles", from.distance(&dest)),
            });
            self.register_violation(session_id, now_ms, actions);
            return HandlerResult::Ok;
        }
        if !self.world.area.is_walkable(dest.map, dest.x, dest.y) {
            return HandlerResult::Ok;
        }

        if let Some(character) =
            self.registry.get_mut(session_id).and_then(|e| e.character.as_mut())
        {
            character.position = dest;
        }
        self.world.area.update(char_id, dest);

        let notify = ServerMessage::MoveNotify(game::MoveNotify {
            entity_id: char_id,
            pos_x: request.pos_x,
            pos_y: request.pos_y,
            dest_x: dest.x,
            dest_y: dest.y,
            speed: request.speed,
        });
        self.broadcast_view(dest.map, dest.x, dest.y, &notify, Some(session_id), actions);
        HandlerResult::Ok
    }

    /// `Attack`: resolve combat against a mob or another character.
    pub(crate) fn handle_attack(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::Attack(request) = message else { return HandlerResult::Ok };
        let skill = (request.skill_id != 0).then_some(request.skill_id);
        self.resolve_player_attack(session_id, request.target_id, skill, actions);
        HandlerResult::Ok
    }

    /// `SkillUse`: targeted skills resolve like attacks; ground casts are
    /// acknowledged and broadcast as an effect.
    pub(crate) fn handle_skill_use(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::SkillUse(request) = message else { return HandlerResult::Ok };

        if request.target_id != 0 {
            self.resolve_player_attack(session_id, request.target_id, Some(request.skill_id), actions);
            return HandlerResult::Ok;
        }

        let Some(entry) = self.registry.get(session_id) else { return HandlerResult::Ok };
        let Some(character) = entry.character.as_ref() else { return HandlerResult::Ok };
        let (char_id, position) = (character.char_id, character.position);

        let result = ServerMessage::SkillResult(game::SkillResult {
            result: 0,
            caster_id: char_id,
            skill_id: request.skill_id,
        });
        self.broadcast_view(position.map, position.x, position.y, &result, None, actions);
        HandlerResult::Ok
    }

    fn resolve_player_attack(
        &mut self,
        session_id: u32,
        target_id: u16,
        skill: Option<u16>,
        actions: &mut Vec<ServerAction>,
    ) {
        let now_ms = self.now_ms();

        let Some(entry) = self.registry.get(session_id) else { return };
        let Some(character) = entry.character.as_ref() else { return };
        let (char_id, position, stats) = (character.char_id, character.position, character.stats);

        let reach = if skill.is_some() { SKILL_RANGE } else { MELEE_RANGE };

        if target_id >= MOB_ID_BASE {
            let Some(mob) = self.world.spawner.mob(target_id) else { return };
            if !mob.is_alive() || mob.position.distance(&position) > reach {
                return;
            }
            let (defender_stats, mob_position) =
                (tmserv_world::entity::Combatant::combat_stats(mob), mob.position);

            let result =
                self.resolver.resolve_attack(stats, defender_stats, skill, &mut self.rng);

            let mut world_events = Vec::new();
            let hp_after = if result.damage > 0 {
                self.world
                    .spawner
                    .apply_damage(
                        target_id,
                        char_id,
                        result.damage,
                        now_ms,
                        &mut self.world.area,
                        &mut self.rng,
                        &mut world_events,
                    )
                    .unwrap_or(0)
            } else {
                self.world.spawner.mob(target_id).map_or(0, |m| m.vitals.hp)
            };

            let outcome = ServerMessage::AttackResult(game::AttackResult {
                attacker_id: char_id,
                defender_id: target_id,
                damage: result.damage as u16,
                flags: result.flags,
                defender_hp: hp_after,
            });
            self.broadcast_view(
                mob_position.map,
                mob_position.x,
                mob_position.y,
                &outcome,
                None,
                actions,
            );

            // Death, loot and despawn notifications come out of the spawn
            // engine as world events.
            for event in world_events {
                self.apply_world_event_from_handler(event, now_ms, actions);
            }
        } else {
            // Player versus player.
            let Some(defender_session) = self.registry.session_by_char_id(target_id) else {
                return;
            };
            let Some(defender_entry) = self.registry.get(defender_session) else { return };
            let Some(defender) = defender_entry.character.as_ref() else { return };
            if !defender.vitals.is_alive() || defender.position.distance(&position) > reach {
                return;
            }
            let (defender_stats, defender_position) = (defender.stats, defender.position);

            let result =
                self.resolver.resolve_attack(stats, defender_stats, skill, &mut self.rng);

            let hp_after = self
                .registry
                .get_mut(defender_session)
                .and_then(|e| e.character.as_mut())
                .map_or(0, |c| {
                    c.vitals.hp = c.vitals.hp.saturating_sub(result.damage);
                    c.vitals.hp
                });
            if hp_after == 0 {
                self.world.spawner.forget_entity(target_id);
            }

            let outcome = ServerMessage::AttackResult(game::AttackResult {
                attacker_id: char_id,
                defender_id: target_id,
                damage: result.damage as u16,
                flags: result.flags,
                defender_hp: hp_after,
            });
            self.broadcast_view(
                defender_position.map,
                defender_position.x,
                defender_position.y,
                &outcome,
                None,
                actions,
            );
        }
    }

    /// Convert a world event produced inside a handler into packets.
    pub(crate) fn apply_world_event_from_handler(
        &mut self,
        event: WorldEvent,
        _now_ms: u64,
        actions: &mut Vec<ServerAction>,
    ) {
        match event {
            WorldEvent::MobDied { mob_id, position, killer, loot } => {
                let message = ServerMessage::EntityDespawn(game::EntityDespawn {
                    entity_id: mob_id,
                    reason: 1,
                });
                self.broadcast_view(position.map, position.x, position.y, &message, None, actions);
                actions.push(ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!(
                        "mob {mob_id} killed at ({},{}) by {killer:?} loot={loot:?}",
                        position.x, position.y
                    ),
                });
            },
            // Damage from players produces no other event kinds today;
            // anything new is surfaced on the next tick instead.
            _ => {},
        }
    }

    /// `Chat`: route a line to its channel.
    pub(crate) fn handle_chat(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::Chat(chat) = message else { return HandlerResult::Ok };

        let Some(entry) = self.registry.get(session_id) else { return HandlerResult::Ok };
        let Some(character) = entry.character.as_ref() else { return HandlerResult::Ok };
        let (position, speaker, party, guild) = (
            character.position,
            character.name.clone(),
            entry.party,
            character.guild,
        );

        // The speaker name always comes from the server's own record.
        let outbound = ServerMessage::Chat(game::Chat {
            chat_type: chat.chat_type,
            name: speaker,
            message: chat.message.clone(),
        });

        match chat.chat_type {
            game::ChatType::Local => {
                self.broadcast_view(position.map, position.x, position.y, &outbound, None, actions);
            },
            game::ChatType::Party => {
                let Some(party_id) = party else { return HandlerResult::Ok };
                let deliveries = self.router.to_party(&self.registry, party_id, &outbound, None);
                for (sid, packet) in deliveries {
                    actions.push(ServerAction::Send { session_id: sid, packet });
                }
            },
            game::ChatType::Guild => {
                let Some(guild_id) = guild else { return HandlerResult::Ok };
                let deliveries = self.router.to_guild(&self.registry, guild_id, &outbound, None);
                for (sid, packet) in deliveries {
                    actions.push(ServerAction::Send { session_id: sid, packet });
                }
            },
            game::ChatType::Whisper => {
                // The name field carries the recipient on the way in.
                let Some(target) = self.registry.lookup_by_character(&chat.name) else {
                    return HandlerResult::Ok;
                };
                self.send_to(target, outbound.clone(), actions);
                self.send_to(session_id, outbound, actions);
            },
            game::ChatType::Global => {
                let deliveries = self.router.to_all(&self.registry, &outbound, None);
                for (sid, packet) in deliveries {
                    actions.push(ServerAction::Send { session_id: sid, packet });
                }
            },
        }
        HandlerResult::Ok
    }

    /// `GmCommand`: permission-gated operational commands.
    pub(crate) fn handle_gm_command(
        &mut self,
        session_id: u32,
        message: ClientMessage,
        actions: &mut Vec<ServerAction>,
    ) -> HandlerResult {
        let ClientMessage::GmCommand(command) = message else { return HandlerResult::Ok };
        let now_ms = self.now_ms();

        let Some(entry) = self.registry.get(session_id) else { return HandlerResult::Ok };
        let permitted = entry.session.account().is_some_and(|a| a.permission > 0);
        if !permitted {
            actions.push(ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("session {session_id}: gm command without permission"),
            });
            self.register_violation(session_id, now_ms, actions);
            return HandlerResult::Ok;
        }

        let line = command.command;
        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("/teleport") => {
                let args: Vec<u16> = parts.filter_map(|p| p.parse().ok()).collect();
                if let [map, x, y] = args[..] {
                    self.gm_teleport(session_id, map, x, y, actions);
                }
            },
            Some("/broadcast") => {
                let text = line.trim_start_matches("/broadcast").trim().to_string();
                let outbound = ServerMessage::Chat(game::Chat {
                    chat_type: game::ChatType::Global,
                    name: "SERVER".to_string(),
                    message: text,
                });
                let deliveries = self.router.to_all(&self.registry, &outbound, None);
                for (sid, packet) in deliveries {
                    actions.push(ServerAction::Send { session_id: sid, packet });
                }
            },
            Some(other) => {
                actions.push(ServerAction::Log {
                    level: LogLevel::Info,
                    message: format!("session {session_id}: unknown gm command {other}"),
                });
            },
            None => {},
        }
        HandlerResult::Ok
    }

    fn gm_teleport(
        &mut self,
        session_id: u32,
        map: u16,
        x: u16,
        y: u16,
        actions: &mut Vec<ServerAction>,
    ) {
        let Some(entry) = self.registry.get(session_id) else { return };
        let Some(character) = entry.character.as_ref() else { return };
        let (char_id, old_position) = (character.char_id, character.position);

        // Observers at the old location see a despawn, at the new one a
        // spawn.
        let despawn =
            ServerMessage::EntityDespawn(game::EntityDespawn { entity_id: char_id, reason: 0 });
        self.broadcast_view(
            old_position.map,
            old_position.x,
            old_position.y,
            &despawn,
            Some(session_id),
            actions,
        );

        let destination = Position { map, x, y };
        let vitals = self
            .registry
            .get_mut(session_id)
            .and_then(|e| e.character.as_mut())
            .map_or_else(
                || tmserv_world::entity::Vitals::full(1, 0),
                |c| {
                    c.position = destination;
                    c.vitals
                },
            );
        self.world.area.update(char_id, destination);

        let spawn = ServerMessage::EntitySpawn(game::EntitySpawn {
            entity_id: char_id,
            template_id: 0,
            pos_x: x,
            pos_y: y,
            flags: 0,
            hp: vitals.hp,
            max_hp: vitals.max_hp,
        });
        self.broadcast_view(map, x, y, &spawn, Some(session_id), actions);
    }
}
