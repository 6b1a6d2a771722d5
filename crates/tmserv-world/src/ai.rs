//! Per-mob AI.
//!
//! One state machine per mob, stepped every simulation tick:
//!
//! ```text
//! Idle → Patrol → Chase → Attack → (Flee | Return) → Idle
//! ```
//!
//! Sensed events drive the transitions: a character entering sight radius
//! (aggressive mobs), damage taken (handled in the spawn engine, which also
//! wakes callers-for-help groupmates), hit points dropping under the flee
//! threshold, and the target staying out of sight for too many ticks.
//!
//! Target selection is threat-driven: the target is always the highest
//! present threat on the mob's map, refreshed every tick. The AI never
//! surfaces an error to its caller; inconsistent state (a target id the
//! character view cannot resolve to stats) drops the target and bumps the
//! fault counter, and the tick moves on.

use rand::Rng;

use crate::{
    WorldEvent,
    area::AreaIndex,
    combat::CombatResolver,
    entity::{Combatant, CombatStats, EntityId, MOB_ID_BASE, Position},
    mob::Mob,
    spawn::SpawnEngine,
    threat::DEFAULT_THREAT_EXPIRY_MS,
};

/// Ticks a target may stay unresolvable before its threat entry is dropped.
pub const TARGET_LOST_TICKS: u32 = 30;

/// AI phase of one mob.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiState {
    /// Nothing to do; may start a patrol step.
    Idle,
    /// Wandering one tile near the spawn point.
    Patrol,
    /// Moving toward the current target.
    Chase,
    /// In range, trading blows on cooldown.
    Attack,
    /// Running from the target (hit points under the flee threshold).
    Flee,
    /// Walking back to the spawn point after combat ended.
    Return,
    /// Hit points reached zero; awaiting corpse purge.
    Dead,
}

/// Driver-side view of connected characters.
///
/// The simulation resolves character ids through this on every tick, so a
/// logout between ticks simply makes the id unresolvable.
pub trait CharacterView {
    /// Position of a character, if connected and in the world.
    fn position_of(&self, id: EntityId) -> Option<Position>;

    /// Whether the character is connected and alive.
    fn is_alive(&self, id: EntityId) -> bool;

    /// Combat numbers for a character.
    fn combat_stats(&self, id: EntityId) -> Option<CombatStats>;
}

/// Step every live mob once.
pub fn step_all<R: Rng>(
    spawner: &mut SpawnEngine,
    area: &mut AreaIndex,
    characters: &dyn CharacterView,
    resolver: &dyn CombatResolver,
    now_ms: u64,
    rng: &mut R,
    events: &mut Vec<WorldEvent>,
) {
    let mut faults = 0u64;

    for id in spawner.mob_ids() {
        // The mob is lifted out of the map for the duration of its step so
        // the stepper can hold it mutably alongside the area index.
        let Some(mut mob) = spawner.mobs_mut().remove(&id) else { continue };

        if mob.ai_state != AiState::Dead {
            faults += step_mob(&mut mob, area, characters, resolver, now_ms, rng, events);
        }

        spawner.mobs_mut().insert(id, mob);
    }

    spawner.ai_errors += faults;
}

fn step_mob<R: Rng>(
    mob: &mut Mob,
    area: &mut AreaIndex,
    characters: &dyn CharacterView,
    resolver: &dyn CombatResolver,
    now_ms: u64,
    rng: &mut R,
    events: &mut Vec<WorldEvent>,
) -> u64 {
    let map = mob.position.map;
    mob.threat.refresh(now_ms, DEFAULT_THREAT_EXPIRY_MS, |id| {
        characters.is_alive(id) && characters.position_of(id).is_some_and(|p| p.map == map)
    });

    // Target is always the highest present threat at refresh time.
    mob.target = mob.threat.highest();

    if mob.target.is_some()
        && matches!(mob.ai_state, AiState::Idle | AiState::Patrol | AiState::Return)
    {
        mob.ai_state = AiState::Chase;
    }

    if mob.target.is_some() && mob.is_health_low() && mob.ai_state != AiState::Flee {
        mob.ai_state = AiState::Flee;
    }

    match mob.ai_state {
        AiState::Idle => update_idle(mob, area, characters, now_ms, rng, events),
        AiState::Patrol => {
            update_patrol(mob, area, now_ms, rng, events);
            0
        },
        AiState::Chase => {
            update_chase(mob, area, characters, now_ms, events);
            0
        },
        AiState::Attack => update_attack(mob, characters, resolver, now_ms, rng, events),
        AiState::Flee => {
            update_flee(mob, area, characters, now_ms, events);
            0
        },
        AiState::Return => {
            update_return(mob, area, now_ms, events);
            0
        },
        AiState::Dead => 0,
    }
}

fn update_idle<R: Rng>(
    mob: &mut Mob,
    area: &mut AreaIndex,
    characters: &dyn CharacterView,
    now_ms: u64,
    rng: &mut R,
    events: &mut Vec<WorldEvent>,
) -> u64 {
    if mob.template.aggressive {
        if let Some(sighted) = scan_for_target(mob, area, characters) {
            mob.threat.add(sighted, 1, now_ms);
            mob.target = Some(sighted);
            mob.ai_state = AiState::Chase;
            return 0;
        }
    }

    // Occasional wander keeps idle mobs from looking frozen.
    if mob.can_step(now_ms) && rng.gen_ratio(1, 32) {
        mob.ai_state = AiState::Patrol;
        update_patrol(mob, area, now_ms, rng, events);
    }
    0
}

fn scan_for_target(
    mob: &Mob,
    area: &AreaIndex,
    characters: &dyn CharacterView,
) -> Option<EntityId> {
    let Position { map, x, y } = mob.position;
    area.query_radius(map, x, y, mob.template.sight_range)
        .into_iter()
        .find(|&id| id < MOB_ID_BASE && characters.is_alive(id))
}

fn update_patrol<R: Rng>(
    mob: &mut Mob,
    area: &mut AreaIndex,
    now_ms: u64,
    rng: &mut R,
    events: &mut Vec<WorldEvent>,
) {
    let dx = rng.gen_range(-1i32..=1);
    let dy = rng.gen_range(-1i32..=1);
    let candidate = Position {
        map: mob.position.map,
        x: mob.position.x.saturating_add_signed(dx as i16),
        y: mob.position.y.saturating_add_signed(dy as i16),
    };

    let leash = candidate.distance(&mob.home) <= mob.template.sight_range;
    if (dx != 0 || dy != 0)
        && leash
        && area.is_walkable(candidate.map, candidate.x, candidate.y)
    {
        move_mob(mob, candidate, area, now_ms, events);
    }

    mob.ai_state = AiState::Idle;
}

fn update_chase(
    mob: &mut Mob,
    area: &mut AreaIndex,
    characters: &dyn CharacterView,
    now_ms: u64,
    events: &mut Vec<WorldEvent>,
) {
    let Some(target) = mob.target else {
        mob.ai_state = AiState::Return;
        return;
    };

    let target_pos = characters.position_of(target).filter(|p| p.map == mob.position.map);
    let Some(target_pos) = target_pos else {
        // Out of sight; give it a grace period, then drop the entry so the
        // next-highest threat takes over (or the mob goes home).
        mob.target_lost_ticks += 1;
        if mob.target_lost_ticks >= TARGET_LOST_TICKS {
            mob.threat.remove(target);
            mob.target_lost_ticks = 0;
        }
        return;
    };
    mob.target_lost_ticks = 0;

    if mob.position.distance(&target_pos) <= mob.template.attack_range {
        mob.ai_state = AiState::Attack;
        return;
    }

    if mob.can_step(now_ms) {
        let next = mob.position.step_toward(&target_pos);
        if area.is_walkable(next.map, next.x, next.y) {
            move_mob(mob, next, area, now_ms, events);
        }
    }
}

fn update_attack<R: Rng>(
    mob: &mut Mob,
    characters: &dyn CharacterView,
    resolver: &dyn CombatResolver,
    now_ms: u64,
    rng: &mut R,
    events: &mut Vec<WorldEvent>,
) -> u64 {
    let Some(target) = mob.target else {
        mob.ai_state = AiState::Return;
        return 0;
    };

    let in_range = characters
        .position_of(target)
        .is_some_and(|p| mob.position.distance(&p) <= mob.template.attack_range);
    if !in_range {
        mob.ai_state = AiState::Chase;
        return 0;
    }

    if !mob.can_attack(now_ms) {
        return 0;
    }

    let Some(defender) = characters.combat_stats(target) else {
        // Alive and positioned but statless: inconsistent view. Swallow,
        // count, drop the target.
        mob.threat.remove(target);
        mob.target = None;
        return 1;
    };

    mob.last_attack_ms = now_ms;
    let result = resolver.resolve_attack(mob.combat_stats(), defender, None, rng);
    events.push(WorldEvent::MobAttacked {
        mob_id: mob.id,
        target_id: target,
        result,
        position: mob.position,
    });
    0
}

fn update_flee(
    mob: &mut Mob,
    area: &mut AreaIndex,
    characters: &dyn CharacterView,
    now_ms: u64,
    events: &mut Vec<WorldEvent>,
) {
    if mob.threat.is_empty() {
        mob.ai_state = AiState::Return;
        return;
    }

    let threat_pos = mob.target.and_then(|id| characters.position_of(id));
    let Some(threat_pos) = threat_pos else { return };

    if mob.can_step(now_ms) {
        // Step away: invert the chase step around the current position.
        let toward = mob.position.step_toward(&threat_pos);
        let away = Position {
            map: mob.position.map,
            x: (2 * i32::from(mob.position.x) - i32::from(toward.x)).clamp(0, i32::from(u16::MAX))
                as u16,
            y: (2 * i32::from(mob.position.y) - i32::from(toward.y)).clamp(0, i32::from(u16::MAX))
                as u16,
        };
        if area.is_walkable(away.map, away.x, away.y) {
            move_mob(mob, away, area, now_ms, events);
        }
    }
}

fn update_return(
    mob: &mut Mob,
    area: &mut AreaIndex,
    now_ms: u64,
    events: &mut Vec<WorldEvent>,
) {
    if mob.position == mob.home {
        mob.ai_state = AiState::Idle;
        // Leash reset: out-of-combat mobs recover fully at home.
        mob.vitals.hp = mob.vitals.max_hp;
        return;
    }

    if mob.can_step(now_ms) {
        let next = mob.position.step_toward(&mob.home);
        if area.is_walkable(next.map, next.x, next.y) {
            move_mob(mob, next, area, now_ms, events);
        }
    }
}

fn move_mob(
    mob: &mut Mob,
    to: Position,
    area: &mut AreaIndex,
    now_ms: u64,
    events: &mut Vec<WorldEvent>,
) {
    mob.position = to;
    mob.last_move_ms = now_ms;
    area.update(mob.id, to);
    events.push(WorldEvent::MobMoved {
        mob_id: mob.id,
        position: to,
        speed: mob.template.move_speed,
    });
}
