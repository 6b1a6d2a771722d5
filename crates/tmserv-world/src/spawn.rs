//! Spawn groups and the spawn engine.
//!
//! A spawn group is a generator: a circle on one map, a weighted template
//! pool, a population cap and a respawn delay range. The engine owns every
//! mob; groups track which of the engine's mobs they produced. At most one
//! mob spawns per group per tick, so repopulation is spread over time the
//! way the original pacing worked.
//!
//! Density scaling: the effective population target is
//! `max_count × clamp(0.5 + players_on_map / 40, 0.5, 1.5)`, capped at
//! `max_count`. The cap is a hard invariant, never exceeded at any
//! observable moment.

use std::collections::{BTreeSet, HashMap};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    WorldEvent,
    ai::AiState,
    area::AreaIndex,
    clock::DayPhase,
    entity::{Combatant, EntityId, MOB_ID_BASE, MapId, Position},
    mob::Mob,
    template::TemplateCatalog,
};

/// How long a dead mob's record is retained for late references.
const CORPSE_RETENTION_MS: u64 = 30_000;

/// One weighted entry of a group's template pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTemplate {
    /// Mob template id.
    pub template_id: u16,
    /// Relative selection weight.
    pub weight: u32,
}

/// Static configuration of one spawn group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnGroupConfig {
    /// Group id, unique per server.
    pub id: u32,
    /// Map the group spawns on.
    pub map: MapId,
    /// Circle center.
    pub x: u16,
    /// Circle center.
    pub y: u16,
    /// Spawn radius in tiles.
    pub radius: u16,
    /// Population cap.
    pub max_count: usize,
    /// Minimum respawn delay.
    pub min_respawn_ms: u64,
    /// Maximum respawn delay.
    pub max_respawn_ms: u64,
    /// Weighted template pool.
    pub templates: Vec<WeightedTemplate>,
    /// Restrict activity to one day phase. `None` = always active.
    #[serde(default)]
    pub active_phase: Option<DayPhase>,
}

#[derive(Debug)]
struct SpawnGroup {
    config: SpawnGroupConfig,
    /// Ids of this group's live mobs. Ordered so iteration is stable.
    alive: BTreeSet<EntityId>,
    next_spawn_at_ms: u64,
}

impl SpawnGroup {
    fn target_count(&self, players_on_map: usize) -> usize {
        // clamp(0.5 + players/40, 0.5, 1.5), in integer permille.
        let density = (500 + players_on_map * 25).min(1500);
        (self.config.max_count * density / 1000).min(self.config.max_count)
    }
}

/// Owner of all mobs and their spawn groups.
#[derive(Debug)]
pub struct SpawnEngine {
    catalog: TemplateCatalog,
    groups: Vec<SpawnGroup>,
    mobs: HashMap<EntityId, Mob>,
    next_mob_id: EntityId,
    /// Swallowed AI faults (stale targets with inconsistent state).
    pub ai_errors: u64,
}

impl SpawnEngine {
    /// Create an engine from a catalog and group configuration.
    #[must_use]
    pub fn new(catalog: TemplateCatalog, configs: Vec<SpawnGroupConfig>) -> Self {
        let groups = configs
            .into_iter()
            .map(|config| SpawnGroup { config, alive: BTreeSet::new(), next_spawn_at_ms: 0 })
            .collect();
        Self { catalog, groups, mobs: HashMap::new(), next_mob_id: MOB_ID_BASE, ai_errors: 0 }
    }

    /// A mob by id, dead or alive.
    #[must_use]
    pub fn mob(&self, id: EntityId) -> Option<&Mob> {
        self.mobs.get(&id)
    }

    /// Mutable access to a mob.
    #[must_use]
    pub fn mob_mut(&mut self, id: EntityId) -> Option<&mut Mob> {
        self.mobs.get_mut(&id)
    }

    /// Ids of every mob currently tracked, in stable order.
    #[must_use]
    pub fn mob_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.mobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Live mob count for a group (diagnostics and tests).
    #[must_use]
    pub fn live_count(&self, group_id: u32) -> usize {
        self.groups
            .iter()
            .find(|g| g.config.id == group_id)
            .map_or(0, |g| g.alive.len())
    }

    /// Template catalog.
    #[must_use]
    pub fn catalog(&self) -> &TemplateCatalog {
        &self.catalog
    }

    /// Advance spawning: at most one new mob per group per tick.
    pub fn tick<R: Rng>(
        &mut self,
        now_ms: u64,
        phase: DayPhase,
        players_by_map: &HashMap<MapId, usize>,
        area: &mut AreaIndex,
        rng: &mut R,
        events: &mut Vec<WorldEvent>,
    ) {
        self.purge_corpses(now_ms, area);

        for group_index in 0..self.groups.len() {
            // Config is cloned out so mob allocation below can borrow the
            // engine mutably.
            let (config, alive_len, next_spawn_at_ms) = {
                let group = &self.groups[group_index];
                (group.config.clone(), group.alive.len(), group.next_spawn_at_ms)
            };

            if config.active_phase.is_some_and(|p| p != phase) {
                continue;
            }

            let players = players_by_map.get(&config.map).copied().unwrap_or(0);
            let target = self.groups[group_index].target_count(players);
            debug_assert!(target <= config.max_count);

            if alive_len >= target || now_ms < next_spawn_at_ms {
                continue;
            }

            let Some(template_id) = pick_weighted(&config.templates, rng) else {
                continue;
            };
            let Some(template) = self.catalog.get(template_id).cloned() else {
                continue;
            };

            let position = pick_spawn_point(&config, area, rng);
            let id = self.allocate_mob_id();
            let mob = Mob::spawn(id, template, config.id, position);

            events.push(WorldEvent::MobSpawned {
                mob_id: id,
                template_id,
                position,
                hp: mob.vitals.hp,
                max_hp: mob.vitals.max_hp,
            });

            area.update(id, position);
            self.mobs.insert(id, mob);

            let group = &mut self.groups[group_index];
            group.alive.insert(id);
            group.next_spawn_at_ms = now_ms + respawn_delay(&group.config, rng);
        }
    }

    /// Advance every live mob's effect timers.
    pub fn expire_effects(&mut self, now_ms: u64, events: &mut Vec<WorldEvent>) {
        for mob in self.mobs.values_mut() {
            if !mob.is_alive() {
                continue;
            }
            for effect in mob.effects.expire(now_ms) {
                events.push(WorldEvent::EffectExpired {
                    mob_id: mob.id,
                    effect_type: effect.effect_type,
                    position: mob.position,
                });
            }
        }
    }

    /// Apply damage from `attacker` to a mob.
    ///
    /// Accumulates threat, wakes the mob (and, for callers-for-help, its
    /// idle groupmates in sight), and on death handles the full sequence:
    /// record the death time, notify the spawn group, roll loot, schedule
    /// the respawn and drop the mob from the area index. Returns the mob's
    /// hit points after the hit, or `None` if the id does not resolve to a
    /// live mob.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_damage<R: Rng>(
        &mut self,
        mob_id: EntityId,
        attacker: EntityId,
        amount: u32,
        now_ms: u64,
        area: &mut AreaIndex,
        rng: &mut R,
        events: &mut Vec<WorldEvent>,
    ) -> Option<u32> {
        let mob = self.mobs.get_mut(&mob_id)?;
        if !mob.is_alive() {
            return None;
        }

        mob.threat.add(attacker, u64::from(amount), now_ms);
        let hp_after = mob.take_damage(amount);

        if matches!(mob.ai_state, AiState::Idle | AiState::Patrol | AiState::Return) {
            mob.ai_state = AiState::Chase;
            mob.target = Some(attacker);
        }

        let calls_for_help = mob.template.calls_for_help && hp_after > 0;
        let (position, group_id, sight) =
            (mob.position, mob.spawn_group, mob.template.sight_range);

        if hp_after == 0 {
            self.kill_mob(mob_id, Some(attacker), now_ms, area, rng, events);
        } else if calls_for_help {
            self.alert_groupmates(group_id, mob_id, attacker, position, sight, now_ms);
        }

        Some(hp_after)
    }

    /// Remove an entity from every threat table (logout, death).
    pub fn forget_entity(&mut self, id: EntityId) {
        for mob in self.mobs.values_mut() {
            mob.threat.remove(id);
            if mob.target == Some(id) {
                mob.target = None;
            }
        }
    }

    fn kill_mob<R: Rng>(
        &mut self,
        mob_id: EntityId,
        killer: Option<EntityId>,
        now_ms: u64,
        area: &mut AreaIndex,
        rng: &mut R,
        events: &mut Vec<WorldEvent>,
    ) {
        let Some(mob) = self.mobs.get_mut(&mob_id) else { return };

        mob.ai_state = AiState::Dead;
        mob.death_at_ms = Some(now_ms);
        mob.target = None;
        mob.threat.clear();

        let position = mob.position;
        let loot = mob.template.roll_drops(rng);
        let group_id = mob.spawn_group;

        area.remove(mob_id);
        events.push(WorldEvent::MobDied { mob_id, position, killer, loot });

        if let Some(group) = self.groups.iter_mut().find(|g| g.config.id == group_id) {
            group.alive.remove(&mob_id);
            group.next_spawn_at_ms = now_ms + respawn_delay(&group.config, rng);
        }
    }

    fn alert_groupmates(
        &mut self,
        group_id: u32,
        victim: EntityId,
        attacker: EntityId,
        position: Position,
        sight: u16,
        now_ms: u64,
    ) {
        let Some(group) = self.groups.iter().find(|g| g.config.id == group_id) else { return };
        let allies: Vec<EntityId> = group.alive.iter().copied().filter(|&id| id != victim).collect();

        for ally_id in allies {
            let Some(ally) = self.mobs.get_mut(&ally_id) else { continue };
            if !ally.is_alive() || ally.position.distance(&position) > sight {
                continue;
            }
            if ally.threat.is_empty() {
                ally.threat.add(attacker, 1, now_ms);
                if matches!(ally.ai_state, AiState::Idle | AiState::Patrol) {
                    ally.ai_state = AiState::Chase;
                    ally.target = Some(attacker);
                }
            }
        }
    }

    fn purge_corpses(&mut self, now_ms: u64, area: &mut AreaIndex) {
        let stale: Vec<EntityId> = self
            .mobs
            .iter()
            .filter(|(_, mob)| {
                mob.death_at_ms
                    .is_some_and(|at| now_ms.saturating_sub(at) >= CORPSE_RETENTION_MS)
            })
            .map(|(&id, _)| id)
            .collect();

        for id in stale {
            self.mobs.remove(&id);
            area.remove(id);
        }
    }

    fn allocate_mob_id(&mut self) -> EntityId {
        // Ids wrap within the mob range; skip any still in use.
        loop {
            let id = self.next_mob_id;
            self.next_mob_id =
                if self.next_mob_id == EntityId::MAX { MOB_ID_BASE } else { self.next_mob_id + 1 };
            if !self.mobs.contains_key(&id) {
                return id;
            }
        }
    }

    /// Direct map access for the AI stepper.
    pub(crate) fn mobs_mut(&mut self) -> &mut HashMap<EntityId, Mob> {
        &mut self.mobs
    }
}

fn respawn_delay<R: Rng>(config: &SpawnGroupConfig, rng: &mut R) -> u64 {
    let hi = config.max_respawn_ms.max(config.min_respawn_ms);
    rng.gen_range(config.min_respawn_ms..=hi)
}

fn pick_weighted<R: Rng>(pool: &[WeightedTemplate], rng: &mut R) -> Option<u16> {
    let total: u32 = pool.iter().map(|t| t.weight).sum();
    if total == 0 {
        return None;
    }

    let mut roll = rng.gen_range(0..total);
    for entry in pool {
        if roll < entry.weight {
            return Some(entry.template_id);
        }
        roll -= entry.weight;
    }
    None
}

fn pick_spawn_point<R: Rng>(
    config: &SpawnGroupConfig,
    area: &AreaIndex,
    rng: &mut R,
) -> Position {
    // Uniform over the square, rejecting blocked tiles. After a bounded
    // number of rejections fall back to the center so a badly-configured
    // group cannot stall the tick.
    for _ in 0..16 {
        let dx = rng.gen_range(0..=u32::from(config.radius) * 2);
        let dy = rng.gen_range(0..=u32::from(config.radius) * 2);
        let x = (u32::from(config.x) + dx)
            .saturating_sub(u32::from(config.radius))
            .min(u32::from(u16::MAX)) as u16;
        let y = (u32::from(config.y) + dy)
            .saturating_sub(u32::from(config.radius))
            .min(u32::from(u16::MAX)) as u16;
        if area.is_walkable(config.map, x, y) {
            return Position { map: config.map, x, y };
        }
    }
    Position { map: config.map, x: config.x, y: config.y }
}
