//! World simulation.
//!
//! Everything the tick loop drives: the fixed-step clock ([`clock`]), the
//! per-map spatial index ([`area`]), mob templates and drop tables
//! ([`template`]), timed effects ([`effects`]), threat bookkeeping
//! ([`threat`]), the mob record ([`mob`]), the per-mob AI state machine
//! ([`ai`]), spawn groups ([`spawn`]) and the combat resolver ([`combat`]).
//!
//! The simulation is sans-IO like the rest of the server: [`World::tick`]
//! consumes plain milliseconds and a view of the connected characters, and
//! returns [`WorldEvent`]s for the driver to turn into packets. Mobs are
//! owned exclusively by the spawn engine; every cross-reference is an id
//! resolved on demand, so stale targets degrade to no-ops instead of
//! dangling pointers.

pub mod ai;
pub mod area;
pub mod clock;
pub mod combat;
pub mod effects;
pub mod entity;
pub mod mob;
pub mod spawn;
pub mod template;
pub mod threat;

use std::collections::HashMap;

use rand::Rng;

pub use ai::{AiState, CharacterView};
pub use area::AreaIndex;
pub use clock::{DayPhase, TickClock, TickReport, WorldClock};
pub use combat::{BattleResult, CombatResolver, DefaultResolver};
pub use entity::{EntityId, MapId, Position, MOB_ID_BASE};
pub use mob::Mob;
pub use spawn::{SpawnEngine, SpawnGroupConfig};
pub use template::{LootDrop, MobTemplate, TemplateCatalog};

/// State change produced by one simulation tick.
///
/// The driver translates these into broadcast packets; the simulation never
/// builds wire messages itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    /// A mob came into existence.
    MobSpawned {
        /// New mob id.
        mob_id: EntityId,
        /// Template it was instantiated from.
        template_id: u16,
        /// Where it appeared.
        position: Position,
        /// Starting hit points.
        hp: u32,
        /// Maximum hit points.
        max_hp: u32,
    },
    /// A mob stepped one tile.
    MobMoved {
        /// Mob that moved.
        mob_id: EntityId,
        /// New position.
        position: Position,
        /// Tiles per second it is moving at.
        speed: u16,
    },
    /// A mob attacked a character.
    MobAttacked {
        /// Attacking mob.
        mob_id: EntityId,
        /// Defending character.
        target_id: EntityId,
        /// Resolved outcome, not yet applied to the defender.
        result: BattleResult,
        /// Where the attack happened, for area scoping.
        position: Position,
    },
    /// A mob died.
    MobDied {
        /// The mob.
        mob_id: EntityId,
        /// Where it died.
        position: Position,
        /// Entity with the killing blow, if attributable.
        killer: Option<EntityId>,
        /// Rolled loot.
        loot: Vec<LootDrop>,
    },
    /// An effect ran out on a mob.
    EffectExpired {
        /// Affected mob.
        mob_id: EntityId,
        /// Effect type that ended.
        effect_type: u16,
        /// Where the mob is, for area scoping.
        position: Position,
    },
}

/// The complete simulation state for one server.
#[derive(Debug)]
pub struct World {
    /// Per-map spatial index shared with the driver for broadcast scoping.
    pub area: AreaIndex,
    /// Spawn groups and the mobs they own.
    pub spawner: SpawnEngine,
    /// Day/night source for spawn gating.
    pub clock: WorldClock,
}

impl World {
    /// Create a world from loaded catalogs and spawn configuration.
    #[must_use]
    pub fn new(catalog: TemplateCatalog, groups: Vec<SpawnGroupConfig>, clock: WorldClock) -> Self {
        Self { area: AreaIndex::new(), spawner: SpawnEngine::new(catalog, groups), clock }
    }

    /// Advance one fixed simulation step.
    ///
    /// Order is fixed: effect timers first, then the spawn engine, then AI
    /// for every live mob. `players_by_map` feeds spawn density scaling;
    /// `characters` is the driver's view of attackable characters.
    pub fn tick<R: Rng>(
        &mut self,
        now_ms: u64,
        wall_secs: u64,
        players_by_map: &HashMap<MapId, usize>,
        characters: &dyn CharacterView,
        resolver: &dyn CombatResolver,
        rng: &mut R,
    ) -> Vec<WorldEvent> {
        let mut events = Vec::new();

        self.spawner.expire_effects(now_ms, &mut events);

        let phase = self.clock.phase(wall_secs);
        self.spawner.tick(now_ms, phase, players_by_map, &mut self.area, rng, &mut events);

        ai::step_all(&mut self.spawner, &mut self.area, characters, resolver, now_ms, rng, &mut events);

        events
    }
}
