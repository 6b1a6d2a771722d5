//! Entity identity and shared attribute records.
//!
//! The original codebase modeled entities as a class hierarchy. Here the
//! shared surface is a small attribute record plus the [`Combatant`] trait;
//! characters (owned by the server registry) and mobs (owned by the spawn
//! engine) both expose it, and everything else refers to entities by id.

/// Process-wide entity identifier as it appears on the wire.
///
/// Characters are allocated below [`MOB_ID_BASE`]; mob ids start there.
/// The ranges never overlap, so an id alone tells you which registry
/// resolves it.
pub type EntityId = u16;

/// First id of the mob range.
pub const MOB_ID_BASE: EntityId = 10_000;

/// Map identifier.
pub type MapId = u16;

/// A tile position on one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    /// Map the entity is on.
    pub map: MapId,
    /// Tile column.
    pub x: u16,
    /// Tile row.
    pub y: u16,
}

impl Position {
    /// Chebyshev distance to another position on the same map.
    ///
    /// Movement and attack ranges are tile-based, so the board metric is
    /// the honest one. Cross-map distances are undefined and return
    /// `u16::MAX`.
    #[must_use]
    pub fn distance(&self, other: &Self) -> u16 {
        if self.map != other.map {
            return u16::MAX;
        }
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// One tile step toward `target`, ignoring walkability.
    #[must_use]
    pub fn step_toward(&self, target: &Self) -> Self {
        let x = match target.x.cmp(&self.x) {
            std::cmp::Ordering::Greater => self.x.saturating_add(1),
            std::cmp::Ordering::Less => self.x.saturating_sub(1),
            std::cmp::Ordering::Equal => self.x,
        };
        let y = match target.y.cmp(&self.y) {
            std::cmp::Ordering::Greater => self.y.saturating_add(1),
            std::cmp::Ordering::Less => self.y.saturating_sub(1),
            std::cmp::Ordering::Equal => self.y,
        };
        Self { map: self.map, x, y }
    }
}

/// Hit point and mana pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vitals {
    /// Current hit points. Zero means dead.
    pub hp: u32,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Current mana.
    pub mp: u32,
    /// Maximum mana.
    pub max_mp: u32,
}

impl Vitals {
    /// Full pools at the given maxima.
    #[must_use]
    pub fn full(max_hp: u32, max_mp: u32) -> Self {
        Self { hp: max_hp, max_hp, mp: max_mp, max_mp }
    }

    /// Whether the entity is alive. `alive ⇔ hp > 0` by definition.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }

    /// Current hit points as a fraction of maximum, in percent.
    #[must_use]
    pub fn hp_percent(&self) -> u8 {
        if self.max_hp == 0 {
            return 0;
        }
        ((u64::from(self.hp) * 100) / u64::from(self.max_hp)) as u8
    }
}

/// Derived combat numbers consumed by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatStats {
    /// Attack rating.
    pub attack: u16,
    /// Defense rating.
    pub defense: u16,
    /// Entity level, for scaling.
    pub level: u16,
}

/// Capability surface shared by characters and mobs.
///
/// Deliberately narrow: identity, placement, pools and damage. Anything
/// richer belongs to the owning registry.
pub trait Combatant {
    /// Wire-visible entity id.
    fn id(&self) -> EntityId;

    /// Current position.
    fn position(&self) -> Position;

    /// Pools.
    fn vitals(&self) -> Vitals;

    /// Combat numbers.
    fn combat_stats(&self) -> CombatStats;

    /// Apply damage, saturating at zero. Returns hit points afterwards.
    fn take_damage(&mut self, amount: u32) -> u32;

    /// Restore hit points, saturating at the maximum. Returns hit points
    /// afterwards.
    fn heal(&mut self, amount: u32) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chebyshev_distance() {
        let a = Position { map: 1, x: 100, y: 100 };
        let b = Position { map: 1, x: 105, y: 103 };
        assert_eq!(a.distance(&b), 5);

        let c = Position { map: 2, x: 100, y: 100 };
        assert_eq!(a.distance(&c), u16::MAX);
    }

    #[test]
    fn step_moves_one_tile_diagonally() {
        let from = Position { map: 1, x: 10, y: 10 };
        let to = Position { map: 1, x: 20, y: 5 };
        assert_eq!(from.step_toward(&to), Position { map: 1, x: 11, y: 9 });
    }

    #[test]
    fn step_toward_self_is_identity() {
        let at = Position { map: 1, x: 10, y: 10 };
        assert_eq!(at.step_toward(&at), at);
    }

    #[test]
    fn vitals_percent_and_liveness() {
        let mut v = Vitals::full(200, 50);
        assert!(v.is_alive());
        assert_eq!(v.hp_percent(), 100);

        v.hp = 30;
        assert_eq!(v.hp_percent(), 15);

        v.hp = 0;
        assert!(!v.is_alive());
    }
}
