//! The mob record.
//!
//! Owned exclusively by the spawn engine. Everything that refers to a mob
//! from outside holds its id and resolves through the engine; a dead mob's
//! record is retained for a grace period so late references resolve to a
//! dead mob deterministically instead of vanishing mid-combat.

use crate::{
    ai::AiState,
    effects::EffectList,
    entity::{Combatant, CombatStats, EntityId, Position, Vitals},
    template::MobTemplate,
    threat::ThreatTable,
};

/// One live (or recently dead) mob.
#[derive(Debug, Clone)]
pub struct Mob {
    /// Wire-visible id, allocated from the mob range.
    pub id: EntityId,
    /// Static definition this mob was instantiated from.
    pub template: MobTemplate,
    /// Current position.
    pub position: Position,
    /// Spawn point; `Return` walks back here.
    pub home: Position,
    /// Pools.
    pub vitals: Vitals,
    /// Current AI state.
    pub ai_state: AiState,
    /// Current target. May be stale; the AI revalidates every tick.
    pub target: Option<EntityId>,
    /// Accumulated threat.
    pub threat: ThreatTable,
    /// Active effects.
    pub effects: EffectList,
    /// Owning spawn group.
    pub spawn_group: u32,
    /// Set when hit points reached zero.
    pub death_at_ms: Option<u64>,
    /// Last attack time, for cooldown.
    pub last_attack_ms: u64,
    /// Last movement step, for the speed budget.
    pub last_move_ms: u64,
    /// Consecutive ticks the target has been out of sight.
    pub target_lost_ticks: u32,
}

impl Mob {
    /// Instantiate a mob from its template at a spawn point.
    #[must_use]
    pub fn spawn(id: EntityId, template: MobTemplate, spawn_group: u32, position: Position) -> Self {
        let vitals = Vitals::full(template.max_hp, template.max_mp);
        Self {
            id,
            template,
            position,
            home: position,
            vitals,
            ai_state: AiState::Idle,
            target: None,
            threat: ThreatTable::new(),
            effects: EffectList::new(),
            spawn_group,
            death_at_ms: None,
            last_attack_ms: 0,
            last_move_ms: 0,
            target_lost_ticks: 0,
        }
    }

    /// Whether the mob is alive. `alive ⇔ hp > 0`.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.vitals.is_alive()
    }

    /// Milliseconds between movement steps at template speed.
    #[must_use]
    pub fn move_step_ms(&self) -> u64 {
        1000 / u64::from(self.template.move_speed.max(1))
    }

    /// Whether the movement budget allows a step at `now_ms`.
    #[must_use]
    pub fn can_step(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_move_ms) >= self.move_step_ms()
    }

    /// Whether the attack cooldown has elapsed at `now_ms`.
    #[must_use]
    pub fn can_attack(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_attack_ms) >= self.template.attack_cooldown_ms
    }

    /// Whether hit points have fallen under the template's flee threshold.
    #[must_use]
    pub fn is_health_low(&self) -> bool {
        self.template.flee_hp_percent > 0
            && self.vitals.hp_percent() < self.template.flee_hp_percent
    }
}

impl Combatant for Mob {
    fn id(&self) -> EntityId {
        self.id
    }

    fn position(&self) -> Position {
        self.position
    }

    fn vitals(&self) -> Vitals {
        self.vitals
    }

    fn combat_stats(&self) -> CombatStats {
        CombatStats {
            attack: self.template.attack,
            defense: self.template.defense,
            level: self.template.level,
        }
    }

    fn take_damage(&mut self, amount: u32) -> u32 {
        self.vitals.hp = self.vitals.hp.saturating_sub(amount);
        self.vitals.hp
    }

    fn heal(&mut self, amount: u32) -> u32 {
        self.vitals.hp = self.vitals.hp.saturating_add(amount).min(self.vitals.max_hp);
        self.vitals.hp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DropEntry;

    fn template() -> MobTemplate {
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
            flee_hp_percent: 20,
            aggressive: true,
            calls_for_help: false,
            drops: vec![DropEntry { item_id: 500, chance_permille: 500, min_qty: 1, max_qty: 2 }],
        }
    }

    #[test]
    fn spawns_at_full_vitals() {
        let mob = Mob::spawn(10_000, template(), 1, Position { map: 1, x: 50, y: 50 });
        assert!(mob.is_alive());
        assert_eq!(mob.vitals.hp, 300);
        assert_eq!(mob.home, mob.position);
        assert_eq!(mob.ai_state, AiState::Idle);
    }

    #[test]
    fn damage_saturates_at_zero() {
        let mut mob = Mob::spawn(10_000, template(), 1, Position { map: 1, x: 50, y: 50 });
        assert_eq!(mob.take_damage(1000), 0);
        assert!(!mob.is_alive());
    }

    #[test]
    fn heal_caps_at_maximum() {
        let mut mob = Mob::spawn(10_000, template(), 1, Position { map: 1, x: 50, y: 50 });
        mob.take_damage(100);
        assert_eq!(mob.heal(5000), 300);
    }

    #[test]
    fn movement_budget_follows_speed() {
        let mut mob = Mob::spawn(10_000, template(), 1, Position { map: 1, x: 50, y: 50 });
        assert_eq!(mob.move_step_ms(), 250);

        mob.last_move_ms = 1000;
        assert!(!mob.can_step(1100));
        assert!(mob.can_step(1250));
    }

    #[test]
    fn flee_threshold_uses_template_percent() {
        let mut mob = Mob::spawn(10_000, template(), 1, Position { map: 1, x: 50, y: 50 });
        assert!(!mob.is_health_low());

        mob.vitals.hp = 59; // 19%
        assert!(mob.is_health_low());
    }
}
