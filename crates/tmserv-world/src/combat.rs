//! Combat resolution.
//!
//! The resolver is a collaborator trait: the AI and the attack handler hand
//! it attacker/defender stats and get back a [`BattleResult`] to apply and
//! broadcast. [`DefaultResolver`] implements the classic formula; servers
//! with custom balance swap in their own implementation at construction.

use rand::RngCore;

use crate::entity::CombatStats;

/// Hit flags carried in the attack-result packet.
pub mod flags {
    /// Critical hit, double damage.
    pub const CRITICAL: u16 = 0x0001;
    /// Attack missed entirely.
    pub const MISS: u16 = 0x0002;
}

/// Outcome of one resolved attack. Not yet applied to anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleResult {
    /// Damage to subtract from the defender.
    pub damage: u32,
    /// Hit flags ([`flags`]).
    pub flags: u16,
}

impl BattleResult {
    /// A whiff.
    #[must_use]
    pub fn miss() -> Self {
        Self { damage: 0, flags: flags::MISS }
    }
}

/// Resolves attacks between any two combatants.
pub trait CombatResolver: Send + Sync {
    /// Compute the outcome of `attacker` hitting `defender`, optionally
    /// through a skill.
    fn resolve_attack(
        &self,
        attacker: CombatStats,
        defender: CombatStats,
        skill_id: Option<u16>,
        rng: &mut dyn RngCore,
    ) -> BattleResult;
}

/// Stock damage formula.
///
/// Base damage is attack minus half defense, swung ±20%, with a flat 5%
/// miss chance and 10% critical chance (doubled damage). Skills multiply
/// the base by 3/2. Damage never drops below 1 on a connecting hit, so a
/// heavily-armored target still takes chip damage.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultResolver;

impl DefaultResolver {
    fn roll(rng: &mut dyn RngCore, bound: u32) -> u32 {
        rng.next_u32() % bound
    }
}

impl CombatResolver for DefaultResolver {
    fn resolve_attack(
        &self,
        attacker: CombatStats,
        defender: CombatStats,
        skill_id: Option<u16>,
        rng: &mut dyn RngCore,
    ) -> BattleResult {
        if Self::roll(rng, 100) < 5 {
            return BattleResult::miss();
        }

        let swing = 80 + Self::roll(rng, 41); // 80..=120 percent
        let base = u32::from(attacker.attack).saturating_sub(u32::from(defender.defense) / 2);
        let mut damage = (base * swing / 100).max(1);

        if skill_id.is_some() {
            damage = damage * 3 / 2;
        }

        let mut result_flags = 0;
        if Self::roll(rng, 100) < 10 {
            damage *= 2;
            result_flags |= flags::CRITICAL;
        }

        BattleResult { damage, flags: result_flags }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    fn stats(attack: u16, defense: u16) -> CombatStats {
        CombatStats { attack, defense, level: 10 }
    }

    #[test]
    fn damage_stays_in_envelope() {
        let resolver = DefaultResolver;
        let mut rng = StdRng::seed_from_u64(1);

        for _ in 0..500 {
            let result = resolver.resolve_attack(stats(100, 0), stats(0, 40), None, &mut rng);
            if result.flags & flags::MISS != 0 {
                assert_eq!(result.damage, 0);
                continue;
            }
            // base 80, swing 64..=96, crit doubles.
            let max = if result.flags & flags::CRITICAL != 0 { 192 } else { 96 };
            assert!(result.damage >= 64 / 2 && result.damage <= max, "damage {}", result.damage);
        }
    }

    #[test]
    fn connecting_hits_deal_at_least_one() {
        let resolver = DefaultResolver;
        let mut rng = StdRng::seed_from_u64(2);

        for _ in 0..200 {
            let result = resolver.resolve_attack(stats(1, 0), stats(0, 500), None, &mut rng);
            if result.flags & flags::MISS == 0 {
                assert!(result.damage >= 1);
            }
        }
    }

    #[test]
    fn skills_amplify_damage() {
        let resolver = DefaultResolver;

        // Average over many rolls; the 1.5x multiplier must show through
        // the swing noise.
        let mut rng = StdRng::seed_from_u64(3);
        let plain: u64 = (0..500)
            .map(|_| u64::from(resolver.resolve_attack(stats(100, 0), stats(0, 0), None, &mut rng).damage))
            .sum();
        let mut rng = StdRng::seed_from_u64(3);
        let skilled: u64 = (0..500)
            .map(|_| {
                u64::from(resolver.resolve_attack(stats(100, 0), stats(0, 0), Some(7), &mut rng).damage)
            })
            .sum();

        assert!(skilled > plain * 14 / 10, "skilled {skilled} vs plain {plain}");
    }
}
