//! Threat tables.
//!
//! Damage dealt to a mob accumulates threat against the dealer. The mob's
//! target is always the present entity with the highest threat; ties break
//! toward the earliest entry so a late equal-damage attacker cannot steal
//! aggro. Entries expire after a quiet window to release aggression once
//! combat ends, and entries whose entity disappeared are dropped on the
//! next refresh.

use std::collections::HashMap;

use crate::entity::EntityId;

/// Default quiet window after which a threat entry expires.
pub const DEFAULT_THREAT_EXPIRY_MS: u64 = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ThreatEntry {
    amount: u64,
    first_at_ms: u64,
    last_at_ms: u64,
}

/// Accumulated threat against one mob.
#[derive(Debug, Clone, Default)]
pub struct ThreatTable {
    entries: HashMap<EntityId, ThreatEntry>,
}

impl ThreatTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether no threat is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recorded threat for an entity.
    #[must_use]
    pub fn threat_of(&self, id: EntityId) -> u64 {
        self.entries.get(&id).map_or(0, |e| e.amount)
    }

    /// Accumulate threat from `id` at `now_ms`.
    pub fn add(&mut self, id: EntityId, amount: u64, now_ms: u64) {
        self.entries
            .entry(id)
            .and_modify(|e| {
                e.amount += amount;
                e.last_at_ms = now_ms;
            })
            .or_insert(ThreatEntry { amount, first_at_ms: now_ms, last_at_ms: now_ms });
    }

    /// Drop entries quiet for longer than `expiry_ms`, and entries whose
    /// entity no longer satisfies `present`.
    pub fn refresh<F>(&mut self, now_ms: u64, expiry_ms: u64, present: F)
    where
        F: Fn(EntityId) -> bool,
    {
        self.entries
            .retain(|&id, e| now_ms.saturating_sub(e.last_at_ms) < expiry_ms && present(id));
    }

    /// Remove one entity's threat outright (death, logout).
    pub fn remove(&mut self, id: EntityId) {
        self.entries.remove(&id);
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The entity with the highest threat; ties break toward the earliest
    /// first entry, then the lower id for full determinism.
    #[must_use]
    pub fn highest(&self) -> Option<EntityId> {
        self.entries
            .iter()
            .max_by(|(id_a, a), (id_b, b)| {
                a.amount
                    .cmp(&b.amount)
                    .then(b.first_at_ms.cmp(&a.first_at_ms))
                    .then(id_b.cmp(id_a))
            })
            .map(|(&id, _)| id)
    }
}
