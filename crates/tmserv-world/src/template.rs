//! Mob templates and drop tables.
//!
//! Catalogs are read-only JSON files loaded at boot. A template carries
//! everything the spawn engine and AI need to instantiate and drive a mob;
//! drops are rolled per-death from the template's drop entries.

use std::{collections::HashMap, path::Path};

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One possible drop from a mob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropEntry {
    /// Item template id.
    pub item_id: u16,
    /// Drop chance in permille (1000 = always).
    pub chance_permille: u16,
    /// Smallest stack dropped.
    #[serde(default = "one")]
    pub min_qty: u16,
    /// Largest stack dropped.
    #[serde(default = "one")]
    pub max_qty: u16,
}

fn one() -> u16 {
    1
}

fn default_true() -> bool {
    true
}

/// A rolled loot drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LootDrop {
    /// Item template id.
    pub item_id: u16,
    /// Stack size.
    pub quantity: u16,
}

/// Static definition of one mob kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MobTemplate {
    /// Template id referenced by spawn groups.
    pub id: u16,
    /// Display name.
    pub name: String,
    /// Level, for combat scaling.
    pub level: u16,
    /// Maximum hit points.
    pub max_hp: u32,
    /// Maximum mana.
    #[serde(default)]
    pub max_mp: u32,
    /// Attack rating.
    pub attack: u16,
    /// Defense rating.
    pub defense: u16,
    /// Movement speed in tiles per second.
    pub move_speed: u16,
    /// Attack reach in tiles.
    pub attack_range: u16,
    /// Aggro scan radius in tiles.
    pub sight_range: u16,
    /// Milliseconds between attacks.
    pub attack_cooldown_ms: u64,
    /// Flee when hit points drop below this percent. Zero disables fleeing.
    #[serde(default)]
    pub flee_hp_percent: u8,
    /// Whether the mob attacks characters on sight.
    #[serde(default = "default_true")]
    pub aggressive: bool,
    /// Whether nearby group members aggro when this mob is damaged.
    #[serde(default)]
    pub calls_for_help: bool,
    /// Possible drops.
    #[serde(default)]
    pub drops: Vec<DropEntry>,
}

impl MobTemplate {
    /// Roll this template's drop table.
    pub fn roll_drops<R: Rng>(&self, rng: &mut R) -> Vec<LootDrop> {
        self.drops
            .iter()
            .filter_map(|entry| {
                if rng.gen_range(0..1000) < entry.chance_permille {
                    let hi = entry.max_qty.max(entry.min_qty);
                    Some(LootDrop { item_id: entry.item_id, quantity: rng.gen_range(entry.min_qty..=hi) })
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Catalog load errors.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// File could not be read.
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// File content is not a valid catalog.
    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two templates share an id.
    #[error("duplicate template id {0}")]
    DuplicateId(u16),
}

/// All mob templates, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct TemplateCatalog {
    templates: HashMap<u16, MobTemplate>,
}

impl TemplateCatalog {
    /// Build a catalog from a template list, rejecting duplicate ids.
    pub fn from_templates(templates: Vec<MobTemplate>) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(templates.len());
        for template in templates {
            let id = template.id;
            if map.insert(id, template).is_some() {
                return Err(CatalogError::DuplicateId(id));
            }
        }
        Ok(Self { templates: map })
    }

    /// Parse a catalog from JSON text.
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let templates: Vec<MobTemplate> = serde_json::from_str(json)?;
        Self::from_templates(templates)
    }

    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Template by id.
    #[must_use]
    pub fn get(&self, id: u16) -> Option<&MobTemplate> {
        self.templates.get(&id)
    }

    /// Number of templates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;

    pub(crate) fn wolf() -> MobTemplate {
        MobTemplate {
            id: 101,
            name: "Gray Wolf".to_string(),
            level: 12,
            max_hp: 300,
            max_mp: 0,
            attack: 40,
            defense: 10,
            move_speed: 3,
            attack_range: 1,
            sight_range: 8,
            attack_cooldown_ms: 1500,
            flee_hp_percent: 0,
            aggressive: true,
            calls_for_help: true,
            drops: vec![
                DropEntry { item_id: 500, chance_permille: 1000, min_qty: 1, max_qty: 1 },
                DropEntry { item_id: 501, chance_permille: 0, min_qty: 1, max_qty: 1 },
            ],
        }
    }

    #[test]
    fn catalog_parses_json() {
        let json = r#"[
            {
                "id": 101, "name": "Gray Wolf", "level": 12, "max_hp": 300,
                "attack": 40, "defense": 10, "move_speed": 3,
                "attack_range": 1, "sight_range": 8, "attack_cooldown_ms": 1500
            }
        ]"#;

        let catalog = TemplateCatalog::from_json(json).expect("parses");
        let wolf = catalog.get(101).expect("present");
        assert_eq!(wolf.name, "Gray Wolf");
        assert_eq!(wolf.max_mp, 0);
        assert!(!wolf.calls_for_help);
        assert!(wolf.drops.is_empty());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let result = TemplateCatalog::from_templates(vec![wolf(), wolf()]);
        assert!(matches!(result, Err(CatalogError::DuplicateId(101))));
    }

    #[test]
    fn certain_and_impossible_drops() {
        let mut rng = StdRng::seed_from_u64(7);
        let drops = wolf().roll_drops(&mut rng);

        assert_eq!(drops.len(), 1, "only the guaranteed entry drops");
        assert_eq!(drops[0].item_id, 500);
        assert_eq!(drops[0].quantity, 1);
    }
}
