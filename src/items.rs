//! Item definitions and inventory consumption helpers.
//!
//! The [`ItemRegistry`] maps item ids to their definitions: a kind tag,
//! display name, sprite glyph/color, and a free-form numeric field table
//! (damage, reach, range, accuracy, cooldown, heal, food, ...). Weapons
//! and consumables read their stats through [`ItemRegistry::get_field`]
//! with a per-call default, the same contract the tuning store uses.

use crate::components::{Health, Hunger, Inventory};
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// One item definition.
#[derive(Debug, Clone, Default)]
pub struct ItemDef {
    pub kind: String,
    pub display_name: String,
    pub glyph: char,
    pub color: [u8; 3],
    pub fields: BTreeMap<String, f32>,
}

impl ItemDef {
    pub fn new(kind: &str, display_name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            display_name: display_name.to_string(),
            glyph: '?',
            color: [200, 200, 200],
            fields: BTreeMap::new(),
        }
    }

    pub fn glyph(mut self, glyph: char, color: [u8; 3]) -> Self {
        self.glyph = glyph;
        self.color = color;
        self
    }

    pub fn field(mut self, key: &str, value: f32) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

/// Item id -> definition. Stored as a resource.
#[derive(Resource, Debug, Default)]
pub struct ItemRegistry {
    items: BTreeMap<String, ItemDef>,
}

impl ItemRegistry {
    pub fn register(&mut self, id: &str, def: ItemDef) {
        self.items.insert(id.to_string(), def);
    }

    pub fn get(&self, id: &str) -> Option<&ItemDef> {
        self.items.get(id)
    }

    pub fn item_kind(&self, id: &str) -> &str {
        self.items.get(id).map_or("", |d| d.kind.as_str())
    }

    pub fn display_name<'a>(&'a self, id: &'a str) -> &'a str {
        self.items.get(id).map_or(id, move |d| {
            if d.display_name.is_empty() {
                id
            } else {
                d.display_name.as_str()
            }
        })
    }

    /// Numeric field lookup with a call-site default.
    pub fn get_field(&self, id: &str, field: &str, default: f32) -> f32 {
        self.items
            .get(id)
            .and_then(|d| d.fields.get(field).copied())
            .unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The stock item set the simulation ships with.
    pub fn with_defaults() -> Self {
        let mut reg = Self::default();
        reg.register(
            "ration",
            ItemDef::new("consumable", "Field Ration")
                .glyph('%', [210, 180, 120])
                .field("food", 30.0),
        );
        reg.register(
            "stew",
            ItemDef::new("consumable", "Hearty Stew")
                .glyph('%', [190, 120, 60])
                .field("food", 55.0)
                .field("heal", 5.0),
        );
        reg.register(
            "canned_beans",
            ItemDef::new("consumable", "Canned Beans")
                .glyph('%', [160, 160, 90])
                .field("food", 40.0),
        );
        reg.register(
            "dried_meat",
            ItemDef::new("consumable", "Dried Meat")
                .glyph('%', [150, 90, 70])
                .field("food", 35.0),
        );
        reg.register(
            "medkit",
            ItemDef::new("consumable", "Medkit")
                .glyph('+', [240, 80, 80])
                .field("heal", 35.0),
        );
        reg.register(
            "bandage",
            ItemDef::new("consumable", "Bandage")
                .glyph('+', [230, 230, 230])
                .field("heal", 12.0),
        );
        reg.register(
            "knife",
            ItemDef::new("weapon", "Rusty Knife")
                .glyph('/', [180, 180, 190])
                .field("damage", 4.0)
                .field("reach", 1.2)
                .field("knockback", 2.0)
                .field("crit_chance", 0.15)
                .field("crit_mult", 1.8),
        );
        reg.register(
            "machete",
            ItemDef::new("weapon", "Machete")
                .glyph('/', [140, 150, 160])
                .field("damage", 9.0)
                .field("reach", 1.5)
                .field("knockback", 3.5)
                .field("crit_chance", 0.1)
                .field("crit_mult", 1.5),
        );
        reg.register(
            "pistol",
            ItemDef::new("weapon", "Scrap Pistol")
                .glyph(')', [120, 120, 130])
                .field("damage", 12.0)
                .field("range", 10.0)
                .field("accuracy", 0.85)
                .field("proj_speed", 14.0)
                .field("cooldown", 1.2),
        );
        reg.register(
            "rifle",
            ItemDef::new("weapon", "Hunting Rifle")
                .glyph(')', [100, 90, 70])
                .field("damage", 20.0)
                .field("range", 16.0)
                .field("accuracy", 0.92)
                .field("proj_speed", 20.0)
                .field("cooldown", 2.0),
        );
        reg.register(
            "leather_jacket",
            ItemDef::new("armor", "Leather Jacket")
                .glyph('[', [120, 90, 60])
                .field("defense", 3.0),
        );
        reg
    }
}

// ============================================================================
// CONSUMPTION HELPERS
// ============================================================================

/// Eat the most filling consumable in `inv`. Restores hunger, applies
/// any heal field, removes one unit. Returns the item id eaten.
pub fn consume_best_food(
    inv: &mut Inventory,
    hunger: &mut Hunger,
    health: Option<&mut Health>,
    registry: &ItemRegistry,
) -> Option<String> {
    let mut best: Option<(String, f32)> = None;
    for (item_id, &qty) in &inv.items {
        if qty == 0 || registry.item_kind(item_id) != "consumable" {
            continue;
        }
        let food = registry.get_field(item_id, "food", 0.0);
        if food <= 0.0 {
            continue;
        }
        if best.as_ref().is_none_or(|(_, f)| food > *f) {
            best = Some((item_id.clone(), food));
        }
    }
    let (item_id, food) = best?;
    inv.take_one(&item_id);
    hunger.current = (hunger.current + food).min(hunger.maximum);
    let heal = registry.get_field(&item_id, "heal", 0.0);
    if heal > 0.0 {
        if let Some(h) = health {
            h.heal(heal);
        }
    }
    Some(item_id)
}

/// Same as [`consume_best_food`] but eating out of a container's
/// inventory (communal storehouse).
pub fn consume_from_container(
    container: &mut Inventory,
    hunger: &mut Hunger,
    health: Option<&mut Health>,
    registry: &ItemRegistry,
) -> Option<String> {
    consume_best_food(container, hunger, health, registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_lookup_defaults() {
        let reg = ItemRegistry::with_defaults();
        assert!(!reg.is_empty() && reg.len() > 8);
        assert_eq!(reg.get_field("pistol", "range", 0.0), 10.0);
        assert_eq!(reg.get_field("pistol", "nonexistent", 7.0), 7.0);
        assert_eq!(reg.get_field("unknown_item", "range", 3.0), 3.0);
        assert_eq!(reg.item_kind("medkit"), "consumable");
        assert_eq!(reg.display_name("stew"), "Hearty Stew");
        assert_eq!(reg.display_name("mystery"), "mystery");
    }

    #[test]
    fn test_consume_best_food_picks_most_filling() {
        let reg = ItemRegistry::with_defaults();
        let mut inv = Inventory::default();
        inv.add("ration", 1); // food 30
        inv.add("stew", 1); // food 55, heal 5
        let mut hunger = Hunger {
            current: 10.0,
            maximum: 100.0,
            ..Default::default()
        };
        let mut health = Health::new(100.0);
        health.current = 50.0;

        let eaten = consume_best_food(&mut inv, &mut hunger, Some(&mut health), &reg);
        assert_eq!(eaten.as_deref(), Some("stew"));
        assert_eq!(hunger.current, 65.0);
        assert_eq!(health.current, 55.0);
        assert_eq!(inv.count("stew"), 0);
        assert_eq!(inv.count("ration"), 1);
    }

    #[test]
    fn test_consume_skips_non_food() {
        let reg = ItemRegistry::with_defaults();
        let mut inv = Inventory::default();
        inv.add("medkit", 2); // heal only, no food field
        inv.add("pistol", 1);
        let mut hunger = Hunger::default();
        assert!(consume_best_food(&mut inv, &mut hunger, None, &reg).is_none());
        assert_eq!(inv.count("medkit"), 2);
    }
}
