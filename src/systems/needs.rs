//! Hunger drain, starvation, auto-eat, and settlement food production.
//!
//! `hunger_system` drains every Hunger each frame, applies starvation
//! damage at zero, and writes `Needs.priority` so brains can react.
//! `auto_eat_system` lets hungry NPCs eat the best food they carry, or
//! failing that a communal storehouse meal. `settlement_food_production`
//! restocks settlement containers on a timer so the storehouse never
//! stays empty for long.
//!
//! Priority bands (fraction of `hunger.maximum`):
//!   >= well_fed  -> none
//!   >= hungry    -> eat, urgency 0.3
//!   >  0         -> eat, urgency 0.7
//!   == 0         -> eat, urgency 1.0 (starving, taking damage)

use crate::components::*;
use crate::devlog::dev_log;
use crate::items::{consume_best_food, consume_from_container, ItemRegistry};
use crate::spatial::zone_entities;
use crate::tuning::tun;
use crate::world::{alive, display_name, GameClock};
use bevy_ecs::prelude::*;
use std::collections::BTreeMap;

/// Per-container restock timers (containers have no Brain to hold
/// timing state, so it lives in a resource).
#[derive(Resource, Debug, Default)]
pub struct RefillTimers {
    pub timers: BTreeMap<Entity, f32>,
}

// ============================================================================
// HUNGER
// ============================================================================

/// Tick hunger for every entity that has it. Off-screen residents are
/// skipped - the subzone scheduler owns their needs.
pub fn hunger_system(world: &mut World, dt: f32) {
    let well_fed = tun(world, "needs", "well_fed_ratio", 0.5);
    let hungry = tun(world, "needs", "hungry_ratio", 0.25);

    let mut entities: Vec<Entity> = world
        .query_filtered::<Entity, With<Hunger>>()
        .iter(world)
        .collect();
    entities.sort();

    for eid in entities {
        if world.get::<SubzonePos>(eid).is_some() {
            continue;
        }
        let Some(mut hunger) = world.get_mut::<Hunger>(eid) else {
            continue;
        };
        hunger.current = (hunger.current - hunger.rate * dt).max(0.0);
        let ratio = hunger.current / hunger.maximum.max(0.01);
        let starving = hunger.current <= 0.0;
        let starve_dps = hunger.starve_dps;

        if starving {
            if let Some(mut health) = world.get_mut::<Health>(eid) {
                health.current = (health.current - starve_dps * dt).max(0.0);
            }
        }

        let Some(mut needs) = world.get_mut::<Needs>(eid) else {
            continue;
        };
        if ratio >= well_fed {
            // Don't clobber a non-eat priority someone else set.
            if needs.priority == NeedPriority::Eat {
                needs.priority = NeedPriority::None;
                needs.urgency = 0.0;
            }
        } else if ratio >= hungry {
            needs.priority = NeedPriority::Eat;
            needs.urgency = 0.3;
        } else if !starving {
            needs.priority = NeedPriority::Eat;
            needs.urgency = 0.7;
        } else {
            needs.priority = NeedPriority::Eat;
            needs.urgency = 1.0;
        }
    }
}

// ============================================================================
// AUTO-EAT
// ============================================================================

/// Auto-eat for any non-player NPC whose needs say "eat". Personal
/// inventory first, then the nearest communal container in the zone.
pub fn auto_eat_system(world: &mut World, _dt: f32) {
    let game_time = world.resource::<GameClock>().time;
    let eat_cd = tun(world, "needs", "eat_cooldown", 30.0);

    let mut entities: Vec<Entity> = world
        .query_filtered::<Entity, With<Needs>>()
        .iter(world)
        .collect();
    entities.sort();

    for eid in entities {
        if world.get::<SubzonePos>(eid).is_some() || world.get::<Player>(eid).is_some() {
            continue;
        }
        let Some(needs) = world.get::<Needs>(eid) else {
            continue;
        };
        if needs.priority != NeedPriority::Eat || needs.urgency < 0.3 {
            continue;
        }
        if world.get::<Hunger>(eid).is_none() {
            continue;
        }
        if let Some(brain) = world.get::<Brain>(eid) {
            if game_time - brain.auto_eat_at < eat_cd {
                continue;
            }
        }

        let ate = eat_from_inventory(world, eid) || eat_communal(world, eid);
        if ate {
            if let Some(mut brain) = world.get_mut::<Brain>(eid) {
                brain.auto_eat_at = game_time;
            }
        }
    }
}

/// Eat the best food in the entity's own inventory.
fn eat_from_inventory(world: &mut World, eid: Entity) -> bool {
    let Some(mut inv) = world.get::<Inventory>(eid).cloned() else {
        return false;
    };
    let Some(mut hunger) = world.get::<Hunger>(eid).copied() else {
        return false;
    };
    let mut health = world.get::<Health>(eid).copied();

    let eaten = {
        let Some(registry) = world.get_resource::<ItemRegistry>() else {
            return false;
        };
        consume_best_food(&mut inv, &mut hunger, health.as_mut(), registry)
    };
    let Some(item) = eaten else {
        return false;
    };

    if let Some(mut c) = world.get_mut::<Inventory>(eid) {
        *c = inv;
    }
    if let Some(mut h) = world.get_mut::<Hunger>(eid) {
        *h = hunger;
    }
    if let (Some(health), Some(mut h)) = (health, world.get_mut::<Health>(eid)) {
        *h = health;
    }
    let t = world.resource::<GameClock>().time;
    dev_log(world, eid, "needs", format!("ate {item}"), t);
    true
}

/// Settlement NPC eats from the nearest communal storehouse. Only the
/// settlers group qualifies - the village feeds its own.
fn eat_communal(world: &mut World, eid: Entity) -> bool {
    if world
        .get::<Faction>(eid)
        .is_none_or(|f| f.group != "settlers")
    {
        return false;
    }
    let Some(pos) = world.get::<Position>(eid).copied() else {
        return false;
    };
    let Some(mut hunger) = world.get::<Hunger>(eid).copied() else {
        return false;
    };
    let mut health = world.get::<Health>(eid).copied();

    for container in zone_entities(world, pos.zone) {
        if !alive(world, container) {
            continue;
        }
        if world
            .get::<Identity>(container)
            .is_none_or(|i| i.kind != "container")
        {
            continue;
        }
        let Some(mut cinv) = world.get::<Inventory>(container).cloned() else {
            continue;
        };
        if cinv.is_empty() {
            continue;
        }

        let eaten = {
            let Some(registry) = world.get_resource::<ItemRegistry>() else {
                return false;
            };
            consume_from_container(&mut cinv, &mut hunger, health.as_mut(), registry)
        };
        if eaten.is_none() {
            continue;
        }

        if let Some(mut c) = world.get_mut::<Inventory>(container) {
            *c = cinv;
        }
        if let Some(mut h) = world.get_mut::<Hunger>(eid) {
            *h = hunger;
        }
        if let (Some(health), Some(mut h)) = (health, world.get_mut::<Health>(eid)) {
            *h = health;
        }
        let t = world.resource::<GameClock>().time;
        let name = display_name(world, eid);
        tracing::debug!(target: "needs", "{name} ate communal food");
        dev_log(world, eid, "needs", "ate communal food", t);
        return true;
    }
    false
}

// ============================================================================
// SETTLEMENT FOOD PRODUCTION
// ============================================================================

const REFILL_ITEMS: [(&str, u32); 2] = [("stew", 3), ("ration", 5)];

fn max_stock(item: &str) -> u32 {
    match item {
        "stew" => 20,
        "ration" => 30,
        "canned_beans" | "dried_meat" => 15,
        _ => 20,
    }
}

/// Timer-gated restock of settlement-zone containers - the village
/// farms and cooks in the background.
pub fn settlement_food_production(world: &mut World, _dt: f32) {
    let Some(settlement) = world
        .get_resource::<crate::zone::ZoneMaps>()
        .and_then(|m| m.id("settlement"))
    else {
        return;
    };
    let game_time = world.resource::<GameClock>().time;
    let refill_ivl = tun(world, "needs.storehouse_refill", "refill_interval", 300.0);

    let mut containers: Vec<Entity> = world
        .query_filtered::<Entity, (With<Identity>, With<Inventory>)>()
        .iter(world)
        .collect();
    containers.sort();

    for ceid in containers {
        if world
            .get::<Identity>(ceid)
            .is_none_or(|i| i.kind != "container")
        {
            continue;
        }
        let in_settlement = world
            .get::<Position>(ceid)
            .map(|p| p.zone == settlement)
            .or_else(|| world.get::<SubzonePos>(ceid).map(|s| s.zone == settlement))
            .unwrap_or(false);
        if !in_settlement {
            continue;
        }

        {
            let mut timers = world.resource_mut::<RefillTimers>();
            let last = timers.timers.get(&ceid).copied().unwrap_or(0.0);
            if game_time - last < refill_ivl {
                continue;
            }
            timers.timers.insert(ceid, game_time);
        }

        let Some(mut inv) = world.get_mut::<Inventory>(ceid) else {
            continue;
        };
        for (item, amount) in REFILL_ITEMS {
            let current = inv.count(item);
            let cap = max_stock(item);
            if current < cap {
                let add = amount.min(cap - current);
                inv.add(item, add);
                if add > 0 {
                    tracing::debug!(target: "needs", "storehouse restocked +{add} {item}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ZoneIndex;
    use crate::tuning::Tuning;
    use crate::world::{register_zone, Graveyard};
    use crate::zone::{TileGrid, ZoneId, ZoneMaps, TILE_GRASS};

    fn needs_world() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let z = maps.insert("settlement", TileGrid::new(20, 20, TILE_GRASS));
        world.insert_resource(maps);
        world.insert_resource(GameClock::default());
        world.insert_resource(Tuning::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(Graveyard::default());
        world.insert_resource(ItemRegistry::with_defaults());
        world.insert_resource(RefillTimers::default());
        (world, z)
    }

    #[test]
    fn test_hunger_drains_and_bands() {
        let (mut world, z) = needs_world();
        let e = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Hunger {
                    current: 30.0,
                    maximum: 100.0,
                    rate: 10.0,
                    starve_dps: 1.0,
                },
                Needs::default(),
                Health::new(100.0),
            ))
            .id();

        hunger_system(&mut world, 1.0);
        let n = world.get::<Needs>(e).unwrap();
        assert_eq!(n.priority, NeedPriority::Eat);
        assert!((n.urgency - 0.7).abs() < 1e-6);
        assert_eq!(world.get::<Hunger>(e).unwrap().current, 20.0);
    }

    #[test]
    fn test_starvation_damages_but_never_negative_hunger() {
        let (mut world, z) = needs_world();
        let e = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Hunger {
                    current: 0.5,
                    maximum: 100.0,
                    rate: 10.0,
                    starve_dps: 2.0,
                },
                Needs::default(),
                Health::new(100.0),
            ))
            .id();

        hunger_system(&mut world, 1.0);
        let h = world.get::<Hunger>(e).unwrap();
        assert_eq!(h.current, 0.0);
        hunger_system(&mut world, 1.0);
        assert_eq!(world.get::<Hunger>(e).unwrap().current, 0.0);
        assert!(world.get::<Health>(e).unwrap().current < 100.0);
        assert_eq!(world.get::<Needs>(e).unwrap().urgency, 1.0);
    }

    #[test]
    fn test_auto_eat_from_own_inventory() {
        let (mut world, z) = needs_world();
        let mut inv = Inventory::default();
        inv.add("ration", 1);
        let e = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Hunger {
                    current: 10.0,
                    maximum: 100.0,
                    rate: 0.1,
                    starve_dps: 1.0,
                },
                Needs {
                    priority: NeedPriority::Eat,
                    urgency: 0.7,
                },
                Brain::new(BrainKind::Villager),
                inv,
            ))
            .id();
        register_zone(&mut world, e, z);

        world.resource_mut::<GameClock>().time = 100.0;
        auto_eat_system(&mut world, 1.0 / 60.0);
        assert_eq!(world.get::<Hunger>(e).unwrap().current, 40.0);
        assert_eq!(world.get::<Inventory>(e).unwrap().count("ration"), 0);
        assert_eq!(world.get::<Brain>(e).unwrap().auto_eat_at, 100.0);
    }

    #[test]
    fn test_auto_eat_falls_back_to_communal_for_settlers() {
        let (mut world, z) = needs_world();
        let mut stock = Inventory::default();
        stock.add("stew", 2);
        let storehouse = world
            .spawn((
                Identity::container("storehouse"),
                Position::new(6.0, 5.0, z),
                stock,
            ))
            .id();
        register_zone(&mut world, storehouse, z);

        let e = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Hunger {
                    current: 5.0,
                    maximum: 100.0,
                    rate: 0.1,
                    starve_dps: 1.0,
                },
                Needs {
                    priority: NeedPriority::Eat,
                    urgency: 1.0,
                },
                Brain::new(BrainKind::Villager),
                Faction::new("settlers", Disposition::Friendly),
                Inventory::default(),
            ))
            .id();
        register_zone(&mut world, e, z);

        world.resource_mut::<GameClock>().time = 100.0;
        auto_eat_system(&mut world, 1.0 / 60.0);
        assert!(world.get::<Hunger>(e).unwrap().current > 5.0);
        assert_eq!(world.get::<Inventory>(storehouse).unwrap().count("stew"), 1);
    }

    #[test]
    fn test_eat_cooldown_blocks_back_to_back_meals() {
        let (mut world, z) = needs_world();
        let mut inv = Inventory::default();
        inv.add("ration", 3);
        let e = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Hunger {
                    current: 1.0,
                    maximum: 100.0,
                    rate: 0.1,
                    starve_dps: 1.0,
                },
                Needs {
                    priority: NeedPriority::Eat,
                    urgency: 1.0,
                },
                Brain::new(BrainKind::Villager),
                inv,
            ))
            .id();
        register_zone(&mut world, e, z);

        world.resource_mut::<GameClock>().time = 100.0;
        auto_eat_system(&mut world, 0.016);
        auto_eat_system(&mut world, 0.016);
        // Second call inside the cooldown: only one ration gone
        assert_eq!(world.get::<Inventory>(e).unwrap().count("ration"), 2);
    }

    #[test]
    fn test_settlement_restock_caps() {
        let (mut world, z) = needs_world();
        let storehouse = world
            .spawn((
                Identity::container("storehouse"),
                Position::new(6.0, 5.0, z),
                Inventory::default(),
            ))
            .id();
        register_zone(&mut world, storehouse, z);

        world.resource_mut::<GameClock>().time = 1000.0;
        settlement_food_production(&mut world, 0.016);
        let inv = world.get::<Inventory>(storehouse).unwrap();
        assert_eq!(inv.count("stew"), 3);
        assert_eq!(inv.count("ration"), 5);

        // Timer blocks immediate re-restock
        settlement_food_production(&mut world, 0.016);
        assert_eq!(world.get::<Inventory>(storehouse).unwrap().count("stew"), 3);
    }
}
