//! Brain dispatch and default (non-combat) behaviors.
//!
//! `tick_ai` executes brains for active, non-low-LOD entities once per
//! frame. Armed entities that should engage (hostile disposition,
//! recently hit, or a guard/hostile kind) run the combat FSM; everyone
//! else dispatches on [`BrainKind`].

use crate::components::*;
use crate::devlog::dev_log;
use crate::spatial::zone_entities;
use crate::systems::engagement::combat_brain;
use crate::systems::perception::should_engage;
use crate::systems::steering::{move_away, move_toward, run_idle};
use crate::tuning::tun;
use crate::world::{alive, GameClock, SimRng};
use crate::zone::ZoneMaps;
use bevy_ecs::prelude::*;

/// Execute brains for active, high-LOD entities.
pub fn tick_ai(world: &mut World, dt: f32) {
    let game_time = world.resource::<GameClock>().time;

    // Expire stale observations before anything reads them.
    let mut remembering: Vec<Entity> = world
        .query_filtered::<Entity, With<WorldMemory>>()
        .iter(world)
        .collect();
    remembering.sort();
    for eid in remembering {
        if let Some(mut mem) = world.get_mut::<WorldMemory>(eid) {
            mem.tick_expiry(game_time);
        }
    }

    let mut entities: Vec<Entity> = world
        .query_filtered::<Entity, With<Brain>>()
        .iter(world)
        .collect();
    entities.sort();

    for eid in entities {
        if !alive(world, eid) {
            continue;
        }
        let Some(brain) = world.get::<Brain>(eid) else {
            continue;
        };
        if !brain.active {
            continue;
        }
        let kind = brain.kind;

        if let Some(lod) = world.get::<Lod>(eid) {
            if lod.level == LodLevel::Low {
                continue;
            }
            if lod.transition_until > game_time {
                continue;
            }
        }
        let Some(pos) = world.get::<Position>(eid).copied() else {
            continue;
        };

        // Armed hostiles missing combat config get the defaults so a
        // faction flip alone is enough to make an entity fight.
        if world.get::<CombatStats>(eid).is_some() && world.get::<AttackConfig>(eid).is_none() {
            let hostile = world
                .get::<Faction>(eid)
                .is_some_and(|f| f.disposition == Disposition::Hostile);
            if hostile {
                world.entity_mut(eid).insert(AttackConfig::default());
                if world.get::<Threat>(eid).is_none() {
                    world.entity_mut(eid).insert(Threat::default());
                }
            }
        }

        // Home origin anchors to the spawn position on first tick.
        if let Some(home) = world.get::<HomeRange>(eid).copied() {
            if home.origin_x == 0.0 && home.origin_y == 0.0 {
                if let Some(mut h) = world.get_mut::<HomeRange>(eid) {
                    h.origin_x = pos.x;
                    h.origin_y = pos.y;
                }
            }
        }

        let armed =
            world.get::<Threat>(eid).is_some() && world.get::<AttackConfig>(eid).is_some();
        if armed && (should_engage(world, eid) || kind.engages_while_neutral()) {
            combat_brain(world, eid, dt, game_time);
            continue;
        }

        match kind {
            BrainKind::Villager => villager_brain(world, eid, game_time),
            _ => wander_brain(world, eid, game_time),
        }
    }
}

/// Panic flee shared by the civilian brains. Returns true while active.
fn crime_flee(world: &mut World, eid: Entity, pos: &Position, game_time: f32) -> bool {
    let Some(brain) = world.get::<Brain>(eid) else {
        return false;
    };
    if brain.crime_flee_until <= game_time {
        return false;
    }
    let from = brain.crime_flee_from.unwrap_or((pos.x + 1.0, pos.y));
    let speed = world.get::<HomeRange>(eid).map_or(2.0, |h| h.speed)
        * tun(world, "ai.helpers", "civilian_flee_speed_mult", 1.5);

    let mut vel = Velocity::default();
    move_away(pos.x, pos.y, &mut vel, from.0, from.1, speed);
    set_velocity_and_facing(world, eid, vel);
    true
}

/// Default behavior: wander the home envelope.
fn wander_brain(world: &mut World, eid: Entity, game_time: f32) {
    let Some(pos) = world.get::<Position>(eid).copied() else {
        return;
    };
    if crime_flee(world, eid, &pos, game_time) {
        return;
    }
    let Some(home) = world.get::<HomeRange>(eid).copied() else {
        return;
    };
    let Some(brain) = world.get::<Brain>(eid) else {
        return;
    };
    let mut wander = brain.wander;
    let mut vel = Velocity::default();
    let mut rng = world.resource::<SimRng>().0.clone();
    {
        let maps = world.resource::<ZoneMaps>();
        run_idle(
            &mut rng, maps, pos.zone, &home, pos.x, pos.y, &mut wander, &mut vel, game_time,
        );
    }
    world.resource_mut::<SimRng>().0 = rng;
    if let Some(mut brain) = world.get_mut::<Brain>(eid) {
        brain.wander = wander;
    }
    set_velocity_and_facing(world, eid, vel);
}

/// Villagers wander like everyone else but walk to the storehouse when
/// they get hungry enough (the auto-eat system does the actual eating
/// once they are in the same zone as food).
fn villager_brain(world: &mut World, eid: Entity, game_time: f32) {
    let Some(pos) = world.get::<Position>(eid).copied() else {
        return;
    };
    if crime_flee(world, eid, &pos, game_time) {
        return;
    }

    let hungry = world
        .get::<Needs>(eid)
        .is_some_and(|n| n.priority == NeedPriority::Eat && n.urgency >= 0.3);
    if hungry {
        if let Some((cx, cy)) = nearest_container(world, &pos) {
            let d = (cx - pos.x).hypot(cy - pos.y);
            if d > 1.2 {
                let speed = world.get::<HomeRange>(eid).map_or(2.0, |h| h.speed);
                let mut vel = Velocity::default();
                move_toward(pos.x, pos.y, &mut vel, cx, cy, speed);
                set_velocity_and_facing(world, eid, vel);
                let t = world.resource::<GameClock>().time;
                dev_log(world, eid, "needs", "walking to storehouse", t);
                return;
            }
            // At the container: stand still and let auto-eat run.
            set_velocity_and_facing(world, eid, Velocity::default());
            return;
        }
    }
    wander_brain(world, eid, game_time);
}

fn nearest_container(world: &World, pos: &Position) -> Option<(f32, f32)> {
    let mut best: Option<((f32, f32), f32)> = None;
    for eid in zone_entities(world, pos.zone) {
        if world
            .get::<Identity>(eid)
            .is_none_or(|i| i.kind != "container")
        {
            continue;
        }
        let has_food = world.get::<Inventory>(eid).is_some_and(|inv| !inv.is_empty());
        if !has_food {
            continue;
        }
        let Some(cpos) = world.get::<Position>(eid) else {
            continue;
        };
        let d = pos.distance_to(cpos);
        if best.is_none_or(|(_, bd)| d < bd) {
            best = Some(((cpos.x, cpos.y), d));
        }
    }
    best.map(|(xy, _)| xy)
}

fn set_velocity_and_facing(world: &mut World, eid: Entity, vel: Velocity) {
    if vel.magnitude() > 0.01 {
        if let Some(mut facing) = world.get_mut::<Facing>(eid) {
            facing.direction = Dir::from_vector(vel.x, vel.y);
        }
    }
    if let Some(mut v) = world.get_mut::<Velocity>(eid) {
        *v = vel;
    }
}
