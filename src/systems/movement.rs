//! Physics / movement system.
//!
//! Moves entities with Position + Velocity, resolves tile collisions
//! with axis-separated wall-sliding, applies soft entity separation,
//! and decays knockback while an entity is hit-stunned.

use crate::components::*;
use crate::world::alive;
use crate::zone::{ZoneMaps, HITBOX_H, HITBOX_W};
use bevy_ecs::prelude::*;
use std::collections::HashMap;

/// Move entities, prevent movement into wall tiles, separate bodies.
///
/// Low-LOD entities have their velocity zeroed and skip integration;
/// only the player and high/medium-LOD entities move.
pub fn movement_system(world: &mut World, dt: f32) {
    // Snapshot collidable bodies; positions update as movers commit so
    // later entities separate against current locations.
    let mut bodies: HashMap<Entity, (f32, f32, f32, crate::zone::ZoneId)> = HashMap::new();
    let mut colliders: Vec<Entity> = Vec::new();
    {
        let mut q = world.query::<(Entity, &Position, &Collider)>();
        for (eid, pos, col) in q.iter(world) {
            bodies.insert(eid, (pos.x, pos.y, col.width, pos.zone));
            colliders.push(eid);
        }
    }
    colliders.sort();

    let mut movers: Vec<Entity> = world
        .query_filtered::<Entity, (With<Position>, With<Velocity>)>()
        .iter(world)
        .collect();
    movers.sort();

    world.resource_scope(|world, maps: Mut<ZoneMaps>| {
        for eid in movers {
            if !alive(world, eid) {
                continue;
            }
            let is_player = world.get::<Player>(eid).is_some();
            if !is_player {
                if let Some(lod) = world.get::<Lod>(eid) {
                    if lod.level == LodLevel::Low {
                        if let Some(mut vel) = world.get_mut::<Velocity>(eid) {
                            vel.zero();
                        }
                        continue;
                    }
                }
            }

            let Some(pos) = world.get::<Position>(eid).copied() else {
                continue;
            };
            let Some(vel0) = world.get::<Velocity>(eid).copied() else {
                continue;
            };

            let mut vel = vel0;
            let mut nx = pos.x + vel.x * dt;
            let mut ny = pos.y + vel.y * dt;

            // Axis-separated tile collision allows wall-sliding.
            if let Some(grid) = maps.grid(pos.zone) {
                if grid.aabb_hits_wall(nx, pos.y, HITBOX_W, HITBOX_H) {
                    nx = pos.x;
                    vel.x = 0.0;
                }
                if grid.aabb_hits_wall(nx, ny, HITBOX_W, HITBOX_H) {
                    ny = pos.y;
                    vel.y = 0.0;
                }
            }

            // Entity soft separation: nudge overlapping bodies apart by
            // 40% of the overlap so they slide past instead of sticking.
            let (wall_safe_x, wall_safe_y) = (nx, ny);
            if let Some(&(_, _, my_w, _)) = bodies.get(&eid) {
                for other in &colliders {
                    if *other == eid {
                        continue;
                    }
                    let Some(&(ox, oy, ow, ozone)) = bodies.get(other) else {
                        continue;
                    };
                    if ozone != pos.zone || !alive(world, *other) {
                        continue;
                    }
                    let ddx = nx - ox;
                    let ddy = ny - oy;
                    let min_dist = (my_w + ow) * 0.5;
                    let dist_sq = ddx * ddx + ddy * ddy;
                    if dist_sq < min_dist * min_dist && dist_sq > 0.0001 {
                        let dist = dist_sq.sqrt();
                        let push = (min_dist - dist) * 0.4;
                        nx += ddx / dist * push;
                        ny += ddy / dist * push;
                    }
                }
            }

            // A separation push must not shove the body into a wall.
            if let Some(grid) = maps.grid(pos.zone) {
                if (nx, ny) != (wall_safe_x, wall_safe_y)
                    && grid.aabb_hits_wall(nx, ny, HITBOX_W, HITBOX_H)
                {
                    nx = wall_safe_x;
                    ny = wall_safe_y;
                }
            }

            // Commit
            if let Some(mut p) = world.get_mut::<Position>(eid) {
                p.x = nx;
                p.y = ny;
            }
            if let Some(body) = bodies.get_mut(&eid) {
                body.0 = nx;
                body.1 = ny;
            }

            // Knockback friction while hit-stunned.
            if !is_player {
                let stunned = world
                    .get::<HitFlash>(eid)
                    .is_some_and(|hf| hf.remaining > 0.0);
                if stunned {
                    vel.x *= 0.85;
                    vel.y *= 0.85;
                    if vel.x.abs() < 0.05 {
                        vel.x = 0.0;
                    }
                    if vel.y.abs() < 0.05 {
                        vel.y = 0.0;
                    }
                }
            }
            if let Some(mut v) = world.get_mut::<Velocity>(eid) {
                *v = vel;
            }
        }
    });

    // Hit-flash decay lives with the friction it drives.
    let mut flashed: Vec<Entity> = world
        .query_filtered::<Entity, With<HitFlash>>()
        .iter(world)
        .collect();
    flashed.sort();
    for eid in flashed {
        let expired = {
            let Some(mut hf) = world.get_mut::<HitFlash>(eid) else {
                continue;
            };
            hf.remaining -= dt;
            hf.remaining <= 0.0
        };
        if expired {
            world.entity_mut(eid).remove::<HitFlash>();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ZoneIndex;
    use crate::world::Graveyard;
    use crate::zone::{TileGrid, ZoneId, TILE_GRASS};

    fn move_world() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let mut grid = TileGrid::new(20, 20, TILE_GRASS);
        grid.wall_border();
        let z = maps.insert("arena", grid);
        world.insert_resource(maps);
        world.insert_resource(Graveyard::default());
        world.insert_resource(ZoneIndex::default());
        (world, z)
    }

    #[test]
    fn test_velocity_integrates() {
        let (mut world, z) = move_world();
        let e = world
            .spawn((Position::new(5.0, 5.0, z), Velocity::new(2.0, 1.0)))
            .id();
        movement_system(&mut world, 0.5);
        let p = world.get::<Position>(e).unwrap();
        assert!((p.x - 6.0).abs() < 1e-4);
        assert!((p.y - 5.5).abs() < 1e-4);
    }

    #[test]
    fn test_wall_slide_keeps_free_axis() {
        let (mut world, z) = move_world();
        // Heading up-right into the top border: x keeps moving, y stops.
        let e = world
            .spawn((Position::new(5.0, 1.1, z), Velocity::new(3.0, -3.0)))
            .id();
        movement_system(&mut world, 0.1);
        let p = world.get::<Position>(e).unwrap();
        let v = world.get::<Velocity>(e).unwrap();
        assert!(p.x > 5.0);
        assert!((p.y - 1.1).abs() < 1e-4);
        assert_eq!(v.y, 0.0);
        assert!(v.x > 0.0);

        // Never ends a tick inside a wall.
        let maps = world.resource::<ZoneMaps>();
        assert!(!maps.grid(z).unwrap().aabb_hits_wall(p.x, p.y, 0.8, 0.8));
    }

    #[test]
    fn test_soft_separation_pushes_overlapping_bodies() {
        let (mut world, z) = move_world();
        let a = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Velocity::default(),
                Collider::default(),
            ))
            .id();
        let b = world
            .spawn((
                Position::new(5.2, 5.0, z),
                Velocity::default(),
                Collider::default(),
            ))
            .id();
        for _ in 0..30 {
            movement_system(&mut world, 1.0 / 60.0);
        }
        let pa = world.get::<Position>(a).unwrap();
        let pb = world.get::<Position>(b).unwrap();
        let dist = (pa.x - pb.x).hypot(pa.y - pb.y);
        assert!(dist > 0.7, "bodies should separate, dist = {dist}");
    }

    #[test]
    fn test_low_lod_velocity_zeroed() {
        let (mut world, z) = move_world();
        let e = world
            .spawn((
                Position::new(5.0, 5.0, z),
                Velocity::new(4.0, 0.0),
                Lod {
                    level: LodLevel::Low,
                    transition_until: 0.0,
                },
            ))
            .id();
        movement_system(&mut world, 0.1);
        let p = world.get::<Position>(e).unwrap();
        let v = world.get::<Velocity>(e).unwrap();
        assert_eq!((p.x, p.y), (5.0, 5.0));
        assert_eq!(v.magnitude(), 0.0);
    }

    #[test]
    fn test_knockback_friction_decays_under_hitflash() {
        let (mut world, z) = move_world();
        let e = world
            .spawn((
                Position::new(10.0, 10.0, z),
                Velocity::new(5.0, 0.0),
                HitFlash { remaining: 1.0 },
            ))
            .id();
        for _ in 0..30 {
            movement_system(&mut world, 1.0 / 60.0);
        }
        let v = world.get::<Velocity>(e).unwrap();
        assert!(v.x < 1.0, "knockback should decay, vx = {}", v.x);
    }

    #[test]
    fn test_hitflash_expires_and_detaches() {
        let (mut world, z) = move_world();
        let e = world
            .spawn((
                Position::new(10.0, 10.0, z),
                Velocity::default(),
                HitFlash { remaining: 0.05 },
            ))
            .id();
        movement_system(&mut world, 0.1);
        assert!(world.get::<HitFlash>(e).is_none());
    }
}
