//! Projectile tick system.
//!
//! Each frame:
//! 1. Advance every projectile along its direction vector.
//! 2. Kill on wall / out-of-bounds contact (with a debris puff).
//! 3. Kill when `max_range` is exceeded.
//! 4. Resolve the first hurtbox overlap and apply falloff damage.
//!
//! Damage falloff: projectiles lose up to half their damage at max
//! range (`combat.ranged.projectile_falloff_min`).

use crate::components::*;
use crate::events::{emit, GameEvent};
use crate::particles::{self, BurstParams};
use crate::spatial::zone_entities;
use crate::systems::damage::{apply_damage, DamageSpec};
use crate::tuning::tun;
use crate::world::{alive, kill};
use crate::zone::{ZoneMaps, TILE_WALL};
use bevy_ecs::prelude::*;

/// Tick all projectiles for one frame.
pub fn projectile_system(world: &mut World, dt: f32) {
    // A projectile with no Position should not exist; reap the orphan
    // instead of letting it sit in the store forever.
    let orphans: Vec<Entity> = world
        .query_filtered::<Entity, (With<Projectile>, Without<Position>)>()
        .iter(world)
        .collect();
    for eid in orphans {
        tracing::warn!(target: "combat", "orphan projectile {eid:?} culled");
        kill(world, eid);
    }

    let mut shots: Vec<Entity> = world
        .query_filtered::<Entity, (With<Projectile>, With<Position>)>()
        .iter(world)
        .collect();
    shots.sort();

    for eid in shots {
        if !alive(world, eid) {
            continue;
        }
        let Some(mut pos) = world.get::<Position>(eid).copied() else {
            continue;
        };
        let Some(proj) = world.get::<Projectile>(eid).cloned() else {
            continue;
        };

        let step = proj.speed * dt;
        pos.x += proj.dx * step;
        pos.y += proj.dy * step;
        let traveled = proj.traveled + step;

        if let Some(mut p) = world.get_mut::<Position>(eid) {
            *p = pos;
        }
        if let Some(mut pr) = world.get_mut::<Projectile>(eid) {
            pr.traveled = traveled;
        }

        // Wall / out-of-bounds contact
        let tile = world
            .resource::<ZoneMaps>()
            .grid(pos.zone)
            .and_then(|g| g.tile(pos.y.floor() as i32, pos.x.floor() as i32));
        if !matches!(tile, Some(t) if t != TILE_WALL) {
            particles::emit_params(
                world,
                pos.x,
                pos.y,
                &BurstParams {
                    count: 4,
                    color: [180, 180, 180],
                    speed: 2.0,
                    life: 0.2,
                    size: 1.5,
                    ..Default::default()
                },
            );
            kill(world, eid);
            continue;
        }

        if traveled >= proj.max_range {
            kill(world, eid);
            continue;
        }

        if let Some(hit) = check_hit(world, eid, &pos, &proj) {
            apply_projectile_damage(world, &proj, traveled, hit);
            kill(world, eid);
        }
    }
}

/// First entity whose hurtbox overlaps the projectile, or None.
///
/// Skips the owner and anything in the owner's spawn-time faction group
/// (friendly-fire guard). Iteration is in ascending entity-id order.
fn check_hit(world: &World, proj_eid: Entity, pos: &Position, proj: &Projectile) -> Option<Entity> {
    let (px, py, r) = (pos.x, pos.y, proj.radius);

    for eid in zone_entities(world, pos.zone) {
        if eid == proj_eid || eid == proj.owner {
            continue;
        }
        let Some(epos) = world.get::<Position>(eid) else {
            continue;
        };
        if world.get::<Health>(eid).is_none() {
            continue;
        }
        if let Some(group) = &proj.owner_group {
            if world.get::<Faction>(eid).is_some_and(|f| &f.group == group) {
                continue;
            }
        }
        let (bx, by, bw, bh) = match world.get::<Hurtbox>(eid) {
            Some(hb) => (epos.x + hb.ox, epos.y + hb.oy, hb.w, hb.h),
            None => (epos.x, epos.y, 0.8, 0.8),
        };
        // Circle vs AABB
        let cx = px.clamp(bx, bx + bw);
        let cy = py.clamp(by, by + bh);
        let dx = px - cx;
        let dy = py - cy;
        if dx * dx + dy * dy <= r * r {
            return Some(eid);
        }
    }
    None
}

/// Deal falloff-scaled damage through the shared pipeline and emit the
/// follow-up event (death or faction alert).
fn apply_projectile_damage(world: &mut World, proj: &Projectile, traveled: f32, target: Entity) {
    if world.get::<Health>(target).is_none() {
        return;
    }

    let falloff_min = tun(world, "combat.ranged", "projectile_falloff_min", 0.5);
    let t = (traveled / proj.max_range.max(0.1)).min(1.0);
    let falloff = 1.0 - (1.0 - falloff_min) * t;
    let raw = proj.damage * falloff;

    let outcome = apply_damage(
        world,
        proj.owner,
        target,
        DamageSpec {
            raw,
            knockback: 2.5,
            knockback_dir: Some((proj.dx, proj.dy)),
            log_prefix: "projectile",
            ..Default::default()
        },
    );

    if outcome.dead {
        let zone = world
            .get::<Position>(target)
            .map_or(crate::zone::ZoneId(0), |p| p.zone);
        emit(
            world,
            GameEvent::EntityDied {
                eid: target,
                killer: Some(proj.owner),
                zone,
            },
        );
    } else if let (Some(pos), Some(fac)) = (
        world.get::<Position>(target).copied(),
        world.get::<Faction>(target).cloned(),
    ) {
        emit(
            world,
            GameEvent::FactionAlert {
                group: fac.group,
                x: pos.x,
                y: pos.y,
                zone: pos.zone,
                threat: Some(proj.owner),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::spatial::ZoneIndex;
    use crate::tuning::Tuning;
    use crate::world::{purge, register_zone, GameClock, Graveyard, SimRng};
    use crate::zone::{TileGrid, ZoneId, TILE_GRASS, TILE_WALL};

    fn proj_world() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let mut grid = TileGrid::new(40, 20, TILE_GRASS);
        grid.set_tile(5, 30, TILE_WALL);
        let z = maps.insert("arena", grid);
        world.insert_resource(maps);
        world.insert_resource(GameClock::default());
        world.insert_resource(Tuning::default());
        world.insert_resource(SimRng::from_seed(3));
        world.insert_resource(Graveyard::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(EventBus::default());
        (world, z)
    }

    fn spawn_shot(world: &mut World, z: ZoneId, x: f32, y: f32, damage: f32, max_range: f32) -> (Entity, Entity) {
        let owner = world
            .spawn((
                Position::new(x - 1.0, y, z),
                Faction::new("raiders", Disposition::Hostile),
            ))
            .id();
        register_zone(world, owner, z);
        let proj = world
            .spawn((
                Position::new(x, y, z),
                Projectile {
                    owner,
                    owner_group: Some("raiders".to_string()),
                    damage,
                    speed: 10.0,
                    dx: 1.0,
                    dy: 0.0,
                    max_range,
                    traveled: 0.0,
                    radius: 0.15,
                },
            ))
            .id();
        register_zone(world, proj, z);
        (owner, proj)
    }

    fn spawn_body(world: &mut World, z: ZoneId, x: f32, y: f32, group: &str) -> Entity {
        let e = world
            .spawn((
                Position::new(x, y, z),
                Velocity::default(),
                Health::new(100.0),
                Faction::new(group, Disposition::Neutral),
            ))
            .id();
        register_zone(world, e, z);
        e
    }

    #[test]
    fn test_projectile_hits_enemy_not_ally() {
        let (mut world, z) = proj_world();
        let (_, _) = spawn_shot(&mut world, z, 5.0, 10.4, 20.0, 15.0);
        let ally = spawn_body(&mut world, z, 8.0, 10.0, "raiders");
        let enemy = spawn_body(&mut world, z, 12.0, 10.0, "settlers");

        for _ in 0..20 {
            projectile_system(&mut world, 1.0 / 10.0);
        }
        assert_eq!(world.get::<Health>(ally).unwrap().current, 100.0);
        assert!(world.get::<Health>(enemy).unwrap().current < 100.0);
    }

    #[test]
    fn test_projectile_never_damages_owner() {
        let (mut world, z) = proj_world();
        let (owner, _) = spawn_shot(&mut world, z, 5.0, 10.4, 20.0, 15.0);
        world
            .entity_mut(owner)
            .insert((Health::new(100.0), Velocity::default()));
        // Owner sits right on the flight path ahead of the muzzle
        if let Some(mut p) = world.get_mut::<Position>(owner) {
            p.x = 6.0;
            p.y = 10.0;
        }
        for _ in 0..20 {
            projectile_system(&mut world, 1.0 / 10.0);
        }
        assert_eq!(world.get::<Health>(owner).unwrap().current, 100.0);
    }

    #[test]
    fn test_wall_stops_projectile() {
        let (mut world, z) = proj_world();
        // Flies right into the wall at (r=5, c=30)
        let (_, proj) = spawn_shot(&mut world, z, 28.0, 5.5, 20.0, 50.0);
        for _ in 0..10 {
            projectile_system(&mut world, 1.0 / 10.0);
            purge(&mut world);
        }
        assert!(!world.entities().contains(proj));
    }

    #[test]
    fn test_range_despawn() {
        let (mut world, z) = proj_world();
        let (_, proj) = spawn_shot(&mut world, z, 2.0, 15.0, 20.0, 3.0);
        for _ in 0..10 {
            projectile_system(&mut world, 1.0 / 10.0);
            purge(&mut world);
        }
        assert!(!world.entities().contains(proj));
    }

    #[test]
    fn test_falloff_scales_damage_with_distance() {
        // Point-blank: full damage (20 raw -> 20 dealt, armor 0).
        let (mut world, z) = proj_world();
        let (_, _) = spawn_shot(&mut world, z, 5.0, 10.4, 20.0, 10.0);
        let victim = spawn_body(&mut world, z, 5.6, 10.0, "settlers");
        projectile_system(&mut world, 0.01);
        let close_dmg = 100.0 - world.get::<Health>(victim).unwrap().current;
        assert!((close_dmg - 20.0).abs() < 1.0, "close hit ~20, got {close_dmg}");

        // Near max range: about half damage.
        let (mut world, z) = proj_world();
        let (_, _) = spawn_shot(&mut world, z, 2.0, 10.4, 20.0, 10.0);
        let victim = spawn_body(&mut world, z, 11.5, 10.0, "settlers");
        for _ in 0..40 {
            projectile_system(&mut world, 0.025);
        }
        let far_dmg = 100.0 - world.get::<Health>(victim).unwrap().current;
        assert!(far_dmg > 0.0, "far shot must connect");
        assert!(far_dmg < 12.5, "far hit ~10, got {far_dmg}");
    }

    #[test]
    fn test_kill_emits_entity_died() {
        let (mut world, z) = proj_world();
        let (_, _) = spawn_shot(&mut world, z, 5.0, 10.4, 500.0, 10.0);
        let victim = spawn_body(&mut world, z, 7.0, 10.0, "settlers");
        for _ in 0..10 {
            projectile_system(&mut world, 0.05);
        }
        assert!(world.get::<Health>(victim).unwrap().current <= 0.0);
        assert!(world.resource::<EventBus>().pending_count() > 0);
    }
}
