//! Distance-based level-of-detail assignment.
//!
//! Entities promote to High within one radius of the player, Medium
//! between the two radii, Low beyond (or in another zone entirely).
//! A short transition grace suppresses re-flips so entities hovering on
//! a threshold don't thrash between levels.

use crate::components::*;
use crate::tuning::tun;
use crate::world::GameClock;
use bevy_ecs::prelude::*;

/// Promote / demote every Lod entity relative to the player. With no
/// player there is no reference point, so levels are left alone.
pub fn lod_system(world: &mut World, _dt: f32) {
    let Some((_, player_pos)) = crate::systems::perception::find_player(world) else {
        return;
    };
    let game_time = world.resource::<GameClock>().time;
    let high = tun(world, "lod", "high_distance", 60.0);
    let medium = tun(world, "lod", "medium_distance", 120.0);
    let grace = tun(world, "lod", "transition_grace", 0.5);
    let (high_sq, medium_sq) = (high * high, medium * medium);

    let mut entities: Vec<Entity> = world
        .query_filtered::<Entity, (With<Lod>, With<Position>)>()
        .iter(world)
        .collect();
    entities.sort();

    for eid in entities {
        if world.get::<Player>(eid).is_some() {
            continue;
        }
        let Some(pos) = world.get::<Position>(eid).copied() else {
            continue;
        };
        let new_level = if player_pos.zone == pos.zone {
            let dx = pos.x - player_pos.x;
            let dy = pos.y - player_pos.y;
            let d2 = dx * dx + dy * dy;
            if d2 <= high_sq {
                LodLevel::High
            } else if d2 <= medium_sq {
                LodLevel::Medium
            } else {
                LodLevel::Low
            }
        } else {
            LodLevel::Low
        };
        let Some(mut lod) = world.get_mut::<Lod>(eid) else {
            continue;
        };
        if lod.level == new_level {
            continue;
        }
        if game_time < lod.transition_until {
            continue;
        }
        lod.level = new_level;
        lod.transition_until = game_time + grace;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::Tuning;
    use crate::zone::ZoneId;

    fn lod_world() -> World {
        let mut world = World::new();
        world.insert_resource(GameClock::default());
        world.insert_resource(Tuning::default());
        world
    }

    #[test]
    fn test_distance_bands() {
        let mut world = lod_world();
        let z = ZoneId(0);
        world.spawn((Player::default(), Position::new(0.0, 0.0, z)));
        let near = world
            .spawn((Position::new(10.0, 0.0, z), Lod::default()))
            .id();
        let mid = world
            .spawn((Position::new(90.0, 0.0, z), Lod::default()))
            .id();
        let far = world
            .spawn((Position::new(300.0, 0.0, z), Lod::default()))
            .id();
        let other_zone = world
            .spawn((Position::new(1.0, 0.0, ZoneId(1)), Lod::default()))
            .id();

        lod_system(&mut world, 0.016);
        assert_eq!(world.get::<Lod>(near).unwrap().level, LodLevel::High);
        assert_eq!(world.get::<Lod>(mid).unwrap().level, LodLevel::Medium);
        assert_eq!(world.get::<Lod>(far).unwrap().level, LodLevel::Low);
        assert_eq!(world.get::<Lod>(other_zone).unwrap().level, LodLevel::Low);
    }

    #[test]
    fn test_transition_grace_prevents_thrash() {
        let mut world = lod_world();
        let z = ZoneId(0);
        world.spawn((Player::default(), Position::new(0.0, 0.0, z)));
        let e = world
            .spawn((Position::new(90.0, 0.0, z), Lod::default()))
            .id();

        lod_system(&mut world, 0.016);
        assert_eq!(world.get::<Lod>(e).unwrap().level, LodLevel::Medium);

        // Move into high range immediately: grace suppresses the flip
        world.get_mut::<Position>(e).unwrap().x = 10.0;
        lod_system(&mut world, 0.016);
        assert_eq!(world.get::<Lod>(e).unwrap().level, LodLevel::Medium);

        // After the grace elapses the promotion goes through
        world.resource_mut::<GameClock>().time = 1.0;
        lod_system(&mut world, 0.016);
        assert_eq!(world.get::<Lod>(e).unwrap().level, LodLevel::High);
    }
}
