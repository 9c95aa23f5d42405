//! Target acquisition, vision-cone tests, and line-of-sight queries.
//!
//! Pure queries against the world - no mutations, no side effects. Used
//! by the combat FSM orchestrator so target-finding, wall-LOS, and
//! ally-in-fire logic lives in exactly one place.

use crate::components::*;
use crate::spatial::{zone_allies, zone_entities};
use crate::tuning::tun;
use crate::zone::ZoneMaps;
use bevy_ecs::prelude::*;

/// Everything the combat FSM needs to know about the current target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetInfo {
    pub eid: Option<Entity>,
    pub x: f32,
    pub y: f32,
    pub dist: f32,
    pub wall_los: bool,
    pub ally_in_fire: bool,
}

// ============================================================================
// VISION CONE
// ============================================================================

/// True iff the target is visible from `pos` given a vision cone:
/// within `peripheral_range` (omnidirectional), or within
/// `view_distance` AND inside the facing arc.
pub fn in_vision_cone(
    pos: (f32, f32),
    facing: Dir,
    target: (f32, f32),
    cone: &VisionCone,
) -> bool {
    let dx = target.0 - pos.0;
    let dy = target.1 - pos.1;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist <= cone.peripheral_range {
        return true;
    }
    if dist > cone.view_distance {
        return false;
    }
    let angle_to_target = dy.atan2(dx);
    let face_angle = facing.to_angle();
    let diff = (angle_to_target - face_angle).sin().atan2((angle_to_target - face_angle).cos());
    diff.abs() <= (cone.fov_degrees / 2.0).to_radians()
}

// ============================================================================
// TARGETING
// ============================================================================

/// The player entity and its position, if one exists.
pub fn find_player(world: &mut World) -> Option<(Entity, Position)> {
    world
        .query_filtered::<(Entity, &Position), With<Player>>()
        .iter(world)
        .next()
        .map(|(e, p)| (e, *p))
}

/// Nearest living entity of a different faction group within `max_range`
/// of `eid`'s position, in the same zone. With `use_vision_cone`, only
/// targets inside the cone (or peripheral range) count.
pub fn find_nearest_enemy(
    world: &World,
    eid: Entity,
    max_range: f32,
    use_vision_cone: bool,
) -> Option<(Entity, Position)> {
    let pos = *world.get::<Position>(eid)?;
    let my_group = world.get::<Faction>(eid)?.group.clone();

    let cone = if use_vision_cone {
        world.get::<VisionCone>(eid).copied()
    } else {
        None
    };
    let facing = world
        .get::<Facing>(eid)
        .map_or(Dir::Down, |f| f.direction);

    let mut best: Option<(Entity, Position, f32)> = None;
    for other in zone_entities(world, pos.zone) {
        if other == eid {
            continue;
        }
        let Some(opos) = world.get::<Position>(other) else {
            continue;
        };
        match world.get::<Health>(other) {
            Some(h) if h.is_alive() => {}
            _ => continue,
        }
        let Some(of) = world.get::<Faction>(other) else {
            continue;
        };
        if of.group == my_group {
            continue;
        }
        let d = pos.distance_to(opos);
        if d > max_range {
            continue;
        }
        if let Some(cone) = &cone {
            if !in_vision_cone((pos.x, pos.y), facing, (opos.x, opos.y), cone) {
                continue;
            }
        }
        if best.as_ref().is_none_or(|(_, _, bd)| d < *bd) {
            best = Some((other, *opos, d));
        }
    }
    best.map(|(e, p, _)| (e, p))
}

/// Find the best combat target: the player first (same zone), otherwise
/// the nearest enemy up to 3x aggro radius. Wall-LOS and ally-in-fire
/// are computed eagerly so callers never re-check.
pub fn acquire_target(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    aggro_radius: f32,
) -> TargetInfo {
    let mut info = TargetInfo {
        dist: f32::MAX,
        ..Default::default()
    };

    if let Some((p_eid, p_pos)) = find_player(world) {
        if p_pos.zone == pos.zone && p_eid != eid {
            info.eid = Some(p_eid);
            info.x = p_pos.x;
            info.y = p_pos.y;
        }
    }
    if info.eid.is_none() {
        if let Some((e_eid, e_pos)) = find_nearest_enemy(world, eid, aggro_radius * 3.0, false) {
            info.eid = Some(e_eid);
            info.x = e_pos.x;
            info.y = e_pos.y;
        }
    }
    if info.eid.is_none() {
        return info;
    }

    let dx = pos.x - info.x;
    let dy = pos.y - info.y;
    info.dist = (dx * dx + dy * dy).sqrt();
    info.wall_los = world
        .resource::<ZoneMaps>()
        .has_line_of_sight(pos.zone, pos.x + 0.4, pos.y + 0.4, info.x + 0.4, info.y + 0.4);
    info.ally_in_fire = ally_in_line_of_fire(world, eid, pos, info.x, info.y);
    info
}

/// Detection test from idle: uses the vision cone if present, else a
/// simple radius check.
pub fn is_detected_idle(
    world: &World,
    eid: Entity,
    pos: &Position,
    tx: f32,
    ty: f32,
    dist: f32,
    aggro_radius: f32,
) -> bool {
    if let Some(cone) = world.get::<VisionCone>(eid) {
        let facing = world.get::<Facing>(eid).map_or(Dir::Down, |f| f.direction);
        return in_vision_cone((pos.x, pos.y), facing, (tx, ty), cone);
    }
    dist <= aggro_radius
}

// ============================================================================
// FIRE-LANE OCCLUSION
// ============================================================================

/// True if a same-group living ally sits between `eid` and `(tx, ty)`.
/// Capsule test: each ally is projected onto the shooter->target segment
/// and checked against the clearance radius.
pub fn ally_in_line_of_fire(world: &World, eid: Entity, pos: &Position, tx: f32, ty: f32) -> bool {
    closest_ally_in_fire(world, eid, pos, tx, ty).is_some()
}

/// The ally blocking the shot (shortest capsule distance), if any.
pub fn find_blocking_ally(
    world: &World,
    eid: Entity,
    pos: &Position,
    tx: f32,
    ty: f32,
) -> Option<Entity> {
    closest_ally_in_fire(world, eid, pos, tx, ty).map(|(e, _)| e)
}

fn closest_ally_in_fire(
    world: &World,
    eid: Entity,
    pos: &Position,
    tx: f32,
    ty: f32,
) -> Option<(Entity, f32)> {
    let group = world.get::<Faction>(eid)?.group.clone();

    let dx = tx - pos.x;
    let dy = ty - pos.y;
    let seg_len_sq = dx * dx + dy * dy;
    if seg_len_sq < 0.01 {
        return None;
    }

    let clearance = tun(world, "combat.engagement", "line_of_fire_clearance", 0.6);
    let mut best: Option<(Entity, f32)> = None;
    for (ally, ax, ay) in zone_allies(world, eid, pos, &group) {
        let rx = ax - pos.x;
        let ry = ay - pos.y;
        let t = (rx * dx + ry * dy) / seg_len_sq;
        // Endpoints excluded: standing at the muzzle or on the target
        // does not count as blocking.
        if !(0.05..=0.95).contains(&t) {
            continue;
        }
        let cx = t * dx;
        let cy = t * dy;
        let dist_sq = (rx - cx) * (rx - cx) + (ry - cy) * (ry - cy);
        if dist_sq < clearance * clearance {
            let d = dist_sq.sqrt();
            if best.is_none_or(|(_, bd)| d < bd) {
                best = Some((ally, d));
            }
        }
    }
    best
}

/// Positions of same-group living allies in the zone (anti-clump input).
pub fn get_ally_positions(world: &World, eid: Entity, pos: &Position) -> Vec<(f32, f32)> {
    let Some(group) = world.get::<Faction>(eid).map(|f| f.group.clone()) else {
        return Vec::new();
    };
    zone_allies(world, eid, pos, &group)
        .into_iter()
        .map(|(_, x, y)| (x, y))
        .collect()
}

// ============================================================================
// STATE PREDICATES
// ============================================================================

/// Entity HP as a 0-1 fraction (1.0 if no Health component).
pub fn hp_ratio(world: &World, eid: Entity) -> f32 {
    world.get::<Health>(eid).map_or(1.0, |h| {
        h.current / h.maximum.max(1.0)
    })
}

/// True if the entity should run hostile combat AI: hostile disposition,
/// recently hit, or no faction at all (wild mob).
pub fn should_engage(world: &World, eid: Entity) -> bool {
    if let Some(hf) = world.get::<HitFlash>(eid) {
        if hf.remaining > 0.05 {
            return true;
        }
    }
    match world.get::<Faction>(eid) {
        Some(f) => f.disposition == Disposition::Hostile,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ZoneIndex;
    use crate::tuning::Tuning;
    use crate::world::register_zone;
    use crate::zone::{TileGrid, ZoneId, TILE_GRASS};

    fn cone_90_wide() -> VisionCone {
        VisionCone {
            fov_degrees: 90.0,
            view_distance: 5000.0,
            peripheral_range: 10.0,
        }
    }

    #[test]
    fn test_vision_cone_forward_and_peripheral() {
        let cone = cone_90_wide();
        // Ahead (facing right) - detected
        assert!(in_vision_cone((30.0, 20.0), Dir::Right, (48.0, 20.0), &cone));
        // Behind and far - not detected
        assert!(!in_vision_cone((30.0, 20.0), Dir::Right, (10.0, 20.0), &cone));
        // Behind but inside peripheral range - detected regardless of facing
        assert!(in_vision_cone((30.0, 20.0), Dir::Right, (29.0, 19.0), &cone));
    }

    #[test]
    fn test_vision_cone_edge_of_arc() {
        let cone = cone_90_wide();
        // 44 degrees off-axis: inside +-45
        assert!(in_vision_cone(
            (0.0, 0.0),
            Dir::Right,
            (100.0, 100.0 * 44.0_f32.to_radians().tan()),
            &cone
        ));
        // 60 degrees off-axis: outside
        assert!(!in_vision_cone(
            (0.0, 0.0),
            Dir::Right,
            (100.0, 100.0 * 60.0_f32.to_radians().tan()),
            &cone
        ));
    }

    fn world_with_zone() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let z = maps.insert("arena", TileGrid::new(40, 40, TILE_GRASS));
        world.insert_resource(maps);
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(Tuning::default());
        (world, z)
    }

    fn spawn_npc(world: &mut World, x: f32, y: f32, z: ZoneId, group: &str) -> Entity {
        let e = world
            .spawn((
                Position::new(x, y, z),
                Health::new(100.0),
                Faction::new(group, Disposition::Hostile),
            ))
            .id();
        register_zone(world, e, z);
        e
    }

    #[test]
    fn test_find_nearest_enemy_skips_same_group() {
        let (mut world, z) = world_with_zone();
        let me = spawn_npc(&mut world, 5.0, 5.0, z, "raiders");
        spawn_npc(&mut world, 6.0, 5.0, z, "raiders"); // ally, closer
        let enemy = spawn_npc(&mut world, 9.0, 5.0, z, "settlers");

        let found = find_nearest_enemy(&world, me, 50.0, false);
        assert_eq!(found.map(|(e, _)| e), Some(enemy));
    }

    #[test]
    fn test_acquire_target_prefers_player() {
        let (mut world, z) = world_with_zone();
        let me = spawn_npc(&mut world, 5.0, 5.0, z, "raiders");
        spawn_npc(&mut world, 7.0, 5.0, z, "settlers");
        let player = world
            .spawn((
                Player::default(),
                Position::new(20.0, 5.0, z),
                Health::new(100.0),
            ))
            .id();
        register_zone(&mut world, player, z);

        let pos = *world.get::<Position>(me).unwrap();
        let info = acquire_target(&mut world, me, &pos, 10.0);
        assert_eq!(info.eid, Some(player));
        assert!(info.wall_los);
        assert!((info.dist - 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_ally_in_line_of_fire_capsule() {
        let (mut world, z) = world_with_zone();
        let me = spawn_npc(&mut world, 5.0, 5.0, z, "raiders");
        // Ally square in the lane
        spawn_npc(&mut world, 12.0, 5.0, z, "raiders");
        let pos = *world.get::<Position>(me).unwrap();
        assert!(ally_in_line_of_fire(&world, me, &pos, 20.0, 5.0));
        // A lane pointing away misses the ally
        assert!(!ally_in_line_of_fire(&world, me, &pos, 5.0, 20.0));
    }

    #[test]
    fn test_should_engage_rules() {
        let (mut world, z) = world_with_zone();
        let hostile = spawn_npc(&mut world, 1.0, 1.0, z, "raiders");
        assert!(should_engage(&world, hostile));

        let neutral = world
            .spawn((
                Position::new(2.0, 2.0, z),
                Faction::new("settlers", Disposition::Neutral),
            ))
            .id();
        assert!(!should_engage(&world, neutral));

        // Recently hit overrides neutrality
        world.entity_mut(neutral).insert(HitFlash { remaining: 0.1 });
        assert!(should_engage(&world, neutral));
    }
}
