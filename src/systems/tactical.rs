//! Tactical position finding.
//!
//! Ring-search algorithms that score candidate positions by engagement
//! range, cover, fire-line clearance, ally spacing, and travel cost.
//! Used by the engagement orchestrator when an NPC needs a better spot -
//! wall-blocked, standing in a fire lane, or clumped with allies.
//!
//! Also hosts the LOS-aware chase waypoint finder.

use crate::systems::fireline::{point_fire_line_dist, FireLine};
use crate::tuning::tun;
use crate::zone::{ZoneId, ZoneMaps, TILE_WALL};
use bevy_ecs::prelude::*;

/// True if any of the 8 neighboring tiles is a wall. Fast heuristic for
/// "am I next to cover?".
pub fn has_adjacent_wall(maps: &ZoneMaps, zone: ZoneId, x: f32, y: f32) -> bool {
    let Some(grid) = maps.grid(zone) else {
        return false;
    };
    let (r, c) = (y.floor() as i32, x.floor() as i32);
    for dr in -1..=1 {
        for dc in -1..=1 {
            if dr == 0 && dc == 0 {
                continue;
            }
            if grid.tile(r + dr, c + dc) == Some(TILE_WALL) {
                return true;
            }
        }
    }
    false
}

/// Find the best nearby position considering range, cover, fire lines,
/// and ally spacing.
///
/// Samples candidates on concentric rings around the NPC, scoring each
/// by:
/// * range - prefer the ideal engagement distance
/// * travel - prefer positions close to the current location
/// * leash - mild penalty for drifting from origin
/// * cover - bonus for wall-adjacent positions that keep LOS
/// * fire lines - strong penalty inside an ally's lane
/// * ally spacing - penalty for crowding allies
///
/// Returns None when nothing beats the current spot.
#[allow(clippy::too_many_arguments)]
pub fn find_tactical_position(
    world: &World,
    zone: ZoneId,
    sx: f32,
    sy: f32,
    tx: f32,
    ty: f32,
    atk_range: f32,
    fire_lines: &[FireLine],
    ally_positions: &[(f32, f32)],
    origin: Option<(f32, f32)>,
) -> Option<(f32, f32)> {
    let maps = world.resource::<ZoneMaps>();
    let ideal_range = atk_range * tun(world, "combat.tactical", "ideal_range_factor", 0.7);
    let fl_clearance = tun(world, "combat.fireline", "clearance", 1.2);
    let cover_bonus = tun(world, "combat.tactical", "cover_bonus", 3.0);
    let spacing_penalty = tun(world, "combat.tactical", "ally_spacing_penalty", 3.0);
    let ally_min_dist = tun(world, "combat.tactical", "ally_min_distance", 3.0);

    let mut best: Option<(f32, f32)> = None;
    let mut best_score = -999.0f32;

    for radius in [2.0f32, 4.0, 6.0, 8.0] {
        let n_dirs = (radius * 3.0) as i32;
        let n_dirs = n_dirs.max(12);
        for i in 0..n_dirs {
            let angle = std::f32::consts::TAU * i as f32 / n_dirs as f32;
            let cx = sx + angle.cos() * radius;
            let cy = sy + angle.sin() * radius;

            if !maps.is_passable(zone, cx, cy) {
                continue;
            }
            if !maps.has_line_of_sight(zone, cx + 0.4, cy + 0.4, tx + 0.4, ty + 0.4) {
                continue;
            }

            let d_target = (cx - tx).hypot(cy - ty);
            let range_score = -(d_target - ideal_range).abs() / ideal_range.max(1.0);
            let travel_score = -(cx - sx).hypot(cy - sy) * 0.15;

            let leash_score = origin.map_or(0.0, |(ox, oy)| -(cx - ox).hypot(cy - oy) * 0.05);

            let cov_score = if has_adjacent_wall(maps, zone, cx, cy) {
                cover_bonus
            } else {
                0.0
            };

            let mut fl_score = 0.0;
            for fl in fire_lines {
                let fd = point_fire_line_dist(cx, cy, fl);
                if fd < fl_clearance {
                    fl_score -= (fl_clearance - fd) * 5.0;
                }
            }

            let mut space_score = 0.0;
            for &(ax, ay) in ally_positions {
                let ad = (cx - ax).hypot(cy - ay);
                if ad < ally_min_dist {
                    space_score -= spacing_penalty * (1.0 - ad / ally_min_dist);
                }
            }

            let score =
                range_score + travel_score + leash_score + cov_score + fl_score + space_score;
            if score > best_score {
                best_score = score;
                best = Some((cx, cy));
            }
        }
    }
    best
}

/// Find the nearest passable tile with LOS to the target.
///
/// Used during chase when the direct path is wall-blocked: instead of
/// charging the wall, the NPC pathfinds to a tile where it can *see*
/// (and then attack) the target. Positions inside an ally's fire lane
/// are penalized so NPCs prefer flanking routes.
pub fn find_chase_los_waypoint(
    world: &World,
    zone: ZoneId,
    sx: f32,
    sy: f32,
    tx: f32,
    ty: f32,
    max_search: f32,
    fire_lines: &[FireLine],
) -> Option<(f32, f32)> {
    let maps = world.resource::<ZoneMaps>();
    let fl_clearance = tun(world, "combat.fireline", "clearance", 1.2);

    let mut best: Option<(f32, f32)> = None;
    let mut best_score = 999.0f32;

    for radius in [2.0f32, 4.0, 6.0, 8.0] {
        if radius > max_search {
            break;
        }
        let n_samples = ((radius * 4.0) as i32).max(8);
        for i in 0..n_samples {
            let angle = std::f32::consts::TAU * i as f32 / n_samples as f32;
            let cx = sx + angle.cos() * radius;
            let cy = sy + angle.sin() * radius;

            if !maps.is_passable(zone, cx, cy) {
                continue;
            }
            if !maps.has_line_of_sight(zone, cx + 0.4, cy + 0.4, tx + 0.4, ty + 0.4) {
                continue;
            }

            let d_self = (cx - sx).hypot(cy - sy);
            let d_target = (cx - tx).hypot(cy - ty);
            let mut score = d_self * 0.6 + d_target * 0.4;

            for fl in fire_lines {
                let fd = point_fire_line_dist(cx, cy, fl);
                if fd < fl_clearance {
                    score += (fl_clearance - fd) * 4.0;
                }
            }

            if score < best_score {
                best_score = score;
                best = Some((cx, cy));
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::Tuning;
    use crate::zone::{TileGrid, TILE_GRASS, TILE_WALL};

    fn tactical_world() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let mut grid = TileGrid::new(30, 30, TILE_GRASS);
        // Vertical wall at c=15 with no gaps in the middle band
        for r in 5..25 {
            grid.set_tile(r, 15, TILE_WALL);
        }
        let z = maps.insert("arena", grid);
        world.insert_resource(maps);
        world.insert_resource(Tuning::default());
        (world, z)
    }

    #[test]
    fn test_adjacent_wall_detection() {
        let (world, z) = tactical_world();
        let maps = world.resource::<ZoneMaps>();
        assert!(has_adjacent_wall(maps, z, 14.5, 10.5));
        assert!(!has_adjacent_wall(maps, z, 5.5, 5.5));
    }

    #[test]
    fn test_tactical_position_has_los_and_clears_lane() {
        let (world, z) = tactical_world();
        // Shooter at (5, 10), target at (12, 10); one ally lane right
        // through the shooter's position.
        let lane = FireLine {
            sx: 2.4,
            sy: 10.4,
            tx: 12.4,
            ty: 10.4,
        };
        let spot = find_tactical_position(
            &world,
            z,
            5.0,
            10.0,
            12.0,
            10.0,
            8.0,
            &[lane],
            &[],
            Some((5.0, 10.0)),
        )
        .expect("open arena must yield a position");
        // Candidate keeps LOS to the target
        let maps = world.resource::<ZoneMaps>();
        assert!(maps.has_line_of_sight(z, spot.0 + 0.4, spot.1 + 0.4, 12.4, 10.4));
        // And steps out of the lane
        assert!(point_fire_line_dist(spot.0, spot.1, &lane) > 0.6);
    }

    #[test]
    fn test_chase_waypoint_sees_target_through_gap() {
        let (world, z) = tactical_world();
        // NPC left of the wall, target right of it, both in the walled
        // band - no direct LOS.
        let maps = world.resource::<ZoneMaps>();
        assert!(!maps.has_line_of_sight(z, 13.4, 15.4, 17.4, 15.4));

        let wp = find_chase_los_waypoint(&world, z, 13.0, 15.0, 17.0, 15.0, 8.0, &[]);
        if let Some((wx, wy)) = wp {
            let maps = world.resource::<ZoneMaps>();
            assert!(maps.has_line_of_sight(z, wx + 0.4, wy + 0.4, 17.4, 15.4));
        }
        // Within an 8-tile ring of (13,15) the wall ends at r=5/r=25, so
        // a waypoint should exist.
        assert!(wp.is_some());
    }
}
