//! Velocity-producing combat movement behaviors.
//!
//! Each function takes pre-resolved inputs and writes straight into the
//! velocity; sub-state timers persist in [`CombatState`]. The
//! engagement orchestrator decides *which* behavior runs - these only
//! decide *how* to move.

use crate::components::{CombatState, MeleePhase, Velocity};
use crate::systems::steering::{move_away, move_toward, move_toward_pathfind, strafe};
use crate::tuning::{tun, tun_bool};
use crate::zone::ZoneId;
use bevy_ecs::prelude::*;
use rand::Rng;
use rand_chacha::ChaCha8Rng;

// ============================================================================
// RANGED ATTACK MOVEMENT
// ============================================================================

/// Ranged attack positioning: kite / strafe / reposition.
#[allow(clippy::too_many_arguments)]
pub fn ranged_attack(
    world: &World,
    rng: &mut ChaCha8Rng,
    zone: ZoneId,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    atk_range: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
    game_time: f32,
) {
    let maps = world.resource::<crate::zone::ZoneMaps>();

    if c.wall_blocked {
        // Pathfind to a flanking position with LOS (if found), else
        // toward the target as fallback.
        if let Some((rx, ry)) = c.repos_target {
            let d_repos = (px - rx).hypot(py - ry);
            if d_repos < 0.5 {
                // Arrived; wait for the next sensor tick to clear
                // wall_blocked.
                vel.zero();
            } else {
                let mult = tun(world, "combat.engagement", "reposition_speed_mult", 1.4);
                move_toward_pathfind(
                    maps, zone, px, py, vel, rx, ry, speed * mult, &mut c.path, game_time,
                );
            }
        } else {
            let mult = tun(world, "combat.engagement", "chase_mult_ranged", 1.2);
            move_toward_pathfind(
                maps, zone, px, py, vel, tx, ty, speed * mult, &mut c.path, game_time,
            );
        }
        return;
    }

    // Range maintenance: stay inside the optimal band.
    let ideal_min = atk_range * tun(world, "combat.engagement", "ranged_ideal_min_factor", 0.5);
    let ideal_max = atk_range * tun(world, "combat.engagement", "ranged_ideal_max_factor", 0.85);
    let too_close = atk_range * tun(world, "combat.engagement", "kite_close_factor", 0.35);

    if dist < too_close {
        // Panic kite
        let mult = tun(world, "combat.engagement", "kite_away_speed_mult", 1.5);
        move_away(px, py, vel, tx, ty, speed * mult);
    } else if dist < ideal_min {
        strafe_with_drift(rng, px, py, vel, tx, ty, speed, c, dt, -0.5);
    } else if dist > ideal_max && dist < atk_range * 1.3 {
        strafe_with_drift(rng, px, py, vel, tx, ty, speed, c, dt, 0.4);
    } else if c.los_blocked {
        let mult = tun(world, "combat.engagement", "strafe_speed_los_mult", 1.2);
        let min_t = tun(world, "combat.engagement", "strafe_timer_los_min", 0.4);
        let max_t = tun(world, "combat.engagement", "strafe_timer_los_max", 0.8);
        do_strafe(rng, px, py, vel, tx, ty, speed * mult, c, dt, min_t, max_t);
    } else {
        let mult = tun(world, "combat.engagement", "strafe_speed_normal_mult", 0.6);
        let min_t = tun(world, "combat.engagement", "strafe_timer_normal_min", 0.8);
        let max_t = tun(world, "combat.engagement", "strafe_timer_normal_max", 2.0);
        do_strafe(rng, px, py, vel, tx, ty, speed * mult, c, dt, min_t, max_t);
    }
}

/// Pathfind toward an active tactical reposition target.
#[allow(clippy::too_many_arguments)]
pub fn tactical_reposition(
    world: &World,
    zone: ZoneId,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    rx: f32,
    ry: f32,
    speed: f32,
    c: &mut CombatState,
    game_time: f32,
) {
    let maps = world.resource::<crate::zone::ZoneMaps>();
    move_toward_pathfind(maps, zone, px, py, vel, rx, ry, speed, &mut c.path, game_time);
}

/// Strafe around the target, flipping direction on a random timer.
#[allow(clippy::too_many_arguments)]
fn do_strafe(
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
    min_t: f32,
    max_t: f32,
) {
    if c.strafe.dir == 0 {
        c.strafe.dir = 1;
    }
    c.strafe.timer -= dt;
    if c.strafe.timer <= 0.0 {
        c.strafe.timer = rng.gen_range(min_t..max_t);
        c.strafe.dir = -c.strafe.dir;
    }
    strafe(px, py, vel, tx, ty, speed, c.strafe.dir);
}

/// Strafe while drifting toward (`drift` > 0) or away from (< 0) the
/// target: tangential motion blended with a radial component so the NPC
/// adjusts distance without ever standing still.
#[allow(clippy::too_many_arguments)]
fn strafe_with_drift(
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
    drift: f32,
) {
    if c.strafe.dir == 0 {
        c.strafe.dir = 1;
    }
    c.strafe.timer -= dt;
    if c.strafe.timer <= 0.0 {
        c.strafe.timer = rng.gen_range(0.6..1.5);
        c.strafe.dir = -c.strafe.dir;
    }

    let dx = tx - px;
    let dy = ty - py;
    let d = (dx * dx + dy * dy).sqrt();
    if d < 0.1 {
        vel.zero();
        return;
    }
    let (nx, ny) = (dx / d, dy / d);
    let cdir = c.strafe.dir as f32;
    let (tang_x, tang_y) = (-ny * cdir, nx * cdir);
    let bx = tang_x * 0.7 + nx * drift;
    let by = tang_y * 0.7 + ny * drift;
    let blen = (bx * bx + by * by).sqrt();
    let spd = speed * 0.8;
    if blen > 0.01 {
        vel.x = bx / blen * spd;
        vel.y = by / blen * spd;
    } else {
        vel.zero();
    }
}

// ============================================================================
// MELEE SUB-FSM
// ============================================================================

/// Melee sub-FSM: approach -> circle -> feint -> lunge -> retreat.
#[allow(clippy::too_many_arguments)]
pub fn melee_attack(
    world: &World,
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    atk_range: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
) {
    let ideal_r = atk_range * tun(world, "combat.engagement", "melee_circle_radius", 1.6);
    match c.melee.phase {
        MeleePhase::Approach => {
            melee_approach(world, rng, px, py, vel, tx, ty, dist, ideal_r, speed, c)
        }
        MeleePhase::Circle => melee_circle(
            world, rng, px, py, vel, tx, ty, dist, ideal_r, atk_range, speed, c, dt,
        ),
        MeleePhase::Feint => {
            melee_feint(world, rng, px, py, vel, tx, ty, dist, atk_range, speed, c, dt)
        }
        MeleePhase::Lunge => {
            melee_lunge(world, rng, px, py, vel, tx, ty, dist, atk_range, speed, c)
        }
        MeleePhase::Retreat => melee_retreat(world, rng, px, py, vel, tx, ty, dist, speed, c, dt),
    }
}

fn enter_circle(world: &World, rng: &mut ChaCha8Rng, c: &mut CombatState) {
    let min = tun(world, "combat.engagement", "melee_circle_time_min", 1.2);
    let max = tun(world, "combat.engagement", "melee_circle_time_max", 3.0);
    c.melee.phase = MeleePhase::Circle;
    c.melee.circle_timer = rng.gen_range(min..max);
    if c.melee.circle_dir == 0 {
        c.melee.circle_dir = if rng.gen::<bool>() { 1 } else { -1 };
    }
}

#[allow(clippy::too_many_arguments)]
fn melee_approach(
    world: &World,
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    ideal_r: f32,
    speed: f32,
    c: &mut CombatState,
) {
    if dist > ideal_r * 1.2 {
        let mult = tun(world, "combat.engagement", "melee_close_in_speed", 1.2);
        move_toward(px, py, vel, tx, ty, speed * mult);
    } else {
        enter_circle(world, rng, c);
    }
}

#[allow(clippy::too_many_arguments)]
fn melee_circle(
    world: &World,
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    ideal_r: f32,
    atk_range: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
) {
    c.melee.circle_timer -= dt;
    let circ_speed = speed * tun(world, "combat.engagement", "melee_circle_speed", 0.9);

    if dist > 0.1 {
        let nx = (tx - px) / dist;
        let ny = (ty - py) / dist;
        let cdir = if c.melee.circle_dir == 0 { 1.0 } else { c.melee.circle_dir as f32 };
        let (tang_x, tang_y) = (-ny * cdir, nx * cdir);

        // Radial drift keeps the orbit near the ideal radius.
        let mut drift = (dist - ideal_r) / ideal_r.max(0.5);
        let jitter = tun(world, "combat.engagement", "melee_direction_jitter", 0.15);
        if jitter > 0.0 {
            drift += rng.gen_range(-jitter..jitter) * dt;
        }
        let bx = tang_x + nx * drift * 1.2;
        let by = tang_y + ny * drift * 1.2;
        let blen = (bx * bx + by * by).sqrt();
        if blen > 0.01 {
            vel.x = bx / blen * circ_speed;
            vel.y = by / blen * circ_speed;
        } else {
            vel.zero();
        }
    } else {
        vel.zero();
    }

    // Rare spontaneous direction flip keeps orbits unpredictable.
    if rng.gen::<f32>() < 0.008 {
        let dir = if c.melee.circle_dir == 0 { 1 } else { c.melee.circle_dir };
        c.melee.circle_dir = -dir;
    }

    if c.melee.circle_timer <= 0.0 {
        let feint_chance = tun(world, "combat.engagement", "melee_feint_chance", 0.35);
        if rng.gen::<f32>() < feint_chance {
            c.melee.phase = MeleePhase::Feint;
            c.melee.feint_timer = rng.gen_range(0.3..0.6);
            c.melee.feint_advancing = true;
        } else {
            c.melee.phase = MeleePhase::Lunge;
        }
    }

    if dist > atk_range * 2.5 {
        c.melee.phase = MeleePhase::Approach;
    }
}

#[allow(clippy::too_many_arguments)]
fn melee_feint(
    world: &World,
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    atk_range: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
) {
    c.melee.feint_timer -= dt;
    if c.melee.feint_advancing {
        let mult = tun(world, "combat.engagement", "melee_feint_speed", 2.5);
        move_toward(px, py, vel, tx, ty, speed * mult);
        if c.melee.feint_timer <= 0.0 || dist < atk_range * 0.5 {
            c.melee.feint_advancing = false;
            c.melee.feint_timer = rng.gen_range(0.3..0.7);
        }
    } else {
        let mult = tun(world, "combat.engagement", "melee_feint_withdraw_speed", 2.0);
        move_away(px, py, vel, tx, ty, speed * mult);
        if c.melee.feint_timer <= 0.0 {
            c.melee.phase = MeleePhase::Circle;
            c.melee.circle_timer = rng.gen_range(0.8..1.5);
            c.melee.circle_dir = if rng.gen::<bool>() { 1 } else { -1 };
        }
    }

    if dist > atk_range * 3.0 {
        c.melee.phase = MeleePhase::Approach;
    }
}

#[allow(clippy::too_many_arguments)]
fn melee_lunge(
    world: &World,
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    atk_range: f32,
    speed: f32,
    c: &mut CombatState,
) {
    let lunge_speed = speed * tun(world, "combat.engagement", "melee_lunge_speed", 3.5);
    let lunge_close = atk_range * tun(world, "combat.engagement", "melee_lunge_dist", 0.3);
    if dist > lunge_close {
        move_toward(px, py, vel, tx, ty, lunge_speed);
    } else {
        vel.zero();
    }

    if c.melee.just_hit {
        c.melee.just_hit = false;
        if tun_bool(world, "combat.engagement", "melee_post_hit_retreat", true) {
            c.melee.phase = MeleePhase::Retreat;
            c.melee.retreat_timer =
                tun(world, "combat.engagement", "melee_retreat_duration", 0.6);
            c.melee.retreat_dir = 0;
        } else {
            enter_circle(world, rng, c);
        }
    }

    if dist > atk_range * 2.5 {
        c.melee.phase = MeleePhase::Approach;
    }
}

#[allow(clippy::too_many_arguments)]
fn melee_retreat(
    world: &World,
    rng: &mut ChaCha8Rng,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    speed: f32,
    c: &mut CombatState,
    dt: f32,
) {
    c.melee.retreat_timer -= dt;
    let retreat_speed = speed * tun(world, "combat.engagement", "melee_retreat_speed", 2.5);

    if c.melee.retreat_dir == 0 {
        c.melee.retreat_dir = if rng.gen::<bool>() { 1 } else { -1 };
    }

    if dist > 0.1 {
        let away_x = (px - tx) / dist;
        let away_y = (py - ty) / dist;
        let r_dir = c.melee.retreat_dir as f32;
        let side_x = -away_y * r_dir;
        let side_y = away_x * r_dir;
        let bx = away_x * 0.7 + side_x * 0.3;
        let by = away_y * 0.7 + side_y * 0.3;
        let blen = (bx * bx + by * by).sqrt();
        if blen > 0.01 {
            vel.x = bx / blen * retreat_speed;
            vel.y = by / blen * retreat_speed;
        } else {
            move_away(px, py, vel, tx, ty, retreat_speed);
        }
    } else {
        move_away(px, py, vel, tx, ty, retreat_speed);
    }

    if c.melee.retreat_timer <= 0.0 {
        enter_circle(world, rng, c);
        c.melee.circle_dir = if rng.gen::<bool>() { 1 } else { -1 };
        c.melee.retreat_dir = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuning::Tuning;
    use crate::zone::{TileGrid, ZoneMaps, TILE_GRASS};
    use rand_chacha::rand_core::SeedableRng;

    fn movement_world() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let z = maps.insert("arena", TileGrid::new(40, 40, TILE_GRASS));
        world.insert_resource(maps);
        world.insert_resource(Tuning::default());
        (world, z)
    }

    #[test]
    fn test_ranged_panic_kite_moves_away() {
        let (world, z) = movement_world();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut vel = Velocity::default();
        let mut c = CombatState::default();
        // dist 1.0 with range 8.0: far below the 0.35 kite threshold
        ranged_attack(
            &world, &mut rng, z, 10.0, 10.0, &mut vel, 11.0, 10.0, 1.0, 8.0, 2.0, &mut c,
            0.016, 0.0,
        );
        assert!(vel.x < 0.0, "kite away from the target: {vel:?}");
        assert!(vel.magnitude() > 2.5, "panic kite is faster than walk");
    }

    #[test]
    fn test_ranged_in_band_strafes_laterally() {
        let (world, z) = movement_world();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut vel = Velocity::default();
        let mut c = CombatState::default();
        // dist 5.5 with range 8.0 sits in [0.5, 0.85] band
        ranged_attack(
            &world, &mut rng, z, 10.0, 10.0, &mut vel, 15.5, 10.0, 5.5, 8.0, 2.0, &mut c,
            0.016, 0.0,
        );
        // Pure strafe: perpendicular to the +x radial
        assert!(vel.x.abs() < 1e-4, "in-band motion is tangential: {vel:?}");
        assert!(vel.y.abs() > 0.0);
        assert_ne!(c.strafe.dir, 0);
    }

    #[test]
    fn test_ranged_wall_blocked_navigates_to_repos() {
        let (world, z) = movement_world();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut vel = Velocity::default();
        let mut c = CombatState {
            wall_blocked: true,
            repos_target: Some((10.0, 14.0)),
            ..Default::default()
        };
        ranged_attack(
            &world, &mut rng, z, 10.0, 10.0, &mut vel, 20.0, 10.0, 10.0, 8.0, 2.0, &mut c,
            0.016, 0.0,
        );
        assert!(vel.y > 0.0, "moves toward repos target: {vel:?}");

        // Arrival stops and waits for the sensor to clear the flag
        let mut vel2 = Velocity::new(1.0, 1.0);
        ranged_attack(
            &world, &mut rng, z, 10.0, 13.8, &mut vel2, 20.0, 10.0, 10.0, 8.0, 2.0, &mut c,
            0.016, 0.0,
        );
        assert_eq!(vel2.magnitude(), 0.0);
    }

    #[test]
    fn test_melee_approach_closes_then_circles() {
        let (world, z) = movement_world();
        let _ = z;
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let mut vel = Velocity::default();
        let mut c = CombatState::default();

        // Far away: approach runs toward the target
        melee_attack(
            &world, &mut rng, 5.0, 5.0, &mut vel, 15.0, 5.0, 10.0, 1.5, 2.0, &mut c, 0.016,
        );
        assert_eq!(c.melee.phase, MeleePhase::Approach);
        assert!(vel.x > 0.0);

        // Inside the circling radius: transitions to circle
        melee_attack(
            &world, &mut rng, 5.0, 5.0, &mut vel, 7.0, 5.0, 2.0, 1.5, 2.0, &mut c, 0.016,
        );
        assert_eq!(c.melee.phase, MeleePhase::Circle);
        assert!(c.melee.circle_timer > 0.0);
        assert_ne!(c.melee.circle_dir, 0);
    }

    #[test]
    fn test_melee_lunge_branches_to_retreat_after_hit() {
        let (world, _z) = movement_world();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut vel = Velocity::default();
        let mut c = CombatState::default();
        c.melee.phase = MeleePhase::Lunge;
        c.melee.just_hit = true;

        melee_attack(
            &world, &mut rng, 5.0, 5.0, &mut vel, 6.0, 5.0, 1.0, 1.5, 2.0, &mut c, 0.016,
        );
        assert_eq!(c.melee.phase, MeleePhase::Retreat);
        assert!(!c.melee.just_hit);
        assert!(c.melee.retreat_timer > 0.0);

        // Retreat moves away and eventually returns to circling
        for _ in 0..60 {
            melee_attack(
                &world, &mut rng, 5.0, 5.0, &mut vel, 6.0, 5.0, 1.0, 1.5, 2.0, &mut c, 0.016,
            );
        }
        assert_eq!(c.melee.phase, MeleePhase::Circle);
    }
}
