//! Velocity-producing steering primitives.
//!
//! Every function writes straight into a `Velocity` and takes
//! pre-resolved inputs, so the combat movement layer stays free of
//! world plumbing.

use crate::components::{Dir, HomeRange, Velocity, WanderState};
use crate::pathfind::{find_path, PathCache};
use crate::zone::{ZoneId, ZoneMaps};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Walk straight at the target.
pub fn move_toward(px: f32, py: f32, vel: &mut Velocity, tx: f32, ty: f32, speed: f32) {
    let dx = tx - px;
    let dy = ty - py;
    let d = (dx * dx + dy * dy).sqrt();
    if d < 0.05 {
        vel.zero();
        return;
    }
    vel.x = dx / d * speed;
    vel.y = dy / d * speed;
}

/// Walk straight away from the target.
pub fn move_away(px: f32, py: f32, vel: &mut Velocity, tx: f32, ty: f32, speed: f32) {
    let dx = px - tx;
    let dy = py - ty;
    let d = (dx * dx + dy * dy).sqrt();
    if d < 0.05 {
        // On top of the threat: any direction beats standing still.
        vel.x = speed;
        vel.y = 0.0;
        return;
    }
    vel.x = dx / d * speed;
    vel.y = dy / d * speed;
}

/// Move tangentially around the target. `dir` is +1 or -1.
pub fn strafe(px: f32, py: f32, vel: &mut Velocity, tx: f32, ty: f32, speed: f32, dir: i8) {
    let dx = tx - px;
    let dy = ty - py;
    let d = (dx * dx + dy * dy).sqrt();
    if d < 0.05 {
        vel.zero();
        return;
    }
    let (nx, ny) = (dx / d, dy / d);
    vel.x = -ny * dir as f32 * speed;
    vel.y = nx * dir as f32 * speed;
}

/// Navigate toward a goal through walls via the cached A* path,
/// replanning when the cache goes stale. Falls back to a straight walk
/// when no path exists (open ground or unreachable goal).
#[allow(clippy::too_many_arguments)]
pub fn move_toward_pathfind(
    maps: &ZoneMaps,
    zone: ZoneId,
    px: f32,
    py: f32,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    speed: f32,
    path: &mut PathCache,
    game_time: f32,
) {
    let Some(grid) = maps.grid(zone) else {
        move_toward(px, py, vel, tx, ty, speed);
        return;
    };
    if path.is_stale((tx, ty), game_time) {
        path.store(find_path(grid, px, py, tx, ty), (tx, ty), game_time);
    }
    match path.current_waypoint(px, py) {
        Some((wx, wy)) => move_toward(px, py, vel, wx, wy, speed),
        None => move_toward(px, py, vel, tx, ty, speed),
    }
}

/// Facing that looks from `(px, py)` toward `(tx, ty)`.
pub fn face_toward(px: f32, py: f32, tx: f32, ty: f32) -> Dir {
    Dir::from_vector(tx - px, ty - py)
}

/// Patrol-envelope wander: walk to a random point inside the home
/// radius, pause briefly on arrival, pick another.
#[allow(clippy::too_many_arguments)]
pub fn run_idle(
    rng: &mut ChaCha8Rng,
    maps: &ZoneMaps,
    zone: ZoneId,
    patrol: &HomeRange,
    px: f32,
    py: f32,
    wander: &mut WanderState,
    vel: &mut Velocity,
    game_time: f32,
) {
    if game_time < wander.pause_until {
        vel.zero();
        return;
    }
    let arrived = wander
        .target
        .is_some_and(|(tx, ty)| (tx - px).hypot(ty - py) < 0.3);
    if arrived || wander.target.is_none() {
        wander.target = pick_wander_target(rng, maps, zone, patrol);
        if arrived {
            wander.pause_until = game_time + rng.gen_range(0.5..2.5);
            vel.zero();
            return;
        }
    }
    match wander.target {
        Some((tx, ty)) => move_toward(px, py, vel, tx, ty, patrol.speed),
        None => vel.zero(),
    }
}

fn pick_wander_target(
    rng: &mut ChaCha8Rng,
    maps: &ZoneMaps,
    zone: ZoneId,
    patrol: &HomeRange,
) -> Option<(f32, f32)> {
    if patrol.radius <= 0.0 {
        return None;
    }
    for _ in 0..8 {
        let dx = rng.gen_range(-patrol.radius..patrol.radius);
        let dy = rng.gen_range(-patrol.radius..patrol.radius);
        let (tx, ty) = (patrol.origin_x + dx, patrol.origin_y + dy);
        if maps.is_passable(zone, tx, ty) {
            return Some((tx, ty));
        }
    }
    None
}
