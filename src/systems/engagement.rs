//! Combat AI orchestrator.
//!
//! Thin coordinator that wires together:
//!
//! - `perception` - target acquisition, LOS checks
//! - `combat_movement` - velocity-producing behaviors
//! - `attacks` (via AttackIntent events) - attack execution / damage
//!
//! The FSM (idle -> searching -> chase -> attack -> flee -> return)
//! lives entirely in `update_fsm` - a short block of pure transitions.
//! Movement and sensing are delegated completely, so every concern is
//! independently testable.
//!
//! The *searching* state bridges hearing and vision: an NPC that hears
//! a loud sound walks toward the source and sweeps its vision cone. If
//! the target is spotted it transitions to chase; otherwise it times
//! out back to idle.

use crate::components::*;
use crate::devlog::dev_log;
use crate::events::{emit, GameEvent};
use crate::items::ItemRegistry;
use crate::systems::combat_movement as move_;
use crate::systems::fireline::{
    fire_line_dodge_vector, get_ally_fire_lines, request_clear_fire_line,
};
use crate::systems::perception::{
    acquire_target, find_blocking_ally, find_nearest_enemy, find_player, get_ally_positions,
    hp_ratio, is_detected_idle, should_engage, TargetInfo,
};
use crate::systems::steering::{face_toward, move_away, move_toward, move_toward_pathfind, run_idle};
use crate::systems::tactical::{find_chase_los_waypoint, find_tactical_position};
use crate::systems::alerts::{make_hostile, share_combat_intel};
use crate::tuning::{tun, tun_i64};
use crate::world::{display_name, rng_range, rng_sign, SimRng};
use crate::zone::ZoneMaps;
use bevy_ecs::prelude::*;

/// Unified combat FSM tick for one entity. Called once per frame from
/// the AI runner for active, high-LOD entities in the player's zone.
pub fn combat_brain(world: &mut World, eid: Entity, dt: f32, game_time: f32) {
    let Some(pos) = world.get::<Position>(eid).copied() else {
        return;
    };
    if world.get::<Velocity>(eid).is_none() {
        return;
    }
    let patrol = world.get::<HomeRange>(eid).copied();
    let Some(mut threat) = world.get::<Threat>(eid).copied() else {
        return;
    };
    let Some(atk_cfg) = world.get::<AttackConfig>(eid).copied() else {
        return;
    };
    let Some(mut brain) = world.get::<Brain>(eid).cloned() else {
        return;
    };

    if brain.combat.origin.is_none() {
        brain.combat.origin = Some((pos.x, pos.y));
    }

    // Stagger sensor timing so groups of spawns don't all tick on the
    // same frame.
    if !brain.combat.staggered {
        brain.combat.staggered = true;
        threat.last_sensor_time = game_time - rng_range(world, 0.0, threat.sensor_interval);
    }

    let is_ranged = atk_cfg.attack_type == AttackType::Ranged;

    // 1. SENSE (throttled)
    let sensor_due = game_time - threat.last_sensor_time >= threat.sensor_interval;
    let mut skip_movement = false;
    if sensor_due {
        threat.last_sensor_time = game_time;
        skip_movement = run_sensor_tick(
            world,
            eid,
            &pos,
            &threat,
            &atk_cfg,
            &mut brain.combat,
            is_ranged,
            game_time,
        );
    }
    if let Some(mut t) = world.get_mut::<Threat>(eid) {
        *t = threat;
    }

    // 2. MOVE (every frame, unless a dodge overrode velocity)
    if !skip_movement {
        run_movement(
            world, eid, &pos, patrol.as_ref(), &atk_cfg, &mut brain, is_ranged, dt, game_time,
        );
    }

    if let Some(mut b) = world.get_mut::<Brain>(eid) {
        *b = brain;
    }
}

// ============================================================================
// SENSOR TICK
// ============================================================================

/// Acquire a target, update the FSM, attempt attacks.
/// Returns true if movement should be skipped this frame (dodge).
#[allow(clippy::too_many_arguments)]
fn run_sensor_tick(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    threat: &Threat,
    atk_cfg: &AttackConfig,
    c: &mut CombatState,
    is_ranged: bool,
    game_time: f32,
) -> bool {
    // Faction gate - not hostile? Searching NPCs may continue (they
    // bridge hearing -> vision); everyone else idles.
    if !should_engage(world, eid) && c.mode != CombatMode::Searching {
        c.mode = CombatMode::Idle;
        return false;
    }

    let target = acquire_target(world, eid, pos, threat.aggro_radius);
    let Some(target_eid) = target.eid else {
        c.target_eid = None;
        c.target_pos = None;
        if c.mode == CombatMode::Searching {
            if game_time >= c.search_until {
                c.mode = CombatMode::Idle;
                dev_log(world, eid, "combat", "searching -> idle (timed out)", game_time);
            }
            return false;
        }
        if c.mode != CombatMode::Idle {
            dev_log(world, eid, "combat", "target lost -> idle", game_time);
        }
        c.mode = CombatMode::Idle;
        return false;
    };
    c.target_eid = Some(target_eid);
    c.target_pos = Some((target.x, target.y));

    // Defensive reactions
    if matches!(c.mode, CombatMode::Chase | CombatMode::Attack) {
        if try_dodge(world, eid, pos, c, game_time) {
            return true; // dodge set velocity - skip movement
        }
        try_heal(world, eid, c, game_time);
    }

    // Refresh LOS flags from fresh sensor data
    if is_ranged {
        c.wall_blocked = !target.wall_los;
        if target.wall_los {
            c.repos_target = None;
        }
    }

    // Chase wall-block: find a tile with LOS instead of charging
    // blindly at a wall the NPC can't see through.
    if c.mode == CombatMode::Chase && !target.wall_los {
        let wp = find_chase_los_waypoint(
            world, pos.zone, pos.x, pos.y, target.x, target.y, 8.0, &c.fire_lines,
        );
        c.chase_los_wp = wp;
        if let Some((wx, wy)) = wp {
            dev_log(
                world,
                eid,
                "combat",
                format!("chase wall-blocked -> rerouting via ({wx:.1},{wy:.1})"),
                game_time,
            );
        }
    } else if c.mode == CombatMode::Chase && target.wall_los {
        c.chase_los_wp = None;
    }

    // Cache ally fire lanes for movement and tactical scoring
    c.fire_lines = get_ally_fire_lines(world, eid, pos);

    // Active fire-line communication: if our shot is blocked by an
    // ally, tell the ally to move.
    if is_ranged && c.mode == CombatMode::Attack && target.ally_in_fire {
        if let Some(blocker) = find_blocking_ally(world, eid, pos, target.x, target.y) {
            request_clear_fire_line(world, blocker, (pos.x, pos.y), (target.x, target.y));
        }
    }

    // Were we asked to clear someone's lane / standing in one / clumped?
    if is_ranged && matches!(c.mode, CombatMode::Attack | CombatMode::Chase) {
        maybe_start_tactical_repos(world, eid, pos, atk_cfg, c, &target, game_time);
    }

    update_fsm(world, eid, pos, threat, atk_cfg, c, &target, is_ranged, game_time);

    // Share intel with nearby idle allies
    if matches!(c.mode, CombatMode::Chase | CombatMode::Attack) {
        share_combat_intel(world, eid, pos, (target.x, target.y), game_time);
    }

    if c.mode == CombatMode::Attack {
        try_attack(world, eid, atk_cfg, c, &target, is_ranged, game_time);
    }

    false
}

// ============================================================================
// DEFENSIVE REACTIONS
// ============================================================================

/// On a fresh hit, dash perpendicular to the threat. Returns true while
/// dodging (the dash already wrote velocity).
fn try_dodge(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    c: &mut CombatState,
    game_time: f32,
) -> bool {
    let fresh_hit = world
        .get::<HitFlash>(eid)
        .is_some_and(|hf| hf.remaining >= 0.08);
    if !fresh_hit || c.dodge_until > game_time {
        return false;
    }

    let threat_pos = find_player(world)
        .filter(|(_, p)| p.zone == pos.zone)
        .map(|(_, p)| (p.x, p.y))
        .or_else(|| find_nearest_enemy(world, eid, 8.0, false).map(|(_, p)| (p.x, p.y)));
    let Some((tx, ty)) = threat_pos else {
        return false;
    };
    let dx = tx - pos.x;
    let dy = ty - pos.y;
    let d = (dx * dx + dy * dy).sqrt();
    if d < 0.05 {
        return false;
    }

    let patrol_speed = world.get::<HomeRange>(eid).map_or(2.0, |p| p.speed);
    let dodge_speed = patrol_speed * tun(world, "ai.helpers", "dodge_speed_mult", 3.0);
    let dir = rng_sign(world) as f32;
    if let Some(mut vel) = world.get_mut::<Velocity>(eid) {
        vel.x = -dy / d * dir * dodge_speed;
        vel.y = dx / d * dir * dodge_speed;
    }
    c.dodge_until = game_time + tun(world, "ai.helpers", "dodge_duration", 1.5);
    true
}

/// Low on HP with a healing consumable in the bag: use the best one.
fn try_heal(world: &mut World, eid: Entity, c: &mut CombatState, game_time: f32) -> bool {
    if c.heal_until > game_time {
        return false;
    }
    if hp_ratio(world, eid) > tun(world, "ai.helpers", "heal_hp_threshold", 0.4) {
        return false;
    }
    let Some(inv) = world.get::<Inventory>(eid) else {
        return false;
    };

    let best = {
        let Some(registry) = world.get_resource::<ItemRegistry>() else {
            return false;
        };
        let mut best: Option<(String, f32)> = None;
        for (item_id, &qty) in &inv.items {
            if qty == 0 || registry.item_kind(item_id) != "consumable" {
                continue;
            }
            let heal = registry.get_field(item_id, "heal", 0.0);
            if heal > 0.0 && best.as_ref().is_none_or(|(_, h)| heal > *h) {
                best = Some((item_id.clone(), heal));
            }
        }
        best
    };
    let Some((item_id, heal)) = best else {
        return false;
    };

    if let Some(mut inv) = world.get_mut::<Inventory>(eid) {
        inv.take_one(&item_id);
    }
    if let Some(mut health) = world.get_mut::<Health>(eid) {
        health.heal(heal);
    }
    c.heal_until = game_time + tun(world, "ai.helpers", "heal_cooldown", 5.0);
    let name = display_name(world, eid);
    tracing::info!(target: "combat", "{name} used {item_id} (+{heal:.0} hp)");
    dev_log(world, eid, "combat", format!("used {item_id}"), game_time);
    true
}

// ============================================================================
// TACTICAL REPOSITION TRIGGERS
// ============================================================================

/// Initiate a tactical reposition if needed (fire-line / clump).
///
/// Triggers, checked in order:
/// 1. an ally explicitly asked us to clear their fire lane
/// 2. we are standing inside any cached fire lane ourselves
/// 3. we are closer than `ally_min_distance` to an ally (anti-clump)
///
/// An active, unexpired reposition is never overridden.
fn maybe_start_tactical_repos(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    atk_cfg: &AttackConfig,
    c: &mut CombatState,
    target: &TargetInfo,
    game_time: f32,
) {
    if c.tac_repos.is_some() && c.tac_repos_until > game_time {
        return;
    }

    let mut need_repos = c.clear_fire_line.take().is_some();

    if !need_repos && !c.fire_lines.is_empty() {
        let clearance = tun(world, "combat.fireline", "clearance", 1.2);
        let (nx, ny) = fire_line_dodge_vector(pos.x, pos.y, &c.fire_lines, clearance);
        if nx != 0.0 || ny != 0.0 {
            need_repos = true;
        }
    }

    let ally_positions = get_ally_positions(world, eid, pos);
    if !need_repos {
        let clump_dist = tun(world, "combat.tactical", "ally_min_distance", 3.0);
        need_repos = ally_positions
            .iter()
            .any(|&(ax, ay)| (pos.x - ax).hypot(pos.y - ay) < clump_dist);
    }
    if !need_repos {
        return;
    }

    if let Some(rp) = find_tactical_position(
        world,
        pos.zone,
        pos.x,
        pos.y,
        target.x,
        target.y,
        atk_cfg.range,
        &c.fire_lines,
        &ally_positions,
        c.origin,
    ) {
        c.tac_repos = Some(rp);
        c.tac_repos_until = game_time + tun(world, "combat.tactical", "repos_timeout", 3.0);
        dev_log(world, eid, "combat", "tactical reposition", game_time);
    }
}

// ============================================================================
// FSM TRANSITIONS
// ============================================================================

/// Pure state transitions - reads sensor data, mutates `c.mode`.
#[allow(clippy::too_many_arguments)]
fn update_fsm(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    threat: &Threat,
    atk_cfg: &AttackConfig,
    c: &mut CombatState,
    target: &TargetInfo,
    is_ranged: bool,
    game_time: f32,
) {
    let dist = target.dist;
    let (ox, oy) = c.origin.unwrap_or((pos.x, pos.y));
    let home_dist = (pos.x - ox).hypot(pos.y - oy);
    let cur_hp = hp_ratio(world, eid);
    let can_flee = threat.flee_threshold > 0.0;

    match c.mode {
        CombatMode::Idle => {
            if is_detected_idle(world, eid, pos, target.x, target.y, dist, threat.aggro_radius) {
                c.mode = CombatMode::Chase;
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("idle -> chase (dist={dist:.1})"),
                    game_time,
                );
            }
        }
        CombatMode::Chase => {
            if can_flee && cur_hp <= threat.flee_threshold {
                c.mode = CombatMode::Flee;
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("chase -> flee (hp={:.0}%)", cur_hp * 100.0),
                    game_time,
                );
            } else if home_dist > threat.leash_radius {
                c.mode = CombatMode::Return;
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("chase -> return (leash={home_dist:.1})"),
                    game_time,
                );
            } else if is_ranged
                && dist <= atk_cfg.range * tun(world, "combat.engagement", "ranged_chase_to_attack", 1.1)
            {
                if target.wall_los {
                    c.mode = CombatMode::Attack;
                    if c.attack_until < 1.0 {
                        c.attack_until =
                            game_time + rng_range(world, 0.1, atk_cfg.cooldown * 0.8);
                    }
                    dev_log(
                        world,
                        eid,
                        "combat",
                        format!("chase -> attack (ranged, dist={dist:.1})"),
                        game_time,
                    );
                }
            } else if !is_ranged && dist <= atk_cfg.range {
                c.mode = CombatMode::Attack;
                c.melee.phase = MeleePhase::Approach;
                if c.attack_until < 1.0 {
                    c.attack_until = game_time + rng_range(world, 0.0, atk_cfg.cooldown * 0.5);
                }
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("chase -> attack (melee, dist={dist:.1})"),
                    game_time,
                );
            }
        }
        CombatMode::Attack => {
            if can_flee && cur_hp <= threat.flee_threshold {
                c.mode = CombatMode::Flee;
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("attack -> flee (hp={:.0}%)", cur_hp * 100.0),
                    game_time,
                );
            } else if dist > threat.leash_radius {
                c.mode = CombatMode::Return;
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("attack -> return (dist={dist:.1})"),
                    game_time,
                );
            } else if is_ranged
                && dist > atk_cfg.range * tun(world, "combat.engagement", "ranged_attack_to_chase", 1.8)
            {
                c.mode = CombatMode::Chase;
                dev_log(world, eid, "combat", "attack -> chase (too far)", game_time);
            } else if !is_ranged
                && dist > atk_cfg.range * tun(world, "combat.engagement", "melee_attack_to_chase", 1.6)
            {
                c.mode = CombatMode::Chase;
                dev_log(
                    world,
                    eid,
                    "combat",
                    "attack -> chase (melee lost range)",
                    game_time,
                );
            }
        }
        CombatMode::Flee => {
            if cur_hp
                > threat.flee_threshold * tun(world, "combat.engagement", "flee_recovery_mult", 2.5)
                || dist > threat.aggro_radius
            {
                c.mode = CombatMode::Return;
                dev_log(world, eid, "combat", "flee -> return", game_time);
            }
        }
        CombatMode::Searching => {
            if game_time >= c.search_until {
                c.mode = CombatMode::Idle;
                dev_log(world, eid, "combat", "searching -> idle (timed out)", game_time);
            } else if is_detected_idle(
                world,
                eid,
                pos,
                target.x,
                target.y,
                dist,
                threat.aggro_radius,
            ) {
                c.mode = CombatMode::Chase;
                // Flip to hostile so the chase persists past the gate.
                make_hostile(world, eid, "spotted target", None, game_time);
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("searching -> chase (spotted, dist={dist:.1})"),
                    game_time,
                );
            }
        }
        CombatMode::Return => {
            if home_dist < tun(world, "combat.engagement", "return_arrive_dist", 1.0) {
                c.mode = CombatMode::Idle;
                // Combat over: stand down to the home disposition.
                if let Some(mut faction) = world.get_mut::<Faction>(eid) {
                    if faction.disposition != faction.home_disposition {
                        faction.disposition = faction.home_disposition;
                    }
                }
                dev_log(world, eid, "combat", "returned home -> idle", game_time);
            } else if dist
                <= threat.aggro_radius
                    * tun(world, "combat.engagement", "return_reaggro_factor", 0.6)
            {
                c.mode = CombatMode::Chase;
                dev_log(world, eid, "combat", "return interrupted -> chase", game_time);
            }
        }
    }
}

// ============================================================================
// ATTACK EXECUTION
// ============================================================================

/// Attempt to fire / strike if the cooldown is ready.
fn try_attack(
    world: &mut World,
    eid: Entity,
    atk_cfg: &AttackConfig,
    c: &mut CombatState,
    target: &TargetInfo,
    is_ranged: bool,
    game_time: f32,
) {
    let Some(target_eid) = target.eid else {
        return;
    };
    if c.attack_until > game_time {
        return;
    }

    if is_ranged {
        if !target.wall_los {
            c.wall_blocked = true;
            dev_log(world, eid, "combat", "los blocked by wall", game_time);
            return;
        }

        if target.ally_in_fire {
            c.los_blocked = true;
            c.los_blocked_count += 1;
            let patience = tun_i64(world, "combat.engagement", "los_blocked_patience", 3) as u32;
            if c.los_blocked_count < patience {
                dev_log(
                    world,
                    eid,
                    "combat",
                    format!("ally in fire ({}/{patience})", c.los_blocked_count),
                    game_time,
                );
                return;
            }
            // Patience exhausted - wall LOS still holds (checked above),
            // so fire anyway rather than stand mute forever.
            c.los_blocked_count = 0;
            dev_log(world, eid, "attack", "fired (forced, los patience)", game_time);
        } else {
            c.los_blocked = false;
            c.los_blocked_count = 0;
            c.wall_blocked = false;
            dev_log(world, eid, "attack", "fired ranged attack", game_time);
        }

        emit(
            world,
            GameEvent::AttackIntent {
                attacker: eid,
                target: target_eid,
                attack_type: AttackType::Ranged,
            },
        );
        c.attack_until = game_time + atk_cfg.cooldown;
    } else {
        emit(
            world,
            GameEvent::AttackIntent {
                attacker: eid,
                target: target_eid,
                attack_type: AttackType::Melee,
            },
        );
        c.attack_until = game_time + atk_cfg.cooldown;
        c.melee.just_hit = true;
        dev_log(world, eid, "attack", "melee strike", game_time);
    }
}

// ============================================================================
// PER-FRAME MOVEMENT
// ============================================================================

const SCAN_DIRS: [Dir; 4] = [Dir::Right, Dir::Down, Dir::Left, Dir::Up];

/// Delegates to `combat_movement` based on the current FSM mode.
#[allow(clippy::too_many_arguments)]
fn run_movement(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    patrol: Option<&HomeRange>,
    atk_cfg: &AttackConfig,
    brain: &mut Brain,
    is_ranged: bool,
    dt: f32,
    game_time: f32,
) {
    let p_speed = patrol.map_or_else(
        || tun(world, "combat.engagement", "fallback_patrol_speed", 2.0),
        |p| p.speed,
    );
    let mut vel = Velocity::default();
    let mut facing: Option<Dir> = None;
    let mut rng = world.resource::<SimRng>().0.clone();
    let mode = brain.combat.mode;
    let (ox, oy) = brain.combat.origin.unwrap_or((pos.x, pos.y));
    let target = brain.combat.target_pos;

    match mode {
        CombatMode::Idle => {
            if let Some(patrol) = patrol {
                let maps = world.resource::<ZoneMaps>();
                run_idle(
                    &mut rng,
                    maps,
                    pos.zone,
                    patrol,
                    pos.x,
                    pos.y,
                    &mut brain.wander,
                    &mut vel,
                    game_time,
                );
            }
            if vel.magnitude() > 0.01 {
                facing = Some(Dir::from_vector(vel.x, vel.y));
            }
        }
        CombatMode::Searching => {
            let c = &mut brain.combat;
            let (sx, sy) = c.search_source.unwrap_or((pos.x, pos.y));
            let dist_to_src = (sx - pos.x).hypot(sy - pos.y);
            if dist_to_src < 2.0 {
                // Close to the source: hold position and sweep the
                // vision cone through the cardinal directions.
                vel.zero();
                let interval = tun(world, "combat.engagement", "search_scan_interval", 0.8);
                let elapsed = game_time - c.search_start;
                let idx = (elapsed / interval.max(0.05)) as usize % 4;
                facing = Some(SCAN_DIRS[idx]);
            } else {
                let search_speed =
                    p_speed * tun(world, "combat.engagement", "search_speed_mult", 0.6);
                move_toward(pos.x, pos.y, &mut vel, sx, sy, search_speed);
                facing = Some(face_toward(pos.x, pos.y, sx, sy));
            }
        }
        CombatMode::Chase => {
            if let Some((tx, ty)) = target {
                let c = &mut brain.combat;
                let mult = if is_ranged {
                    tun(world, "combat.engagement", "chase_mult_ranged", 1.2)
                } else {
                    tun(world, "combat.engagement", "chase_mult_melee", 1.4)
                };
                let speed = p_speed * mult;
                // Wall-blocked chases route via the cached LOS waypoint.
                let goal = match c.chase_los_wp {
                    Some((wx, wy)) => {
                        if (pos.x - wx).hypot(pos.y - wy) < 1.0 {
                            c.chase_los_wp = None;
                            (tx, ty)
                        } else {
                            (wx, wy)
                        }
                    }
                    None => (tx, ty),
                };
                let maps = world.resource::<ZoneMaps>();
                move_toward_pathfind(
                    maps, pos.zone, pos.x, pos.y, &mut vel, goal.0, goal.1, speed, &mut c.path,
                    game_time,
                );
                facing = Some(face_toward(pos.x, pos.y, tx, ty));
            }
        }
        CombatMode::Attack => {
            if let Some((tx, ty)) = target {
                facing = Some(face_toward(pos.x, pos.y, tx, ty));
                let dist = (pos.x - tx).hypot(pos.y - ty);
                let c = &mut brain.combat;
                if is_ranged {
                    ranged_attack_movement(
                        world, eid, pos, atk_cfg, c, &mut rng, &mut vel, tx, ty, dist, p_speed,
                        dt, game_time,
                    );
                } else {
                    move_::melee_attack(
                        world,
                        &mut rng,
                        pos.x,
                        pos.y,
                        &mut vel,
                        tx,
                        ty,
                        dist,
                        atk_cfg.range,
                        p_speed,
                        c,
                        dt,
                    );
                }
            }
        }
        CombatMode::Flee => {
            if let Some((tx, ty)) = target {
                let mult = tun(world, "combat.engagement", "flee_speed_mult", 1.3);
                move_away(pos.x, pos.y, &mut vel, tx, ty, p_speed * mult);
            }
        }
        CombatMode::Return => {
            let mult = if is_ranged {
                1.0
            } else {
                tun(world, "combat.engagement", "return_speed_mult_melee", 1.5)
            };
            let maps = world.resource::<ZoneMaps>();
            move_toward_pathfind(
                maps,
                pos.zone,
                pos.x,
                pos.y,
                &mut vel,
                ox,
                oy,
                p_speed * mult,
                &mut brain.combat.path,
                game_time,
            );
        }
    }

    world.resource_mut::<SimRng>().0 = rng;
    if let Some(dir) = facing {
        if let Some(mut f) = world.get_mut::<Facing>(eid) {
            f.direction = dir;
        }
    }
    if let Some(mut v) = world.get_mut::<Velocity>(eid) {
        *v = vel;
    }
}

/// Ranged attack movement: tactical reposition first, then the
/// kite / strafe band logic.
#[allow(clippy::too_many_arguments)]
fn ranged_attack_movement(
    world: &World,
    eid: Entity,
    pos: &Position,
    atk_cfg: &AttackConfig,
    c: &mut CombatState,
    rng: &mut rand_chacha::ChaCha8Rng,
    vel: &mut Velocity,
    tx: f32,
    ty: f32,
    dist: f32,
    p_speed: f32,
    dt: f32,
    game_time: f32,
) {
    // Tactical reposition takes priority over everything else.
    if let Some((rx, ry)) = c.tac_repos {
        if game_time < c.tac_repos_until {
            let arrive = tun(world, "combat.tactical", "repos_arrive_dist", 0.8);
            if (pos.x - rx).hypot(pos.y - ry) < arrive {
                c.tac_repos = None;
                c.tac_repos_until = 0.0;
            } else {
                move_::tactical_reposition(
                    world, pos.zone, pos.x, pos.y, vel, rx, ry, p_speed, c, game_time,
                );
                return;
            }
        } else {
            // Timed out - drop the stale reposition.
            c.tac_repos = None;
            c.tac_repos_until = 0.0;
        }
    }

    // Wall-blocked with no flanking spot yet: find one.
    if c.wall_blocked && c.repos_target.is_none() {
        let ally_positions = get_ally_positions(world, eid, pos);
        c.repos_target = find_tactical_position(
            world,
            pos.zone,
            pos.x,
            pos.y,
            tx,
            ty,
            atk_cfg.range,
            &c.fire_lines,
            &ally_positions,
            c.origin,
        );
    }

    move_::ranged_attack(
        world,
        rng,
        pos.zone,
        pos.x,
        pos.y,
        vel,
        tx,
        ty,
        dist,
        atk_cfg.range,
        p_speed,
        c,
        dt,
        game_time,
    );
}
