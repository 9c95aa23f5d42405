//! Ally fire-line extraction and avoidance.
//!
//! A fire line is the segment from a shooting ally to its target. NPCs
//! cache nearby allies' fire lines each sensor tick, steer out of them,
//! score tactical positions against them, and - when blocked - actively
//! ask the blocking ally to move (`request_clear_fire_line`).

use crate::components::{Brain, CombatMode, Faction, Position};
use crate::spatial::zone_allies;
use crate::tuning::tun;
use bevy_ecs::prelude::*;

/// One ally's line of fire: shooter center -> target center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireLine {
    pub sx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

/// Distance from a point to the fire-line segment.
pub fn point_fire_line_dist(px: f32, py: f32, fl: &FireLine) -> f32 {
    let dx = fl.tx - fl.sx;
    let dy = fl.ty - fl.sy;
    let seg_len_sq = dx * dx + dy * dy;
    if seg_len_sq < 1e-6 {
        let rx = px - fl.sx;
        let ry = py - fl.sy;
        return (rx * rx + ry * ry).sqrt();
    }
    let t = (((px - fl.sx) * dx + (py - fl.sy) * dy) / seg_len_sq).clamp(0.0, 1.0);
    let cx = fl.sx + t * dx;
    let cy = fl.sy + t * dy;
    let ox = px - cx;
    let oy = py - cy;
    (ox * ox + oy * oy).sqrt()
}

/// Combined push-out vector away from every fire line the point stands
/// in. Zero when the point is clear of all lanes.
pub fn fire_line_dodge_vector(
    px: f32,
    py: f32,
    fire_lines: &[FireLine],
    clearance: f32,
) -> (f32, f32) {
    let mut out = (0.0f32, 0.0f32);
    for fl in fire_lines {
        let d = point_fire_line_dist(px, py, fl);
        if d >= clearance {
            continue;
        }
        // Perpendicular away from the lane, stronger the deeper in.
        let dx = fl.tx - fl.sx;
        let dy = fl.ty - fl.sy;
        let seg_len = (dx * dx + dy * dy).sqrt().max(1e-3);
        let t = (((px - fl.sx) * dx + (py - fl.sy) * dy) / (seg_len * seg_len)).clamp(0.0, 1.0);
        let cx = fl.sx + t * dx;
        let cy = fl.sy + t * dy;
        let (mut ox, mut oy) = (px - cx, py - cy);
        let olen = (ox * ox + oy * oy).sqrt();
        if olen < 1e-3 {
            // Dead center of the lane: push perpendicular to it.
            ox = -dy / seg_len;
            oy = dx / seg_len;
        } else {
            ox /= olen;
            oy /= olen;
        }
        let weight = clearance - d;
        out.0 += ox * weight;
        out.1 += oy * weight;
    }
    out
}

/// Fire lines of nearby same-group allies currently in chase or attack
/// mode with a cached target.
pub fn get_ally_fire_lines(world: &World, eid: Entity, pos: &Position) -> Vec<FireLine> {
    let Some(group) = world.get::<Faction>(eid).map(|f| f.group.clone()) else {
        return Vec::new();
    };
    let scan = tun(world, "combat.fireline", "scan_radius", 15.0);
    let mut lines = Vec::new();
    for (ally, ax, ay) in zone_allies(world, eid, pos, &group) {
        let dx = ax - pos.x;
        let dy = ay - pos.y;
        if dx * dx + dy * dy > scan * scan {
            continue;
        }
        let Some(brain) = world.get::<Brain>(ally) else {
            continue;
        };
        if !matches!(brain.combat.mode, CombatMode::Chase | CombatMode::Attack) {
            continue;
        }
        let Some((tx, ty)) = brain.combat.target_pos else {
            continue;
        };
        lines.push(FireLine {
            sx: ax + 0.4,
            sy: ay + 0.4,
            tx: tx + 0.4,
            ty: ty + 0.4,
        });
    }
    lines
}

/// Tell `blocker` it is standing in our fire lane. Its next tactical
/// reposition check sees the callout.
pub fn request_clear_fire_line(
    world: &mut World,
    blocker: Entity,
    from: (f32, f32),
    to: (f32, f32),
) {
    if let Some(mut brain) = world.get_mut::<Brain>(blocker) {
        brain.combat.clear_fire_line = Some(FireLine {
            sx: from.0,
            sy: from.1,
            tx: to.0,
            ty: to.1,
        });
    }
}
