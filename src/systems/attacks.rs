//! Attack execution pipeline.
//!
//! [`attack_entity`] is the generic damage path for any attacker and
//! defender. [`npc_melee_attack`] / [`npc_ranged_attack`] wrap it with
//! cooldown gating, equipped-weapon stat resolution, projectile
//! spawning, and combat-sound emission. Both are invoked from the event
//! drain in response to `AttackIntent`.

use crate::components::*;
use crate::items::ItemRegistry;
use crate::particles::{self, BurstParams};
use crate::systems::alerts::{alert_nearby_faction, emit_combat_sound};
use crate::systems::damage::{apply_damage, handle_death, DamageSpec};
use crate::tuning::tun;
use crate::world::{alive, display_name, register_zone, rng_range, GameClock};
use bevy_ecs::prelude::*;

/// One entity attacks another. Returns true if the defender died.
pub fn attack_entity(
    world: &mut World,
    attacker: Entity,
    defender: Entity,
    bonus_damage: f32,
    knockback: Option<f32>,
    crit_chance: Option<f32>,
    crit_mult: Option<f32>,
) -> bool {
    if world.get::<CombatStats>(attacker).is_none() || world.get::<Health>(defender).is_none() {
        return false;
    }

    let knockback = knockback.unwrap_or_else(|| tun(world, "combat.melee", "default_knockback", 3.0));
    let crit_chance =
        crit_chance.unwrap_or_else(|| tun(world, "combat.melee", "default_crit_chance", 0.1));
    let crit_mult = crit_mult.unwrap_or_else(|| tun(world, "combat.melee", "default_crit_mult", 1.5));

    let base = world.get::<CombatStats>(attacker).map_or(0.0, |cs| cs.damage) + bonus_damage;
    let v_min = tun(world, "combat.melee", "damage_variance_min", 0.8);
    let v_max = tun(world, "combat.melee", "damage_variance_max", 1.2);
    let raw = base * rng_range(world, v_min, v_max);

    let outcome = apply_damage(
        world,
        attacker,
        defender,
        DamageSpec {
            raw,
            knockback,
            crit_chance,
            crit_mult,
            ..Default::default()
        },
    );

    if outcome.dead {
        handle_death(world, defender, Some(attacker));
        return true;
    }
    alert_nearby_faction(world, defender, attacker);
    false
}

/// `(bonus_damage, reach)` from an entity's equipped weapon.
pub fn get_entity_weapon_stats(world: &World, eid: Entity) -> (f32, f32) {
    let Some(weapon) = world
        .get::<Equipment>(eid)
        .and_then(|e| e.weapon.clone())
    else {
        return (0.0, 1.0);
    };
    let Some(registry) = world.get_resource::<ItemRegistry>() else {
        return (0.0, 1.0);
    };
    (
        registry.get_field(&weapon, "damage", 0.0),
        registry.get_field(&weapon, "reach", 1.5),
    )
}

/// Gate on `AttackConfig.cooldown`; stamps `last_attack_time` when the
/// attack may proceed.
fn cooldown_ready(world: &mut World, attacker: Entity) -> bool {
    let now = world.resource::<GameClock>().time;
    let Some(mut cfg) = world.get_mut::<AttackConfig>(attacker) else {
        return true;
    };
    if now - cfg.last_attack_time < cfg.cooldown * 0.9 {
        return false;
    }
    cfg.last_attack_time = now;
    true
}

/// NPC melee strike. Returns true if the target died.
pub fn npc_melee_attack(world: &mut World, attacker: Entity, target: Entity) -> bool {
    if !alive(world, attacker) || !alive(world, target) {
        return false;
    }
    if !cooldown_ready(world, attacker) {
        return false;
    }

    let (bonus, _reach) = get_entity_weapon_stats(world, attacker);
    let weapon = world
        .get::<Equipment>(attacker)
        .and_then(|e| e.weapon.clone());
    let (mut kb, mut cc, mut cm) = (None, None, None);
    if let (Some(weapon), Some(registry)) = (&weapon, world.get_resource::<ItemRegistry>()) {
        kb = Some(registry.get_field(weapon, "knockback", 3.0));
        cc = Some(registry.get_field(weapon, "crit_chance", 0.1));
        cm = Some(registry.get_field(weapon, "crit_mult", 1.5));
    }

    let died = attack_entity(world, attacker, target, bonus, kb, cc, cm);

    if let Some(pos) = world.get::<Position>(attacker).copied() {
        emit_combat_sound(world, attacker, &pos, "melee");
    }
    died
}

/// NPC fires a projectile at the target. Returns true if a projectile
/// spawned.
pub fn npc_ranged_attack(world: &mut World, attacker: Entity, target: Entity) -> bool {
    if !alive(world, attacker) || !alive(world, target) {
        return false;
    }
    if !cooldown_ready(world, attacker) {
        return false;
    }

    let (Some(att_pos), Some(def_pos)) = (
        world.get::<Position>(attacker).copied(),
        world.get::<Position>(target).copied(),
    ) else {
        return false;
    };

    let (cx, cy) = att_pos.center();
    let (tx, ty) = def_pos.center();
    let dx = tx - cx;
    let dy = ty - cy;
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < 0.01 {
        return false;
    }

    // Weapon item overrides AttackConfig fallbacks.
    let (bonus, _) = get_entity_weapon_stats(world, attacker);
    let base = world.get::<CombatStats>(attacker).map_or(0.0, |c| c.damage);
    let total_damage = base + bonus;

    let cfg = world.get::<AttackConfig>(attacker).copied().unwrap_or_default();
    let weapon = world
        .get::<Equipment>(attacker)
        .and_then(|e| e.weapon.clone());
    let (accuracy, proj_speed, max_range) = match (&weapon, world.get_resource::<ItemRegistry>()) {
        (Some(w), Some(reg)) => (
            reg.get_field(w, "accuracy", cfg.accuracy),
            reg.get_field(w, "proj_speed", cfg.proj_speed),
            reg.get_field(w, "range", cfg.range),
        ),
        _ => (cfg.accuracy, cfg.proj_speed, cfg.range),
    };

    // Inaccuracy: uniform angular deviation shrinking with accuracy.
    let spread = (1.0 - accuracy) * 0.4;
    let angle = dy.atan2(dx) + rng_range(world, -spread, spread);
    let (pdx, pdy) = (angle.cos(), angle.sin());

    let owner_group = world.get::<Faction>(attacker).map(|f| f.group.clone());
    let (sx, sy) = (cx + pdx * 0.5, cy + pdy * 0.5);
    let proj = world
        .spawn((
            Position::new(sx, sy, att_pos.zone),
            Projectile {
                owner: attacker,
                owner_group,
                damage: total_damage,
                speed: proj_speed,
                dx: pdx,
                dy: pdy,
                max_range,
                traveled: 0.0,
                radius: 0.15,
            },
        ))
        .id();
    register_zone(world, proj, att_pos.zone);

    // Muzzle flash cone along the shot direction
    let mut flash = world
        .get_resource::<crate::tuning::Tuning>()
        .map(|t| BurstParams::from_preset(&t.section("particles.muzzle_flash")))
        .unwrap_or(BurstParams {
            count: 3,
            color: [255, 180, 60],
            speed: 1.5,
            life: 0.1,
            size: 1.0,
            ..Default::default()
        });
    flash.spread = 0.5;
    flash.angle = angle;
    particles::emit_params(world, sx, sy, &flash);

    tracing::debug!(target: "combat", "{} fired", display_name(world, attacker));
    emit_combat_sound(world, attacker, &att_pos, "gunshot");
    true
}
