//! Canonical damage application and death sequence.
//!
//! Every code path that deals damage (melee hits, projectile impacts)
//! funnels through [`apply_damage`] so that armor, crits, knockback,
//! hit-flash, particles, and logging stay consistent. [`handle_death`]
//! centralizes the death pipeline (particles -> loot -> deferred kill).

use crate::components::*;
use crate::devlog::dev_log;
use crate::events::{emit, GameEvent};
use crate::particles;
use crate::tuning::tun;
use crate::world::{alive, display_name, kill, rng_chance, GameClock};
use bevy_ecs::prelude::*;

/// What a damage application did.
#[derive(Debug, Clone, Copy, Default)]
pub struct DamageOutcome {
    pub dealt: f32,
    pub crit: bool,
    pub dead: bool,
}

/// Damage parameters beyond the raw amount.
#[derive(Debug, Clone, Copy)]
pub struct DamageSpec {
    /// Pre-armor damage (already includes weapon bonus, falloff, ...).
    pub raw: f32,
    /// Override armor; None reads the defender's CombatStats.
    pub armor_override: Option<f32>,
    pub knockback: f32,
    /// Unit knockback direction; None derives attacker -> defender.
    pub knockback_dir: Option<(f32, f32)>,
    pub crit_chance: f32,
    pub crit_mult: f32,
    pub particle_preset: &'static str,
    pub crit_particle_preset: &'static str,
    pub log_prefix: &'static str,
}

impl Default for DamageSpec {
    fn default() -> Self {
        Self {
            raw: 0.0,
            armor_override: None,
            knockback: 3.0,
            knockback_dir: None,
            crit_chance: 0.0,
            crit_mult: 1.5,
            particle_preset: "hit_normal",
            crit_particle_preset: "hit_crit",
            log_prefix: "combat",
        }
    }
}

/// Deal damage to `defender`. Returns what happened.
pub fn apply_damage(
    world: &mut World,
    attacker: Entity,
    defender: Entity,
    spec: DamageSpec,
) -> DamageOutcome {
    if world.get::<Health>(defender).is_none() {
        return DamageOutcome::default();
    }

    // Armor subtraction with a floor so hits always matter.
    let armor = spec.armor_override.unwrap_or_else(|| {
        world
            .get::<CombatStats>(defender)
            .map_or(0.0, |cs| cs.defense)
    });
    let min_dmg = tun(world, "combat.melee", "min_base_damage", 1.0);
    let mut damage = (spec.raw - armor).max(min_dmg);

    let crit = spec.crit_chance > 0.0 && rng_chance(world, spec.crit_chance);
    if crit {
        damage *= spec.crit_mult;
    }

    let mut hp_after = 0.0;
    if let Some(mut health) = world.get_mut::<Health>(defender) {
        health.current -= damage;
        hp_after = health.current;
    }

    // Knockback
    if spec.knockback > 0.0 {
        let dir = spec.knockback_dir.or_else(|| {
            let att = world.get::<Position>(attacker).copied()?;
            let def = world.get::<Position>(defender).copied()?;
            let dx = def.x - att.x;
            let dy = def.y - att.y;
            let mag = (dx * dx + dy * dy).sqrt();
            if mag > 0.01 {
                Some((dx / mag, dy / mag))
            } else {
                Some((0.0, 0.0))
            }
        });
        if let (Some((dx, dy)), Some(mut vel)) = (dir, world.get_mut::<Velocity>(defender)) {
            vel.x = dx * spec.knockback;
            vel.y = dy * spec.knockback;
        }
    }

    // Hit flash
    let flash = tun(world, "combat.melee", "hit_flash_duration", 0.1);
    match world.get_mut::<HitFlash>(defender) {
        Some(mut hf) => hf.remaining = flash,
        None => {
            world
                .entity_mut(defender)
                .insert(HitFlash { remaining: flash });
        }
    }

    // Particles at the defender's center
    if let Some(def_pos) = world.get::<Position>(defender).copied() {
        let preset = if crit {
            spec.crit_particle_preset
        } else {
            spec.particle_preset
        };
        particles::emit_preset(world, def_pos.x + 0.4, def_pos.y + 0.4, preset);
    }

    emit(
        world,
        GameEvent::EntityHit {
            target: defender,
            attacker,
            damage,
        },
    );

    let t = world.resource::<GameClock>().time;
    let attacker_name = display_name(world, attacker);
    let defender_name = display_name(world, defender);
    tracing::debug!(
        target: "combat",
        "[{}] {attacker_name} hit {defender_name} for {damage:.0}{} (hp {hp_after:.0})",
        spec.log_prefix,
        if crit { " [crit]" } else { "" },
    );
    dev_log(
        world,
        defender,
        "combat",
        format!("took {damage:.0} from {attacker_name}"),
        t,
    );

    DamageOutcome {
        dealt: damage,
        crit,
        dead: hp_after <= 0.0,
    }
}

/// Unified death sequence: particles -> loot -> deferred kill.
///
/// The player entity is never killed by the combat pipeline; the outer
/// scene decides game-over.
pub fn handle_death(world: &mut World, dead: Entity, killer: Option<Entity>) {
    if !alive(world, dead) {
        return;
    }
    if world.get::<Player>(dead).is_some() {
        tracing::info!(target: "combat", "player down");
        return;
    }

    let t = world.resource::<GameClock>().time;
    let name = display_name(world, dead);
    let killer_name = killer.map(|k| display_name(world, k));
    tracing::info!(
        target: "combat",
        "{name} died{}",
        killer_name.map_or(String::new(), |k| format!(" (killed by {k})")),
    );
    dev_log(world, dead, "death", "died", t);

    if let Some(pos) = world.get::<Position>(dead).copied() {
        particles::emit_preset(world, pos.x + 0.4, pos.y + 0.4, "death");
    }
    drop_loot(world, dead);
    kill(world, dead);
}

/// Log dropped items where the entity died. The external scene turns
/// these into pickup entities; the core only records the drop.
fn drop_loot(world: &mut World, dead: Entity) {
    let Some(pos) = world.get::<Position>(dead).copied() else {
        return;
    };
    let Some(loot) = world.get::<Loot>(dead) else {
        return;
    };
    if loot.looted || loot.items.is_empty() {
        return;
    }
    let items = loot.items.clone();
    tracing::info!(
        target: "loot",
        "items dropped at ({:.0},{:.0}): {items:?}",
        pos.x,
        pos.y,
    );
    if let Some(mut loot) = world.get_mut::<Loot>(dead) {
        loot.looted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use crate::spatial::ZoneIndex;
    use crate::tuning::Tuning;
    use crate::world::{Graveyard, SimRng};
    use crate::zone::ZoneId;

    fn damage_world() -> World {
        let mut world = World::new();
        world.insert_resource(GameClock::default());
        world.insert_resource(Tuning::default());
        world.insert_resource(SimRng::from_seed(5));
        world.insert_resource(Graveyard::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(EventBus::default());
        world
    }

    fn combatant(world: &mut World, x: f32, defense: f32) -> Entity {
        world
            .spawn((
                Position::new(x, 0.0, ZoneId(0)),
                Velocity::default(),
                Health::new(100.0),
                CombatStats {
                    damage: 10.0,
                    defense,
                },
            ))
            .id()
    }

    #[test]
    fn test_armor_subtracts_with_floor() {
        let mut world = damage_world();
        let a = combatant(&mut world, 0.0, 0.0);
        let d = combatant(&mut world, 2.0, 6.0);

        let out = apply_damage(
            &mut world,
            a,
            d,
            DamageSpec {
                raw: 10.0,
                ..Default::default()
            },
        );
        assert_eq!(out.dealt, 4.0);
        assert!(!out.dead);

        // Armor above raw damage still deals the minimum
        let out = apply_damage(
            &mut world,
            a,
            d,
            DamageSpec {
                raw: 3.0,
                ..Default::default()
            },
        );
        assert_eq!(out.dealt, 1.0);
    }

    #[test]
    fn test_no_crit_damage_is_order_independent() {
        // R2: with crit_chance = 0 the dealt damage never touches the RNG.
        let mut world = damage_world();
        let a = combatant(&mut world, 0.0, 0.0);
        let d1 = combatant(&mut world, 2.0, 3.0);
        let d2 = combatant(&mut world, 4.0, 3.0);

        let spec = DamageSpec {
            raw: 12.0,
            ..Default::default()
        };
        let first = apply_damage(&mut world, a, d1, spec);
        let second = apply_damage(&mut world, a, d2, spec);
        assert_eq!(first.dealt, second.dealt);
    }

    #[test]
    fn test_knockback_and_hitflash() {
        let mut world = damage_world();
        let a = combatant(&mut world, 0.0, 0.0);
        let d = combatant(&mut world, 2.0, 0.0);

        apply_damage(
            &mut world,
            a,
            d,
            DamageSpec {
                raw: 5.0,
                knockback: 4.0,
                ..Default::default()
            },
        );
        let vel = world.get::<Velocity>(d).unwrap();
        assert!(vel.x > 3.9, "knockback should push defender away: {vel:?}");
        assert!(world.get::<HitFlash>(d).unwrap().remaining > 0.0);
    }

    #[test]
    fn test_death_skips_player_and_defers_npc_kill() {
        let mut world = damage_world();
        let npc = combatant(&mut world, 0.0, 0.0);
        let player = world
            .spawn((Player::default(), Position::new(1.0, 0.0, ZoneId(0)), Health::new(100.0)))
            .id();

        handle_death(&mut world, player, None);
        assert!(alive(&world, player));

        handle_death(&mut world, npc, Some(player));
        assert!(!alive(&world, npc));
        // Deferred: still present until purge
        assert!(world.entities().contains(npc));
    }
}
