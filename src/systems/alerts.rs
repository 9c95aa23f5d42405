//! Sound alerts, intel sharing, and faction flipping.
//!
//! Three alert mechanisms:
//!
//! 1. Faction alert - when an entity is attacked, same-group allies
//!    within its `alert_radius` become hostile toward the attacker.
//! 2. Combat sound - gunshots / melee impacts alert NPCs within hearing
//!    radius; armed NPCs investigate, civilians flee.
//! 3. Intel sharing - active combatants call out target locations to
//!    idle same-group allies.
//!
//! Faction mutations all go through `make_hostile` / `make_flee` so
//! logging and combat kick-start stay consistent.

use crate::components::*;
use crate::devlog::dev_log;
use crate::spatial::nearby;
use crate::tuning::tun;
use crate::world::{display_name, GameClock};
use crate::zone::ZoneId;
use bevy_ecs::prelude::*;

// ============================================================================
// FACTION OPS
// ============================================================================

/// Flip an entity to hostile and kick-start its combat brain if armed.
/// Returns true if the disposition actually changed.
pub fn make_hostile(
    world: &mut World,
    eid: Entity,
    reason: &str,
    threat_pos: Option<(f32, f32)>,
    game_time: f32,
) -> bool {
    let Some(mut faction) = world.get_mut::<Faction>(eid) else {
        return false;
    };
    let changed = faction.disposition != Disposition::Hostile;
    faction.disposition = Disposition::Hostile;

    if changed {
        let name = display_name(world, eid);
        tracing::info!(target: "faction", "{name} is now hostile ({reason})");
        dev_log(world, eid, "faction", format!("hostile ({reason})"), game_time);
    }

    if world.get::<AttackConfig>(eid).is_some() {
        activate_combat(world, eid, threat_pos, game_time);
    }
    changed
}

/// Unarmed NPC panic: set the flee timer and remember the threat spot.
pub fn make_flee(
    world: &mut World,
    eid: Entity,
    game_time: f32,
    duration: Option<f32>,
    from: Option<(f32, f32)>,
) -> bool {
    let duration =
        duration.unwrap_or_else(|| tun(world, "combat.hearing", "civilian_flee_duration", 10.0));
    let Some(mut brain) = world.get_mut::<Brain>(eid) else {
        return false;
    };
    brain.active = true;
    brain.crime_flee_until = game_time + duration;
    brain.crime_flee_from = from;

    let name = display_name(world, eid);
    tracing::info!(target: "faction", "{name} panics, fleeing for {duration:.0}s");
    true
}

/// Flip to hostile if armed, flee if unarmed.
pub fn activate_hostile_or_flee(
    world: &mut World,
    eid: Entity,
    threat_pos: Option<(f32, f32)>,
    game_time: f32,
    reason: &str,
) {
    if world.get::<AttackConfig>(eid).is_some() {
        make_hostile(world, eid, reason, threat_pos, game_time);
    } else {
        make_flee(world, eid, game_time, None, threat_pos);
    }
}

/// Kick a brain into chase toward the threat position and make its next
/// sensor tick due immediately.
fn activate_combat(
    world: &mut World,
    eid: Entity,
    threat_pos: Option<(f32, f32)>,
    game_time: f32,
) {
    if let Some(mut brain) = world.get_mut::<Brain>(eid) {
        brain.active = true;
        brain.combat.mode = CombatMode::Chase;
        if threat_pos.is_some() {
            brain.combat.target_pos = threat_pos;
        }
    }
    if let Some(mut threat) = world.get_mut::<Threat>(eid) {
        threat.last_sensor_time = game_time - threat.sensor_interval;
    }
}

// ============================================================================
// FACTION ALERT PROPAGATION
// ============================================================================

/// When an entity is attacked, flip it hostile and alert same-group
/// allies inside its alert radius. Same-group attackers are ignored
/// (friendly scuffles don't mobilize the village).
pub fn alert_nearby_faction(world: &mut World, defender: Entity, attacker: Entity) {
    let Some(faction) = world.get::<Faction>(defender) else {
        return;
    };
    let group = faction.group.clone();
    let alert_radius = faction.alert_radius;
    let Some(pos) = world.get::<Position>(defender).copied() else {
        return;
    };

    if let Some(att_fac) = world.get::<Faction>(attacker) {
        if att_fac.group == group {
            return;
        }
    }

    let game_time = world.resource::<GameClock>().time;
    let threat_xy = world
        .get::<Position>(attacker)
        .map(|p| (p.x, p.y));

    make_hostile(world, defender, "attacked", threat_xy, game_time);

    let radius_sq = alert_radius * alert_radius;
    let candidates = nearby(world, pos.zone, pos.x, pos.y, alert_radius);
    for (ally, d2) in candidates {
        if ally == defender || ally == attacker || d2 > radius_sq {
            continue;
        }
        if world.get::<Faction>(ally).is_none_or(|f| f.group != group) {
            continue;
        }
        // Allies already fighting keep their current target.
        if world
            .get::<Brain>(ally)
            .is_some_and(|b| b.combat.mode.is_fighting())
        {
            continue;
        }
        activate_hostile_or_flee(world, ally, threat_xy, game_time, "ally attacked");
    }
}

/// `FactionAlert` event handler: mobilize same-group entities near the
/// alert point against the threat.
pub fn on_faction_alert(
    world: &mut World,
    group: &str,
    x: f32,
    y: f32,
    zone: ZoneId,
    threat: Option<Entity>,
) {
    let game_time = world.resource::<GameClock>().time;
    let threat_xy = threat
        .and_then(|t| world.get::<Position>(t).map(|p| (p.x, p.y)))
        .or(Some((x, y)));

    // Scan wide enough for the largest plausible alert radius; each
    // candidate is then gated by its own.
    let scan = 64.0;
    for (ally, d2) in nearby(world, zone, x, y, scan) {
        if Some(ally) == threat {
            continue;
        }
        let Some(f) = world.get::<Faction>(ally) else {
            continue;
        };
        if f.group != group || d2 > f.alert_radius * f.alert_radius {
            continue;
        }
        if world
            .get::<Brain>(ally)
            .is_some_and(|b| b.combat.mode.is_fighting())
        {
            continue;
        }
        activate_hostile_or_flee(world, ally, threat_xy, game_time, "faction alert");
    }
}

// ============================================================================
// HEARING
// ============================================================================

fn sound_default_radius(sound_type: &str) -> f32 {
    match sound_type {
        "gunshot" => 1600.0,
        "melee" => 40.0,
        _ => 150.0,
    }
}

/// Alert NPCs within hearing radius of a combat sound. Armed listeners
/// enter `searching` toward the source; unarmed listeners flee.
pub fn emit_combat_sound(world: &mut World, source: Entity, source_pos: &Position, sound_type: &str) {
    let radius = tun(
        world,
        "combat.hearing",
        &format!("{sound_type}_radius"),
        sound_default_radius(sound_type),
    );
    let source_group = world.get::<Faction>(source).map(|f| f.group.clone());
    let game_time = world.resource::<GameClock>().time;
    let search_dur = tun(world, "combat.hearing", "search_duration", 5.0);

    let radius_sq = radius * radius;
    for (eid, d2) in nearby(world, source_pos.zone, source_pos.x, source_pos.y, radius) {
        if eid == source || d2 > radius_sq {
            continue;
        }
        if let (Some(sg), Some(f)) = (&source_group, world.get::<Faction>(eid)) {
            if &f.group == sg {
                continue;
            }
        }
        let Some(brain) = world.get::<Brain>(eid) else {
            continue;
        };
        if brain.combat.mode.is_fighting() {
            continue;
        }

        if world.get::<AttackConfig>(eid).is_some() {
            let name = display_name(world, eid);
            if let Some(mut brain) = world.get_mut::<Brain>(eid) {
                brain.active = true;
                if matches!(brain.combat.mode, CombatMode::Idle | CombatMode::Searching) {
                    brain.combat.mode = CombatMode::Searching;
                    brain.combat.search_source = Some((source_pos.x, source_pos.y));
                    brain.combat.search_until = game_time + search_dur;
                    brain.combat.search_start = game_time;
                } else {
                    continue;
                }
            }
            if let Some(mut threat) = world.get_mut::<Threat>(eid) {
                threat.last_sensor_time = game_time - threat.sensor_interval;
            }
            tracing::info!(target: "hearing", "{name} heard {sound_type}, searching");
            dev_log(world, eid, "hearing", format!("heard {sound_type}"), game_time);
        } else {
            make_flee(world, eid, game_time, None, Some((source_pos.x, source_pos.y)));
        }
    }
}

// ============================================================================
// INTEL SHARING
// ============================================================================

/// Active combatant shares its target location with idle same-group
/// allies in callout range; they enter `searching` toward the target.
pub fn share_combat_intel(
    world: &mut World,
    eid: Entity,
    pos: &Position,
    target_xy: (f32, f32),
    game_time: f32,
) {
    let Some(group) = world.get::<Faction>(eid).map(|f| f.group.clone()) else {
        return;
    };
    let callout_radius = tun(world, "combat.intel", "callout_radius", 12.0);
    let search_dur = tun(world, "combat.hearing", "search_duration", 5.0);

    let radius_sq = callout_radius * callout_radius;
    for (ally, d2) in nearby(world, pos.zone, pos.x, pos.y, callout_radius) {
        if ally == eid || d2 > radius_sq {
            continue;
        }
        if world.get::<Faction>(ally).is_none_or(|f| f.group != group) {
            continue;
        }
        if world.get::<AttackConfig>(ally).is_none() {
            continue;
        }
        let Some(brain) = world.get::<Brain>(ally) else {
            continue;
        };
        if !matches!(brain.combat.mode, CombatMode::Idle | CombatMode::Return) {
            continue;
        }

        if let Some(mut brain) = world.get_mut::<Brain>(ally) {
            brain.active = true;
            brain.combat.mode = CombatMode::Searching;
            brain.combat.search_source = Some(target_xy);
            brain.combat.search_until = game_time + search_dur;
            brain.combat.search_start = game_time;
        }
        if let Some(mut threat) = world.get_mut::<Threat>(ally) {
            threat.last_sensor_time = game_time - threat.sensor_interval;
        }
        let name = display_name(world, ally);
        tracing::debug!(target: "intel", "{name} alerted by ally callout");
        dev_log(world, ally, "intel", "ally callout, searching", game_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spatial::ZoneIndex;
    use crate::tuning::Tuning;
    use crate::world::register_zone;
    use crate::zone::{TileGrid, ZoneMaps, TILE_GRASS};

    fn alert_world() -> (World, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let z = maps.insert("arena", TileGrid::new(120, 80, TILE_GRASS));
        world.insert_resource(maps);
        world.insert_resource(GameClock::default());
        world.insert_resource(Tuning::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(crate::devlog::DevLog::default());
        (world, z)
    }

    fn guard(world: &mut World, z: ZoneId, x: f32, y: f32, group: &str) -> Entity {
        let e = world
            .spawn((
                Position::new(x, y, z),
                Velocity::default(),
                Health::new(100.0),
                Faction::new(group, Disposition::Neutral),
                Brain::new(BrainKind::Guard),
                Threat::default(),
                AttackConfig::ranged(8.0, 1.0),
            ))
            .id();
        register_zone(world, e, z);
        e
    }

    fn civilian(world: &mut World, z: ZoneId, x: f32, y: f32, group: &str) -> Entity {
        let e = world
            .spawn((
                Position::new(x, y, z),
                Velocity::default(),
                Health::new(60.0),
                Faction::new(group, Disposition::Neutral),
                Brain::new(BrainKind::Wander),
            ))
            .id();
        register_zone(world, e, z);
        e
    }

    #[test]
    fn test_gunshot_sends_armed_listeners_searching() {
        let (mut world, z) = alert_world();
        let raider = guard(&mut world, z, 5.0, 30.0, "raiders");
        let g1 = guard(&mut world, z, 30.0, 30.0, "settlers");
        let g2 = guard(&mut world, z, 55.0, 30.0, "settlers");
        let civ = civilian(&mut world, z, 40.0, 30.0, "settlers");

        let pos = *world.get::<Position>(raider).unwrap();
        emit_combat_sound(&mut world, raider, &pos, "gunshot");

        for g in [g1, g2] {
            let brain = world.get::<Brain>(g).unwrap();
            assert_eq!(brain.combat.mode, CombatMode::Searching);
            assert_eq!(brain.combat.search_source, Some((5.0, 30.0)));
        }
        // Civilian fled instead
        let b = world.get::<Brain>(civ).unwrap();
        assert!(b.crime_flee_until > 0.0);
        assert_eq!(b.combat.mode, CombatMode::Idle);
    }

    #[test]
    fn test_same_group_does_not_hear_own_shots() {
        let (mut world, z) = alert_world();
        let shooter = guard(&mut world, z, 5.0, 5.0, "raiders");
        let buddy = guard(&mut world, z, 8.0, 5.0, "raiders");
        let pos = *world.get::<Position>(shooter).unwrap();
        emit_combat_sound(&mut world, shooter, &pos, "gunshot");
        assert_eq!(
            world.get::<Brain>(buddy).unwrap().combat.mode,
            CombatMode::Idle
        );
    }

    #[test]
    fn test_alert_nearby_faction_mobilizes_allies() {
        let (mut world, z) = alert_world();
        let attacker = guard(&mut world, z, 20.0, 20.0, "raiders");
        let victim = guard(&mut world, z, 22.0, 20.0, "settlers");
        let near_ally = guard(&mut world, z, 25.0, 20.0, "settlers");
        let civ = civilian(&mut world, z, 24.0, 22.0, "settlers");
        let far_ally = guard(&mut world, z, 60.0, 20.0, "settlers");

        alert_nearby_faction(&mut world, victim, attacker);

        for e in [victim, near_ally] {
            let f = world.get::<Faction>(e).unwrap();
            assert_eq!(f.disposition, Disposition::Hostile);
            assert_eq!(
                world.get::<Brain>(e).unwrap().combat.mode,
                CombatMode::Chase
            );
        }
        // Unarmed civilian flees rather than turning hostile
        assert!(world.get::<Brain>(civ).unwrap().crime_flee_until > 0.0);
        // Outside the 12-tile alert radius: untouched
        assert_eq!(
            world.get::<Faction>(far_ally).unwrap().disposition,
            Disposition::Neutral
        );
    }

    #[test]
    fn test_intel_share_pushes_idle_allies_to_search() {
        let (mut world, z) = alert_world();
        let fighter = guard(&mut world, z, 10.0, 10.0, "settlers");
        let idle_ally = guard(&mut world, z, 14.0, 10.0, "settlers");
        // An ally already fighting keeps its state
        let busy_ally = guard(&mut world, z, 12.0, 12.0, "settlers");
        world.get_mut::<Brain>(busy_ally).unwrap().combat.mode = CombatMode::Attack;

        let pos = *world.get::<Position>(fighter).unwrap();
        share_combat_intel(&mut world, fighter, &pos, (30.0, 10.0), 1.0);

        let b = world.get::<Brain>(idle_ally).unwrap();
        assert_eq!(b.combat.mode, CombatMode::Searching);
        assert_eq!(b.combat.search_source, Some((30.0, 10.0)));
        assert_eq!(
            world.get::<Brain>(busy_ally).unwrap().combat.mode,
            CombatMode::Attack
        );
    }
}
