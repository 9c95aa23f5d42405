//! World-level resources and helpers: the game clock, the seeded PRNG,
//! the deferred-kill queue, zone registration, and the serializable
//! [`Snapshot`] state view consumed by the save layer and by tests.

use crate::components::*;
use crate::spatial::ZoneIndex;
use crate::zone::ZoneMaps;
use bevy_ecs::prelude::*;
use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

// ============================================================================
// CLOCK & TICK
// ============================================================================

/// Monotonically increasing game time in seconds.
/// One real second is one game minute at 1x speed.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct GameClock {
    pub time: f32,
}

impl GameClock {
    /// Game minutes elapsed, for the off-screen scheduler.
    pub fn minutes(&self) -> f32 {
        self.time
    }
}

/// Global simulation tick counter.
#[derive(Resource, Debug, Clone, Copy, Default)]
pub struct SimTick(pub u64);

impl SimTick {
    pub fn increment(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

// ============================================================================
// SEEDED RNG
// ============================================================================

/// World-owned PRNG. Every random decision in the core draws from this,
/// so a fixed seed plus a fixed initial world replays identically.
#[derive(Resource, Debug, Clone)]
pub struct SimRng(pub ChaCha8Rng);

impl SimRng {
    pub fn from_seed(seed: u64) -> Self {
        Self(ChaCha8Rng::seed_from_u64(seed))
    }
}

/// Uniform sample in `[lo, hi)`. Degenerate ranges return `lo`.
pub fn rng_range(world: &mut World, lo: f32, hi: f32) -> f32 {
    if lo >= hi {
        return lo;
    }
    world.resource_mut::<SimRng>().0.gen_range(lo..hi)
}

/// Bernoulli draw with probability `p`.
pub fn rng_chance(world: &mut World, p: f32) -> bool {
    world.resource_mut::<SimRng>().0.gen::<f32>() < p
}

/// Random +1 / -1.
pub fn rng_sign(world: &mut World) -> i8 {
    if world.resource_mut::<SimRng>().0.gen::<bool>() {
        1
    } else {
        -1
    }
}

// ============================================================================
// DEFERRED KILL
// ============================================================================

/// Entities marked for removal this frame; reaped by [`purge`] at frame
/// end so active iterations never observe a dangling entity.
#[derive(Resource, Debug, Default)]
pub struct Graveyard {
    pending: Vec<Entity>,
}

impl Graveyard {
    pub fn contains(&self, entity: Entity) -> bool {
        self.pending.contains(&entity)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Mark `entity` for removal at frame end.
pub fn kill(world: &mut World, entity: Entity) {
    let mut graveyard = world.resource_mut::<Graveyard>();
    if !graveyard.pending.contains(&entity) {
        graveyard.pending.push(entity);
    }
}

/// True while `entity` exists and is not pending removal.
pub fn alive(world: &World, entity: Entity) -> bool {
    if !world.entities().contains(entity) {
        return false;
    }
    world
        .get_resource::<Graveyard>()
        .is_none_or(|g| !g.contains(entity))
}

/// Reap every entity marked by [`kill`]: unregister from the zone index,
/// then despawn. Runs at the end of each tick.
pub fn purge(world: &mut World) {
    let pending = std::mem::take(&mut world.resource_mut::<Graveyard>().pending);
    for entity in pending {
        if !world.entities().contains(entity) {
            continue;
        }
        if let Some(pos) = world.get::<Position>(entity) {
            let zone = pos.zone;
            if let Some(mut idx) = world.get_resource_mut::<ZoneIndex>() {
                idx.remove(entity, zone);
            }
        }
        world.despawn(entity);
    }
}

// ============================================================================
// ZONE REGISTRATION
// ============================================================================

/// Register a freshly positioned entity in the zone index.
pub fn register_zone(world: &mut World, entity: Entity, zone: crate::zone::ZoneId) {
    if let Some(mut idx) = world.get_resource_mut::<ZoneIndex>() {
        idx.insert(entity, zone);
    }
}

/// Move an entity to a new zone: updates `Position.zone` and the index
/// in one step so the two can never disagree.
pub fn zone_set(world: &mut World, entity: Entity, new_zone: crate::zone::ZoneId) {
    let Some(old_zone) = world.get::<Position>(entity).map(|p| p.zone) else {
        return;
    };
    if old_zone == new_zone {
        return;
    }
    if let Some(mut pos) = world.get_mut::<Position>(entity) {
        pos.zone = new_zone;
    }
    if let Some(mut idx) = world.get_resource_mut::<ZoneIndex>() {
        idx.transfer(entity, old_zone, new_zone);
    }
}

/// Diagnostic dump: entity bits -> component type names, sorted by id.
pub fn debug_dump(world: &World) -> std::collections::BTreeMap<u64, Vec<String>> {
    let mut out = std::collections::BTreeMap::new();
    for entity in world.iter_entities() {
        let names: Vec<String> = world
            .inspect_entity(entity.id())
            .map(|info| info.name().to_string())
            .collect();
        out.insert(entity.id().to_bits(), names);
    }
    out
}

/// Display name for logging: Identity name, or `e<index>`.
pub fn display_name(world: &World, entity: Entity) -> String {
    match world.get::<Identity>(entity) {
        Some(ident) if !ident.name.is_empty() => ident.name.clone(),
        _ => format!("e{}", entity.index()),
    }
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Serializable view of one entity's externally relevant state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub id: u64,
    pub name: String,
    pub zone: String,
    pub x: f32,
    pub y: f32,
    pub health: f32,
    pub health_max: f32,
    pub faction: String,
    pub disposition: String,
    pub mode: String,
    pub lod: String,
}

/// Complete simulation state snapshot for the save layer / tooling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub tick: u64,
    pub time: f32,
    pub entities: Vec<EntitySnapshot>,
}

impl Snapshot {
    pub fn from_world(world: &mut World) -> Self {
        let tick = world.resource::<SimTick>().0;
        let time = world.resource::<GameClock>().time;

        let mut rows: Vec<(Entity, Position)> = world
            .query::<(Entity, &Position)>()
            .iter(world)
            .map(|(e, p)| (e, *p))
            .collect();
        rows.sort_by_key(|(e, _)| *e);

        let mut entities = Vec::with_capacity(rows.len());
        for (eid, pos) in rows {
            let (health, health_max) = world
                .get::<Health>(eid)
                .map_or((0.0, 0.0), |h| (h.current, h.maximum));
            let (faction, disposition) = world.get::<Faction>(eid).map_or_else(
                || (String::new(), String::new()),
                |f| (f.group.clone(), format!("{:?}", f.disposition)),
            );
            let mode = world
                .get::<Brain>(eid)
                .map_or("", |b| b.combat.mode.as_str())
                .to_string();
            let lod = world
                .get::<Lod>(eid)
                .map_or(String::new(), |l| format!("{:?}", l.level));
            let zone = world
                .get_resource::<ZoneMaps>()
                .map_or(String::new(), |m| m.name(pos.zone).to_string());
            entities.push(EntitySnapshot {
                id: eid.to_bits(),
                name: display_name(world, eid),
                zone,
                x: pos.x,
                y: pos.y,
                health,
                health_max,
                faction,
                disposition,
                mode,
                lod,
            });
        }

        Self {
            tick,
            time,
            entities,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::ZoneId;

    fn test_world() -> World {
        let mut world = World::new();
        world.insert_resource(GameClock::default());
        world.insert_resource(SimTick::default());
        world.insert_resource(Graveyard::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(ZoneMaps::default());
        world.insert_resource(SimRng::from_seed(7));
        world
    }

    #[test]
    fn test_deferred_kill_and_purge() {
        let mut world = test_world();
        let z = ZoneId(0);
        let e = world.spawn(Position::new(1.0, 1.0, z)).id();
        register_zone(&mut world, e, z);

        kill(&mut world, e);
        // Still present until purge, but no longer "alive"
        assert!(world.entities().contains(e));
        assert!(!alive(&world, e));
        assert_eq!(world.resource::<Graveyard>().pending_count(), 1);

        purge(&mut world);
        assert!(!world.entities().contains(e));
        assert_eq!(world.resource::<ZoneIndex>().zone_len(z), 0);
    }

    #[test]
    fn test_zone_set_keeps_index_consistent() {
        let mut world = test_world();
        let (z0, z1) = (ZoneId(0), ZoneId(1));
        let e = world.spawn(Position::new(1.0, 1.0, z0)).id();
        register_zone(&mut world, e, z0);

        zone_set(&mut world, e, z1);
        assert_eq!(world.get::<Position>(e).unwrap().zone, z1);
        let idx = world.resource::<ZoneIndex>();
        assert!(idx.contains(e, z1));
        assert!(!idx.contains(e, z0));
    }

    #[test]
    fn test_debug_dump_lists_components() {
        let mut world = test_world();
        let e = world
            .spawn((Position::new(0.0, 0.0, ZoneId(0)), Health::new(10.0)))
            .id();
        let dump = debug_dump(&world);
        let names = dump.get(&e.to_bits()).unwrap();
        assert!(names.iter().any(|n| n.contains("Position")));
        assert!(names.iter().any(|n| n.contains("Health")));
    }

    #[test]
    fn test_seeded_rng_reproducible() {
        let mut a = SimRng::from_seed(42);
        let mut b = SimRng::from_seed(42);
        for _ in 0..16 {
            assert_eq!(a.0.gen::<u32>(), b.0.gen::<u32>());
        }
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let mut world = test_world();
        world.resource_mut::<ZoneMaps>().intern("arena");
        let z = world.resource::<ZoneMaps>().id("arena").unwrap();
        world.spawn((
            Identity::npc("raider"),
            Position::new(3.0, 4.0, z),
            Health::new(80.0),
            Faction::new("raiders", Disposition::Hostile),
        ));

        let snap = Snapshot::from_world(&mut world);
        assert_eq!(snap.entities.len(), 1);
        let json = snap.to_json().unwrap();
        let restored = Snapshot::from_json(&json).unwrap();
        assert_eq!(restored.entities[0].name, "raider");
        assert_eq!(restored.entities[0].zone, "arena");
        assert_eq!(restored.entities[0].health, 80.0);
    }
}
