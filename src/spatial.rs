//! Per-zone spatial index for efficient, deterministic entity queries.
//!
//! Every entity with a `Position` is registered in exactly one zone set;
//! `zone_set` transitions are atomic (remove + insert in one call). Sets
//! are `BTreeSet<Entity>` so iteration is always in ascending entity-id
//! order - replay with identical RNG seeds stays reproducible.

use crate::components::{Faction, Health, Position};
use crate::zone::ZoneId;
use bevy_ecs::prelude::*;
use std::collections::{BTreeMap, BTreeSet};

/// Zone-keyed entity sets. Stored as a resource.
#[derive(Resource, Debug, Default)]
pub struct ZoneIndex {
    zones: BTreeMap<ZoneId, BTreeSet<Entity>>,
}

impl ZoneIndex {
    pub fn insert(&mut self, entity: Entity, zone: ZoneId) {
        self.zones.entry(zone).or_default().insert(entity);
    }

    pub fn remove(&mut self, entity: Entity, zone: ZoneId) {
        if let Some(set) = self.zones.get_mut(&zone) {
            set.remove(&entity);
        }
    }

    /// Atomic re-registration when an entity changes zone.
    pub fn transfer(&mut self, entity: Entity, from: ZoneId, to: ZoneId) {
        self.remove(entity, from);
        self.insert(entity, to);
    }

    pub fn contains(&self, entity: Entity, zone: ZoneId) -> bool {
        self.zones.get(&zone).is_some_and(|s| s.contains(&entity))
    }

    /// Entities registered in `zone`, ascending id order.
    pub fn entities(&self, zone: ZoneId) -> Vec<Entity> {
        self.zones
            .get(&zone)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn zone_len(&self, zone: ZoneId) -> usize {
        self.zones.get(&zone).map_or(0, |s| s.len())
    }

    pub fn total_count(&self) -> usize {
        self.zones.values().map(|s| s.len()).sum()
    }
}

/// Entities registered in `zone`, ascending id order. O(k) in zone size.
pub fn zone_entities(world: &World, zone: ZoneId) -> Vec<Entity> {
    world
        .get_resource::<ZoneIndex>()
        .map(|idx| idx.entities(zone))
        .unwrap_or_default()
}

/// Entities within the square bounding box of `radius` around `(x, y)`,
/// with their squared distance. Callers gate by `d2` when they need a
/// strict circle. Ascending entity-id order.
pub fn nearby(world: &World, zone: ZoneId, x: f32, y: f32, radius: f32) -> Vec<(Entity, f32)> {
    let mut out = Vec::new();
    for eid in zone_entities(world, zone) {
        let Some(pos) = world.get::<Position>(eid) else {
            continue;
        };
        let dx = pos.x - x;
        let dy = pos.y - y;
        if dx.abs() <= radius && dy.abs() <= radius {
            out.push((eid, dx * dx + dy * dy));
        }
    }
    out
}

/// Same-group living allies of `eid` in its zone (excluding itself),
/// with positions. Used by fire-line extraction and anti-clump checks.
pub fn zone_allies(world: &World, eid: Entity, pos: &Position, group: &str) -> Vec<(Entity, f32, f32)> {
    let mut out = Vec::new();
    for other in zone_entities(world, pos.zone) {
        if other == eid {
            continue;
        }
        let Some(opos) = world.get::<Position>(other) else {
            continue;
        };
        let Some(of) = world.get::<Faction>(other) else {
            continue;
        };
        if of.group != group {
            continue;
        }
        match world.get::<Health>(other) {
            Some(h) if h.is_alive() => out.push((other, opos.x, opos.y)),
            _ => {}
        }
    }
    out
}
