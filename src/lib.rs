//! Wasteland - Survival RPG Simulation Core
//!
//! A deterministic, fixed-timestep ECS simulation: zone-indexed spatial
//! queries, a throttled combat FSM with fire-line-aware tactical
//! positioning, projectile physics, needs, faction alerts, and an
//! event-driven off-screen world scheduler. Uses `bevy_ecs` for the
//! entity-component-system store. No rendering, no I/O loop - the
//! embedding front-end drives [`SimWorld::step`] and draws snapshots.

pub mod api;
pub mod components;
pub mod devlog;
pub mod events;
pub mod items;
pub mod nbt;
pub mod particles;
pub mod pathfind;
pub mod spatial;
pub mod subzone;
pub mod systems;
pub mod tuning;
pub mod world;
pub mod zone;

pub use api::{NpcSpec, SimConfig, SimWorld, TickToggles};
pub use components::*;
pub use devlog::{DevLog, DevLogEntry};
pub use events::{EventBus, GameEvent};
pub use items::{ItemDef, ItemRegistry};
pub use particles::{BurstParams, Particle, ParticleManager};
pub use spatial::ZoneIndex;
pub use subzone::{stat_check_combat, StatBlock, SubzoneGraph, SubzoneId, WorldScheduler};
pub use systems::*;
pub use tuning::Tuning;
pub use world::{
    alive, debug_dump, display_name, kill, purge, register_zone, zone_set, GameClock, SimRng,
    SimTick, Snapshot,
};
pub use zone::{Portal, TileGrid, ZoneId, ZoneMaps, ZonePortals};
