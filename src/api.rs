//! Public API for the simulation.
//!
//! [`SimWorld`] owns the ECS world and provides the interface the
//! front-end scene layer drives: initialization, zone/data loading,
//! fixed-timestep stepping, spawning, player input intents, zone
//! changes, and state snapshots.
//!
//! ## Fixed timestep
//!
//! The simulation uses a fixed timestep internally (default 60 Hz).
//! `step(dt)` accumulates real time and runs fixed updates as needed,
//! so behavior is deterministic regardless of frame rate.

use crate::components::*;
use crate::devlog::DevLog;
use crate::events::{event_drain_system, EventBus};
use crate::items::ItemRegistry;
use crate::nbt::ZoneIoError;
use crate::particles::ParticleManager;
use crate::spatial::ZoneIndex;
use crate::subzone::{on_zone_change, subzone_tick, SubzoneGraph, WorldScheduler};
use crate::systems::{
    auto_eat_system, hunger_system, lod_system, movement_system, projectile_system,
    settlement_food_production, tick_ai, RefillTimers,
};
use crate::tuning::Tuning;
use crate::world::{purge, register_zone, GameClock, Graveyard, SimRng, SimTick, Snapshot};
use crate::zone::{TileGrid, ZoneId, ZoneMaps, ZonePortals};
use bevy_ecs::prelude::*;
use std::path::Path;

/// Simulation construction parameters.
#[derive(Resource, Debug, Clone, Copy)]
pub struct SimConfig {
    /// Fixed timestep in seconds (1/60 = one tick per nominal frame).
    pub fixed_timestep: f32,
    /// Seed for the world-owned PRNG; fixed seed => reproducible run.
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 60.0,
            seed: 0,
        }
    }
}

/// Per-system skip flags for test scenes and tooling.
#[derive(Resource, Debug, Clone, Copy)]
pub struct TickToggles {
    pub lod: bool,
    pub needs: bool,
    pub brains: bool,
}

impl Default for TickToggles {
    fn default() -> Self {
        Self {
            lod: true,
            needs: true,
            brains: true,
        }
    }
}

/// Everything needed to spawn an NPC in one call. Field defaults make
/// an unremarkable hostile melee wanderer; override what matters.
#[derive(Debug, Clone)]
pub struct NpcSpec {
    pub name: String,
    pub zone: ZoneId,
    pub x: f32,
    pub y: f32,
    pub kind: BrainKind,
    pub group: String,
    pub disposition: Disposition,
    pub hp: f32,
    pub damage: f32,
    pub defense: f32,
    pub attack: AttackConfig,
    pub threat: Threat,
    pub speed: f32,
    pub patrol_radius: f32,
    pub facing: Dir,
    pub vision: Option<VisionCone>,
    pub hunger: bool,
}

impl Default for NpcSpec {
    fn default() -> Self {
        Self {
            name: "npc".to_string(),
            zone: ZoneId(0),
            x: 1.0,
            y: 1.0,
            kind: BrainKind::Wander,
            group: "wild".to_string(),
            disposition: Disposition::Hostile,
            hp: 100.0,
            damage: 10.0,
            defense: 0.0,
            attack: AttackConfig::default(),
            threat: Threat::default(),
            speed: 2.0,
            patrol_radius: 6.0,
            facing: Dir::Down,
            vision: None,
            hunger: false,
        }
    }
}

/// The main simulation world container.
pub struct SimWorld {
    world: World,
    tick: u64,
    time_accumulator: f32,
}

impl SimWorld {
    pub fn new() -> Self {
        Self::with_config(SimConfig::default())
    }

    pub fn with_config(config: SimConfig) -> Self {
        let mut world = World::new();
        world.insert_resource(GameClock::default());
        world.insert_resource(SimTick::default());
        world.insert_resource(Graveyard::default());
        world.insert_resource(SimRng::from_seed(config.seed));
        world.insert_resource(EventBus::default());
        world.insert_resource(Tuning::default());
        world.insert_resource(ItemRegistry::with_defaults());
        world.insert_resource(ParticleManager::default());
        world.insert_resource(DevLog::default());
        world.insert_resource(ZoneMaps::default());
        world.insert_resource(ZonePortals::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(SubzoneGraph::default());
        world.insert_resource(WorldScheduler::default());
        world.insert_resource(RefillTimers::default());
        world.insert_resource(TickToggles::default());
        world.insert_resource(config);

        Self {
            world,
            tick: 0,
            time_accumulator: 0.0,
        }
    }

    // ------------------------------------------------------------------
    // Data loading
    // ------------------------------------------------------------------

    /// Load (or hot-reload) tuning values from TOML text.
    pub fn load_tuning(&mut self, content: &str) -> Result<(), toml::de::Error> {
        self.world.resource_mut::<Tuning>().replace(content)
    }

    /// Load portal definitions from `data/portals.toml` text.
    pub fn load_portals(&mut self, content: &str) -> Result<usize, ZoneIoError> {
        // Intern every referenced zone so portals can be followed even
        // before their maps load.
        let count = self
            .world
            .resource_scope(|world, mut portals: Mut<ZonePortals>| {
                let n = portals.load_str(content)?;
                let mut maps = world.resource_mut::<ZoneMaps>();
                for portal in &portals.portals {
                    maps.intern(&portal.side_a.zone);
                    maps.intern(&portal.side_b.zone);
                }
                Ok::<usize, ZoneIoError>(n)
            })?;
        Ok(count)
    }

    /// Register a zone grid under `name`.
    pub fn add_zone(&mut self, name: &str, grid: TileGrid) -> ZoneId {
        self.world.resource_mut::<ZoneMaps>().insert(name, grid)
    }

    /// Load a zone from a `.nbt` file.
    pub fn load_zone_file(&mut self, name: &str, path: &Path) -> Result<ZoneId, ZoneIoError> {
        let grid = crate::nbt::load_zone_file(path)?;
        Ok(self.add_zone(name, grid))
    }

    pub fn zone_id(&self, name: &str) -> Option<ZoneId> {
        self.world.resource::<ZoneMaps>().id(name)
    }

    // ------------------------------------------------------------------
    // Stepping
    // ------------------------------------------------------------------

    /// Step the simulation forward by `dt` real seconds, running fixed
    /// updates as the accumulator fills.
    pub fn step(&mut self, dt: f32) {
        let fixed_dt = self.world.resource::<SimConfig>().fixed_timestep;
        self.time_accumulator += dt;
        while self.time_accumulator >= fixed_dt {
            self.tick_systems(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run all core gameplay systems for one frame, in the fixed order:
    /// clock -> LOD -> needs -> AI -> physics -> projectiles -> events
    /// -> particles -> off-screen scheduler -> purge.
    pub fn tick_systems(&mut self, dt: f32) {
        let world = &mut self.world;
        world.resource_mut::<GameClock>().time += dt;
        world.resource_mut::<SimTick>().increment();

        let toggles = *world.resource::<TickToggles>();
        if toggles.lod {
            lod_system(world, dt);
        }
        if toggles.needs {
            hunger_system(world, dt);
            auto_eat_system(world, dt);
            settlement_food_production(world, dt);
        }
        if toggles.brains {
            tick_ai(world, dt);
        }
        movement_system(world, dt);
        projectile_system(world, dt);
        event_drain_system(world);
        world.resource_scope(|_, mut pm: Mut<ParticleManager>| pm.update(dt));

        let minutes = world.resource::<GameClock>().minutes();
        subzone_tick(world, minutes);

        purge(world);
        self.tick += 1;
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn current_time(&self) -> f32 {
        self.world.resource::<GameClock>().time
    }

    // ------------------------------------------------------------------
    // Spawning
    // ------------------------------------------------------------------

    /// Spawn the player at a wall-safe spot near `(x, y)`.
    pub fn spawn_player(&mut self, zone: ZoneId, x: f32, y: f32) -> Entity {
        let (sx, sy) = self.safe_spawn(zone, x, y);
        let eid = self
            .world
            .spawn((
                Player::default(),
                Identity::npc("player"),
                Position::new(sx, sy, zone),
                Velocity::default(),
                Facing::default(),
                Collider::default(),
                Hurtbox::default(),
                Health::new(100.0),
                CombatStats {
                    damage: 10.0,
                    defense: 0.0,
                },
                Inventory::default(),
                Equipment::default(),
            ))
            .id();
        register_zone(&mut self.world, eid, zone);
        eid
    }

    /// Spawn a full NPC from a spec.
    pub fn spawn_npc(&mut self, spec: NpcSpec) -> Entity {
        let (sx, sy) = self.safe_spawn(spec.zone, spec.x, spec.y);
        let mut faction = Faction::new(&spec.group, spec.disposition);
        faction.home_disposition = spec.disposition;
        let eid = self
            .world
            .spawn((
                NpcBundle {
                    identity: Identity::npc(&spec.name),
                    position: Position::new(sx, sy, spec.zone),
                    velocity: Velocity::default(),
                    facing: Facing {
                        direction: spec.facing,
                    },
                    collider: Collider::default(),
                    hurtbox: Hurtbox::default(),
                    health: Health::new(spec.hp),
                    stats: CombatStats {
                        damage: spec.damage,
                        defense: spec.defense,
                    },
                    faction,
                    lod: Lod::default(),
                },
                Brain::new(spec.kind),
                HomeRange {
                    origin_x: sx,
                    origin_y: sy,
                    radius: spec.patrol_radius,
                    speed: spec.speed,
                },
                spec.threat,
                spec.attack,
                Inventory::default(),
            ))
            .id();
        if let Some(vision) = spec.vision {
            self.world.entity_mut(eid).insert(vision);
        }
        if spec.hunger {
            self.world
                .entity_mut(eid)
                .insert((Hunger::default(), Needs::default()));
        }
        register_zone(&mut self.world, eid, spec.zone);
        eid
    }

    /// Spawn a storage container with starting stock.
    pub fn spawn_container(
        &mut self,
        zone: ZoneId,
        x: f32,
        y: f32,
        items: &[(&str, u32)],
    ) -> Entity {
        let mut inv = Inventory::default();
        for (item, count) in items {
            inv.add(item, *count);
        }
        let eid = self
            .world
            .spawn((
                Identity::container("container"),
                Position::new(x, y, zone),
                inv,
            ))
            .id();
        register_zone(&mut self.world, eid, zone);
        eid
    }

    fn safe_spawn(&self, zone: ZoneId, x: f32, y: f32) -> (f32, f32) {
        self.world
            .resource::<ZoneMaps>()
            .grid(zone)
            .map_or((x, y), |g| g.find_safe_spawn(y, x))
    }

    // ------------------------------------------------------------------
    // Player intents & zone travel
    // ------------------------------------------------------------------

    /// Set the player's movement intent (normalized direction from the
    /// input collector). Also updates facing.
    pub fn set_player_move(&mut self, dx: f32, dy: f32) {
        let Some((eid, _)) = crate::systems::find_player(&mut self.world) else {
            return;
        };
        let speed = self.world.get::<Player>(eid).map_or(5.0, |p| p.speed);
        if let Some(mut vel) = self.world.get_mut::<Velocity>(eid) {
            vel.x = dx * speed;
            vel.y = dy * speed;
        }
        if dx.abs() > 0.01 || dy.abs() > 0.01 {
            if let Some(mut facing) = self.world.get_mut::<Facing>(eid) {
                facing.direction = Dir::from_vector(dx, dy);
            }
        }
    }

    /// Move the player to another zone (portal traversal): relocates the
    /// player, promotes the destination zone's off-screen residents, and
    /// demotes the NPCs left behind.
    pub fn change_zone(&mut self, zone_name: &str, spawn_row: f32, spawn_col: f32) -> bool {
        let Some(zone) = self.zone_id(zone_name) else {
            return false;
        };
        let Some((player, _)) = crate::systems::find_player(&mut self.world) else {
            return false;
        };
        let (x, y) = self.safe_spawn(zone, spawn_col, spawn_row);
        crate::world::zone_set(&mut self.world, player, zone);
        if let Some(mut pos) = self.world.get_mut::<Position>(player) {
            pos.x = x;
            pos.y = y;
        }
        on_zone_change(&mut self.world, zone);
        true
    }

    // ------------------------------------------------------------------
    // State access
    // ------------------------------------------------------------------

    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world)
    }

    pub fn snapshot_json(&mut self) -> String {
        self.snapshot()
            .to_json()
            .unwrap_or_else(|_| "{}".to_string())
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}
