//! ECS components for the Wasteland simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use crate::pathfind::PathCache;
use crate::systems::fireline::FireLine;
use crate::zone::ZoneId;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 2D position in tile units, plus the zone the entity lives in.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub zone: ZoneId,
}

impl Position {
    pub fn new(x: f32, y: f32, zone: ZoneId) -> Self {
        Self { x, y, zone }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Center of the canonical 0.8x0.8 hitbox.
    pub fn center(&self) -> (f32, f32) {
        (self.x + 0.4, self.y + 0.4)
    }
}

/// 2D velocity in tiles/sec.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
}

impl Velocity {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn zero(&mut self) {
        self.x = 0.0;
        self.y = 0.0;
    }
}

/// Cardinal facing direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dir {
    Right,
    #[default]
    Down,
    Left,
    Up,
}

impl Dir {
    /// Radians: right = 0, down = pi/2, left = pi, up = -pi/2.
    pub fn to_angle(self) -> f32 {
        match self {
            Dir::Right => 0.0,
            Dir::Down => std::f32::consts::FRAC_PI_2,
            Dir::Left => std::f32::consts::PI,
            Dir::Up => -std::f32::consts::FRAC_PI_2,
        }
    }

    /// Dominant-axis facing from a movement vector.
    pub fn from_vector(dx: f32, dy: f32) -> Self {
        if dx.abs() >= dy.abs() {
            if dx > 0.0 {
                Dir::Right
            } else {
                Dir::Left
            }
        } else if dy > 0.0 {
            Dir::Down
        } else {
            Dir::Up
        }
    }
}

/// Facing wrapper component.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Facing {
    pub direction: Dir,
}

/// Entity-vs-entity collision body (soft separation only).
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Collider {
    pub width: f32,
    pub height: f32,
}

impl Default for Collider {
    fn default() -> Self {
        Self {
            width: 0.8,
            height: 0.8,
        }
    }
}

/// Damage-receiving box, offset from Position.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hurtbox {
    pub ox: f32,
    pub oy: f32,
    pub w: f32,
    pub h: f32,
}

impl Default for Hurtbox {
    fn default() -> Self {
        Self {
            ox: 0.0,
            oy: 0.0,
            w: 0.8,
            h: 0.8,
        }
    }
}

// ============================================================================
// IDENTITY & LIFE
// ============================================================================

/// Marker + movement speed for the player entity.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Player {
    pub speed: f32,
}

impl Default for Player {
    fn default() -> Self {
        Self { speed: 5.0 }
    }
}

/// Display name and coarse kind tag ("npc", "container", "item").
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub kind: String,
}

impl Identity {
    pub fn npc(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "npc".to_string(),
        }
    }

    pub fn container(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: "container".to_string(),
        }
    }
}

/// Hit points.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Health {
    pub current: f32,
    pub maximum: f32,
}

impl Health {
    pub fn new(maximum: f32) -> Self {
        Self {
            current: maximum,
            maximum,
        }
    }

    pub fn fraction(&self) -> f32 {
        if self.maximum <= 0.0 {
            0.0
        } else {
            (self.current / self.maximum).clamp(0.0, 1.0)
        }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0.0
    }

    pub fn heal(&mut self, amount: f32) {
        self.current = (self.current + amount).min(self.maximum);
    }
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100.0)
    }
}

/// Brief post-hit stun visual; knockback friction applies while it runs.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct HitFlash {
    pub remaining: f32,
}

// ============================================================================
// FACTIONS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Disposition {
    Friendly,
    #[default]
    Neutral,
    Hostile,
}

/// Faction membership and current stance.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct Faction {
    pub group: String,
    pub disposition: Disposition,
    /// Stance to reset to when combat ends and the entity returns home.
    pub home_disposition: Disposition,
    /// How far an attack on this entity alerts same-group allies.
    pub alert_radius: f32,
}

impl Faction {
    pub fn new(group: &str, disposition: Disposition) -> Self {
        Self {
            group: group.to_string(),
            disposition,
            home_disposition: disposition,
            alert_radius: 12.0,
        }
    }
}

impl Default for Faction {
    fn default() -> Self {
        Self::new("wild", Disposition::Hostile)
    }
}

// ============================================================================
// COMBAT COMPONENTS
// ============================================================================

/// Flat damage dealt and absorbed per hit.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CombatStats {
    pub damage: f32,
    pub defense: f32,
}

impl Default for CombatStats {
    fn default() -> Self {
        Self {
            damage: 10.0,
            defense: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttackType {
    #[default]
    Melee,
    Ranged,
}

/// How an entity fights.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttackConfig {
    pub attack_type: AttackType,
    /// Melee reach or ranged standoff distance (tiles).
    pub range: f32,
    pub cooldown: f32,
    /// Absolute GameClock time of the last attack.
    pub last_attack_time: f32,
    pub accuracy: f32,
    pub proj_speed: f32,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            attack_type: AttackType::Melee,
            range: 1.2,
            cooldown: 0.5,
            last_attack_time: 0.0,
            accuracy: 0.85,
            proj_speed: 14.0,
        }
    }
}

impl AttackConfig {
    pub fn ranged(range: f32, cooldown: f32) -> Self {
        Self {
            attack_type: AttackType::Ranged,
            range,
            cooldown,
            ..Default::default()
        }
    }

    pub fn melee(range: f32, cooldown: f32) -> Self {
        Self {
            attack_type: AttackType::Melee,
            range,
            cooldown,
            ..Default::default()
        }
    }
}

/// Perception and engagement parameters.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Threat {
    /// Detection range (tiles).
    pub aggro_radius: f32,
    /// Max chase distance from origin before returning home.
    pub leash_radius: f32,
    /// HP fraction below which the entity flees (0 = never).
    pub flee_threshold: f32,
    /// Seconds between sensor sweeps.
    pub sensor_interval: f32,
    /// Absolute GameClock time of the last sensor run.
    pub last_sensor_time: f32,
}

impl Default for Threat {
    fn default() -> Self {
        Self {
            aggro_radius: 5000.0,
            leash_radius: 200.0,
            flee_threshold: 0.2,
            sensor_interval: 0.1,
            last_sensor_time: 0.0,
        }
    }
}

/// Directional perception for high-LOD AI entities.
///
/// Detection succeeds inside `peripheral_range` regardless of facing, or
/// inside `view_distance` within the facing arc.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VisionCone {
    pub fov_degrees: f32,
    pub view_distance: f32,
    pub peripheral_range: f32,
}

impl Default for VisionCone {
    fn default() -> Self {
        Self {
            fov_degrees: 120.0,
            view_distance: 5000.0,
            peripheral_range: 10.0,
        }
    }
}

/// A bullet / arrow flying through the world. Pure kinematic payload:
/// projectiles never carry Health, Faction, or Brain.
#[derive(Component, Debug, Clone)]
pub struct Projectile {
    pub owner: Entity,
    /// Owner's faction group captured at spawn; the friendly-fire filter
    /// uses this, so a mid-flight faction flip does not change immunity.
    pub owner_group: Option<String>,
    pub damage: f32,
    pub speed: f32,
    pub dx: f32,
    pub dy: f32,
    pub max_range: f32,
    pub traveled: f32,
    pub radius: f32,
}

/// Entity that can be looted once on death.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Loot {
    pub items: Vec<String>,
    pub looted: bool,
}

// ============================================================================
// BRAIN / AI STATE
// ============================================================================

/// Default non-combat behavior. Combat is driven by Threat + AttackConfig
/// presence, not by the kind - but guard/hostile kinds engage even while
/// their disposition is still neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BrainKind {
    #[default]
    Wander,
    Villager,
    Guard,
    HostileMelee,
    HostileRanged,
}

impl BrainKind {
    pub fn engages_while_neutral(self) -> bool {
        matches!(
            self,
            BrainKind::Guard | BrainKind::HostileMelee | BrainKind::HostileRanged
        )
    }
}

/// Combat FSM mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CombatMode {
    #[default]
    Idle,
    Searching,
    Chase,
    Attack,
    Flee,
    Return,
}

impl CombatMode {
    pub fn as_str(self) -> &'static str {
        match self {
            CombatMode::Idle => "idle",
            CombatMode::Searching => "searching",
            CombatMode::Chase => "chase",
            CombatMode::Attack => "attack",
            CombatMode::Flee => "flee",
            CombatMode::Return => "return",
        }
    }

    pub fn is_fighting(self) -> bool {
        matches!(self, CombatMode::Chase | CombatMode::Attack | CombatMode::Flee)
    }
}

/// Melee attack sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MeleePhase {
    #[default]
    Approach,
    Circle,
    Feint,
    Lunge,
    Retreat,
}

/// Strafe direction + flip timer, used by ranged attack movement.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrafeState {
    /// +1 or -1; 0 means "not yet initialized".
    pub dir: i8,
    pub timer: f32,
}

/// Melee sub-FSM timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeleeState {
    pub phase: MeleePhase,
    pub circle_timer: f32,
    /// +1 / -1 circling direction; 0 = uninitialized.
    pub circle_dir: i8,
    pub feint_timer: f32,
    pub feint_advancing: bool,
    pub retreat_timer: f32,
    pub retreat_dir: i8,
    pub just_hit: bool,
}

/// Per-entity combat FSM state.
#[derive(Debug, Clone, Default)]
pub struct CombatState {
    pub mode: CombatMode,
    /// First-seen position; leash anchor.
    pub origin: Option<(f32, f32)>,
    pub target_eid: Option<Entity>,
    pub target_pos: Option<(f32, f32)>,
    /// Earliest game time the next attack may fire.
    pub attack_until: f32,
    pub wall_blocked: bool,
    pub los_blocked: bool,
    pub los_blocked_count: u32,
    /// Ally fire lanes cached by the last sensor tick.
    pub fire_lines: Vec<FireLine>,
    /// Set by an ally asking us to clear their fire lane.
    pub clear_fire_line: Option<FireLine>,
    pub tac_repos: Option<(f32, f32)>,
    pub tac_repos_until: f32,
    /// Flanking spot used while wall-blocked in attack mode.
    pub repos_target: Option<(f32, f32)>,
    /// LOS waypoint used while wall-blocked in chase mode.
    pub chase_los_wp: Option<(f32, f32)>,
    pub search_source: Option<(f32, f32)>,
    pub search_until: f32,
    pub search_start: f32,
    /// Sensor phase has been randomized once.
    pub staggered: bool,
    pub dodge_until: f32,
    pub heal_until: f32,
    pub strafe: StrafeState,
    pub melee: MeleeState,
    pub path: PathCache,
}

/// Wander behavior scratch state.
#[derive(Debug, Clone, Copy, Default)]
pub struct WanderState {
    pub target: Option<(f32, f32)>,
    pub pause_until: f32,
}

/// Entity AI controller.
#[derive(Component, Debug, Clone, Default)]
pub struct Brain {
    pub kind: BrainKind,
    /// Must be true for the brain runner to execute. Off by default.
    pub active: bool,
    pub combat: CombatState,
    pub wander: WanderState,
    /// Civilian panic timer (absolute game time).
    pub crime_flee_until: f32,
    pub crime_flee_from: Option<(f32, f32)>,
    /// Last auto-eat time (absolute game time).
    pub auto_eat_at: f32,
}

impl Brain {
    pub fn new(kind: BrainKind) -> Self {
        Self {
            kind,
            active: true,
            ..Default::default()
        }
    }
}

/// Wander / patrol envelope for any entity that moves on its own.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HomeRange {
    pub origin_x: f32,
    pub origin_y: f32,
    pub radius: f32,
    pub speed: f32,
}

impl Default for HomeRange {
    fn default() -> Self {
        Self {
            origin_x: 0.0,
            origin_y: 0.0,
            radius: 6.0,
            speed: 2.0,
        }
    }
}

// ============================================================================
// NEEDS & INVENTORY
// ============================================================================

/// Hunger meter. `current` stays in `[0, maximum]`; at zero the entity
/// takes `starve_dps` damage per second instead of going negative.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Hunger {
    pub current: f32,
    pub maximum: f32,
    pub rate: f32,
    pub starve_dps: f32,
}

impl Default for Hunger {
    fn default() -> Self {
        Self {
            current: 100.0,
            maximum: 100.0,
            rate: 0.03,
            starve_dps: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NeedPriority {
    #[default]
    None,
    Eat,
}

/// Evaluated need, written by the hunger system and read by brains.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Needs {
    pub priority: NeedPriority,
    pub urgency: f32,
}

/// Item id -> count. BTreeMap so iteration order is deterministic.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub items: BTreeMap<String, u32>,
}

impl Inventory {
    pub fn add(&mut self, item: &str, count: u32) {
        *self.items.entry(item.to_string()).or_insert(0) += count;
    }

    pub fn count(&self, item: &str) -> u32 {
        self.items.get(item).copied().unwrap_or(0)
    }

    /// Remove one of `item`; returns false if none held.
    pub fn take_one(&mut self, item: &str) -> bool {
        match self.items.get_mut(item) {
            Some(n) if *n > 0 => {
                *n -= 1;
                if *n == 0 {
                    self.items.remove(item);
                }
                true
            }
            _ => false,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Equipped weapon / armor item ids.
#[derive(Component, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Equipment {
    pub weapon: Option<String>,
    pub armor: Option<String>,
}

// ============================================================================
// LOD & OFF-SCREEN RESIDENCE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LodLevel {
    #[default]
    High,
    Medium,
    Low,
}

/// Simulation level of detail. Low-LOD entities keep Position but have
/// velocity zeroed by the movement system and their brains skipped.
#[derive(Component, Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Lod {
    pub level: LodLevel,
    /// Absolute clock time suppressing further transitions (anti-thrash).
    pub transition_until: f32,
}

/// Off-screen residence marker: the entity lives at a subzone graph node
/// instead of a live Position.
#[derive(Component, Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SubzonePos {
    pub zone: ZoneId,
    pub node: crate::subzone::SubzoneId,
}

// ============================================================================
// WORLD MEMORY
// ============================================================================

/// Value stored in an entity's world memory.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    Flag(bool),
    Num(f32),
    Point(f32, f32),
    EntityRef(Entity),
    Text(String),
}

/// Typed key-value observations with TTL auto-expiry against the clock.
/// Keys use a `prefix:detail` convention so related entries can be
/// queried together (e.g. `crime:theft:42`).
#[derive(Component, Debug, Clone, Default)]
pub struct WorldMemory {
    data: BTreeMap<String, MemoryValue>,
    expiry: BTreeMap<String, f32>,
}

impl WorldMemory {
    pub fn set(&mut self, key: &str, value: MemoryValue) {
        self.data.insert(key.to_string(), value);
        self.expiry.remove(key);
    }

    pub fn set_ttl(&mut self, key: &str, value: MemoryValue, ttl: f32, game_time: f32) {
        self.data.insert(key.to_string(), value);
        self.expiry.insert(key.to_string(), game_time + ttl);
    }

    pub fn get(&self, key: &str) -> Option<&MemoryValue> {
        self.data.get(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn forget(&mut self, key: &str) {
        self.data.remove(key);
        self.expiry.remove(key);
    }

    /// All live entries whose key starts with `prefix`, in key order.
    pub fn query_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a MemoryValue)> + 'a {
        self.data
            .range(prefix.to_string()..)
            .take_while(move |(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.as_str(), v))
    }

    /// Drop entries whose TTL has lapsed.
    pub fn tick_expiry(&mut self, game_time: f32) {
        let expired: Vec<String> = self
            .expiry
            .iter()
            .filter(|(_, &t)| game_time >= t)
            .map(|(k, _)| k.clone())
            .collect();
        for k in expired {
            self.data.remove(&k);
            self.expiry.remove(&k);
        }
    }
}

// ============================================================================
// BUNDLE HELPERS
// ============================================================================

/// Everything a live NPC body needs.
#[derive(Bundle, Default)]
pub struct NpcBundle {
    pub identity: Identity,
    pub position: Position,
    pub velocity: Velocity,
    pub facing: Facing,
    pub collider: Collider,
    pub hurtbox: Hurtbox,
    pub health: Health,
    pub stats: CombatStats,
    pub faction: Faction,
    pub lod: Lod,
}
