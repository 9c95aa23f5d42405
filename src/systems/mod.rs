//! Gameplay systems for the Wasteland simulation.
//!
//! Systems are plain functions taking `&mut World`: the orchestrator
//! (`api::SimWorld::tick_systems`) runs them in a fixed order on one
//! thread, so all observed state is per-frame consistent and a seeded
//! run replays identically. Sensors and decisions run before physics,
//! physics before effects, effects before event propagation.
//!
//! ## Pipeline order and data access
//!
//! | # | System | Reads | Writes |
//! |---|--------|-------|--------|
//! | 1 | `lod_system` | Position (player), Tuning | Lod |
//! | 2 | `hunger_system` | Tuning | Hunger, Health, Needs |
//! | 3 | `auto_eat_system` | Needs, ItemRegistry | Inventory, Hunger, Health, Brain |
//! | 4 | `settlement_food_production` | ZoneMaps, Tuning | Inventory, RefillTimers |
//! | 5 | `tick_ai` | perception queries, ZoneMaps, Tuning | Brain, Velocity, Facing, Faction, Threat |
//! | 6 | `movement_system` | ZoneMaps, Collider | Position, Velocity, HitFlash |
//! | 7 | `projectile_system` | ZoneMaps, Hurtbox | Position, Projectile, Health (via damage) |
//! | 8 | `event_drain_system` | EventBus | everything the handlers touch |
//! | 9 | particles update | - | ParticleManager |
//! | 10 | `subzone_tick` | SubzoneGraph | SubzonePos, Health, WorldScheduler |
//! | 11 | `purge` | Graveyard | despawns, ZoneIndex |
//!
//! Multiple authors of the same component are serialized by this order,
//! not by locks. Entity death is deferred (`kill` marks, `purge` reaps)
//! so every iteration sees a consistent entity set.

pub mod alerts;
pub mod attacks;
pub mod brains;
pub mod combat_movement;
pub mod damage;
pub mod engagement;
pub mod fireline;
pub mod lod;
pub mod movement;
pub mod needs;
pub mod perception;
pub mod projectiles;
pub mod steering;
pub mod tactical;

pub use alerts::{alert_nearby_faction, emit_combat_sound, make_hostile, share_combat_intel};
pub use attacks::{attack_entity, npc_melee_attack, npc_ranged_attack};
pub use brains::tick_ai;
pub use damage::{apply_damage, handle_death, DamageOutcome, DamageSpec};
pub use engagement::combat_brain;
pub use fireline::{get_ally_fire_lines, FireLine};
pub use lod::lod_system;
pub use movement::movement_system;
pub use needs::{auto_eat_system, hunger_system, settlement_food_production, RefillTimers};
pub use perception::{acquire_target, find_nearest_enemy, find_player, in_vision_cone, TargetInfo};
pub use projectiles::projectile_system;
pub use tactical::{find_chase_los_waypoint, find_tactical_position};
