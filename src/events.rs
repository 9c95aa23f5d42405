//! Typed event bus.
//!
//! Decouples systems that need to *signal* something from systems that
//! *react* to it. Events are plain data; reactions live in one
//! [`apply_event`] dispatch so the bus itself stores only the FIFO queue
//! and cumulative per-type counters.
//!
//! `drain` is breadth-first: it takes the current batch, clears the
//! queue, applies every event, then re-enters while handlers queued new
//! events - up to a safety cap of 1000 rounds to prevent livelock.

use crate::components::{AttackType, MemoryValue, WorldMemory};
use crate::devlog::dev_log;
use crate::world::GameClock;
use crate::zone::ZoneId;
use bevy_ecs::prelude::*;
use std::collections::{BTreeMap, VecDeque};

/// Everything the core can signal.
#[derive(Debug, Clone)]
pub enum GameEvent {
    /// An entity's HP dropped to zero.
    EntityDied {
        eid: Entity,
        killer: Option<Entity>,
        zone: ZoneId,
    },
    /// An NPC wants to attack a target - the combat system resolves it.
    AttackIntent {
        attacker: Entity,
        target: Entity,
        attack_type: AttackType,
    },
    /// Notify nearby same-group allies that combat started.
    FactionAlert {
        group: String,
        x: f32,
        y: f32,
        zone: ZoneId,
        threat: Option<Entity>,
    },
    /// A crime was observed by an NPC.
    CrimeWitnessed {
        criminal: Entity,
        witness: Entity,
        kind: String,
        x: f32,
        y: f32,
        zone: ZoneId,
    },
    /// Damage landed (diagnostic feed).
    EntityHit {
        target: Entity,
        attacker: Entity,
        damage: f32,
    },
}

impl GameEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GameEvent::EntityDied { .. } => "EntityDied",
            GameEvent::AttackIntent { .. } => "AttackIntent",
            GameEvent::FactionAlert { .. } => "FactionAlert",
            GameEvent::CrimeWitnessed { .. } => "CrimeWitnessed",
            GameEvent::EntityHit { .. } => "EntityHit",
        }
    }
}

/// Fire-and-forget event bus stored as a resource.
#[derive(Resource, Debug, Default)]
pub struct EventBus {
    queue: VecDeque<GameEvent>,
    counts: BTreeMap<&'static str, u64>,
}

impl EventBus {
    /// Queue an event for the next drain. O(1).
    pub fn emit(&mut self, event: GameEvent) {
        self.queue.push_back(event);
    }

    pub fn pending_count(&self) -> usize {
        self.queue.len()
    }

    /// Cumulative event counts by type name.
    pub fn counts(&self) -> &BTreeMap<&'static str, u64> {
        &self.counts
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Emit helper for systems holding `&mut World`.
pub fn emit(world: &mut World, event: GameEvent) {
    if let Some(mut bus) = world.get_resource_mut::<EventBus>() {
        bus.emit(event);
    }
}

/// Drain the bus. Returns the number of events processed.
pub fn event_drain_system(world: &mut World) -> usize {
    let mut processed = 0;
    let mut rounds = 0;
    loop {
        let batch: Vec<GameEvent> = {
            let Some(mut bus) = world.get_resource_mut::<EventBus>() else {
                return processed;
            };
            if bus.queue.is_empty() {
                return processed;
            }
            let batch: Vec<GameEvent> = bus.queue.drain(..).collect();
            for event in &batch {
                *bus.counts.entry(event.kind()).or_insert(0) += 1;
            }
            batch
        };

        for event in &batch {
            apply_event(world, event);
        }
        processed += batch.len();

        rounds += 1;
        if rounds >= 1000 {
            // Livelock guard: stop, log, keep whatever is still queued.
            let t = world.resource::<GameClock>().time;
            tracing::warn!(target: "events", "drain hit the 1000-round safety cap");
            dev_log(world, Entity::PLACEHOLDER, "error", "event drain hit safety cap", t);
            return processed;
        }
    }
}

/// Single dispatch point for all event reactions.
fn apply_event(world: &mut World, event: &GameEvent) {
    match event {
        GameEvent::EntityDied { eid, killer, .. } => {
            crate::systems::damage::handle_death(world, *eid, *killer);
        }
        GameEvent::AttackIntent {
            attacker,
            target,
            attack_type,
        } => match attack_type {
            AttackType::Melee => {
                crate::systems::attacks::npc_melee_attack(world, *attacker, *target);
            }
            AttackType::Ranged => {
                crate::systems::attacks::npc_ranged_attack(world, *attacker, *target);
            }
        },
        GameEvent::FactionAlert {
            group,
            x,
            y,
            zone,
            threat,
        } => {
            crate::systems::alerts::on_faction_alert(world, group, *x, *y, *zone, *threat);
        }
        GameEvent::CrimeWitnessed {
            criminal,
            witness,
            kind,
            x,
            y,
            ..
        } => {
            let t = world.resource::<GameClock>().time;
            if let Some(mut mem) = world.get_mut::<WorldMemory>(*witness) {
                mem.set_ttl(
                    &format!("crime:{kind}:{}", criminal.index()),
                    MemoryValue::Point(*x, *y),
                    600.0,
                    t,
                );
            }
            dev_log(world, *witness, "crime", format!("witnessed {kind}"), t);
        }
        GameEvent::EntityHit {
            target,
            attacker,
            damage,
        } => {
            let t = world.resource::<GameClock>().time;
            dev_log(
                world,
                *target,
                "combat",
                format!("hit by e{} for {damage:.0}", attacker.index()),
                t,
            );
        }
    }
}
