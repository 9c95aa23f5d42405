//! Off-screen persistent world simulation.
//!
//! Every NPC exists persistently: entities outside the player's zone
//! live at nodes of the subzone graph as [`SubzonePos`] residents. They
//! do not integrate motion or appear in combat queries; instead an
//! event-driven scheduler walks them through arrivals, meals, travel,
//! and stat-check fights on a priority queue of timed events.
//!
//! Times are game minutes (one real second is one game minute, so the
//! clock value doubles as the minute count).

use crate::components::*;
use crate::devlog::dev_log;
use crate::spatial::ZoneIndex;
use crate::tuning::tun;
use crate::world::{alive, display_name, kill, register_zone, rng_range, GameClock};
use crate::zone::{ZoneId, ZoneMaps};
use bevy_ecs::prelude::*;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

// ============================================================================
// GRAPH
// ============================================================================

/// Node id inside a [`SubzoneGraph`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct SubzoneId(pub u32);

/// One off-screen location: a named point in a zone with travel edges
/// and optional storage containers.
#[derive(Debug, Clone)]
pub struct SubzoneNode {
    pub id: SubzoneId,
    pub key: String,
    pub zone: ZoneId,
    pub pos: (f32, f32),
    /// Container entities parked at this node (storehouses, caches).
    pub containers: Vec<Entity>,
    /// `(neighbor, travel minutes)`.
    pub edges: Vec<(SubzoneId, f32)>,
}

/// The world's off-screen topology.
#[derive(Resource, Debug, Default)]
pub struct SubzoneGraph {
    nodes: Vec<SubzoneNode>,
    by_key: BTreeMap<String, SubzoneId>,
}

impl SubzoneGraph {
    pub fn add_node(&mut self, key: &str, zone: ZoneId, pos: (f32, f32)) -> SubzoneId {
        if let Some(&id) = self.by_key.get(key) {
            return id;
        }
        let id = SubzoneId(self.nodes.len() as u32);
        self.nodes.push(SubzoneNode {
            id,
            key: key.to_string(),
            zone,
            pos,
            containers: Vec::new(),
            edges: Vec::new(),
        });
        self.by_key.insert(key.to_string(), id);
        id
    }

    /// Bidirectional travel edge.
    pub fn connect(&mut self, a: SubzoneId, b: SubzoneId, minutes: f32) {
        if let Some(node) = self.node_mut(a) {
            node.edges.push((b, minutes));
        }
        if let Some(node) = self.node_mut(b) {
            node.edges.push((a, minutes));
        }
    }

    pub fn node(&self, id: SubzoneId) -> Option<&SubzoneNode> {
        self.nodes.get(id.0 as usize)
    }

    pub fn node_mut(&mut self, id: SubzoneId) -> Option<&mut SubzoneNode> {
        self.nodes.get_mut(id.0 as usize)
    }

    pub fn id_of(&self, key: &str) -> Option<SubzoneId> {
        self.by_key.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Travel minutes along the edge `from -> to`, or a flat default
    /// when the nodes aren't directly connected.
    pub fn travel_minutes(&self, from: SubzoneId, to: SubzoneId) -> f32 {
        self.node(from)
            .and_then(|n| n.edges.iter().find(|(id, _)| *id == to))
            .map_or(5.0, |(_, m)| *m)
    }

    /// Node in `zone` closest to `(x, y)`.
    pub fn nearest_node_in_zone(&self, zone: ZoneId, x: f32, y: f32) -> Option<SubzoneId> {
        self.nodes
            .iter()
            .filter(|n| n.zone == zone)
            .min_by(|a, b| {
                let da = (a.pos.0 - x).hypot(a.pos.1 - y);
                let db = (b.pos.0 - x).hypot(b.pos.1 - y);
                da.total_cmp(&db)
            })
            .map(|n| n.id)
    }
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Off-screen event kinds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubzoneEventKind {
    ArriveNode { node: SubzoneId },
    TravelStart { to: SubzoneId },
    HungerCritical,
    TradeRequest,
    SleepEnd,
}

/// One queued off-screen event.
#[derive(Debug, Clone, Copy)]
pub struct ScheduledEvent {
    pub due: f32,
    /// Insertion sequence - the stable tie-break for equal due times.
    pub seq: u64,
    pub eid: Entity,
    pub kind: SubzoneEventKind,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for ScheduledEvent {}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due
            .total_cmp(&other.due)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Priority queue of timed off-screen events.
#[derive(Resource, Debug, Default)]
pub struct WorldScheduler {
    heap: BinaryHeap<std::cmp::Reverse<ScheduledEvent>>,
    seq: u64,
    /// Nodes that already resolved a fight this tick - at most one
    /// off-screen combat per node per tick.
    fought_nodes: BTreeSet<SubzoneId>,
}

impl WorldScheduler {
    pub fn schedule(&mut self, due: f32, eid: Entity, kind: SubzoneEventKind) {
        let seq = self.seq;
        self.seq += 1;
        self.heap
            .push(std::cmp::Reverse(ScheduledEvent { due, seq, eid, kind }));
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    fn pop_due(&mut self, now: f32) -> Option<ScheduledEvent> {
        match self.heap.peek() {
            Some(std::cmp::Reverse(ev)) if ev.due <= now => {
                Some(self.heap.pop().unwrap().0)
            }
            _ => None,
        }
    }
}

// ============================================================================
// STAT-CHECK COMBAT
// ============================================================================

/// Input stats for one side of an off-screen fight.
#[derive(Debug, Clone, Copy)]
pub struct StatBlock {
    pub hp: f32,
    pub hp_max: f32,
    pub damage: f32,
    pub defense: f32,
    pub cooldown: f32,
    pub flee_threshold: f32,
}

/// Outcome of a resolved off-screen fight.
#[derive(Debug, Clone, Copy)]
pub struct StatCombatOutcome {
    pub a_won: bool,
    /// Fight length in game minutes. Always positive.
    pub duration: f32,
    pub loser_fled: bool,
    pub a_hp: f32,
    pub b_hp: f32,
}

/// Deterministic DPS race. Each side's DPS is
/// `damage * (1 - defense/100) / cooldown`; the fight runs until one
/// side hits its flee threshold (or zero HP when it never flees).
/// An exact tie goes to side A.
pub fn stat_check_combat(a: &StatBlock, b: &StatBlock) -> StatCombatOutcome {
    let dps_a = a.damage * (1.0 - b.defense / 100.0) / a.cooldown.max(0.05);
    let dps_b = b.damage * (1.0 - a.defense / 100.0) / b.cooldown.max(0.05);

    let break_hp = |s: &StatBlock| {
        if s.flee_threshold > 0.0 {
            s.flee_threshold * s.hp_max
        } else {
            0.0
        }
    };
    let a_break = break_hp(a);
    let b_break = break_hp(b);

    let t_a = ((a.hp - a_break).max(0.0) / dps_b.max(1e-3)).max(0.05);
    let t_b = ((b.hp - b_break).max(0.0) / dps_a.max(1e-3)).max(0.05);

    if t_b <= t_a {
        // B breaks first
        let duration = t_b;
        StatCombatOutcome {
            a_won: true,
            duration,
            loser_fled: b.flee_threshold > 0.0,
            a_hp: (a.hp - dps_b * duration).max(a_break.min(a.hp)),
            b_hp: b_break,
        }
    } else {
        let duration = t_a;
        StatCombatOutcome {
            a_won: false,
            duration,
            loser_fled: a.flee_threshold > 0.0,
            a_hp: a_break,
            b_hp: (b.hp - dps_a * duration).max(b_break.min(b.hp)),
        }
    }
}

fn stat_block_of(world: &World, eid: Entity) -> Option<StatBlock> {
    let health = world.get::<Health>(eid)?;
    let stats = world.get::<CombatStats>(eid)?;
    let cooldown = world.get::<AttackConfig>(eid).map_or(1.0, |c| c.cooldown);
    let flee = world.get::<Threat>(eid).map_or(0.0, |t| t.flee_threshold);
    Some(StatBlock {
        hp: health.current,
        hp_max: health.maximum,
        damage: stats.damage,
        defense: stats.defense,
        cooldown,
        flee_threshold: flee,
    })
}

// ============================================================================
// SCHEDULER TICK
// ============================================================================

/// Process every due off-screen event. Handlers may enqueue further
/// events (visible this tick if already due).
pub fn subzone_tick(world: &mut World, game_minutes: f32) {
    world.resource_scope(|world, mut sched: Mut<WorldScheduler>| {
        sched.fought_nodes.clear();
        while let Some(ev) = sched.pop_due(game_minutes) {
            if !alive(world, ev.eid) {
                continue;
            }
            // Promoted entities dropped their SubzonePos; their queued
            // events are stale.
            if world.get::<SubzonePos>(ev.eid).is_none() {
                continue;
            }
            match ev.kind {
                SubzoneEventKind::ArriveNode { node } => {
                    on_arrive(world, &mut *sched, ev.eid, node, game_minutes);
                }
                SubzoneEventKind::TravelStart { to } => {
                    on_travel_start(world, &mut *sched, ev.eid, to, game_minutes);
                }
                SubzoneEventKind::HungerCritical => {
                    on_hunger_critical(world, &mut *sched, ev.eid, game_minutes);
                }
                SubzoneEventKind::TradeRequest => {
                    on_trade_request(world, ev.eid, game_minutes);
                }
                SubzoneEventKind::SleepEnd => {
                    on_sleep_end(world, &mut *sched, ev.eid, game_minutes);
                }
            }
        }
    });
}

fn random_neighbor(world: &mut World, node: SubzoneId) -> Option<SubzoneId> {
    let edges: Vec<SubzoneId> = world
        .resource::<SubzoneGraph>()
        .node(node)
        .map(|n| n.edges.iter().map(|(id, _)| *id).collect())
        .unwrap_or_default();
    if edges.is_empty() {
        return None;
    }
    let idx = world
        .resource_mut::<crate::world::SimRng>()
        .0
        .gen_range(0..edges.len());
    Some(edges[idx])
}

fn on_arrive(
    world: &mut World,
    sched: &mut WorldScheduler,
    eid: Entity,
    node: SubzoneId,
    now: f32,
) {
    if let Some(mut szp) = world.get_mut::<SubzonePos>(eid) {
        szp.node = node;
    }
    dev_log(world, eid, "subzone", format!("arrived at node {}", node.0), now);

    checkpoint_eat(world, eid, node);
    resolve_node_combat(world, sched, eid, node, now);
    if !alive(world, eid) || world.get::<SubzonePos>(eid).is_none() {
        return;
    }

    // Occasionally barter with the local stores before moving on.
    let has_containers = world
        .resource::<SubzoneGraph>()
        .node(node)
        .is_some_and(|n| !n.containers.is_empty());
    if has_containers && crate::world::rng_chance(world, 0.25) {
        let delay = rng_range(world, 1.0, 5.0);
        sched.schedule(now + delay, eid, SubzoneEventKind::TradeRequest);
    }

    // Plan the next leg after a dwell, or sleep at a dead end.
    match random_neighbor(world, node) {
        Some(next) => {
            let dwell = rng_range(world, 10.0, 30.0);
            sched.schedule(now + dwell, eid, SubzoneEventKind::TravelStart { to: next });
        }
        None => {
            sched.schedule(now + 60.0, eid, SubzoneEventKind::SleepEnd);
        }
    }
}

/// Barter at the current node: surplus stock (more than 3 of an item)
/// goes into the local container.
fn on_trade_request(world: &mut World, eid: Entity, now: f32) {
    let Some(node) = world.get::<SubzonePos>(eid).map(|s| s.node) else {
        return;
    };
    let Some(container) = world
        .resource::<SubzoneGraph>()
        .node(node)
        .and_then(|n| n.containers.iter().copied().find(|&c| alive(world, c)))
    else {
        return;
    };
    let surplus = world.get::<Inventory>(eid).and_then(|inv| {
        inv.items
            .iter()
            .find(|(_, &n)| n > 3)
            .map(|(id, _)| id.clone())
    });
    let Some(item) = surplus else {
        return;
    };
    if let Some(mut inv) = world.get_mut::<Inventory>(eid) {
        inv.take_one(&item);
    }
    if let Some(mut cinv) = world.get_mut::<Inventory>(container) {
        cinv.add(&item, 1);
    }
    dev_log(world, eid, "subzone", format!("traded {item}"), now);
}

fn on_travel_start(
    world: &mut World,
    sched: &mut WorldScheduler,
    eid: Entity,
    to: SubzoneId,
    now: f32,
) {
    let from = world
        .get::<SubzonePos>(eid)
        .map(|s| s.node)
        .unwrap_or(to);
    let minutes = world.resource::<SubzoneGraph>().travel_minutes(from, to);
    sched.schedule(now + minutes, eid, SubzoneEventKind::ArriveNode { node: to });
}

fn on_hunger_critical(
    world: &mut World,
    sched: &mut WorldScheduler,
    eid: Entity,
    now: f32,
) {
    let Some(node) = world.get::<SubzonePos>(eid).map(|s| s.node) else {
        return;
    };
    if checkpoint_eat(world, eid, node) {
        schedule_hunger_check(world, sched, eid, now);
        return;
    }

    // Nothing to eat here: take starvation damage for the elapsed
    // stretch and try again later (travel may bring food).
    let starve = world
        .get::<Hunger>(eid)
        .map_or(0.0, |h| h.starve_dps * 10.0);
    let mut dead = false;
    if let Some(mut health) = world.get_mut::<Health>(eid) {
        health.current = (health.current - starve).max(0.0);
        dead = health.current <= 0.0;
    }
    if dead {
        let name = display_name(world, eid);
        tracing::info!(target: "subzone", "{name} starved off-screen");
        dev_log(world, eid, "subzone", "starved", now);
        kill(world, eid);
        return;
    }
    sched.schedule(now + 30.0, eid, SubzoneEventKind::HungerCritical);
}

/// Schedule the next hunger check from the entity's current reserves.
fn schedule_hunger_check(world: &mut World, sched: &mut WorldScheduler, eid: Entity, now: f32) {
    let Some(hunger) = world.get::<Hunger>(eid).copied() else {
        return;
    };
    if hunger.rate <= 0.0 {
        return;
    }
    // Due again when reserves would drop under the hungry line.
    let headroom = (hunger.current - hunger.maximum * 0.25).max(0.0);
    sched.schedule(
        now + (headroom / hunger.rate).max(10.0),
        eid,
        SubzoneEventKind::HungerCritical,
    );
}

fn on_sleep_end(world: &mut World, sched: &mut WorldScheduler, eid: Entity, now: f32) {
    let Some(node) = world.get::<SubzonePos>(eid).map(|s| s.node) else {
        return;
    };
    match random_neighbor(world, node) {
        Some(next) => sched.schedule(now, eid, SubzoneEventKind::TravelStart { to: next }),
        None => sched.schedule(now + 60.0, eid, SubzoneEventKind::SleepEnd),
    }
}

/// Eat from a node container when hungry. Returns true if a meal was
/// eaten (or none was needed).
fn checkpoint_eat(world: &mut World, eid: Entity, node: SubzoneId) -> bool {
    let Some(hunger) = world.get::<Hunger>(eid).copied() else {
        return true;
    };
    if hunger.current / hunger.maximum.max(0.01) >= 0.5 {
        return true;
    }

    let containers: Vec<Entity> = world
        .resource::<SubzoneGraph>()
        .node(node)
        .map(|n| n.containers.clone())
        .unwrap_or_default();
    for container in containers {
        if !alive(world, container) {
            continue;
        }
        let Some(mut cinv) = world.get::<Inventory>(container).cloned() else {
            continue;
        };
        let mut hunger = match world.get::<Hunger>(eid).copied() {
            Some(h) => h,
            None => return true,
        };
        let mut health = world.get::<Health>(eid).copied();
        let eaten = {
            let Some(registry) = world.get_resource::<crate::items::ItemRegistry>() else {
                return false;
            };
            crate::items::consume_from_container(&mut cinv, &mut hunger, health.as_mut(), registry)
        };
        if eaten.is_none() {
            continue;
        }
        if let Some(mut c) = world.get_mut::<Inventory>(container) {
            *c = cinv;
        }
        if let Some(mut h) = world.get_mut::<Hunger>(eid) {
            *h = hunger;
        }
        if let (Some(health), Some(mut h)) = (health, world.get_mut::<Health>(eid)) {
            *h = health;
        }
        return true;
    }
    false
}

/// Two hostile residents at one node fight a stat-check battle. At most
/// one fight per node per tick prevents stampedes.
fn resolve_node_combat(
    world: &mut World,
    sched: &mut WorldScheduler,
    eid: Entity,
    node: SubzoneId,
    now: f32,
) {
    if sched.fought_nodes.contains(&node) {
        return;
    }
    let Some(my_group) = world.get::<Faction>(eid).map(|f| f.group.clone()) else {
        return;
    };
    let Some(a_stats) = stat_block_of(world, eid) else {
        return;
    };

    let hostile_self = world
        .get::<Faction>(eid)
        .is_some_and(|f| f.disposition == Disposition::Hostile);

    // First hostile-pairing co-resident in id order: different group,
    // and at least one side hostile.
    let mut residents: Vec<Entity> = world
        .query_filtered::<Entity, With<SubzonePos>>()
        .iter(world)
        .collect();
    residents.sort();
    let opponent = residents.into_iter().find(|&other| {
        other != eid
            && alive(world, other)
            && world.get::<SubzonePos>(other).is_some_and(|s| s.node == node)
            && world.get::<Faction>(other).is_some_and(|f| {
                f.group != my_group
                    && (hostile_self || f.disposition == Disposition::Hostile)
            })
            && stat_block_of(world, other).is_some()
    });
    let Some(opponent) = opponent else {
        return;
    };
    let Some(b_stats) = stat_block_of(world, opponent) else {
        return;
    };

    sched.fought_nodes.insert(node);
    let outcome = stat_check_combat(&a_stats, &b_stats);
    let (winner, loser, w_hp, l_hp) = if outcome.a_won {
        (eid, opponent, outcome.a_hp, outcome.b_hp)
    } else {
        (opponent, eid, outcome.b_hp, outcome.a_hp)
    };

    if let Some(mut h) = world.get_mut::<Health>(winner) {
        h.current = w_hp;
    }
    if let Some(mut h) = world.get_mut::<Health>(loser) {
        h.current = l_hp;
    }

    let w_name = display_name(world, winner);
    let l_name = display_name(world, loser);
    tracing::info!(
        target: "subzone",
        "off-screen fight at node {}: {w_name} beat {l_name} in {:.1} min",
        node.0,
        outcome.duration,
    );
    dev_log(
        world,
        winner,
        "subzone",
        format!("won off-screen fight ({:.1} min)", outcome.duration),
        now,
    );

    if outcome.loser_fled {
        if let Some(next) = random_neighbor(world, node) {
            sched.schedule(now, loser, SubzoneEventKind::TravelStart { to: next });
        }
    } else {
        dev_log(world, loser, "subzone", "died off-screen", now);
        kill(world, loser);
    }
}

// ============================================================================
// LOD TRANSITION (zone change)
// ============================================================================

/// The player moved to `new_zone`: materialize that zone's residents as
/// live high-LOD entities, and demote live NPCs left behind in other
/// zones to their nearest graph node.
pub fn on_zone_change(world: &mut World, new_zone: ZoneId) {
    let game_time = world.resource::<GameClock>().time;
    let grace = tun(world, "lod", "transition_grace", 0.5);

    // Promote: SubzonePos residents of the new zone.
    let mut promote: Vec<(Entity, SubzoneId)> = world
        .query::<(Entity, &SubzonePos)>()
        .iter(world)
        .filter(|(_, szp)| szp.zone == new_zone)
        .map(|(e, szp)| (e, szp.node))
        .collect();
    promote.sort_by_key(|(e, _)| *e);

    for (eid, node) in promote {
        let (nx, ny) = world
            .resource::<SubzoneGraph>()
            .node(node)
            .map_or((1.0, 1.0), |n| n.pos);
        let (x, y) = world
            .resource::<ZoneMaps>()
            .grid(new_zone)
            .map_or((nx, ny), |g| g.find_safe_spawn(ny, nx));
        world.entity_mut(eid).remove::<SubzonePos>();
        world.entity_mut(eid).insert((
            Position::new(x, y, new_zone),
            Lod {
                level: LodLevel::High,
                transition_until: game_time + grace,
            },
        ));
        register_zone(world, eid, new_zone);
        dev_log(world, eid, "subzone", "promoted to live entity", game_time);
    }

    // Demote: live brained NPCs now outside the player's zone.
    let mut demote: Vec<(Entity, Position)> = Vec::new();
    {
        let mut q = world.query_filtered::<(Entity, &Position), (With<Brain>, Without<Player>)>();
        for (eid, pos) in q.iter(world) {
            if pos.zone != new_zone {
                demote.push((eid, *pos));
            }
        }
    }
    demote.sort_by_key(|(e, _)| *e);

    for (eid, pos) in demote {
        let Some(node) = world
            .resource::<SubzoneGraph>()
            .nearest_node_in_zone(pos.zone, pos.x, pos.y)
        else {
            continue; // No graph coverage: stays live (and low-LOD).
        };
        if let Some(mut idx) = world.get_resource_mut::<ZoneIndex>() {
            idx.remove(eid, pos.zone);
        }
        world.entity_mut(eid).remove::<Position>();
        world.entity_mut(eid).insert(SubzonePos {
            zone: pos.zone,
            node,
        });
        // Bootstrap the off-screen life of this entity.
        let hunger_due = world.get::<Hunger>(eid).map_or(f32::MAX, |h| {
            if h.rate > 0.0 {
                game_time + (h.current / h.rate).max(1.0)
            } else {
                f32::MAX
            }
        });
        {
            let mut sched = world.resource_mut::<WorldScheduler>();
            sched.schedule(game_time, eid, SubzoneEventKind::ArriveNode { node });
            if hunger_due < f32::MAX {
                sched.schedule(hunger_due, eid, SubzoneEventKind::HungerCritical);
            }
        }
        dev_log(world, eid, "subzone", "demoted to off-screen", game_time);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::items::ItemRegistry;
    use crate::tuning::Tuning;
    use crate::world::{Graveyard, SimRng};
    use crate::zone::{TileGrid, TILE_GRASS};

    fn sub_world() -> (World, ZoneId, ZoneId) {
        let mut world = World::new();
        let mut maps = ZoneMaps::default();
        let z0 = maps.insert("overworld", TileGrid::new(40, 40, TILE_GRASS));
        let z1 = maps.insert("ruins", TileGrid::new(40, 40, TILE_GRASS));
        world.insert_resource(maps);
        world.insert_resource(GameClock::default());
        world.insert_resource(Tuning::default());
        world.insert_resource(SimRng::from_seed(13));
        world.insert_resource(Graveyard::default());
        world.insert_resource(ZoneIndex::default());
        world.insert_resource(ItemRegistry::with_defaults());
        world.insert_resource(WorldScheduler::default());
        world.insert_resource(SubzoneGraph::default());
        world.insert_resource(crate::devlog::DevLog::default());
        (world, z0, z1)
    }

    #[test]
    fn test_scheduler_orders_by_due_then_seq() {
        let mut sched = WorldScheduler::default();
        let e = Entity::from_raw(1);
        sched.schedule(5.0, e, SubzoneEventKind::SleepEnd);
        sched.schedule(3.0, e, SubzoneEventKind::HungerCritical);
        sched.schedule(3.0, e, SubzoneEventKind::SleepEnd);

        let a = sched.pop_due(10.0).unwrap();
        let b = sched.pop_due(10.0).unwrap();
        let c = sched.pop_due(10.0).unwrap();
        assert_eq!(a.kind, SubzoneEventKind::HungerCritical); // due 3, seq 1
        assert_eq!(b.kind, SubzoneEventKind::SleepEnd); // due 3, seq 2
        assert_eq!(c.due, 5.0);
        // Nothing due before its time
        sched.schedule(99.0, e, SubzoneEventKind::SleepEnd);
        assert!(sched.pop_due(10.0).is_none());
    }

    #[test]
    fn test_stat_check_combat_guard_vs_raider() {
        // Deterministic outcome with a positive duration (S9).
        let guard = StatBlock {
            hp: 100.0,
            hp_max: 100.0,
            damage: 12.0,
            defense: 6.0,
            cooldown: 1.0,
            flee_threshold: 0.2,
        };
        let raider = StatBlock {
            hp: 80.0,
            hp_max: 80.0,
            damage: 15.0,
            defense: 3.0,
            cooldown: 1.0,
            flee_threshold: 0.35,
        };
        let out = stat_check_combat(&guard, &raider);
        assert!(out.a_won, "guard outlasts the raider");
        assert!(out.duration > 0.0);
        assert!(out.loser_fled);
        assert!(out.a_hp <= guard.hp_max);
        assert!(out.a_hp > 0.0);
        // Raider broke at its flee line
        assert!((out.b_hp - 0.35 * 80.0).abs() < 1e-3);

        // Determinism: same inputs, same outcome.
        let again = stat_check_combat(&guard, &raider);
        assert_eq!(out.duration, again.duration);
        assert_eq!(out.a_hp, again.a_hp);
    }

    #[test]
    fn test_travel_and_arrive_cycle() {
        let (mut world, z0, _) = sub_world();
        let (a, b);
        {
            let mut graph = world.resource_mut::<SubzoneGraph>();
            a = graph.add_node("camp", z0, (5.0, 5.0));
            b = graph.add_node("well", z0, (20.0, 5.0));
            graph.connect(a, b, 4.0);
            assert_eq!(graph.len(), 2);
            assert_eq!(graph.id_of("well"), Some(b));
            assert_eq!(graph.travel_minutes(a, b), 4.0);
        }
        let npc = world
            .spawn((
                Identity::npc("nomad"),
                SubzonePos { zone: z0, node: a },
                Health::new(100.0),
                Hunger::default(),
            ))
            .id();
        world
            .resource_mut::<WorldScheduler>()
            .schedule(0.0, npc, SubzoneEventKind::ArriveNode { node: a });

        // Arrival schedules a dwell (10-30 min) then travel; run long
        // enough to see the entity move through the graph.
        subzone_tick(&mut world, 0.0);
        assert!(world.resource::<WorldScheduler>().len() > 0);
        for minute in 0..120 {
            subzone_tick(&mut world, minute as f32);
        }
        // Still resident somewhere on the graph, still scheduled.
        assert!(world.get::<SubzonePos>(npc).is_some());
        assert!(!world.resource::<WorldScheduler>().is_empty());
    }

    #[test]
    fn test_zone_change_promotes_and_demotes() {
        let (mut world, z0, z1) = sub_world();
        let node0;
        let node1;
        {
            let mut graph = world.resource_mut::<SubzoneGraph>();
            node0 = graph.add_node("ow_camp", z0, (5.0, 5.0));
            node1 = graph.add_node("ruin_gate", z1, (8.0, 8.0));
        }

        // Off-screen resident of z1, live NPC in z0, player moving to z1.
        let resident = world
            .spawn((
                Identity::npc("hermit"),
                SubzonePos { zone: z1, node: node1 },
                Health::new(50.0),
                Brain::new(BrainKind::Wander),
            ))
            .id();
        let live_npc = world
            .spawn((
                Identity::npc("farmer"),
                Position::new(6.0, 5.0, z0),
                Velocity::default(),
                Health::new(50.0),
                Brain::new(BrainKind::Wander),
                Hunger::default(),
            ))
            .id();
        register_zone(&mut world, live_npc, z0);

        on_zone_change(&mut world, z1);

        // Resident materialized in z1 at high LOD
        let pos = world.get::<Position>(resident).expect("promoted");
        assert_eq!(pos.zone, z1);
        assert!(world.get::<SubzonePos>(resident).is_none());
        assert_eq!(world.get::<Lod>(resident).unwrap().level, LodLevel::High);
        assert!(world.resource::<ZoneIndex>().contains(resident, z1));

        // Farmer captured at the nearest z0 node
        assert!(world.get::<Position>(live_npc).is_none());
        let szp = world.get::<SubzonePos>(live_npc).unwrap();
        assert_eq!(szp.zone, z0);
        assert_eq!(szp.node, node0);
        assert!(!world.resource::<ZoneIndex>().contains(live_npc, z0));
        // Bootstrap events queued
        assert!(world.resource::<WorldScheduler>().len() >= 1);
    }

    #[test]
    fn test_offscreen_fight_one_per_node() {
        let (mut world, z0, _) = sub_world();
        let node;
        {
            let mut graph = world.resource_mut::<SubzoneGraph>();
            node = graph.add_node("crossroads", z0, (10.0, 10.0));
        }
        let fighter = |world: &mut World, name: &str, group: &str, hp: f32, dmg: f32| {
            world
                .spawn((
                    Identity::npc(name),
                    SubzonePos { zone: z0, node },
                    Health::new(hp),
                    CombatStats {
                        damage: dmg,
                        defense: 3.0,
                    },
                    AttackConfig::default(),
                    Threat {
                        flee_threshold: 0.2,
                        ..Default::default()
                    },
                    Faction::new(if group == "raiders" { "raiders" } else { "settlers" },
                        Disposition::Hostile),
                ))
                .id()
        };
        let guard = fighter(&mut world, "guard", "settlers", 100.0, 12.0);
        let raider = fighter(&mut world, "raider", "raiders", 80.0, 15.0);

        world
            .resource_mut::<WorldScheduler>()
            .schedule(0.0, guard, SubzoneEventKind::ArriveNode { node });
        subzone_tick(&mut world, 0.0);

        // Someone took damage - the fight resolved exactly once.
        let g_hp = world.get::<Health>(guard).unwrap().current;
        let r_hp = world.get::<Health>(raider).unwrap().current;
        assert!(g_hp < 100.0 || r_hp < 80.0);
    }
}
