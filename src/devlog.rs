//! Structured AI / system event log.
//!
//! A ring-buffer resource recording timestamped actions: FSM transitions,
//! attacks, faction flips, errors. Read by external dev tooling to show a
//! live feed of what every NPC is doing and why. Category and entity
//! filters let the tooling pre-filter at record time instead of paying
//! for entries it will never display.

use crate::world::display_name;
use bevy_ecs::prelude::*;
use std::collections::{HashSet, VecDeque};

/// One recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct DevLogEntry {
    pub t: f32,
    pub eid: Entity,
    pub name: String,
    pub cat: String,
    pub msg: String,
}

/// Ring buffer of AI / system events.
#[derive(Resource, Debug)]
pub struct DevLog {
    entries: VecDeque<DevLogEntry>,
    max_entries: usize,
    paused: bool,
    /// If non-empty, only these categories are kept.
    pub cat_filter: HashSet<String>,
    /// If non-empty, only these entities are kept.
    pub eid_filter: HashSet<Entity>,
}

impl Default for DevLog {
    fn default() -> Self {
        Self {
            entries: VecDeque::new(),
            max_entries: 500,
            paused: false,
            cat_filter: HashSet::new(),
            eid_filter: HashSet::new(),
        }
    }
}

impl DevLog {
    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            max_entries,
            ..Default::default()
        }
    }

    pub fn record(&mut self, eid: Entity, cat: &str, msg: String, name: String, t: f32) {
        if self.paused {
            return;
        }
        if !self.cat_filter.is_empty() && !self.cat_filter.contains(cat) {
            return;
        }
        if !self.eid_filter.is_empty() && !self.eid_filter.contains(&eid) {
            return;
        }
        self.entries.push_back(DevLogEntry {
            t,
            eid,
            name,
            cat: cat.to_string(),
            msg,
        });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<&DevLogEntry> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).collect()
    }

    /// Last `n` entries for one entity.
    pub fn for_eid(&self, eid: Entity, n: usize) -> Vec<&DevLogEntry> {
        let all: Vec<&DevLogEntry> = self.entries.iter().filter(|e| e.eid == eid).collect();
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).collect()
    }

    /// Last `n` entries in one category.
    pub fn for_cat(&self, cat: &str, n: usize) -> Vec<&DevLogEntry> {
        let all: Vec<&DevLogEntry> = self.entries.iter().filter(|e| e.cat == cat).collect();
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).collect()
    }
}

/// Record helper for systems holding `&mut World`. No-op when the DevLog
/// resource is absent (headless tests that don't care about the feed).
pub fn dev_log(world: &mut World, eid: Entity, cat: &str, msg: impl Into<String>, t: f32) {
    let name = display_name(world, eid);
    if let Some(mut log) = world.get_resource_mut::<DevLog>() {
        log.record(eid, cat, msg.into(), name, t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(log: &mut DevLog, eid: u32, cat: &str, msg: &str, t: f32) {
        log.record(
            Entity::from_raw(eid),
            cat,
            msg.to_string(),
            format!("e{eid}"),
            t,
        );
    }

    #[test]
    fn test_ring_buffer_caps_entries() {
        let mut log = DevLog::with_capacity(3);
        for i in 0..5 {
            entry(&mut log, 1, "combat", &format!("m{i}"), i as f32);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.recent(10)[0].msg, "m2");
    }

    #[test]
    fn test_filters_drop_at_record_time() {
        let mut log = DevLog::default();
        log.cat_filter.insert("attack".to_string());
        entry(&mut log, 1, "combat", "ignored", 0.0);
        entry(&mut log, 1, "attack", "kept", 0.0);
        assert_eq!(log.len(), 1);
        assert_eq!(log.recent(1)[0].cat, "attack");
    }

    #[test]
    fn test_per_entity_and_category_views() {
        let mut log = DevLog::default();
        entry(&mut log, 1, "combat", "a", 0.0);
        entry(&mut log, 2, "combat", "b", 0.1);
        entry(&mut log, 1, "attack", "c", 0.2);
        assert_eq!(log.for_eid(Entity::from_raw(1), 10).len(), 2);
        assert_eq!(log.for_cat("combat", 10).len(), 2);
        assert_eq!(log.for_cat("attack", 1)[0].msg, "c");
    }

    #[test]
    fn test_pause_suppresses_recording() {
        let mut log = DevLog::default();
        log.pause();
        entry(&mut log, 1, "combat", "lost", 0.0);
        assert!(log.is_empty());
        log.resume();
        entry(&mut log, 1, "combat", "kept", 0.0);
        assert_eq!(log.len(), 1);
    }
}
