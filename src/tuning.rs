//! Data-driven tuning constants.
//!
//! Every gameplay magic number - FSM thresholds, movement multipliers,
//! alert radii, particle presets - lives in `data/tuning.toml` and is read
//! through this resource. Missing keys fall back to the hard-coded default
//! passed at the call site, so the simulation runs fine with no file at
//! all. Hot-reload is an atomic swap of the stored table.

use bevy_ecs::prelude::*;

/// Keyed scalar store backed by a TOML table. Sections use dot-paths,
/// e.g. `get_f32("combat.engagement", "los_blocked_patience", 3.0)` looks
/// up `[combat.engagement]`.
#[derive(Resource, Debug, Default)]
pub struct Tuning {
    root: toml::Table,
}

impl Tuning {
    pub fn from_str(content: &str) -> Result<Self, toml::de::Error> {
        Ok(Self {
            root: content.parse()?,
        })
    }

    /// Hot-reload: replace the whole table.
    pub fn replace(&mut self, content: &str) -> Result<(), toml::de::Error> {
        self.root = content.parse()?;
        tracing::info!(target: "tuning", leaves = count_leaves(&self.root), "tuning reloaded");
        Ok(())
    }

    fn node(&self, section: &str) -> Option<&toml::Table> {
        let mut node = &self.root;
        for part in section.split('.') {
            node = node.get(part)?.as_table()?;
        }
        Some(node)
    }

    pub fn get_f32(&self, section: &str, key: &str, default: f32) -> f32 {
        self.node(section)
            .and_then(|t| t.get(key))
            .and_then(|v| {
                v.as_float()
                    .map(|f| f as f32)
                    .or_else(|| v.as_integer().map(|i| i as f32))
            })
            .unwrap_or(default)
    }

    pub fn get_i64(&self, section: &str, key: &str, default: i64) -> i64 {
        self.node(section)
            .and_then(|t| t.get(key))
            .and_then(|v| v.as_integer())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.node(section)
            .and_then(|t| t.get(key))
            .and_then(|v| v.as_bool())
            .unwrap_or(default)
    }

    /// Shallow copy of an entire section, or an empty table.
    pub fn section(&self, section_path: &str) -> toml::Table {
        self.node(section_path).cloned().unwrap_or_default()
    }
}

fn count_leaves(t: &toml::Table) -> usize {
    t.values()
        .map(|v| match v.as_table() {
            Some(sub) => count_leaves(sub),
            None => 1,
        })
        .sum()
}

/// Call-site helper so systems holding `&mut World` can read a value in
/// one expression without keeping a resource borrow alive.
pub fn tun(world: &World, section: &str, key: &str, default: f32) -> f32 {
    world
        .get_resource::<Tuning>()
        .map_or(default, |t| t.get_f32(section, key, default))
}

pub fn tun_i64(world: &World, section: &str, key: &str, default: i64) -> i64 {
    world
        .get_resource::<Tuning>()
        .map_or(default, |t| t.get_i64(section, key, default))
}

pub fn tun_bool(world: &World, section: &str, key: &str, default: bool) -> bool {
    world
        .get_resource::<Tuning>()
        .map_or(default, |t| t.get_bool(section, key, default))
}
