//! Zone tile maps, collision primitives, line of sight, and portals.
//!
//! A zone is a named 2-D grid of tile IDs. Zone names are interned to a
//! small copyable [`ZoneId`] so components never carry strings; the
//! [`ZoneMaps`] resource owns the name table and the grids.
//!
//! Collision and LOS live here (not in `systems/`) because both the
//! engine layer (safe-spawn resolution) and gameplay systems (movement,
//! projectiles, perception) need them.

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// TILE IDS (persisted in zone files - must not change)
// ============================================================================

pub const TILE_VOID: u8 = 0;
pub const TILE_GRASS: u8 = 1;
pub const TILE_DIRT: u8 = 2;
pub const TILE_STONE: u8 = 3;
pub const TILE_WATER: u8 = 4;
pub const TILE_WOOD_FLOOR: u8 = 5;
pub const TILE_WALL: u8 = 6;
pub const TILE_TELEPORTER: u8 = 9;

/// Canonical entity hitbox (tile units), placed with a 0.1-tile inset.
pub const HITBOX_W: f32 = 0.8;
pub const HITBOX_H: f32 = 0.8;

/// Inset that centers the canonical hitbox inside a tile.
pub const HITBOX_INSET: f32 = (1.0 - HITBOX_W) / 2.0;

// ============================================================================
// ZONE IDENTITY
// ============================================================================

/// Interned zone identifier. Stable for the lifetime of a [`ZoneMaps`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ZoneId(pub u32);

// ============================================================================
// TILE GRID
// ============================================================================

/// Where a teleporter tile sends you.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Teleporter {
    pub row: i32,
    pub col: i32,
    pub target_zone: String,
    /// Explicit landing tile in the target zone, if recorded.
    pub target_tile: Option<(i32, i32)>,
}

/// One zone's tile data (row-major).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    pub width: u32,
    pub height: u32,
    pub tiles: Vec<u8>,
    pub anchor: Option<(f64, f64)>,
    pub teleporters: Vec<Teleporter>,
}

impl TileGrid {
    pub fn new(width: u32, height: u32, fill: u8) -> Self {
        Self {
            width,
            height,
            tiles: vec![fill; (width * height) as usize],
            anchor: None,
            teleporters: Vec::new(),
        }
    }

    /// Build from row-major rows (test helper; rows must be equal length).
    pub fn from_rows(rows: &[Vec<u8>]) -> Self {
        let height = rows.len() as u32;
        let width = rows.first().map_or(0, |r| r.len()) as u32;
        let mut tiles = Vec::with_capacity((width * height) as usize);
        for row in rows {
            tiles.extend_from_slice(row);
        }
        Self {
            width,
            height,
            tiles,
            anchor: None,
            teleporters: Vec::new(),
        }
    }

    #[inline]
    pub fn tile(&self, row: i32, col: i32) -> Option<u8> {
        if row < 0 || col < 0 || row >= self.height as i32 || col >= self.width as i32 {
            return None;
        }
        Some(self.tiles[(row as u32 * self.width + col as u32) as usize])
    }

    #[inline]
    pub fn set_tile(&mut self, row: i32, col: i32, id: u8) {
        if row >= 0 && col >= 0 && row < self.height as i32 && col < self.width as i32 {
            self.tiles[(row as u32 * self.width + col as u32) as usize] = id;
        }
    }

    /// Fill the outer border with walls (arena helper for tests/demos).
    pub fn wall_border(&mut self) {
        let (w, h) = (self.width as i32, self.height as i32);
        for c in 0..w {
            self.set_tile(0, c, TILE_WALL);
            self.set_tile(h - 1, c, TILE_WALL);
        }
        for r in 0..h {
            self.set_tile(r, 0, TILE_WALL);
            self.set_tile(r, w - 1, TILE_WALL);
        }
    }

    /// AABB-vs-wall test. The box spans `(x, y)..(x + bw, y + bh)` in tile
    /// coordinates; out-of-bounds counts as a wall.
    pub fn aabb_hits_wall(&self, x: f32, y: f32, bw: f32, bh: f32) -> bool {
        let min_c = x.floor() as i32;
        let max_c = (x + bw - 0.001).floor() as i32;
        let min_r = y.floor() as i32;
        let max_r = (y + bh - 0.001).floor() as i32;
        for r in min_r..=max_r {
            for c in min_c..=max_c {
                match self.tile(r, c) {
                    None => return true,
                    Some(TILE_WALL) => return true,
                    Some(_) => {}
                }
            }
        }
        false
    }

    /// Single-tile passability (only walls and out-of-bounds block).
    #[inline]
    pub fn is_passable(&self, x: f32, y: f32) -> bool {
        matches!(self.tile(y.floor() as i32, x.floor() as i32), Some(t) if t != TILE_WALL)
    }

    /// DDA grid walk from (x1, y1) to (x2, y2), ~2.5 samples per tile.
    /// Returns false on the first wall or out-of-bounds tile encountered.
    pub fn has_line_of_sight(&self, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        let dx = x2 - x1;
        let dy = y2 - y1;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < 0.01 {
            return true;
        }
        let steps = (dist * 2.5) as i32 + 1;
        let sx = dx / steps as f32;
        let sy = dy / steps as f32;

        let (mut cx, mut cy) = (x1, y1);
        let (mut prev_c, mut prev_r) = (i32::MIN, i32::MIN);
        for _ in 0..=steps {
            let c = cx.floor() as i32;
            let r = cy.floor() as i32;
            if c != prev_c || r != prev_r {
                match self.tile(r, c) {
                    None => return false,
                    Some(TILE_WALL) => return false,
                    Some(_) => {}
                }
                prev_c = c;
                prev_r = r;
            }
            cx += sx;
            cy += sy;
        }
        true
    }

    /// Return an `(x, y)` position near tile `(row, col)` where the
    /// canonical hitbox does not overlap a wall. Expanding ring search.
    pub fn find_safe_spawn(&self, row: f32, col: f32) -> (f32, f32) {
        let (x0, y0) = (col + HITBOX_INSET, row + HITBOX_INSET);
        if !self.aabb_hits_wall(x0, y0, HITBOX_W, HITBOX_H) {
            return (x0, y0);
        }
        for radius in 1..6i32 {
            for dr in -radius..=radius {
                for dc in -radius..=radius {
                    if dr.abs() != radius && dc.abs() != radius {
                        continue;
                    }
                    let tx = col + dc as f32 + HITBOX_INSET;
                    let ty = row + dr as f32 + HITBOX_INSET;
                    if tx < 0.0 || ty < 0.0 {
                        continue;
                    }
                    if !self.aabb_hits_wall(tx, ty, HITBOX_W, HITBOX_H) {
                        return (tx, ty);
                    }
                }
            }
        }
        (x0, y0)
    }
}

// ============================================================================
// ZONE MAP RESOURCE
// ============================================================================

/// All loaded zones: name interning plus the tile grids.
#[derive(Resource, Debug, Default)]
pub struct ZoneMaps {
    names: Vec<String>,
    by_name: BTreeMap<String, ZoneId>,
    grids: Vec<Option<TileGrid>>,
}

impl ZoneMaps {
    /// Intern a zone name, returning its stable id. The grid may be
    /// attached later with [`ZoneMaps::insert`].
    pub fn intern(&mut self, name: &str) -> ZoneId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = ZoneId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        self.grids.push(None);
        id
    }

    pub fn insert(&mut self, name: &str, grid: TileGrid) -> ZoneId {
        let id = self.intern(name);
        self.grids[id.0 as usize] = Some(grid);
        id
    }

    pub fn id(&self, name: &str) -> Option<ZoneId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: ZoneId) -> &str {
        self.names.get(id.0 as usize).map_or("", |s| s.as_str())
    }

    pub fn grid(&self, id: ZoneId) -> Option<&TileGrid> {
        self.grids.get(id.0 as usize).and_then(|g| g.as_ref())
    }

    pub fn grid_mut(&mut self, id: ZoneId) -> Option<&mut TileGrid> {
        self.grids.get_mut(id.0 as usize).and_then(|g| g.as_mut())
    }

    pub fn zone_count(&self) -> usize {
        self.names.len()
    }

    /// Passability with the "no map loaded" fallback: an unloaded zone is
    /// treated as open ground so off-map logic keeps running.
    pub fn is_passable(&self, zone: ZoneId, x: f32, y: f32) -> bool {
        match self.grid(zone) {
            Some(g) => g.is_passable(x, y),
            None => true,
        }
    }

    pub fn has_line_of_sight(&self, zone: ZoneId, x1: f32, y1: f32, x2: f32, y2: f32) -> bool {
        match self.grid(zone) {
            Some(g) => g.has_line_of_sight(x1, y1, x2, y2),
            None => true,
        }
    }
}

// ============================================================================
// PORTALS
// ============================================================================

/// One endpoint of a bidirectional portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortalSide {
    pub zone: String,
    /// Teleporter tile positions `(row, col)` in this zone.
    pub tiles: Vec<(i32, i32)>,
    /// `(row, col)` landing position when arriving on this side.
    pub spawn: (f32, f32),
    /// Linked subzone graph node id.
    pub subzone: String,
}

/// Bidirectional interzone connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub id: String,
    pub side_a: PortalSide,
    pub side_b: PortalSide,
}

impl Portal {
    /// Return `(this_side, other_side)` relative to `zone`.
    pub fn sides_for(&self, zone: &str) -> (&PortalSide, &PortalSide) {
        if self.side_a.zone == zone {
            (&self.side_a, &self.side_b)
        } else {
            (&self.side_b, &self.side_a)
        }
    }
}

/// All loaded portals plus a tile lookup per zone.
#[derive(Resource, Debug, Default)]
pub struct ZonePortals {
    pub portals: Vec<Portal>,
    /// zone name -> tile -> (target zone, spawn row, spawn col, portal id)
    lookup: BTreeMap<String, BTreeMap<(i32, i32), (String, f32, f32, String)>>,
}

impl ZonePortals {
    /// Parse `data/portals.toml` content (repeated `[[portal]]` tables).
    pub fn load_str(&mut self, content: &str) -> Result<usize, crate::nbt::ZoneIoError> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| crate::nbt::ZoneIoError::Parse {
                what: "portals.toml",
                detail: e.to_string(),
            })?;
        self.portals.clear();
        self.lookup.clear();

        let Some(list) = table.get("portal").and_then(|v| v.as_array()) else {
            return Ok(0);
        };
        for p in list {
            let Some(p) = p.as_table() else { continue };
            let portal = Portal {
                id: str_field(p, "id"),
                side_a: PortalSide {
                    zone: str_field(p, "zone_a"),
                    tiles: tile_list(p, "tiles_a"),
                    spawn: spawn_field(p, "spawn_a"),
                    subzone: str_field(p, "subzone_a"),
                },
                side_b: PortalSide {
                    zone: str_field(p, "zone_b"),
                    tiles: tile_list(p, "tiles_b"),
                    spawn: spawn_field(p, "spawn_b"),
                    subzone: str_field(p, "subzone_b"),
                },
            };
            self.index_portal(&portal);
            self.portals.push(portal);
        }
        tracing::info!(target: "zone", count = self.portals.len(), "portals loaded");
        Ok(self.portals.len())
    }

    fn index_portal(&mut self, portal: &Portal) {
        for (side, other) in [
            (&portal.side_a, &portal.side_b),
            (&portal.side_b, &portal.side_a),
        ] {
            let zone_map = self.lookup.entry(side.zone.clone()).or_default();
            for &(r, c) in &side.tiles {
                zone_map.insert(
                    (r, c),
                    (other.zone.clone(), other.spawn.0, other.spawn.1, portal.id.clone()),
                );
            }
        }
    }

    /// Portal that owns tile `(r, c)` in `zone`, or None.
    pub fn portal_for_tile(&self, zone: &str, r: i32, c: i32) -> Option<&Portal> {
        self.portals.iter().find(|p| {
            (p.side_a.zone == zone && p.side_a.tiles.contains(&(r, c)))
                || (p.side_b.zone == zone && p.side_b.tiles.contains(&(r, c)))
        })
    }

    /// Destination of stepping on tile `(r, c)` in `zone`:
    /// `(target zone, spawn row, spawn col, portal id)`.
    pub fn destination(&self, zone: &str, r: i32, c: i32) -> Option<&(String, f32, f32, String)> {
        self.lookup.get(zone).and_then(|m| m.get(&(r, c)))
    }
}

fn str_field(t: &toml::Table, key: &str) -> String {
    t.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string()
}

fn tile_list(t: &toml::Table, key: &str) -> Vec<(i32, i32)> {
    let mut out = Vec::new();
    if let Some(arr) = t.get(key).and_then(|v| v.as_array()) {
        for pair in arr {
            if let Some(pair) = pair.as_array() {
                if let (Some(r), Some(c)) = (
                    pair.first().and_then(|v| v.as_integer()),
                    pair.get(1).and_then(|v| v.as_integer()),
                ) {
                    out.push((r as i32, c as i32));
                }
            }
        }
    }
    out
}

fn spawn_field(t: &toml::Table, key: &str) -> (f32, f32) {
    if let Some(arr) = t.get(key).and_then(|v| v.as_array()) {
        let r = arr.first().and_then(toml_num).unwrap_or(0.0);
        let c = arr.get(1).and_then(toml_num).unwrap_or(0.0);
        return (r, c);
    }
    (0.0, 0.0)
}

fn toml_num(v: &toml::Value) -> Option<f32> {
    v.as_float()
        .map(|f| f as f32)
        .or_else(|| v.as_integer().map(|i| i as f32))
}
