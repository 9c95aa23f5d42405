//! Grid A* over wall-impassable tiles.
//!
//! Paths are meant to be computed rarely: callers cache the result in
//! brain state ([`PathCache`]) and re-plan only when the goal drifts,
//! the cache expires, or the next step turns out to be blocked.

use crate::zone::{TileGrid, HITBOX_INSET};
use pathfinding::prelude::astar;

/// How far the goal may drift (tiles) before a cached path is replanned.
const GOAL_DRIFT: f32 = 2.0;

/// Cached path age limit in seconds.
const PATH_MAX_AGE: f32 = 1.5;

/// A cached A* path with a follow cursor.
#[derive(Debug, Clone, Default)]
pub struct PathCache {
    pub waypoints: Vec<(f32, f32)>,
    pub next: usize,
    pub goal: (f32, f32),
    pub computed_at: f32,
}

impl PathCache {
    /// Whether the cache must be recomputed for `goal` at `game_time`.
    pub fn is_stale(&self, goal: (f32, f32), game_time: f32) -> bool {
        if self.next >= self.waypoints.len() {
            return true;
        }
        if game_time - self.computed_at > PATH_MAX_AGE {
            return true;
        }
        let dx = goal.0 - self.goal.0;
        let dy = goal.1 - self.goal.1;
        dx * dx + dy * dy > GOAL_DRIFT * GOAL_DRIFT
    }

    pub fn store(&mut self, waypoints: Vec<(f32, f32)>, goal: (f32, f32), game_time: f32) {
        self.waypoints = waypoints;
        self.next = 0;
        self.goal = goal;
        self.computed_at = game_time;
    }

    /// Current waypoint to walk toward, consuming any already reached
    /// (within 1 tile). None when the path is exhausted.
    pub fn current_waypoint(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        while let Some(&(wx, wy)) = self.waypoints.get(self.next) {
            let dx = wx - x;
            let dy = wy - y;
            if dx * dx + dy * dy < 1.0 {
                self.next += 1;
            } else {
                return Some((wx, wy));
            }
        }
        None
    }

    pub fn clear(&mut self) {
        self.waypoints.clear();
        self.next = 0;
    }
}

/// A* from `(sx, sy)` to `(tx, ty)` in tile coordinates. Returns inset
/// tile-corner waypoints excluding the start tile, or empty when the
/// goal is unreachable.
pub fn find_path(grid: &TileGrid, sx: f32, sy: f32, tx: f32, ty: f32) -> Vec<(f32, f32)> {
    let start = (sy.floor() as i32, sx.floor() as i32);
    let mut goal = (ty.floor() as i32, tx.floor() as i32);

    if start == goal {
        return Vec::new();
    }

    // A wall goal (common when the target hugs a wall) retargets to the
    // passable neighbor closest to the start.
    if !passable(grid, goal) {
        let mut best: Option<((i32, i32), i32)> = None;
        for (dr, dc) in NEIGHBORS_8 {
            let cand = (goal.0 + dr, goal.1 + dc);
            if passable(grid, cand) {
                let d = (cand.0 - start.0).abs() + (cand.1 - start.1).abs();
                if best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((cand, d));
                }
            }
        }
        match best {
            Some((cand, _)) => goal = cand,
            None => return Vec::new(),
        }
    }

    let result = astar(
        &start,
        |&(r, c)| {
            NEIGHBORS_4
                .iter()
                .map(move |&(dr, dc)| (r + dr, c + dc))
                .filter(|&n| passable(grid, n))
                .map(|n| (n, 1u32))
                .collect::<Vec<_>>()
        },
        |&(r, c)| ((r - goal.0).abs() + (c - goal.1).abs()) as u32,
        |&n| n == goal,
    );

    match result {
        Some((tiles, _cost)) => tiles
            .into_iter()
            .skip(1)
            .map(|(r, c)| (c as f32 + HITBOX_INSET, r as f32 + HITBOX_INSET))
            .collect(),
        None => Vec::new(),
    }
}

const NEIGHBORS_4: [(i32, i32); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const NEIGHBORS_8: [(i32, i32); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

#[inline]
fn passable(grid: &TileGrid, (r, c): (i32, i32)) -> bool {
    matches!(grid.tile(r, c), Some(t) if t != crate::zone::TILE_WALL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zone::{TileGrid, TILE_GRASS, TILE_WALL};

    fn arena_with_wall() -> TileGrid {
        // 20x20 with a vertical wall at c=10, gap at r=1
        let mut g = TileGrid::new(20, 20, TILE_GRASS);
        for r in 2..20 {
            g.set_tile(r, 10, TILE_WALL);
        }
        g
    }

    #[test]
    fn test_path_routes_around_wall() {
        let g = arena_with_wall();
        let path = find_path(&g, 5.1, 10.1, 15.1, 10.1);
        assert!(!path.is_empty());
        // The path must pass through the gap row (r <= 1 => y < 2)
        assert!(path.iter().any(|&(_, y)| y < 2.0));
        // Last waypoint lands on the goal tile
        let (lx, ly) = *path.last().unwrap();
        assert_eq!(lx.floor() as i32, 15);
        assert_eq!(ly.floor() as i32, 10);
    }

    #[test]
    fn test_unreachable_returns_empty() {
        let mut g = TileGrid::new(10, 10, TILE_GRASS);
        // Seal off the right half completely
        for r in 0..10 {
            g.set_tile(r, 5, TILE_WALL);
        }
        assert!(find_path(&g, 2.0, 2.0, 8.0, 2.0).is_empty());
    }

    #[test]
    fn test_cache_staleness() {
        let mut cache = PathCache::default();
        cache.store(vec![(1.1, 1.1), (2.1, 1.1)], (2.0, 1.0), 10.0);
        assert!(!cache.is_stale((2.2, 1.0), 10.5));
        // Goal drifted too far
        assert!(cache.is_stale((8.0, 8.0), 10.5));
        // Aged out
        assert!(cache.is_stale((2.0, 1.0), 12.0));
    }

    #[test]
    fn test_cache_waypoint_consumption() {
        let mut cache = PathCache::default();
        cache.store(vec![(1.1, 1.1), (5.1, 1.1)], (5.0, 1.0), 0.0);
        // Standing on the first waypoint consumes it
        assert_eq!(cache.current_waypoint(1.2, 1.2), Some((5.1, 1.1)));
        assert_eq!(cache.next, 1);
        // Past the last waypoint -> None
        assert_eq!(cache.current_waypoint(5.2, 1.2), None);

        cache.clear();
        assert!(cache.is_stale((5.0, 1.0), 0.0));
    }
}
