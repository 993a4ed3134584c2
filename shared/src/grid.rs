//! Grid math shared by movement validation, occupancy and pathfinding.
//!
//! The world is continuous; the grid is a lattice of square cells of
//! `size` world units. A cell's world-space center sits at
//! `(cell + center_offset) * size` on each axis.

use serde::{Deserialize, Serialize};
use crate::entities::Vec2;

pub const SQRT_2: f64 = std::f64::consts::SQRT_2;

/// The four orthogonal step directions, in search order
pub const ORTHOGONAL_DIRS: [(i32, i32); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

/// The four diagonal step directions, in search order
pub const DIAGONAL_DIRS: [(i32, i32); 4] = [(1, 1), (1, -1), (-1, 1), (-1, -1)];

/// All eight step directions, orthogonal first
pub const ALL_DIRS: [(i32, i32); 8] = [
    (1, 0), (-1, 0), (0, 1), (0, -1),
    (1, 1), (1, -1), (-1, 1), (-1, -1),
];

/// Integer cell coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Neighbouring cell; saturates at the edge of the coordinate range
    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self { x: self.x.saturating_add(dx), y: self.y.saturating_add(dy) }
    }

    /// Per-axis absolute differences, widened so no coordinate pair overflows
    fn abs_delta(&self, other: Cell) -> (i64, i64) {
        (
            (i64::from(self.x) - i64::from(other.x)).abs(),
            (i64::from(self.y) - i64::from(other.y)).abs(),
        )
    }

    /// Octile distance: the exact shortest-path cost on an open 8-connected
    /// grid with orthogonal cost 1 and diagonal cost sqrt(2)
    pub fn octile_distance(&self, other: Cell) -> f64 {
        let (dx, dy) = self.abs_delta(other);
        let (dx, dy) = (dx as f64, dy as f64);
        let (lo, hi) = if dx < dy { (dx, dy) } else { (dy, dx) };
        SQRT_2 * lo + (hi - lo)
    }

    /// Chebyshev distance (king moves), saturating at `i32::MAX`
    pub fn chebyshev_distance(&self, other: Cell) -> i32 {
        let (dx, dy) = self.abs_delta(other);
        i32::try_from(dx.max(dy)).unwrap_or(i32::MAX)
    }

    /// Whether `other` is one of the 8 (or 4) cells around this one
    pub fn is_adjacent(&self, other: Cell, orthogonal_only: bool) -> bool {
        let (dx, dy) = self.abs_delta(other);
        if orthogonal_only {
            dx + dy == 1
        } else {
            dx.max(dy) == 1
        }
    }

    /// Whether the two cells share a row or a column
    pub fn is_aligned_with(&self, other: Cell) -> bool {
        self.x == other.x || self.y == other.y
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cost of a single step in the given direction
pub fn step_cost(dx: i32, dy: i32) -> f64 {
    if dx != 0 && dy != 0 { SQRT_2 } else { 1.0 }
}

/// Round a direction vector to the nearest of the 8 grid steps.
/// Returns `(0, 0)` for a zero vector.
pub fn direction_to_step(dir: Vec2) -> (i32, i32) {
    if dir.length_squared() < 1e-12 {
        return (0, 0);
    }
    // Split the circle into 8 sectors of 45 degrees centered on each step
    let angle = dir.y.atan2(dir.x);
    let sector = (angle / std::f64::consts::FRAC_PI_4).round() as i32;
    match sector.rem_euclid(8) {
        0 => (1, 0),
        1 => (1, 1),
        2 => (0, 1),
        3 => (-1, 1),
        4 => (-1, 0),
        5 => (-1, -1),
        6 => (0, -1),
        _ => (1, -1),
    }
}

/// Rotate a grid step by `eighths` sectors of 45 degrees, in the same sector
/// order `direction_to_step` uses
pub fn rotate_step(step: (i32, i32), eighths: i32) -> (i32, i32) {
    const RING: [(i32, i32); 8] = [
        (1, 0), (1, 1), (0, 1), (-1, 1),
        (-1, 0), (-1, -1), (0, -1), (1, -1),
    ];
    match RING.iter().position(|s| *s == step) {
        Some(i) => RING[(i as i32 + eighths).rem_euclid(8) as usize],
        None => step,
    }
}

/// Grid dimensions used for converting between world and cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// Cell edge length in world units
    pub size: f64,
    /// Offset of the cell center, in cells
    pub center_offset: f64,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { size: 32.0, center_offset: 0.5 }
    }
}

impl GridSpec {
    pub fn new(size: f64, center_offset: f64) -> Self {
        Self { size, center_offset }
    }

    fn axis_to_cell(&self, v: f64) -> i32 {
        // floor(x + 0.5) rounds halves up on both sides of zero
        ((v / self.size) - self.center_offset + 0.5).floor() as i32
    }

    fn cell_to_axis(&self, c: i32) -> f64 {
        (c as f64 + self.center_offset) * self.size
    }

    pub fn world_to_cell(&self, pos: Vec2) -> Cell {
        Cell::new(self.axis_to_cell(pos.x), self.axis_to_cell(pos.y))
    }

    /// World-space center of a cell
    pub fn cell_to_world(&self, cell: Cell) -> Vec2 {
        Vec2::new(self.cell_to_axis(cell.x), self.cell_to_axis(cell.y))
    }
}
