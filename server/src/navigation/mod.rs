//! Navigation for server-side NPC movement.
//!
//! This module provides:
//! - The per-tick occupancy snapshot of every live entity's cell
//! - Walkability queries combining occupancy and static terrain
//! - A* pathfinding that yields the next cell to step into

mod astar;

pub use astar::find_step;

use std::collections::HashSet;

use arena_shared::Cell;

use crate::config::BlockedCells;
use crate::world::World;

// ============================================================================
// Occupancy
// ============================================================================

/// Cells held by players and NPCs at the start of a tick
#[derive(Debug, Clone, Default)]
pub struct Occupancy {
    cells: HashSet<Cell>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from every live entity in the world
    pub fn snapshot(world: &World) -> Self {
        let grid = world.grid();
        let cells = world
            .players()
            .map(|p| p.body.cell(grid))
            .chain(world.npcs().map(|n| n.body.cell(grid)))
            .collect();
        Self { cells }
    }

    pub fn from_cells<I: IntoIterator<Item = Cell>>(cells: I) -> Self {
        Self { cells: cells.into_iter().collect() }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

// ============================================================================
// Walkability
// ============================================================================

/// What one mover may step into this tick
#[derive(Debug, Clone, Copy)]
pub struct Walkability<'a> {
    pub occupancy: &'a Occupancy,
    pub blocked: &'a BlockedCells,
    /// The mover's own cell, which is never a destination
    pub mover: Cell,
}

impl<'a> Walkability<'a> {
    pub fn new(occupancy: &'a Occupancy, blocked: &'a BlockedCells, mover: Cell) -> Self {
        Self { occupancy, blocked, mover }
    }

    pub fn is_walkable(&self, cell: Cell) -> bool {
        cell != self.mover && !self.blocked.contains(cell) && !self.occupancy.contains(cell)
    }
}
