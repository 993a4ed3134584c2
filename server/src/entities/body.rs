//! Kinematic state shared by players and NPCs.

use arena_shared::{Cell, GridSpec, Vec2};

/// Position, motion and facing of an entity
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub position: Vec2,
    /// Derived from the last committed displacement
    pub velocity: Vec2,
    /// Unit vector
    pub facing: Vec2,
    pub moving: bool,
    pub in_combat: bool,
    /// Timestamp of the last committed position
    pub last_update: f64,
}

impl Body {
    pub fn new(position: Vec2, now: f64) -> Self {
        Self {
            position,
            velocity: Vec2::ZERO,
            facing: Vec2::new(0.0, 1.0),
            moving: false,
            in_combat: false,
            last_update: now,
        }
    }

    pub fn cell(&self, grid: &GridSpec) -> Cell {
        grid.world_to_cell(self.position)
    }

    /// Turn to face along `dir`; a zero vector leaves the facing unchanged
    pub fn face(&mut self, dir: Vec2) {
        let unit = dir.normalized();
        if unit != Vec2::ZERO {
            self.facing = unit;
        }
    }
}
