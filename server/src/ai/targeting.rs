//! Target selection.
//!
//! Distances are Chebyshev distances between cells. Equidistant candidates
//! resolve to the lowest player id, which falls out of the world's ordered
//! player table.

use arena_shared::Cell;

use crate::world::World;

/// A player the NPC can see
#[derive(Debug, Clone, PartialEq)]
pub struct Sighting {
    pub id: String,
    pub cell: Cell,
    pub distance: i32,
}

/// Where an eligible player stands, if it exists and is alive
pub fn sight(world: &World, from: Cell, id: &str) -> Option<Sighting> {
    let player = world.get_player(id)?;
    if !world.is_alive(id) {
        return None;
    }
    let cell = player.body.cell(world.grid());
    Some(Sighting { id: id.to_string(), cell, distance: from.chebyshev_distance(cell) })
}

/// The nearest living player within `range` cells
pub fn nearest(world: &World, from: Cell, range: i32) -> Option<Sighting> {
    let mut best: Option<Sighting> = None;
    for player in world.players() {
        let Some(seen) = sight(world, from, &player.id) else {
            continue;
        };
        if seen.distance > range {
            continue;
        }
        if best.as_ref().map_or(true, |b| seen.distance < b.distance) {
            best = Some(seen);
        }
    }
    best
}

/// Keep the current target while it is alive and within `lose_range`,
/// otherwise fall back to the nearest player within that range
pub fn keep_or_pick(world: &World, from: Cell, current: Option<&str>, lose_range: i32) -> Option<Sighting> {
    current
        .and_then(|id| sight(world, from, id))
        .filter(|s| s.distance <= lose_range)
        .or_else(|| nearest(world, from, lose_range))
}
