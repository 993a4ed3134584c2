//! A* search over the occupancy grid.
//!
//! Only the first step of the best path is returned: the world changes every
//! tick, so NPCs re-plan from scratch each time they move.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use log::trace;

use arena_shared::{step_cost, Cell, ALL_DIRS, ORTHOGONAL_DIRS};

use super::Walkability;

/// Costs are compared in millionths of a cell so that paths of equal length
/// built from different sums of sqrt(2) still tie exactly
fn quantize(cost: f64) -> i64 {
    (cost * 1_000_000.0).round() as i64
}

/// An entry in the open list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct OpenNode {
    f: i64,
    g: i64,
    /// The step into this cell was diagonal
    diagonal: bool,
    cell: Cell,
}

impl Ord for OpenNode {
    // Reversed on every key: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.diagonal.cmp(&self.diagonal))
            .then_with(|| other.cell.cmp(&self.cell))
    }
}

impl PartialOrd for OpenNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Find the next cell on the cheapest path from `from` toward `to`.
///
/// When `to` itself cannot be entered (usually because the target stands
/// on it) every walkable neighbour of `to` becomes a goal instead. Returns
/// `None` when already at the goal, when no path exists, or when the search
/// expands more than `budget` nodes.
pub fn find_step(
    from: Cell,
    to: Cell,
    walk: &Walkability<'_>,
    force_orthogonal: bool,
    budget: usize,
) -> Option<Cell> {
    if from == to {
        return None;
    }

    let dirs: &[(i32, i32)] = if force_orthogonal { &ORTHOGONAL_DIRS } else { &ALL_DIRS };

    let goals: Vec<Cell> = if walk.is_walkable(to) {
        vec![to]
    } else {
        if from.is_adjacent(to, force_orthogonal) {
            return None;
        }
        dirs.iter()
            .map(|&(dx, dy)| to.offset(dx, dy))
            .filter(|c| walk.is_walkable(*c))
            .collect()
    };
    if goals.is_empty() {
        trace!("[ASTAR] {} -> {}: no walkable goal", from, to);
        return None;
    }

    let heuristic = |cell: Cell| -> f64 {
        goals
            .iter()
            .map(|g| cell.octile_distance(*g))
            .fold(f64::INFINITY, f64::min)
    };

    let mut open = BinaryHeap::new();
    let mut best_g: HashMap<Cell, f64> = HashMap::new();
    let mut came_from: HashMap<Cell, Cell> = HashMap::new();
    let mut closed: HashSet<Cell> = HashSet::new();

    open.push(OpenNode { f: quantize(heuristic(from)), g: 0, diagonal: false, cell: from });
    best_g.insert(from, 0.0);

    let mut expanded = 0usize;

    while let Some(node) = open.pop() {
        if closed.contains(&node.cell) {
            continue;
        }
        if goals.contains(&node.cell) {
            return first_step(&came_from, from, node.cell);
        }

        closed.insert(node.cell);
        expanded += 1;
        if expanded > budget {
            trace!("[ASTAR] {} -> {}: gave up after {} nodes", from, to, budget);
            return None;
        }

        let g_here = best_g.get(&node.cell).copied().unwrap_or(0.0);
        for &(dx, dy) in dirs {
            let next = node.cell.offset(dx, dy);
            if closed.contains(&next) || !walk.is_walkable(next) {
                continue;
            }
            let g = g_here + step_cost(dx, dy);
            if best_g.get(&next).map_or(false, |&old| quantize(old) <= quantize(g)) {
                continue;
            }
            best_g.insert(next, g);
            came_from.insert(next, node.cell);
            open.push(OpenNode {
                f: quantize(g + heuristic(next)),
                g: quantize(g),
                diagonal: dx != 0 && dy != 0,
                cell: next,
            });
        }
    }

    trace!("[ASTAR] {} -> {}: unreachable", from, to);
    None
}

/// Walk the parent links back from `goal` to the cell right after `from`
fn first_step(came_from: &HashMap<Cell, Cell>, from: Cell, goal: Cell) -> Option<Cell> {
    let mut current = goal;
    while let Some(&parent) = came_from.get(&current) {
        if parent == from {
            return Some(current);
        }
        current = parent;
    }
    None
}
