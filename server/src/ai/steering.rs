//! Per-state movement and attack decisions.
//!
//! NPCs move one whole cell at a time, at most once per step interval, and
//! always land on a cell center. Every decision reads the occupancy snapshot
//! taken at the start of the tick.

use log::trace;
use rand::seq::SliceRandom;

use arena_shared::{direction_to_step, rotate_step, AiState, Cell, GridSpec, ServerEvent, Vec2, ALL_DIRS};

use crate::combat::{self, geometry::facing_ok};
use crate::config::NpcTuning;
use crate::entities::ServerNpc;
use crate::events::Outgoing;
use crate::navigation::{find_step, Occupancy, Walkability};
use crate::world::World;

use super::targeting::Sighting;

/// Fallback order when the direct retreat direction is blocked
const RETREAT_ROTATIONS: [i32; 5] = [0, 1, -1, 2, -2];

/// Everything a movement decision needs besides the NPC itself
pub struct StepContext<'a> {
    pub tuning: &'a NpcTuning,
    pub occupancy: &'a Occupancy,
    pub now: f64,
}

/// Carry out the current state's movement or attack for this tick
pub fn act(
    world: &mut World,
    npc: &mut ServerNpc,
    sighting: Option<&Sighting>,
    ctx: &StepContext<'_>,
    out: &mut Vec<Outgoing>,
) {
    match npc.ai.state() {
        AiState::Idle => halt(npc),
        AiState::Patrol => patrol(world, npc, ctx),
        AiState::Chase => match sighting {
            Some(seen) => chase(world, npc, seen, ctx),
            None => halt(npc),
        },
        AiState::Attack => match sighting {
            Some(seen) => attack(world, npc, seen, ctx, out),
            None => halt(npc),
        },
        AiState::Retreat => match sighting {
            Some(seen) => retreat(world, npc, seen, ctx),
            None => halt(npc),
        },
        AiState::Search => search(world, npc, ctx),
    }
}

fn ready_to_step(npc: &ServerNpc, ctx: &StepContext<'_>) -> bool {
    npc.ai.since_move(ctx.now) >= ctx.tuning.step_interval_secs
}

fn halt(npc: &mut ServerNpc) {
    npc.body.moving = false;
    npc.body.velocity = Vec2::ZERO;
}

/// Move into the neighbouring cell `next`
fn step_to(npc: &mut ServerNpc, next: Cell, grid: &GridSpec, ctx: &StepContext<'_>) {
    let destination = grid.cell_to_world(next);
    let displacement = destination - npc.body.position;
    let interval = ctx.tuning.step_interval_secs.max(f64::EPSILON);

    npc.body.face(displacement);
    npc.body.velocity = displacement * (1.0 / interval);
    npc.body.position = destination;
    npc.body.moving = true;
    npc.body.last_update = ctx.now;
    npc.ai.last_move_at = Some(ctx.now);
    trace!("[AI] {} stepped to {}", npc.id, next);
}

/// Path one step toward `goal`, or stand still if there is no way
fn path_toward(world: &World, npc: &mut ServerNpc, goal: Cell, orthogonal: bool, ctx: &StepContext<'_>) -> bool {
    let grid = *world.grid();
    let cell = npc.body.cell(&grid);
    let walk = Walkability::new(ctx.occupancy, world.blocked(), cell);
    match find_step(cell, goal, &walk, orthogonal, ctx.tuning.path_node_budget) {
        Some(next) => {
            step_to(npc, next, &grid, ctx);
            true
        }
        None => false,
    }
}

// =============================================================================
// Patrol
// =============================================================================

fn patrol(world: &World, npc: &mut ServerNpc, ctx: &StepContext<'_>) {
    let Some(&waypoint) = npc.patrol.points.get(npc.ai.patrol.index) else {
        halt(npc);
        return;
    };
    let cell = npc.body.cell(world.grid());
    let walk = Walkability::new(ctx.occupancy, world.blocked(), cell);
    // Someone standing on the waypoint: being next to it is close enough
    let reached = cell == waypoint || (!walk.is_walkable(waypoint) && cell.is_adjacent(waypoint, false));

    if reached {
        halt(npc);
        match npc.ai.patrol.wait_until {
            None => npc.ai.patrol.wait_until = Some(ctx.now + ctx.tuning.patrol_wait_secs),
            Some(until) if ctx.now >= until => advance_waypoint(npc),
            Some(_) => {}
        }
        return;
    }

    if ready_to_step(npc, ctx) && !path_toward(world, npc, waypoint, false, ctx) {
        halt(npc);
    }
}

fn advance_waypoint(npc: &mut ServerNpc) {
    let len = npc.patrol.points.len();
    let progress = &mut npc.ai.patrol;
    progress.wait_until = None;
    if progress.index + 1 < len {
        progress.index += 1;
    } else if npc.patrol.looping {
        progress.index = 0;
    } else {
        progress.done = true;
    }
}

// =============================================================================
// Chase
// =============================================================================

/// Scale for the velocity lead: zero on a shared row or column, growing
/// linearly to one at `band` cells off-axis
pub fn lead_damping(from: Cell, to: Cell, band: f64) -> f64 {
    let dx = (i64::from(to.x) - i64::from(from.x)).abs();
    let dy = (i64::from(to.y) - i64::from(from.y)).abs();
    if dx == 0 || dy == 0 {
        return 0.0;
    }
    if band <= 0.0 {
        return 1.0;
    }
    (dx.min(dy) as f64 / band).min(1.0)
}

fn chase(world: &World, npc: &mut ServerNpc, seen: &Sighting, ctx: &StepContext<'_>) {
    if !ready_to_step(npc, ctx) {
        return;
    }
    let Some(target) = world.get_player(&seen.id) else {
        halt(npc);
        return;
    };

    let grid = *world.grid();
    let cell = npc.body.cell(&grid);
    let aligned = cell.is_aligned_with(seen.cell);
    let damping = lead_damping(cell, seen.cell, ctx.tuning.chase_alignment_band);
    let lead = target.body.velocity * (ctx.tuning.chase_prediction_secs * damping);
    let predicted = grid.world_to_cell(target.body.position + lead);

    let moved = path_toward(world, npc, predicted, aligned, ctx)
        || (predicted != seen.cell && path_toward(world, npc, seen.cell, aligned, ctx));
    if !moved {
        halt(npc);
    }
}

// =============================================================================
// Attack
// =============================================================================

fn attack(world: &World, npc: &mut ServerNpc, seen: &Sighting, ctx: &StepContext<'_>, out: &mut Vec<Outgoing>) {
    if npc.ai.pending_windup().is_some() {
        return;
    }
    let Some(target) = world.get_player(&seen.id) else {
        halt(npc);
        return;
    };

    if !combat::npc_in_reach(world, npc, &seen.id) {
        if ready_to_step(npc, ctx) && !path_toward(world, npc, seen.cell, false, ctx) {
            halt(npc);
        }
        return;
    }

    halt(npc);
    let target_pos = target.body.position;
    if !facing_ok(npc.body.facing, npc.body.position, target_pos, ctx.tuning.facing_dot_threshold) {
        // Turning takes the whole tick
        npc.body.face(target_pos - npc.body.position);
        return;
    }
    if npc.ai.since_attack(ctx.now) < ctx.tuning.attack_cooldown_secs
        || npc.ai.since_move(ctx.now) < ctx.tuning.post_move_attack_delay_secs
    {
        return;
    }

    let windup = ctx.tuning.attack_windup_secs;
    let attack_id = npc.ai.begin_windup(&npc.id, &seen.id, ctx.now, windup);
    trace!("[AI] {} winds up {} at {}", npc.id, attack_id, seen.id);
    out.push(Outgoing::to_all(ServerEvent::AttackStart {
        attack_id,
        source: npc.id.clone(),
        target: Some(seen.id.clone()),
        dir: npc.body.facing,
        weapon: npc.kind.clone(),
        duration: windup,
    }));
}

// =============================================================================
// Retreat
// =============================================================================

fn retreat(world: &World, npc: &mut ServerNpc, seen: &Sighting, ctx: &StepContext<'_>) {
    if !ready_to_step(npc, ctx) {
        return;
    }
    let Some(target) = world.get_player(&seen.id) else {
        halt(npc);
        return;
    };

    let grid = *world.grid();
    let cell = npc.body.cell(&grid);
    let away = direction_to_step(npc.body.position - target.body.position);
    if away == (0, 0) {
        halt(npc);
        return;
    }

    let walk = Walkability::new(ctx.occupancy, world.blocked(), cell);
    let escape = RETREAT_ROTATIONS
        .iter()
        .map(|&r| rotate_step(away, r))
        .map(|(dx, dy)| cell.offset(dx, dy))
        .find(|c| walk.is_walkable(*c));

    match escape {
        Some(next) => step_to(npc, next, &grid, ctx),
        None => halt(npc),
    }
}

// =============================================================================
// Search
// =============================================================================

fn search(world: &mut World, npc: &mut ServerNpc, ctx: &StepContext<'_>) {
    if !ready_to_step(npc, ctx) {
        return;
    }
    let Some(memory) = npc.ai.memory else {
        halt(npc);
        return;
    };

    let grid = *world.grid();
    let cell = npc.body.cell(&grid);
    if cell != memory.cell && path_toward(world, npc, memory.cell, false, ctx) {
        return;
    }

    // At the last sighting (or unable to reach it): look around
    let walk = Walkability::new(ctx.occupancy, world.blocked(), cell);
    let around: Vec<Cell> = ALL_DIRS
        .iter()
        .map(|&(dx, dy)| cell.offset(dx, dy))
        .filter(|c| walk.is_walkable(*c))
        .collect();

    match around.choose(&mut world.rng) {
        Some(&next) => step_to(npc, next, &grid, ctx),
        None => halt(npc),
    }
}
