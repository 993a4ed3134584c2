//! State transitions, evaluated once per tick before any movement.

use log::debug;
use rand::Rng;

use arena_shared::AiState;

use crate::combat;
use crate::config::NpcTuning;
use crate::entities::ServerNpc;
use crate::world::World;

use super::meta::{Behavior, Memory};
use super::targeting::{keep_or_pick, nearest, Sighting};

/// Update `npc`'s target and FSM state. Returns the target it now holds.
pub fn evaluate(world: &mut World, npc: &mut ServerNpc, tuning: &NpcTuning, now: f64) -> Option<Sighting> {
    let cell = npc.body.cell(world.grid());
    let health = world.vitals().get(&npc.id).map_or(1.0, |v| v.health_fraction());
    if health >= tuning.retreat_health_fraction {
        npc.ai.retreat_spent = false;
    }

    let before = npc.ai.state();
    let held_for = npc.ai.time_in_state(now);
    let sighting = match before {
        // Calm NPCs only notice players inside aggro range
        AiState::Idle | AiState::Patrol | AiState::Search => nearest(world, cell, tuning.aggro_range),
        _ => keep_or_pick(world, cell, npc.ai.target.as_deref(), tuning.lose_range),
    };

    if let Some(seen) = &sighting {
        npc.ai.memory = Some(Memory { cell: seen.cell, seen_at: now });
    }
    npc.ai.target = sighting.as_ref().map(|s| s.id.clone());

    match before {
        AiState::Idle => {
            if sighting.is_some() {
                npc.ai.enter(Behavior::Chase, now);
            } else if patrol_available(npc) {
                npc.ai.enter(Behavior::Patrol, now);
            }
        }
        AiState::Patrol => {
            if sighting.is_some() {
                npc.ai.enter(Behavior::Chase, now);
            } else if !patrol_available(npc) {
                npc.ai.enter(Behavior::Idle, now);
            }
        }
        AiState::Search => {
            if sighting.is_some() {
                npc.ai.enter(Behavior::Chase, now);
            } else if !npc.ai.memory_is_fresh(now, tuning.memory_secs) {
                rest(npc, now);
            }
        }
        AiState::Chase => match &sighting {
            None => lose_target(npc, tuning, now),
            Some(seen) => {
                if roll_retreat(world, npc, health, tuning) {
                    npc.ai.enter(Behavior::Retreat, now);
                } else if combat::npc_in_reach(world, npc, &seen.id) {
                    npc.ai.enter(Behavior::Attack { windup: None }, now);
                }
            }
        },
        AiState::Attack => {
            let committed = npc.ai.pending_windup().is_some();
            let settling = npc.ai.since_move(now) < tuning.post_move_attack_delay_secs;
            if !committed && !settling {
                match &sighting {
                    None => lose_target(npc, tuning, now),
                    Some(seen) => {
                        if roll_retreat(world, npc, health, tuning) {
                            npc.ai.enter(Behavior::Retreat, now);
                        } else if !combat::npc_in_reach(world, npc, &seen.id) {
                            npc.ai.enter(Behavior::Chase, now);
                        }
                    }
                }
            }
        }
        AiState::Retreat => match &sighting {
            None => rest(npc, now),
            Some(seen) => {
                if seen.distance >= tuning.retreat_safe_distance && health >= tuning.retreat_recover_fraction {
                    npc.ai.enter(Behavior::Chase, now);
                }
            }
        },
    }

    let after = npc.ai.state();
    if after != before {
        debug!(
            "NPC {} {} -> {} after {:.1}s (target {:?})",
            npc.id,
            before.name(),
            after.name(),
            held_for,
            npc.ai.target
        );
    }

    sighting
}

fn patrol_available(npc: &ServerNpc) -> bool {
    !npc.patrol.is_empty() && !npc.ai.patrol.done
}

/// Fall back to the NPC's resting behaviour
fn rest(npc: &mut ServerNpc, now: f64) {
    npc.ai.target = None;
    if patrol_available(npc) {
        npc.ai.enter(Behavior::Patrol, now);
    } else {
        npc.ai.enter(Behavior::Idle, now);
    }
}

/// The target slipped away: search its last cell while the memory is fresh
fn lose_target(npc: &mut ServerNpc, tuning: &NpcTuning, now: f64) {
    if npc.ai.memory_is_fresh(now, tuning.memory_secs) {
        npc.ai.target = None;
        npc.ai.enter(Behavior::Search, now);
    } else {
        rest(npc, now);
    }
}

/// One roll per low-health episode
fn roll_retreat(world: &mut World, npc: &mut ServerNpc, health: f64, tuning: &NpcTuning) -> bool {
    if health >= tuning.retreat_health_fraction || npc.ai.retreat_spent {
        return false;
    }
    npc.ai.retreat_spent = true;
    world.rng.gen::<f64>() < tuning.retreat_chance
}
