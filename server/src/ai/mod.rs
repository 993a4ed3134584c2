//! NPC artificial intelligence.
//!
//! Each AI tick walks the NPCs in id order. For every NPC it resolves a due
//! wind-up, re-evaluates the state machine, acts on the resulting state and
//! finally broadcasts `npc_state` if anything a client can see has changed.

mod fsm;
mod meta;
mod steering;
pub mod targeting;

pub use meta::{Behavior, Memory, NpcMeta, PatrolProgress, Windup};
pub use steering::lead_damping;

use log::trace;

use crate::combat;
use crate::config::NpcTuning;
use crate::entities::ServerNpc;
use crate::events::Outgoing;
use crate::navigation::Occupancy;
use crate::world::World;

use self::steering::StepContext;

/// Advance every NPC by one AI tick
pub fn tick(world: &mut World, now: f64) -> Vec<Outgoing> {
    combat::prune_attacks(world, now);

    let occupancy = Occupancy::snapshot(world);
    let tuning = world.config().npc.clone();
    let ids: Vec<String> = world.npcs.keys().cloned().collect();

    let mut out = Vec::new();
    for id in ids {
        // Take the NPC out so it can be updated alongside the rest of the world
        let Some(mut npc) = world.npcs.remove(&id) else {
            continue;
        };
        update_npc(world, &mut npc, &tuning, &occupancy, now, &mut out);
        world.npcs.insert(id, npc);
    }
    out
}

fn update_npc(
    world: &mut World,
    npc: &mut ServerNpc,
    tuning: &NpcTuning,
    occupancy: &Occupancy,
    now: f64,
    out: &mut Vec<Outgoing>,
) {
    if let Some(windup) = npc.ai.take_due_windup(now) {
        trace!("[AI] {} resolves {}", npc.id, windup.attack_id);
        out.extend(combat::resolve_npc_swing(world, npc, &windup.target, now));
    }

    let sighting = fsm::evaluate(world, npc, tuning, now);

    let ctx = StepContext { tuning, occupancy, now };
    steering::act(world, npc, sighting.as_ref(), &ctx, out);

    let event = npc.state_event();
    if npc.ai.last_broadcast.as_ref() != Some(&event) {
        npc.ai.last_broadcast = Some(event.clone());
        out.push(Outgoing::to_all(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_shared::{AiState, Cell, ServerEvent, Vec2, ALL_DIRS};
    use crate::config::{BlockedCells, NpcSpawn, ServerConfig};
    use crate::movement::handle_move;

    fn config_with(spawn_cell: Cell, patrol: Vec<Cell>) -> ServerConfig {
        let mut config = ServerConfig {
            npc_spawns: vec![NpcSpawn {
                name: "grunt".into(),
                kind: "goblin".into(),
                cell: spawn_cell,
                max_hp: 60.0,
                damage: 8.0,
                patrol,
                patrol_loop: true,
            }],
            ..ServerConfig::default()
        };
        config.npc.aggro_range = 6;
        config.npc.lose_range = 8;
        config
    }

    fn place(world: &mut World, id: &str, cell: Cell, now: f64) {
        let pos = world.grid().cell_to_world(cell);
        handle_move(world, id, pos, None, None, now);
    }

    fn the_npc(world: &World) -> &ServerNpc {
        world.npcs().next().unwrap()
    }

    #[test]
    fn test_idle_to_chase_steps_closer() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(5, 5), 0.0);

        let out = tick(&mut world, 1.0);
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Chase);
        assert_eq!(npc.ai.target.as_deref(), Some("p1"));

        let goal = Cell::new(5, 5);
        let now_at = npc.body.cell(world.grid());
        assert!(now_at.octile_distance(goal) < Cell::new(0, 0).octile_distance(goal));
        assert!(out.iter().any(|o| matches!(&o.event, ServerEvent::NpcState { state: AiState::Chase, .. })));
    }

    #[test]
    fn test_idle_npc_ignores_distant_player() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(7, 0), 0.0);

        let out = tick(&mut world, 1.0);
        assert_eq!(the_npc(&world).ai.state(), AiState::Idle);
        // Nothing changed since the spawn broadcast
        assert!(out.is_empty());
    }

    #[test]
    fn test_unchanged_state_is_not_rebroadcast() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        assert!(tick(&mut world, 0.1).is_empty());
        assert!(tick(&mut world, 0.2).is_empty());
    }

    #[test]
    fn test_patrol_walks_and_dwells() {
        let route = vec![Cell::new(0, 0), Cell::new(2, 0)];
        let mut world = World::with_seed(config_with(Cell::new(0, 0), route), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);

        let mut t = 0.0;
        let mut reached_second = None;
        for _ in 0..200 {
            t += 0.1;
            tick(&mut world, t);
            if the_npc(&world).body.cell(world.grid()) == Cell::new(2, 0) {
                reached_second = Some(t);
                break;
            }
        }
        let reached = reached_second.expect("patrol never reached the second waypoint");
        assert_eq!(the_npc(&world).ai.state(), AiState::Patrol);
        // Dwelled at the first waypoint before leaving
        assert!(reached >= world.config().npc.patrol_wait_secs);
    }

    #[test]
    fn test_attack_winds_up_and_hits() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(1, 0), 0.0);

        let mut t = 0.0;
        let mut started = false;
        let mut hit = false;
        for _ in 0..50 {
            t += 0.1;
            for o in tick(&mut world, t) {
                match o.event {
                    ServerEvent::AttackStart { ref source, .. } if source.starts_with("grunt") => started = true,
                    ServerEvent::Damage { ref target, amount, .. } if target == "p1" => {
                        assert_eq!(amount, 8.0);
                        hit = true;
                    }
                    _ => {}
                }
            }
            if hit {
                break;
            }
        }
        assert!(started && hit);
        assert_eq!(world.vitals().get("p1").unwrap().hp, 92.0);
    }

    #[test]
    fn test_search_after_losing_target() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(4, 0), 0.0);
        tick(&mut world, 0.5);
        assert_eq!(the_npc(&world).ai.state(), AiState::Chase);

        world.remove_player("p1");
        tick(&mut world, 1.0);
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Search);
        assert!(npc.ai.target.is_none());

        // Memory runs out
        let later = 1.0 + world.config().npc.memory_secs + 1.0;
        tick(&mut world, later);
        assert_eq!(the_npc(&world).ai.state(), AiState::Idle);
    }

    #[test]
    fn test_low_health_npc_retreats_when_roll_succeeds() {
        let mut config = config_with(Cell::new(0, 0), Vec::new());
        config.npc.retreat_chance = 1.0;
        let mut world = World::with_seed(config, BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(3, 0), 0.0);
        tick(&mut world, 0.5);

        let npc_id = the_npc(&world).id.clone();
        world.vitals_mut().get_mut(&npc_id).unwrap().hp = 5.0;
        tick(&mut world, 1.0);
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Retreat);

        // Stepping away from the player
        let before = npc.body.cell(world.grid()).chebyshev_distance(Cell::new(3, 0));
        tick(&mut world, 2.0);
        let after = the_npc(&world).body.cell(world.grid()).chebyshev_distance(Cell::new(3, 0));
        assert!(after > before);
    }

    #[test]
    fn test_retreat_roll_happens_once_per_episode() {
        let mut config = config_with(Cell::new(0, 0), Vec::new());
        config.npc.retreat_chance = 0.0;
        let mut world = World::with_seed(config, BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(4, 4), 0.0);
        tick(&mut world, 0.5);

        let npc_id = the_npc(&world).id.clone();
        world.vitals_mut().get_mut(&npc_id).unwrap().hp = 5.0;
        tick(&mut world, 1.0);
        assert!(the_npc(&world).ai.retreat_spent);
        assert_ne!(the_npc(&world).ai.state(), AiState::Retreat);

        world.vitals_mut().get_mut(&npc_id).unwrap().hp = 60.0;
        tick(&mut world, 1.5);
        assert!(!the_npc(&world).ai.retreat_spent);
    }

    #[test]
    fn test_retreating_npc_regroups_at_safe_distance() {
        let mut config = config_with(Cell::new(0, 0), Vec::new());
        config.npc.retreat_chance = 1.0;
        let mut world = World::with_seed(config, BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(3, 0), 0.0);
        tick(&mut world, 0.5);

        let npc_id = the_npc(&world).id.clone();
        world.vitals_mut().get_mut(&npc_id).unwrap().hp = 5.0;

        let safe = world.config().npc.retreat_safe_distance;
        let mut t = 0.5;
        let mut farthest = 0;
        let mut regrouped = false;
        for _ in 0..20 {
            t += 0.5;
            let distance = the_npc(&world).body.cell(world.grid()).chebyshev_distance(Cell::new(3, 0));
            farthest = farthest.max(distance);
            tick(&mut world, t);
            if the_npc(&world).ai.state() == AiState::Chase {
                regrouped = true;
                break;
            }
        }
        assert!(regrouped);
        assert!(farthest >= safe);
    }

    #[test]
    fn test_retreat_falls_back_when_direct_escape_is_blocked() {
        let blocked = BlockedCells::from_cells([Cell::new(-1, 0), Cell::new(-1, -1)]);
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), blocked, 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(2, 0), 0.0);

        let npc_id = the_npc(&world).id.clone();
        let npc = world.get_npc_mut(&npc_id).unwrap();
        npc.ai.target = Some("p1".into());
        npc.ai.enter(Behavior::Retreat, 0.0);

        tick(&mut world, 0.5);
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Retreat);
        // Straight back and one diagonal are walls, so it takes the other diagonal
        assert_eq!(npc.body.cell(world.grid()), Cell::new(-1, 1));
    }

    #[test]
    fn test_search_looks_around_the_last_known_cell() {
        // Only one way out of the memory cell
        let open = Cell::new(0, 1);
        let blocked = BlockedCells::from_cells(
            ALL_DIRS.iter().map(|&(dx, dy)| Cell::new(dx, dy)).filter(|c| *c != open),
        );
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), blocked, 1);
        world.bootstrap_npcs(0.0);

        let npc_id = the_npc(&world).id.clone();
        let npc = world.get_npc_mut(&npc_id).unwrap();
        npc.ai.memory = Some(Memory { cell: Cell::new(0, 0), seen_at: 0.0 });
        npc.ai.enter(Behavior::Search, 0.0);

        tick(&mut world, 0.5);
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Search);
        assert_eq!(npc.body.cell(world.grid()), open);
    }

    #[test]
    fn test_one_shot_patrol_ends_idle() {
        let route = vec![Cell::new(0, 0), Cell::new(1, 0)];
        let mut config = config_with(Cell::new(0, 0), route);
        config.npc_spawns[0].patrol_loop = false;
        let mut world = World::with_seed(config, BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);

        let mut t = 0.0;
        let mut patrolled = false;
        for _ in 0..100 {
            t += 0.1;
            tick(&mut world, t);
            match the_npc(&world).ai.state() {
                AiState::Patrol => patrolled = true,
                AiState::Idle if patrolled => break,
                _ => {}
            }
        }
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Idle);
        assert!(npc.ai.patrol.done);
        assert_eq!(npc.body.cell(world.grid()), Cell::new(1, 0));

        tick(&mut world, t + 5.0);
        assert_eq!(the_npc(&world).ai.state(), AiState::Idle);
    }

    #[test]
    fn test_chase_goes_orthogonal_when_aligned() {
        // The diagonal detours around (1, 0) are shorter, but an aligned
        // chase only takes orthogonal steps
        let blocked = BlockedCells::from_cells([Cell::new(1, 0)]);
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), blocked, 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(4, 0), 0.0);

        tick(&mut world, 1.0);
        let npc = the_npc(&world);
        assert_eq!(npc.ai.state(), AiState::Chase);
        let cell = npc.body.cell(world.grid());
        assert!(cell.is_adjacent(Cell::new(0, 0), true), "took {}", cell);
    }

    #[test]
    fn test_client_resolves_windup_early() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        place(&mut world, "p1", Cell::new(1, 0), 0.0);
        let npc_id = the_npc(&world).id.clone();

        let mut t = 0.0;
        let mut started = false;
        for _ in 0..50 {
            t += 0.1;
            if tick(&mut world, t).iter().any(|o| matches!(o.event, ServerEvent::AttackStart { .. })) {
                started = true;
                break;
            }
        }
        assert!(started);
        assert!(the_npc(&world).ai.pending_windup().is_some());

        let out = combat::npc_attack_request(&mut world, &npc_id, "p1", t + 0.05);
        assert!(out.iter().any(|o| matches!(o.event, ServerEvent::Damage { amount, .. } if amount == 8.0)));
        assert_eq!(world.vitals().get("p1").unwrap().hp, 92.0);
        assert!(the_npc(&world).ai.pending_windup().is_none());

        // Consumed: neither a second request nor the AI tick hits again
        assert!(combat::npc_attack_request(&mut world, &npc_id, "p1", t + 0.1).is_empty());
        let later = tick(&mut world, t + 0.4);
        assert!(later.iter().all(|o| !matches!(o.event, ServerEvent::Damage { .. })));
        assert_eq!(world.vitals().get("p1").unwrap().hp, 92.0);
    }

    #[test]
    fn test_far_off_player_is_out_of_every_range() {
        let mut world = World::with_seed(config_with(Cell::new(0, 0), Vec::new()), BlockedCells::new(), 1);
        world.bootstrap_npcs(0.0);
        world.insert_player("far", Vec2::new(-1e300, 1e300), 0.0);
        place(&mut world, "near", Cell::new(3, 0), 0.0);

        tick(&mut world, 0.5);
        assert_eq!(the_npc(&world).ai.target.as_deref(), Some("near"));
    }
}
