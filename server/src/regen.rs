//! Energy spending and the regeneration scheduler.

use log::debug;

use arena_shared::ServerEvent;

use crate::events::Outgoing;
use crate::world::World;

/// One regeneration tick: spawn NPCs into an empty world, then refill energy
/// one segment at a time
pub fn tick(world: &mut World, now: f64) -> Vec<Outgoing> {
    let mut out = world.bootstrap_npcs(now);

    let period = world.config().energy_segment_period_secs;
    let segments = f64::from(world.config().energy_segments.max(1));

    for (id, vitals) in world.vitals_mut().iter_mut() {
        let segment = vitals.max_energy / segments;
        if vitals.regen_step(now, period, segment) {
            out.push(Outgoing::to_all(ServerEvent::EnergyUpdate {
                id: id.clone(),
                energy: vitals.energy,
                max_energy: vitals.max_energy,
            }));
        }
    }
    out
}

/// Spend energy on behalf of `id`. Emptying the pool installs the lockout.
pub fn spend_energy(world: &mut World, id: &str, amount: f64, now: f64) -> Vec<Outgoing> {
    let lockout = world.energy_lockout();
    world.ensure_vitals(id, now);
    let Some(vitals) = world.vitals.get_mut(id) else {
        return Vec::new();
    };

    let emptied = vitals.spend_energy(amount, now, lockout, &mut world.rng);
    let update = ServerEvent::EnergyUpdate {
        id: id.to_string(),
        energy: vitals.energy,
        max_energy: vitals.max_energy,
    };

    let mut out = vec![Outgoing::to_all(update)];
    if emptied {
        debug!("{} ran out of energy until {:?}", id, vitals.blocked_until);
        out.push(Outgoing::to_all(ServerEvent::EnergySync {
            id: id.to_string(),
            energy: vitals.energy,
            max_energy: vitals.max_energy,
            blocked_until: vitals.blocked_until,
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BlockedCells, ServerConfig};

    fn world() -> World {
        let config = ServerConfig { npc_spawns: Vec::new(), ..ServerConfig::default() };
        World::with_seed(config, BlockedCells::new(), 4)
    }

    #[test]
    fn test_spend_emits_update() {
        let mut w = world();
        let out = spend_energy(&mut w, "p1", 30.0, 1.0);
        assert_eq!(
            out,
            vec![Outgoing::to_all(ServerEvent::EnergyUpdate { id: "p1".into(), energy: 70.0, max_energy: 100.0 })]
        );
    }

    #[test]
    fn test_emptying_energy_syncs_lockout() {
        let mut w = world();
        let out = spend_energy(&mut w, "p1", 100.0, 2.0);
        assert_eq!(out.len(), 2);
        match &out[1].event {
            ServerEvent::EnergySync { energy, blocked_until: Some(until), .. } => {
                assert_eq!(*energy, 0.0);
                assert!(*until >= 7.0 && *until < 32.0);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_regen_respects_lockout() {
        let mut w = world();
        spend_energy(&mut w, "p1", 100.0, 0.0);
        let until = w.vitals().get("p1").unwrap().blocked_until.unwrap();

        let mut t = 0.0;
        while t < until {
            assert!(tick(&mut w, t).is_empty(), "regenerated during lockout at {}", t);
            t += 0.25;
        }
        let mut refilled = false;
        for _ in 0..12 {
            t += 0.25;
            if !tick(&mut w, t).is_empty() {
                refilled = true;
                break;
            }
        }
        assert!(refilled);
        assert_eq!(w.vitals().get("p1").unwrap().energy, 10.0);
    }

    #[test]
    fn test_regen_adds_one_segment_per_period() {
        let mut w = world();
        spend_energy(&mut w, "p1", 25.0, 0.0);
        assert!(tick(&mut w, 0.5).is_empty());
        let out = tick(&mut w, 1.0);
        assert_eq!(
            out,
            vec![Outgoing::to_all(ServerEvent::EnergyUpdate { id: "p1".into(), energy: 85.0, max_energy: 100.0 })]
        );
        assert!(tick(&mut w, 1.25).is_empty());
    }

    #[test]
    fn test_bootstrap_runs_in_regen_tick() {
        let mut w = World::with_seed(ServerConfig::default(), BlockedCells::new(), 4);
        let out = tick(&mut w, 0.0);
        assert_eq!(w.npc_count(), w.config().npc_spawns.len());
        assert!(out.iter().any(|o| matches!(o.event, ServerEvent::NpcSpawn { .. })));
        assert!(tick(&mut w, 0.25).iter().all(|o| !matches!(o.event, ServerEvent::NpcSpawn { .. })));
    }
}
