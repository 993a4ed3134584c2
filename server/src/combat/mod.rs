//! Combat resolution.
//!
//! Every damage path (trusted client reports, validated player swings and
//! NPC swings) ends in `apply_damage`, which owns HP clamping, the outbound
//! damage events and NPC death.

pub mod geometry;

use log::{debug, info, trace};

use arena_shared::{ServerEvent, Vec2};

use crate::ai::Behavior;
use crate::entities::ServerNpc;
use crate::events::Outgoing;
use crate::world::World;

use self::geometry::{facing_ok, obb_overlaps_aabb, Aabb, Obb};

/// A player swing waiting for its hit report
#[derive(Debug, Clone, PartialEq)]
pub struct AttackRecord {
    pub attack_id: String,
    pub source: String,
    /// When set, only this entity can be hit
    pub target: Option<String>,
    pub dir: Vec2,
    pub weapon: String,
    pub started_at: f64,
    /// Active window length
    pub duration: f64,
}

/// Attack records are keyed by `(source, attack_id)`; clients number their
/// own swings
pub type AttackKey = (String, String);

pub fn attack_key(source: &str, attack_id: &str) -> AttackKey {
    (source.to_string(), attack_id.to_string())
}

impl AttackRecord {
    pub fn key(&self) -> AttackKey {
        attack_key(&self.source, &self.attack_id)
    }

    /// Last moment a hit report is accepted
    pub fn expires_at(&self, grace: f64) -> f64 {
        self.started_at + self.duration + grace
    }
}

/// Drop swings whose report window has closed
pub fn prune_attacks(world: &mut World, now: f64) {
    let grace = world.config().attack_grace_secs;
    world.attacks.retain(|(source, id), attack| {
        let keep = now <= attack.expires_at(grace);
        if !keep {
            trace!("Attack {} from {} expired", id, source);
        }
        keep
    });
}

/// Apply `amount` of damage from `source` to `target` and report it.
///
/// Unknown targets get a default HP record first. An NPC brought to zero HP
/// is despawned; a surviving NPC hit by a player turns on its attacker.
pub fn apply_damage(world: &mut World, source: &str, target: &str, amount: f64, now: f64) -> Vec<Outgoing> {
    let position = world.body(target).map(|b| b.position);

    let vitals = world.ensure_vitals(target, now);
    let applied = vitals.apply_damage(amount);
    let hp = vitals.hp;

    debug!("{} hit {} for {:.1} (hp {:.1})", source, target, applied, hp);

    let mut events = vec![Outgoing::to_all(ServerEvent::Damage {
        source: source.to_string(),
        target: target.to_string(),
        amount: applied,
        hp,
    })];

    if applied > 0.0 {
        events.push(Outgoing::to_all(ServerEvent::DamagePopup {
            target: target.to_string(),
            amount: applied,
            x: position.map(|p| p.x),
            y: position.map(|p| p.y),
        }));
        events.push(Outgoing::to_all(ServerEvent::HitFx {
            source: source.to_string(),
            target: target.to_string(),
            x: position.map(|p| p.x),
            y: position.map(|p| p.y),
        }));
    }

    if world.is_npc(target) {
        if hp <= 0.0 {
            events.extend(world.despawn_npc(target));
        } else if world.get_player(source).is_some() {
            aggro_on_hit(world, target, source, now);
        }
    } else if applied > 0.0 && hp <= 0.0 && world.get_player(target).is_some() {
        info!("Player {} was killed by {}", target, source);
    }

    events
}

/// A damaged NPC adopts its attacker unless it is committed elsewhere
fn aggro_on_hit(world: &mut World, npc_id: &str, attacker: &str, now: f64) {
    let Some(npc) = world.get_npc_mut(npc_id) else {
        return;
    };
    match npc.ai.behavior {
        Behavior::Idle | Behavior::Patrol | Behavior::Search => {
            npc.ai.target = Some(attacker.to_string());
            npc.ai.enter(Behavior::Chase, now);
            debug!("NPC {} aggroed on {}", npc_id, attacker);
        }
        Behavior::Chase => {
            npc.ai.target = Some(attacker.to_string());
        }
        Behavior::Attack { .. } | Behavior::Retreat => {}
    }
}

// =============================================================================
// Player swings
// =============================================================================

/// Register a player swing and announce it to everyone else
pub fn start_player_attack(
    world: &mut World,
    attack_id: &str,
    source: &str,
    target: Option<&str>,
    dir: Vec2,
    weapon: &str,
    now: f64,
) -> Vec<Outgoing> {
    if world.attacks.contains_key(&attack_key(source, attack_id)) {
        debug!("Duplicate attack id {} from {}", attack_id, source);
        return Vec::new();
    }
    if !world.is_alive(source) {
        debug!("Dead player {} tried to attack", source);
        return Vec::new();
    }
    let Some(player) = world.get_player_mut(source) else {
        debug!("Attack {} from unknown player {}", attack_id, source);
        return Vec::new();
    };
    player.body.face(dir);

    let duration = world.config().weapon(weapon).active_secs;
    let record = AttackRecord {
        attack_id: attack_id.to_string(),
        source: source.to_string(),
        target: target.map(str::to_string),
        dir: dir.normalized(),
        weapon: weapon.to_string(),
        started_at: now,
        duration,
    };
    let event = ServerEvent::AttackStart {
        attack_id: record.attack_id.clone(),
        source: record.source.clone(),
        target: record.target.clone(),
        dir: record.dir,
        weapon: record.weapon.clone(),
        duration,
    };
    world.attacks.insert(record.key(), record);

    vec![Outgoing::except(event, source)]
}

/// Check a client's claim that its swing connected, and apply the hit if
/// the geometry agrees
pub fn resolve_hit_report(world: &mut World, attack_id: &str, source: &str, target: &str, now: f64) -> Vec<Outgoing> {
    let grace = world.config().attack_grace_secs;
    let key = attack_key(source, attack_id);
    let Some(record) = world.attacks.get(&key) else {
        debug!("Hit report for unknown attack {} from {}", attack_id, source);
        return Vec::new();
    };
    if now > record.expires_at(grace) {
        debug!("Rejected hit report {} from {}", attack_id, source);
        return Vec::new();
    }
    if record.target.as_deref().map_or(false, |bound| bound != target) || target == source {
        debug!("Hit report {} names the wrong target {}", attack_id, target);
        return Vec::new();
    }
    if !world.is_alive(target) {
        return Vec::new();
    }

    let (Some(attacker), Some(victim)) = (world.body(source), world.body(target)) else {
        return Vec::new();
    };
    let profile = world.config().weapon(&record.weapon);
    let swing = Obb::melee(attacker.position, record.dir, profile.reach, profile.width);
    let body = Aabb::around(victim.position, world.config().body_half_extent);
    let threshold = world.config().npc.facing_dot_threshold;

    if !obb_overlaps_aabb(&swing, &body) || !facing_ok(record.dir, attacker.position, victim.position, threshold) {
        debug!("Hit report {} failed geometry against {}", attack_id, target);
        return Vec::new();
    }

    world.attacks.remove(&key);
    apply_damage(world, source, target, profile.damage, now)
}

// =============================================================================
// NPC swings
// =============================================================================

/// Whether `npc`'s swing would currently land on the player `target`
pub fn npc_swing_connects(world: &World, npc: &ServerNpc, target: &str) -> bool {
    let Some(victim) = world.get_player(target) else {
        return false;
    };
    let tuning = &world.config().npc;
    let swing = Obb::melee(npc.body.position, npc.body.facing, tuning.attack_reach, tuning.attack_width);
    let body = Aabb::around(victim.body.position, world.config().body_half_extent);
    obb_overlaps_aabb(&swing, &body)
        && facing_ok(npc.body.facing, npc.body.position, victim.body.position, tuning.facing_dot_threshold)
}

/// Whether `target` is within `npc`'s swing if it turned to face it
pub fn npc_in_reach(world: &World, npc: &ServerNpc, target: &str) -> bool {
    let Some(victim) = world.get_player(target) else {
        return false;
    };
    let toward = victim.body.position - npc.body.position;
    if toward.length_squared() < 1e-12 {
        return true;
    }
    let tuning = &world.config().npc;
    let swing = Obb::melee(npc.body.position, toward, tuning.attack_reach, tuning.attack_width);
    obb_overlaps_aabb(&swing, &Aabb::around(victim.body.position, world.config().body_half_extent))
}

/// Resolve a wind-up that has been taken off `npc`
pub fn resolve_npc_swing(world: &mut World, npc: &ServerNpc, target: &str, now: f64) -> Vec<Outgoing> {
    if !world.is_alive(target) || !npc_swing_connects(world, npc, target) {
        trace!("NPC {} swing at {} missed", npc.id, target);
        return Vec::new();
    }
    apply_damage(world, &npc.id, target, npc.damage, now)
}

/// A client asks to resolve an NPC's open wind-up against itself now
pub fn npc_attack_request(world: &mut World, npc_id: &str, target: &str, now: f64) -> Vec<Outgoing> {
    let Some(mut npc) = world.npcs.remove(npc_id) else {
        debug!("Attack request for unknown NPC {}", npc_id);
        return Vec::new();
    };
    let events = match npc.ai.take_requested_windup(target, now) {
        Some(_) => resolve_npc_swing(world, &npc, target, now),
        None => {
            debug!("NPC {} has no open swing at {}", npc_id, target);
            Vec::new()
        }
    };
    world.npcs.insert(npc_id.to_string(), npc);
    events
}
