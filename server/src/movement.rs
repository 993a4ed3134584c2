//! Server-side movement validation.
//!
//! Clients report where they are; the server decides where they may be. A
//! report implying a speed above `max_speed` is pulled back along the same
//! direction before it is committed and broadcast.

use log::{debug, trace};

use arena_shared::Vec2;

use crate::events::Outgoing;
use crate::world::World;

/// Shortest elapsed time the validator will divide by
pub const MIN_DT: f64 = 1.0 / 60.0;

/// Result of validating one displacement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correction {
    pub position: Vec2,
    pub velocity: Vec2,
    /// The reported position was pulled back
    pub clamped: bool,
}

/// Clamp a reported move from `last` to `target` over `elapsed` seconds
pub fn correct_move(last: Vec2, target: Vec2, elapsed: f64, max_speed: f64) -> Correction {
    let dt = elapsed.max(MIN_DT);
    let delta = target - last;
    let dist = delta.length();

    if dist == 0.0 {
        return Correction { position: last, velocity: Vec2::ZERO, clamped: false };
    }

    let max_dist = max_speed * dt;
    let (displacement, clamped) = if dist / dt > max_speed {
        (delta * (max_dist / dist), true)
    } else {
        (delta, false)
    };

    Correction {
        position: last + displacement,
        velocity: displacement * (1.0 / dt),
        clamped,
    }
}

/// Validate and commit a `move` report, returning the broadcast
pub fn handle_move(
    world: &mut World,
    id: &str,
    target: Vec2,
    facing: Option<Vec2>,
    combat: Option<bool>,
    now: f64,
) -> Vec<Outgoing> {
    let max_speed = world.config().max_speed;
    if !world.config().in_bounds(target) {
        debug!("Dropped move for {} outside the world at ({}, {})", id, target.x, target.y);
        return Vec::new();
    }

    if world.get_player(id).is_none() {
        // First sighting: nothing to measure speed against
        let player = world.insert_player(id, target, now);
        if let Some(f) = facing {
            player.body.face(f);
        }
        player.body.in_combat = combat.unwrap_or(false);
        return vec![Outgoing::except(player.move_event(), id)];
    }
    let Some(player) = world.get_player_mut(id) else {
        return Vec::new();
    };

    let body = &mut player.body;
    let correction = correct_move(body.position, target, now - body.last_update, max_speed);

    if correction.clamped {
        debug!(
            "Player {} moved too fast: reported ({:.1}, {:.1}), corrected to ({:.1}, {:.1})",
            id, target.x, target.y, correction.position.x, correction.position.y
        );
    }

    let displacement = correction.position - body.position;
    body.position = correction.position;
    body.velocity = correction.velocity;
    body.moving = displacement.length_squared() > 0.0;
    body.last_update = now;
    match facing {
        Some(f) => body.face(f),
        None => body.face(displacement),
    }
    if let Some(c) = combat {
        body.in_combat = c;
    }

    trace!(
        "[MOVE] {} -> ({:.1}, {:.1}) v=({:.1}, {:.1})",
        id, body.position.x, body.position.y, body.velocity.x, body.velocity.y
    );

    let event = player.move_event();
    if correction.clamped {
        // The sender needs the correction too
        vec![Outgoing::to_all(event)]
    } else {
        vec![Outgoing::except(event, id)]
    }
}
