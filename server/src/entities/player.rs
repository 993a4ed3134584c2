//! Server-side player entity.

use arena_shared::{ServerEvent, Vec2};

use super::Body;

/// Server-side player state. Players are client-authored: every position
/// here has already been through the movement validator.
#[derive(Debug, Clone)]
pub struct ServerPlayer {
    pub id: String,
    pub body: Body,
}

impl ServerPlayer {
    pub fn new(id: String, position: Vec2, now: f64) -> Self {
        Self {
            id,
            body: Body::new(position, now),
        }
    }

    /// Authoritative `move` event for this player
    pub fn move_event(&self) -> ServerEvent {
        ServerEvent::Move {
            id: self.id.clone(),
            x: self.body.position.x,
            y: self.body.position.y,
            vx: self.body.velocity.x,
            vy: self.body.velocity.y,
            facing: self.body.facing,
            moving: self.body.moving,
            combat: self.body.in_combat,
        }
    }
}
