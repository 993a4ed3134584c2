//! Server-side NPC entity.

use arena_shared::{Cell, ServerEvent};

use crate::ai::NpcMeta;
use super::Body;

/// Waypoints an NPC walks while nothing holds its attention
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatrolRoute {
    pub points: Vec<Cell>,
    /// Loop back to the first point, or stop at the last one
    pub looping: bool,
}

impl PatrolRoute {
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Server-side NPC state. Everything here is computed by the AI engine.
#[derive(Debug, Clone)]
pub struct ServerNpc {
    pub id: String,
    pub kind: String,
    pub body: Body,
    pub patrol: PatrolRoute,
    /// Damage dealt by one landed swing
    pub damage: f64,
    pub ai: NpcMeta,
}

impl ServerNpc {
    pub fn spawn_event(&self, hp: f64, max_hp: f64) -> ServerEvent {
        ServerEvent::NpcSpawn {
            id: self.id.clone(),
            kind: self.kind.clone(),
            x: self.body.position.x,
            y: self.body.position.y,
            hp,
            max_hp,
        }
    }

    pub fn state_event(&self) -> ServerEvent {
        ServerEvent::NpcState {
            id: self.id.clone(),
            x: self.body.position.x,
            y: self.body.position.y,
            state: self.ai.state(),
            facing: self.body.facing,
            moving: self.body.moving,
            target: self.ai.target.clone(),
        }
    }
}
