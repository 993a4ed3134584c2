//! Outbound events produced by the simulation, addressed for the broadcaster.

use arena_shared::ServerEvent;

/// An event plus the player whose connection should not receive it
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub event: ServerEvent,
    pub exclude: Option<String>,
}

impl Outgoing {
    /// Send to every connection
    pub fn to_all(event: ServerEvent) -> Self {
        Self { event, exclude: None }
    }

    /// Send to every connection except the one bound to `player_id`
    pub fn except(event: ServerEvent, player_id: impl Into<String>) -> Self {
        Self { event, exclude: Some(player_id.into()) }
    }
}
