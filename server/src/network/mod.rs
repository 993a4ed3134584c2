//! Transport adapter: UDP datagrams carrying one JSON message each.

mod server;

pub use server::{ClientConnection, Server};

use arena_shared::ServerEvent;

use crate::events::Outgoing;

/// Outbound half of the transport as seen by the simulation
pub trait Broadcaster {
    /// Queue `event` for every bound connection except `exclude`'s
    fn broadcast(&mut self, event: &ServerEvent, exclude: Option<&str>);

    /// Queue a join snapshot for the connection bound to `player_id`
    fn send_snapshot(&mut self, player_id: &str, events: Vec<ServerEvent>);
}

/// Hand simulation output to a broadcaster
pub fn deliver<B: Broadcaster + ?Sized>(broadcaster: &mut B, outgoing: Vec<Outgoing>) {
    for item in outgoing {
        broadcaster.broadcast(&item.event, item.exclude.as_deref());
    }
}
