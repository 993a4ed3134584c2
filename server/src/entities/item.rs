//! World item entity (dropped items).

use arena_shared::{ServerEvent, Vec2};

/// An item lying on the ground
#[derive(Debug, Clone)]
pub struct WorldItem {
    pub entity_id: u64,
    pub item: String,
    pub position: Vec2,
    pub dropped_by: String,
}

impl WorldItem {
    pub fn drop_event(&self) -> ServerEvent {
        ServerEvent::ItemDrop {
            entity_id: self.entity_id,
            item: self.item.clone(),
            x: self.position.x,
            y: self.position.y,
            by: self.dropped_by.clone(),
        }
    }
}
