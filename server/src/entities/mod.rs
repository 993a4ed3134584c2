//! Server-side entity definitions.

mod body;
mod player;
mod npc;
mod item;

pub use body::Body;
pub use player::ServerPlayer;
pub use npc::{ServerNpc, PatrolRoute};
pub use item::WorldItem;
