//! Arena game server
//!
//! An authoritative simulation for a small top-down arena: movement
//! validation, grid pathfinding, NPC AI, melee combat and energy
//! regeneration, served to clients over UDP.

pub mod ai;
pub mod combat;
pub mod config;
pub mod dispatch;
pub mod entities;
pub mod events;
pub mod movement;
pub mod navigation;
pub mod network;
pub mod regen;
pub mod world;

pub use config::{BlockedCells, ConfigError, ServerConfig};
pub use events::Outgoing;
pub use world::World;
