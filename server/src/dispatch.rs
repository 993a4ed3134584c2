//! Routes decoded client messages into the simulation.

use log::debug;

use arena_shared::{ClientMessage, Vec2};

use crate::events::Outgoing;
use crate::world::World;
use crate::{combat, movement, regen};

/// Apply one message from the connection bound to `sender`.
///
/// A message acting on behalf of anyone but `sender` is dropped without
/// touching the world.
pub fn handle_message(world: &mut World, sender: &str, message: ClientMessage, now: f64) -> Vec<Outgoing> {
    if let Some(actor) = message.actor() {
        if actor != sender {
            debug!("Dropped {} from {} acting as {}", message.kind(), sender, actor);
            return Vec::new();
        }
    }

    match message {
        ClientMessage::Move { id, x, y, facing, combat } => {
            movement::handle_move(world, &id, Vec2::new(x, y), facing, combat, now)
        }
        ClientMessage::DamageRequest { source, target, amount } => {
            combat::apply_damage(world, &source, &target, amount, now)
        }
        ClientMessage::EnergyRequest { id, amount } => regen::spend_energy(world, &id, amount, now),
        ClientMessage::PlayerAttackRequest { attack_id, source, target, dir, weapon } => {
            combat::start_player_attack(world, &attack_id, &source, target.as_deref(), dir, &weapon, now)
        }
        ClientMessage::AttackHitReport { attack_id, source, target } => {
            combat::resolve_hit_report(world, &attack_id, &source, &target, now)
        }
        ClientMessage::NpcAttackRequest { npc_id, target } => {
            combat::npc_attack_request(world, &npc_id, &target, now)
        }
        ClientMessage::ItemDrop { id, item, x, y } => world.drop_item(&id, &item, Vec2::new(x, y)),
        ClientMessage::ItemPickup { id, entity_id } => world.pickup_item(&id, entity_id),
    }
}
