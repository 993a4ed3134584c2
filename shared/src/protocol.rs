//! Network protocol definitions shared between client and server.
//!
//! Every message is a JSON object carrying a `type` discriminator. Field
//! names are part of the client contract and must not change.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entities::{AiState, Vec2};

/// Default server port
pub const DEFAULT_PORT: u16 = 7777;

/// Largest datagram the server reads
pub const MAX_PACKET_SIZE: usize = 4096;

/// Errors raised while decoding an inbound message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {0} message")]
    Invalid(&'static str),
}

// =============================================================================
// Client -> Server Messages
// =============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Position report (sent frequently); also binds the connection on first use
    Move {
        id: String,
        x: f64,
        y: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        facing: Option<Vec2>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        combat: Option<bool>,
    },

    /// Damage computed client-side (zones, blocking); amount is already reduced
    DamageRequest {
        source: String,
        target: String,
        amount: f64,
    },

    /// Spend energy
    EnergyRequest {
        id: String,
        amount: f64,
    },

    /// Start a melee swing
    PlayerAttackRequest {
        attack_id: String,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        dir: Vec2,
        weapon: String,
    },

    /// Client believes a swing connected
    AttackHitReport {
        attack_id: String,
        source: String,
        target: String,
    },

    /// Resolve an NPC swing against a player
    NpcAttackRequest {
        npc_id: String,
        target: String,
    },

    /// Drop an item on the ground
    ItemDrop {
        id: String,
        item: String,
        x: f64,
        y: f64,
    },

    /// Pick up a ground item
    ItemPickup {
        id: String,
        entity_id: u64,
    },
}

fn valid_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 64
}

fn valid_amount(amount: f64) -> bool {
    amount.is_finite() && amount >= 0.0
}

impl ClientMessage {
    /// Decode and validate a message. Anything that fails here must never
    /// reach the simulation.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        if message.is_well_formed() {
            Ok(message)
        } else {
            Err(ProtocolError::Invalid(message.kind()))
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the message type
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Move { .. } => "move",
            Self::DamageRequest { .. } => "damage_request",
            Self::EnergyRequest { .. } => "energy_request",
            Self::PlayerAttackRequest { .. } => "player_attack_request",
            Self::AttackHitReport { .. } => "attack_hit_report",
            Self::NpcAttackRequest { .. } => "npc_attack_request",
            Self::ItemDrop { .. } => "item_drop",
            Self::ItemPickup { .. } => "item_pickup",
        }
    }

    /// The player id this message acts on behalf of, if it names one
    pub fn actor(&self) -> Option<&str> {
        match self {
            Self::Move { id, .. } => Some(id),
            Self::EnergyRequest { id, .. } => Some(id),
            Self::PlayerAttackRequest { source, .. } => Some(source),
            Self::AttackHitReport { source, .. } => Some(source),
            Self::ItemDrop { id, .. } => Some(id),
            Self::ItemPickup { id, .. } => Some(id),
            // Damage and NPC swings are reported on behalf of other entities
            Self::DamageRequest { .. } | Self::NpcAttackRequest { .. } => None,
        }
    }

    /// Value checks that the JSON schema alone cannot express
    pub fn is_well_formed(&self) -> bool {
        match self {
            Self::Move { id, x, y, facing, .. } => {
                valid_id(id)
                    && x.is_finite()
                    && y.is_finite()
                    && facing.map_or(true, |f| f.is_finite())
            }
            Self::DamageRequest { source, target, amount } => {
                valid_id(source) && valid_id(target) && valid_amount(*amount)
            }
            Self::EnergyRequest { id, amount } => valid_id(id) && valid_amount(*amount),
            Self::PlayerAttackRequest { attack_id, source, target, dir, weapon } => {
                valid_id(attack_id)
                    && valid_id(source)
                    && target.as_deref().map_or(true, valid_id)
                    && dir.is_finite()
                    && dir.length_squared() > 1e-12
                    && valid_id(weapon)
            }
            Self::AttackHitReport { attack_id, source, target } => {
                valid_id(attack_id) && valid_id(source) && valid_id(target)
            }
            Self::NpcAttackRequest { npc_id, target } => valid_id(npc_id) && valid_id(target),
            Self::ItemDrop { id, item, x, y } => {
                valid_id(id) && valid_id(item) && x.is_finite() && y.is_finite()
            }
            Self::ItemPickup { id, .. } => valid_id(id),
        }
    }
}

// =============================================================================
// Server -> Client Events
// =============================================================================

/// Events sent from server to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Authoritative player position
    Move {
        id: String,
        x: f64,
        y: f64,
        vx: f64,
        vy: f64,
        facing: Vec2,
        moving: bool,
        combat: bool,
    },

    /// Damage was applied
    Damage {
        source: String,
        target: String,
        amount: f64,
        hp: f64,
    },

    /// Floating damage number
    DamagePopup {
        target: String,
        amount: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },

    /// Hit effect at the target
    HitFx {
        source: String,
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        x: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        y: Option<f64>,
    },

    /// Full HP state for one entity
    HpSync {
        id: String,
        hp: f64,
        max_hp: f64,
    },

    /// Energy changed
    EnergyUpdate {
        id: String,
        energy: f64,
        max_energy: f64,
    },

    /// Full energy state for one entity
    EnergySync {
        id: String,
        energy: f64,
        max_energy: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocked_until: Option<f64>,
    },

    /// Player left
    Disconnect {
        id: String,
    },

    /// Item placed on the ground
    ItemDrop {
        entity_id: u64,
        item: String,
        x: f64,
        y: f64,
        by: String,
    },

    /// Ground item was picked up
    ItemPickup {
        entity_id: u64,
        by: String,
    },

    /// NPC entered the world
    NpcSpawn {
        id: String,
        kind: String,
        x: f64,
        y: f64,
        hp: f64,
        max_hp: f64,
    },

    /// NPC position/behaviour changed
    NpcState {
        id: String,
        x: f64,
        y: f64,
        state: AiState,
        facing: Vec2,
        moving: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },

    /// NPC left the world
    NpcDespawn {
        id: String,
    },

    /// A swing began (player or NPC)
    AttackStart {
        attack_id: String,
        source: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        dir: Vec2,
        weapon: String,
        duration: f64,
    },
}

impl ServerEvent {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
