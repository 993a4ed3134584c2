//! Game world management.
//!
//! `World` owns every authoritative table: players, NPCs, HP/energy records,
//! live player attacks and ground items. Subsystems (movement, AI, combat,
//! regeneration) receive it by `&mut` from the single event loop.

mod vitals;

pub use vitals::{EnergyLockout, Vitals, VitalsStore};

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;

use arena_shared::{Cell, GridSpec, ServerEvent, Vec2};

use crate::ai::NpcMeta;
use crate::combat::{AttackKey, AttackRecord};
use crate::config::{BlockedCells, NpcSpawn, ServerConfig};
use crate::entities::{Body, PatrolRoute, ServerNpc, ServerPlayer, WorldItem};
use crate::events::Outgoing;

/// The game world containing all entities
#[derive(Debug)]
pub struct World {
    config: ServerConfig,
    blocked: BlockedCells,
    pub(crate) players: BTreeMap<String, ServerPlayer>,
    pub(crate) npcs: BTreeMap<String, ServerNpc>,
    pub(crate) vitals: VitalsStore,
    pub(crate) attacks: HashMap<AttackKey, AttackRecord>,
    items: BTreeMap<u64, WorldItem>,
    next_item_id: u64,
    /// Bumped on every bootstrap so respawned NPCs never reuse a dead id
    spawn_generation: u32,
    pub(crate) rng: StdRng,
}

impl World {
    pub fn new(config: ServerConfig, blocked: BlockedCells) -> Self {
        Self::with_rng(config, blocked, StdRng::from_entropy())
    }

    /// Deterministic world for tests and replays
    pub fn with_seed(config: ServerConfig, blocked: BlockedCells, seed: u64) -> Self {
        Self::with_rng(config, blocked, StdRng::seed_from_u64(seed))
    }

    pub fn with_rng(config: ServerConfig, blocked: BlockedCells, rng: StdRng) -> Self {
        Self {
            config,
            blocked,
            players: BTreeMap::new(),
            npcs: BTreeMap::new(),
            vitals: VitalsStore::new(),
            attacks: HashMap::new(),
            items: BTreeMap::new(),
            next_item_id: 1,
            spawn_generation: 0,
            rng,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn grid(&self) -> &GridSpec {
        &self.config.grid
    }

    pub fn blocked(&self) -> &BlockedCells {
        &self.blocked
    }

    pub fn energy_lockout(&self) -> EnergyLockout {
        EnergyLockout {
            min_secs: self.config.energy_lockout_min_secs,
            max_secs: self.config.energy_lockout_max_secs,
        }
    }

    // =========================================================================
    // Players
    // =========================================================================

    pub fn get_player(&self, id: &str) -> Option<&ServerPlayer> {
        self.players.get(id)
    }

    pub fn get_player_mut(&mut self, id: &str) -> Option<&mut ServerPlayer> {
        self.players.get_mut(id)
    }

    pub fn players(&self) -> impl Iterator<Item = &ServerPlayer> {
        self.players.values()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Insert a freshly seen player. HP/energy left over from an earlier
    /// session are reused.
    pub(crate) fn insert_player(&mut self, id: &str, position: Vec2, now: f64) -> &mut ServerPlayer {
        self.ensure_vitals(id, now);
        info!("Player {} entered at ({:.1}, {:.1})", id, position.x, position.y);
        self.players
            .entry(id.to_string())
            .or_insert_with(|| ServerPlayer::new(id.to_string(), position, now))
    }

    /// Remove a player on disconnect. Its HP/energy record is kept.
    pub fn remove_player(&mut self, id: &str) -> Vec<Outgoing> {
        if self.players.remove(id).is_none() {
            return Vec::new();
        }
        self.attacks.retain(|_, attack| attack.source != id);
        info!("Player {} left", id);
        vec![Outgoing::except(ServerEvent::Disconnect { id: id.to_string() }, id)]
    }

    // =========================================================================
    // NPCs
    // =========================================================================

    pub fn get_npc(&self, id: &str) -> Option<&ServerNpc> {
        self.npcs.get(id)
    }

    pub fn get_npc_mut(&mut self, id: &str) -> Option<&mut ServerNpc> {
        self.npcs.get_mut(id)
    }

    pub fn npcs(&self) -> impl Iterator<Item = &ServerNpc> {
        self.npcs.values()
    }

    pub fn npc_count(&self) -> usize {
        self.npcs.len()
    }

    pub fn is_npc(&self, id: &str) -> bool {
        self.npcs.contains_key(id)
    }

    /// Spawn one NPC from its spawn definition
    pub fn spawn_npc(&mut self, spawn: &NpcSpawn, now: f64) -> Vec<Outgoing> {
        let id = format!("{}-{}", spawn.name, self.spawn_generation);
        let position = self.config.grid.cell_to_world(spawn.cell);
        let mut npc = ServerNpc {
            id: id.clone(),
            kind: spawn.kind.clone(),
            body: Body::new(position, now),
            patrol: PatrolRoute {
                points: spawn.patrol.clone(),
                looping: spawn.patrol_loop,
            },
            damage: spawn.damage,
            ai: NpcMeta::spawned(now),
        };

        let max_energy = self.config.default_energy;
        self.vitals.insert(id.clone(), Vitals::new(spawn.max_hp, max_energy, now));

        let state = npc.state_event();
        npc.ai.last_broadcast = Some(state.clone());
        let events = vec![
            Outgoing::to_all(npc.spawn_event(spawn.max_hp, spawn.max_hp)),
            Outgoing::to_all(state),
        ];
        debug!("Spawned {} '{}' at cell {}", npc.kind, id, spawn.cell);
        self.npcs.insert(id, npc);
        events
    }

    /// Spawn the configured population. Does nothing while any NPC is alive,
    /// so calling it every tick repopulates exactly once per wipe.
    pub fn bootstrap_npcs(&mut self, now: f64) -> Vec<Outgoing> {
        if !self.npcs.is_empty() || self.config.npc_spawns.is_empty() {
            return Vec::new();
        }
        self.spawn_generation += 1;
        let spawns = self.config.npc_spawns.clone();
        let events: Vec<Outgoing> = spawns
            .iter()
            .flat_map(|spawn| self.spawn_npc(spawn, now))
            .collect();
        info!("Spawned {} NPCs (generation {})", self.npcs.len(), self.spawn_generation);
        events
    }

    /// Remove a dead NPC and everything keyed by its id
    pub fn despawn_npc(&mut self, id: &str) -> Vec<Outgoing> {
        if self.npcs.remove(id).is_none() {
            return Vec::new();
        }
        self.vitals.remove(id);
        info!("NPC {} died", id);
        vec![Outgoing::to_all(ServerEvent::NpcDespawn { id: id.to_string() })]
    }

    // =========================================================================
    // Shared entity queries
    // =========================================================================

    /// Body of a player or NPC
    pub fn body(&self, id: &str) -> Option<&Body> {
        self.players
            .get(id)
            .map(|p| &p.body)
            .or_else(|| self.npcs.get(id).map(|n| &n.body))
    }

    pub fn cell_of(&self, id: &str) -> Option<Cell> {
        self.body(id).map(|b| b.cell(&self.config.grid))
    }

    // =========================================================================
    // HP / energy
    // =========================================================================

    pub fn vitals(&self) -> &VitalsStore {
        &self.vitals
    }

    pub fn vitals_mut(&mut self) -> &mut VitalsStore {
        &mut self.vitals
    }

    /// The record for `id`, created with default maxima if it is missing
    pub fn ensure_vitals(&mut self, id: &str, now: f64) -> &mut Vitals {
        let (max_hp, max_energy) = (self.config.default_hp, self.config.default_energy);
        self.vitals.ensure(id, max_hp, max_energy, now)
    }

    /// Whether `id` is alive; entities without a record have default HP
    pub fn is_alive(&self, id: &str) -> bool {
        self.vitals.get(id).map_or(true, Vitals::is_alive)
    }

    // =========================================================================
    // Ground items
    // =========================================================================

    pub fn items(&self) -> impl Iterator<Item = &WorldItem> {
        self.items.values()
    }

    /// Put an item on the ground
    pub fn drop_item(&mut self, by: &str, item: &str, position: Vec2) -> Vec<Outgoing> {
        if !self.config.in_bounds(position) {
            debug!("Dropped item {} from {} outside the world", item, by);
            return Vec::new();
        }
        let entity_id = self.next_item_id;
        self.next_item_id += 1;

        let world_item = WorldItem {
            entity_id,
            item: item.to_string(),
            position,
            dropped_by: by.to_string(),
        };
        let event = world_item.drop_event();
        self.items.insert(entity_id, world_item);
        vec![Outgoing::to_all(event)]
    }

    /// Remove a ground item; a second pickup of the same item is ignored
    pub fn pickup_item(&mut self, by: &str, entity_id: u64) -> Vec<Outgoing> {
        match self.items.remove(&entity_id) {
            Some(_) => vec![Outgoing::to_all(ServerEvent::ItemPickup {
                entity_id,
                by: by.to_string(),
            })],
            None => {
                debug!("Player {} tried to pick up missing item {}", by, entity_id);
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Snapshots and reset
    // =========================================================================

    /// Everything a newly joined client needs to see the current world
    pub fn snapshot(&self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        for player in self.players.values() {
            events.push(player.move_event());
        }
        for id in self.players.keys() {
            events.extend(self.vitals.hp_sync(id));
            events.extend(self.vitals.energy_sync(id));
        }
        for npc in self.npcs.values() {
            let (hp, max_hp) = self
                .vitals
                .get(&npc.id)
                .map_or((0.0, 0.0), |v| (v.hp, v.max_hp));
            events.push(npc.spawn_event(hp, max_hp));
            events.push(npc.state_event());
        }
        for item in self.items.values() {
            events.push(item.drop_event());
        }

        events
    }

    /// Clear every table, HP/energy records included
    pub fn reset(&mut self) {
        self.players.clear();
        self.npcs.clear();
        self.vitals.clear();
        self.attacks.clear();
        self.items.clear();
        info!("World reset");
    }
}
