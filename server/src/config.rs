//! Server configuration.
//!
//! Everything tunable lives in `ServerConfig`, loaded from a JSON file. Every
//! field has a default so a partial file only overrides what it names. The
//! static blocked terrain comes from a separate side file.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use arena_shared::{Cell, GridSpec, Vec2, DEFAULT_PORT};

/// Errors raised while loading configuration files
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid blocked cell key {0:?}, expected \"cx,cy\"")]
    BadCellKey(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Melee profile for a weapon tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponProfile {
    pub damage: f64,
    /// Hitbox length along the swing direction, in world units
    pub reach: f64,
    /// Hitbox width across the swing direction, in world units
    pub width: f64,
    /// How long the swing can still connect
    pub active_secs: f64,
}

impl Default for WeaponProfile {
    fn default() -> Self {
        Self { damage: 10.0, reach: 40.0, width: 32.0, active_secs: 0.4 }
    }
}

/// One NPC in the bootstrap population
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcSpawn {
    /// Spawn slot name; live NPC ids are `<name>-<generation>`
    pub name: String,
    #[serde(default = "default_npc_kind")]
    pub kind: String,
    pub cell: Cell,
    #[serde(default = "default_npc_hp")]
    pub max_hp: f64,
    #[serde(default = "default_npc_damage")]
    pub damage: f64,
    #[serde(default)]
    pub patrol: Vec<Cell>,
    #[serde(default = "default_true")]
    pub patrol_loop: bool,
}

fn default_npc_kind() -> String {
    "goblin".to_string()
}

fn default_npc_hp() -> f64 {
    60.0
}

fn default_npc_damage() -> f64 {
    8.0
}

fn default_true() -> bool {
    true
}

/// NPC behaviour tuning. Ranges are Chebyshev distances in cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NpcTuning {
    pub aggro_range: i32,
    pub lose_range: i32,
    /// Melee hitbox length in front of the NPC, world units
    pub attack_reach: f64,
    /// Melee hitbox width, world units
    pub attack_width: f64,
    /// Minimum facing·direction-to-target to land a hit
    pub facing_dot_threshold: f64,
    pub attack_cooldown_secs: f64,
    /// Delay between `attack_start` and the hit resolving
    pub attack_windup_secs: f64,
    /// An NPC cannot start a swing this soon after stepping
    pub post_move_attack_delay_secs: f64,
    /// Time to cross one cell
    pub step_interval_secs: f64,
    /// Health fraction below which an NPC may retreat
    pub retreat_health_fraction: f64,
    /// Chance to retreat once health drops below the threshold
    pub retreat_chance: f64,
    /// Distance at which a retreating NPC feels safe again
    pub retreat_safe_distance: i32,
    /// Health fraction at which a retreating NPC is willing to fight again.
    /// NPCs never heal, so anything above `retreat_health_fraction` keeps a
    /// retreating NPC away until it loses its target.
    pub retreat_recover_fraction: f64,
    pub patrol_wait_secs: f64,
    /// How long a lost target's last cell stays worth searching
    pub memory_secs: f64,
    /// How far ahead a chasing NPC leads its target
    pub chase_prediction_secs: f64,
    /// Lead is damped linearly to zero within this many cells of axis alignment
    pub chase_alignment_band: f64,
    /// A* gives up after expanding this many nodes
    pub path_node_budget: usize,
}

impl Default for NpcTuning {
    fn default() -> Self {
        Self {
            aggro_range: 6,
            lose_range: 10,
            attack_reach: 44.0,
            attack_width: 32.0,
            facing_dot_threshold: 0.5,
            attack_cooldown_secs: 1.2,
            attack_windup_secs: 0.35,
            post_move_attack_delay_secs: 0.2,
            step_interval_secs: 0.3,
            retreat_health_fraction: 0.25,
            retreat_chance: 0.5,
            retreat_safe_distance: 5,
            retreat_recover_fraction: 0.0,
            patrol_wait_secs: 2.0,
            memory_secs: 5.0,
            chase_prediction_secs: 0.3,
            chase_alignment_band: 2.0,
            path_node_budget: 512,
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub default_hp: f64,
    pub default_energy: f64,
    /// Energy refills in this many equal segments
    pub energy_segments: u32,
    /// Minimum time between two regenerated segments
    pub energy_segment_period_secs: f64,
    pub energy_lockout_min_secs: f64,
    pub energy_lockout_max_secs: f64,
    /// World units per second
    pub max_speed: f64,
    /// Playable area is `[-world_half_extent, world_half_extent]` on each axis
    pub world_half_extent: f64,
    pub grid: GridSpec,
    /// Half extent of every entity's body box, world units
    pub body_half_extent: f64,
    pub ai_tick_secs: f64,
    pub regen_tick_secs: f64,
    /// Extra time after a swing's active window during which a hit report is accepted
    pub attack_grace_secs: f64,
    pub connection_timeout_secs: f64,
    pub npc: NpcTuning,
    pub weapons: BTreeMap<String, WeaponProfile>,
    pub npc_spawns: Vec<NpcSpawn>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let mut weapons = BTreeMap::new();
        weapons.insert("fists".to_string(), WeaponProfile { damage: 5.0, reach: 28.0, width: 24.0, active_secs: 0.25 });
        weapons.insert("sword".to_string(), WeaponProfile::default());
        weapons.insert("spear".to_string(), WeaponProfile { damage: 12.0, reach: 64.0, width: 16.0, active_secs: 0.45 });

        Self {
            port: DEFAULT_PORT,
            default_hp: 100.0,
            default_energy: 100.0,
            energy_segments: 10,
            energy_segment_period_secs: 1.0,
            energy_lockout_min_secs: 5.0,
            energy_lockout_max_secs: 30.0,
            max_speed: 240.0,
            world_half_extent: 100_000.0,
            grid: GridSpec::default(),
            body_half_extent: 12.0,
            ai_tick_secs: 0.1,
            regen_tick_secs: 0.25,
            attack_grace_secs: 0.25,
            connection_timeout_secs: 30.0,
            npc: NpcTuning::default(),
            weapons,
            npc_spawns: default_npc_spawns(),
        }
    }
}

fn default_npc_spawns() -> Vec<NpcSpawn> {
    vec![
        NpcSpawn {
            name: "goblin_gate".to_string(),
            kind: "goblin".to_string(),
            cell: Cell::new(8, 4),
            max_hp: 60.0,
            damage: 8.0,
            patrol: vec![Cell::new(8, 4), Cell::new(12, 4), Cell::new(12, 8), Cell::new(8, 8)],
            patrol_loop: true,
        },
        NpcSpawn {
            name: "wolf_den".to_string(),
            kind: "wolf".to_string(),
            cell: Cell::new(-6, 10),
            max_hp: 45.0,
            damage: 10.0,
            patrol: Vec::new(),
            patrol_loop: false,
        },
    ]
}

impl ServerConfig {
    /// Load a configuration file; fields it omits keep their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ServerConfig = serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to the built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                config
            }
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                info!("No {:?} found, using default configuration", path);
                Self::default()
            }
            Err(e) => {
                error!("{}", e);
                error!("Using default configuration");
                Self::default()
            }
        }
    }

    /// Reject values the simulation cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |msg: &str| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg.to_string())) };

        if !(self.grid.size.is_finite() && self.grid.size > 0.0) {
            return fail("grid.size must be positive");
        }
        if !self.grid.center_offset.is_finite() {
            return fail("grid.center_offset must be finite");
        }
        if !(self.default_hp > 0.0 && self.default_energy > 0.0) {
            return fail("default_hp and default_energy must be positive");
        }
        if self.energy_segments == 0 {
            return fail("energy_segments must be at least 1");
        }
        if !(self.energy_lockout_min_secs >= 0.0
            && self.energy_lockout_min_secs < self.energy_lockout_max_secs)
        {
            return fail("energy lockout bounds must satisfy 0 <= min < max");
        }
        if !(self.max_speed > 0.0) {
            return fail("max_speed must be positive");
        }
        // Cells of the playable area must fit comfortably in i32
        if !(self.world_half_extent > 0.0 && self.world_half_extent / self.grid.size < f64::from(i32::MAX / 4)) {
            return fail("world_half_extent must be positive and within the grid's coordinate range");
        }
        if !(self.ai_tick_secs > 0.0 && self.regen_tick_secs > 0.0) {
            return fail("tick periods must be positive");
        }
        if self.npc.aggro_range < 0 || self.npc.lose_range < self.npc.aggro_range {
            return fail("npc.lose_range must be at least npc.aggro_range");
        }
        if !(0.0..=1.0).contains(&self.npc.retreat_chance) {
            return fail("npc.retreat_chance must be within [0, 1]");
        }
        if self.npc.path_node_budget == 0 {
            return fail("npc.path_node_budget must be at least 1");
        }
        for spawn in &self.npc_spawns {
            if spawn.name.is_empty() || !(spawn.max_hp > 0.0) {
                return Err(ConfigError::Invalid(format!("npc spawn {:?} needs a name and positive max_hp", spawn.name)));
            }
        }
        Ok(())
    }

    /// Whether `pos` lies inside the playable area
    pub fn in_bounds(&self, pos: Vec2) -> bool {
        pos.x.abs() <= self.world_half_extent && pos.y.abs() <= self.world_half_extent
    }

    /// Profile for a weapon tag; unknown tags swing like fists
    pub fn weapon(&self, tag: &str) -> WeaponProfile {
        self.weapons
            .get(tag)
            .or_else(|| self.weapons.get("fists"))
            .cloned()
            .unwrap_or_default()
    }
}

/// Static terrain that nothing can walk through
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockedCells {
    cells: HashSet<Cell>,
}

impl BlockedCells {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cells<I: IntoIterator<Item = Cell>>(cells: I) -> Self {
        Self { cells: cells.into_iter().collect() }
    }

    pub fn contains(&self, cell: Cell) -> bool {
        self.cells.contains(&cell)
    }

    pub fn insert(&mut self, cell: Cell) {
        self.cells.insert(cell);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Parse the side file format: a JSON object keyed by `"cx,cy"`
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let json: serde_json::Value = serde_json::from_str(content).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<blocked cells>"),
            source,
        })?;
        let obj = json
            .as_object()
            .ok_or_else(|| ConfigError::Invalid("blocked cells root is not an object".to_string()))?;

        let mut blocked = Self::new();
        for (key, value) in obj {
            if !value.as_bool().unwrap_or(true) {
                continue;
            }
            blocked.insert(parse_cell_key(key)?);
        }
        Ok(blocked)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let blocked = Self::parse(&content).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse { path: path.to_path_buf(), source },
            other => other,
        })?;
        info!("Loaded {} blocked cells from {:?}", blocked.len(), path);
        Ok(blocked)
    }

    /// Load the side file, treating a missing or broken file as open terrain
    pub fn load_or_empty<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(blocked) => blocked,
            Err(ConfigError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                info!("No {:?} found, terrain is fully open", path);
                Self::new()
            }
            Err(e) => {
                warn!("{}; terrain is fully open", e);
                Self::new()
            }
        }
    }
}

fn parse_cell_key(key: &str) -> Result<Cell, ConfigError> {
    let bad = || ConfigError::BadCellKey(key.to_string());
    let (x, y) = key.split_once(',').ok_or_else(bad)?;
    let x = x.trim().parse::<i32>().map_err(|_| bad())?;
    let y = y.trim().parse::<i32>().map_err(|_| bad())?;
    Ok(Cell::new(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.energy_segments, 10);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"max_speed": 20.0, "npc": {"aggro_range": 3}}"#).unwrap();
        assert_eq!(config.max_speed, 20.0);
        assert_eq!(config.npc.aggro_range, 3);
        assert_eq!(config.npc.lose_range, NpcTuning::default().lose_range);
        assert_eq!(config.default_hp, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_lockout() {
        let config = ServerConfig {
            energy_lockout_min_secs: 30.0,
            energy_lockout_max_secs: 5.0,
            ..ServerConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_lose_below_aggro() {
        let mut config = ServerConfig::default();
        config.npc.aggro_range = 8;
        config.npc.lose_range = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_world_extent() {
        let config = ServerConfig::default();
        assert!(config.in_bounds(Vec2::new(-100_000.0, 99_999.0)));
        assert!(!config.in_bounds(Vec2::new(-1e300, 0.0)));
        assert!(!config.in_bounds(Vec2::new(0.0, 100_000.5)));

        let huge = ServerConfig { world_half_extent: 1e12, ..ServerConfig::default() };
        assert!(huge.validate().is_err());
    }

    #[test]
    fn test_unknown_weapon_falls_back_to_fists() {
        let config = ServerConfig::default();
        assert_eq!(config.weapon("banana"), config.weapons["fists"]);
        assert_eq!(config.weapon("spear").reach, 64.0);
    }

    #[test]
    fn test_parse_blocked_cells() {
        let blocked = BlockedCells::parse(r#"{"3,4": true, "-1, 7": true, "9,9": false}"#).unwrap();
        assert_eq!(blocked.len(), 2);
        assert!(blocked.contains(Cell::new(3, 4)));
        assert!(blocked.contains(Cell::new(-1, 7)));
        assert!(!blocked.contains(Cell::new(9, 9)));
    }

    #[test]
    fn test_parse_blocked_cells_bad_key() {
        assert!(matches!(
            BlockedCells::parse(r#"{"3;4": true}"#),
            Err(ConfigError::BadCellKey(_))
        ));
        assert!(BlockedCells::parse("[1, 2]").is_err());
    }

    #[test]
    fn test_missing_config_file_falls_back() {
        let config = ServerConfig::load_or_default("/nonexistent/server_config.json");
        assert_eq!(config, ServerConfig::default());
        assert!(BlockedCells::load_or_empty("/nonexistent/blocked_cells.json").is_empty());
    }
}
