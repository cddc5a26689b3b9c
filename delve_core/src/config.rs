//! Tunable constants for generation, population, loot and play.
//!
//! Every struct carries sane defaults and deserializes with
//! `#[serde(default)]`, so an override file only needs the fields it changes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub generation: GenerationConfig,
    pub population: PopulationConfig,
    pub loot: LootConfig,
    pub player: PlayerConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Gap attempts per coarse cell.
    pub gap_proportion: f64,
    pub door_proportion: f64,
    pub room_proportion: f64,
    pub glass_proportion: f64,
    /// Doors saving fewer steps than this revert to wall.
    pub door_threshold: u32,
    pub room_sizes: Vec<usize>,
    pub glass_wall_length: usize,
    /// Whether `Edge` cells may be trimmed by the corner-cut passes.
    pub corner_cut_rooms: bool,
    /// One entry per corner-cut pass.
    pub cut_probabilities: Vec<f64>,
    pub chest_probability: f64,
    pub nether_crack_probability: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            gap_proportion: 0.07,
            door_proportion: 0.2,
            room_proportion: 0.035,
            glass_proportion: 0.05,
            door_threshold: 50,
            room_sizes: vec![3, 5, 7, 9],
            glass_wall_length: 5,
            corner_cut_rooms: false,
            cut_probabilities: vec![1.0, 1.0],
            chest_probability: 0.65,
            nether_crack_probability: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PopulationConfig {
    /// `P0` in `1 - (1 - P0) * e^(-visible / K)`.
    pub enemy_probability: f64,
    /// `K` in the spawn probability.
    pub enemy_tile_constant: f64,
    /// Upper bound on a hidden enemy's unhide threshold.
    pub hidden_unhide_steps: u32,
    pub difficulty_divisor: u64,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            enemy_probability: 0.25,
            enemy_tile_constant: 40.0,
            hidden_unhide_steps: 8,
            difficulty_divisor: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LootConfig {
    pub value_multiplier: u32,
    pub super_chest_probability: f64,
    pub max_chest_items: usize,
    pub early_stop_probability: f64,
    /// Chance that a chest holds only gold, skipping the item draw.
    pub leftover_currency_probability: f64,
}

impl Default for LootConfig {
    fn default() -> Self {
        Self {
            value_multiplier: 3,
            super_chest_probability: 0.1,
            max_chest_items: 4,
            early_stop_probability: 0.15,
            leftover_currency_probability: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub max_hp: u32,
    pub max_mana: u32,
    pub armor: u32,
    pub unarmed_damage: u32,
    /// Ticks between passive regeneration of one hit point. Zero disables.
    pub hp_regen_interval: u64,
    pub mana_regen_interval: u64,
    /// Item names and counts granted when the player is created.
    pub starting_items: Vec<(String, u32)>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            max_hp: 20,
            max_mana: 10,
            armor: 0,
            unarmed_damage: 1,
            hp_regen_interval: 10,
            mana_regen_interval: 5,
            starting_items: vec![
                ("key".to_string(), 1),
                ("s-seeing".to_string(), 1),
                ("dagger".to_string(), 1),
                ("potion".to_string(), 2),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stun applied to a revealed hidden enemy that appears next to the player.
    pub ambush_stun: u32,
    /// Ticks a scrying beacon keeps revealing its surroundings.
    pub scry_duration: u32,
    pub potion_heal: u32,
    pub mana_potion_restore: u32,
    pub stun_bomb_turns: u32,
    pub revelation_radius: i32,
    pub greater_revelation_radius: i32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ambush_stun: 1,
            scry_duration: 5,
            potion_heal: 8,
            mana_potion_restore: 6,
            stun_bomb_turns: 3,
            revelation_radius: 10,
            greater_revelation_radius: 15,
        }
    }
}
