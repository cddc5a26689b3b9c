use serde::{Deserialize, Serialize};

use crate::items::Attack;

/// Index of an enemy type in its [`Bestiary`].
pub type EnemyTypeId = usize;

/// Immutable definition of a kind of monster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyType {
    pub name: String,
    /// Spawns only where `visible * steps / divisor` reaches this value.
    pub difficulty: u64,
    pub max_hp: u32,
    pub armor: u32,
    pub attack: Attack,
    /// Holds position instead of shuffling around once next to the player.
    pub stop_if_adjacent: bool,
    /// Chance per tick that an aggroed monster steps randomly instead of
    /// chasing.
    pub random_walk_probability: f64,
    /// Whether it may still attack on a tick it moved.
    pub move_and_attack: bool,
    /// Whether it forgets the player once out of sight.
    pub loses_aggro: bool,
    /// Chance to be placed as an ambush marker instead of a live monster.
    pub hidden_probability: f64,
}

/// Ordered, immutable enemy registry.
#[derive(Debug, Clone)]
pub struct Bestiary {
    types: Vec<EnemyType>,
}

impl Bestiary {
    pub fn builder() -> BestiaryBuilder {
        BestiaryBuilder::default()
    }

    pub fn standard() -> Self {
        Self::builder()
            .enemy(EnemyType {
                name: "rat".to_string(),
                difficulty: 0,
                max_hp: 2,
                armor: 0,
                attack: Attack { damage: 1, stun: 0 },
                stop_if_adjacent: true,
                random_walk_probability: 0.3,
                move_and_attack: false,
                loses_aggro: true,
                hidden_probability: 0.0,
            })
            .enemy(EnemyType {
                name: "goblin".to_string(),
                difficulty: 2,
                max_hp: 5,
                armor: 0,
                attack: Attack { damage: 2, stun: 0 },
                stop_if_adjacent: true,
                random_walk_probability: 0.1,
                move_and_attack: false,
                loses_aggro: true,
                hidden_probability: 0.1,
            })
            .enemy(EnemyType {
                name: "lurker".to_string(),
                difficulty: 4,
                max_hp: 6,
                armor: 1,
                attack: Attack { damage: 3, stun: 1 },
                stop_if_adjacent: true,
                random_walk_probability: 0.0,
                move_and_attack: false,
                loses_aggro: false,
                hidden_probability: 0.8,
            })
            .enemy(EnemyType {
                name: "ogre".to_string(),
                difficulty: 8,
                max_hp: 14,
                armor: 2,
                attack: Attack { damage: 4, stun: 1 },
                stop_if_adjacent: true,
                random_walk_probability: 0.05,
                move_and_attack: false,
                loses_aggro: true,
                hidden_probability: 0.0,
            })
            .enemy(EnemyType {
                name: "wraith".to_string(),
                difficulty: 12,
                max_hp: 10,
                armor: 1,
                attack: Attack { damage: 3, stun: 0 },
                stop_if_adjacent: false,
                random_walk_probability: 0.0,
                move_and_attack: true,
                loses_aggro: false,
                hidden_probability: 0.3,
            })
            .build()
    }

    pub fn get(&self, id: EnemyTypeId) -> Option<&EnemyType> {
        self.types.get(id)
    }

    pub fn id_of(&self, name: &str) -> Option<EnemyTypeId> {
        self.types.iter().position(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (EnemyTypeId, &EnemyType)> {
        self.types.iter().enumerate()
    }

    /// Types whose difficulty does not exceed `rating`.
    pub fn eligible(&self, rating: u64) -> Vec<EnemyTypeId> {
        self.iter()
            .filter(|(_, t)| t.difficulty <= rating)
            .map(|(id, _)| id)
            .collect()
    }

    /// The type with the lowest difficulty (first one on ties).
    pub fn weakest(&self) -> Option<EnemyTypeId> {
        self.iter()
            .min_by_key(|(id, t)| (t.difficulty, *id))
            .map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl std::ops::Index<EnemyTypeId> for Bestiary {
    type Output = EnemyType;

    fn index(&self, id: EnemyTypeId) -> &EnemyType {
        &self.types[id]
    }
}

#[derive(Debug, Default)]
pub struct BestiaryBuilder {
    types: Vec<EnemyType>,
}

impl BestiaryBuilder {
    pub fn enemy(mut self, enemy: EnemyType) -> Self {
        self.types.push(enemy);
        self
    }

    pub fn build(self) -> Bestiary {
        Bestiary { types: self.types }
    }
}
