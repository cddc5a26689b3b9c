use serde::{Deserialize, Serialize};

use crate::{
    EntityId, Position,
    bestiary::{EnemyType, EnemyTypeId},
    items::{Attack, Inventory, ItemId},
};

/// Combat-relevant numbers shared by the player and monsters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub hp: u32,
    pub max_hp: u32,
    pub mana: u32,
    pub max_mana: u32,
    /// Flat damage reduction. A positive hit always deals at least 1.
    pub armor: u32,
    /// Turns left before this entity acts again.
    pub stun: u32,
}

impl Stats {
    pub fn new(max_hp: u32, max_mana: u32, armor: u32) -> Self {
        Stats {
            hp: max_hp,
            max_hp,
            mana: max_mana,
            max_mana,
            armor,
            stun: 0,
        }
    }

    /// Applies a hit and returns the damage actually dealt.
    ///
    /// Stun is raised to the attack's value, never lowered.
    pub fn take_hit(&mut self, attack: Attack) -> u32 {
        let dealt = if attack.damage > 0 {
            attack.damage.saturating_sub(self.armor).max(1)
        } else {
            0
        };
        self.hp = self.hp.saturating_sub(dealt);
        self.stun = self.stun.max(attack.stun);
        dealt
    }

    pub fn should_die(&self) -> bool {
        self.hp == 0
    }

    pub fn is_stunned(&self) -> bool {
        self.stun > 0
    }

    /// Counts one stunned turn down. Returns whether the entity was stunned.
    pub fn tick_stun(&mut self) -> bool {
        if self.stun > 0 {
            self.stun -= 1;
            true
        } else {
            false
        }
    }

    pub fn heal(&mut self, amount: u32) -> u32 {
        let before = self.hp;
        self.hp = (self.hp + amount).min(self.max_hp);
        self.hp - before
    }

    pub fn restore_mana(&mut self, amount: u32) -> u32 {
        let before = self.mana;
        self.mana = (self.mana + amount).min(self.max_mana);
        self.mana - before
    }

    pub fn reset(&mut self) {
        self.hp = self.max_hp;
        self.mana = self.max_mana;
        self.stun = 0;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub position: Position,
    pub stats: Stats,
    pub inventory: Inventory,
    pub gold: u32,
    pub wielded: Option<ItemId>,
    pub deaths: u32,
}

impl Player {
    pub fn new(position: Position, stats: Stats) -> Self {
        Player {
            position,
            stats,
            inventory: Inventory::new(),
            gold: 0,
            wielded: None,
            deaths: 0,
        }
    }
}

/// Per-tick behavioral state of a monster, derived from its fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonsterState {
    Dormant,
    Aggroed,
    Stunned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monster {
    pub id: EntityId,
    pub kind: EnemyTypeId,
    pub position: Position,
    pub stats: Stats,
    pub aggro: bool,
    /// Copied from the type: drop aggro when the player leaves sight.
    pub deaggro_on_lost_sight: bool,
}

impl Monster {
    pub fn spawn(id: EntityId, kind: EnemyTypeId, enemy: &EnemyType, position: Position) -> Self {
        Monster {
            id,
            kind,
            position,
            stats: Stats::new(enemy.max_hp, 0, enemy.armor),
            aggro: false,
            deaggro_on_lost_sight: enemy.loses_aggro,
        }
    }

    pub fn state(&self) -> MonsterState {
        if self.stats.is_stunned() {
            MonsterState::Stunned
        } else if self.aggro {
            MonsterState::Aggroed
        } else {
            MonsterState::Dormant
        }
    }

    pub fn take_hit(&mut self, attack: Attack) -> u32 {
        self.stats.take_hit(attack)
    }

    pub fn should_die(&self) -> bool {
        self.stats.should_die()
    }
}

/// A deferred spawn waiting for the player to walk past it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenEnemy {
    pub position: Position,
    pub kind: EnemyTypeId,
    /// Steps (doors counted) from start to the spawn cell.
    pub spawn_steps: u32,
    /// How far past the spawn the player must be before it springs.
    pub unhide_threshold: u32,
}

impl HiddenEnemy {
    /// Whether a player standing `player_steps` from start has walked far
    /// enough past this spot.
    pub fn ready(&self, player_steps: u32) -> bool {
        player_steps >= self.spawn_steps.saturating_add(self.unhide_threshold)
    }
}

/// Transient or deferred objects advanced once per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DynamicObject {
    Ambush {
        id: EntityId,
        hidden: HiddenEnemy,
    },
    /// Keeps revealing what is visible from `position` until it runs out.
    ScryBeacon {
        id: EntityId,
        position: Position,
        turns_left: u32,
    },
}

impl DynamicObject {
    pub fn id(&self) -> EntityId {
        match self {
            DynamicObject::Ambush { id, .. } | DynamicObject::ScryBeacon { id, .. } => *id,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            DynamicObject::Ambush { hidden, .. } => hidden.position,
            DynamicObject::ScryBeacon { position, .. } => *position,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, DynamicObject::ScryBeacon { turns_left: 0, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn armor_never_reduces_a_hit_below_one() {
        let mut stats = Stats::new(10, 0, 5);
        assert_eq!(stats.take_hit(Attack { damage: 3, stun: 0 }), 1);
        assert_eq!(stats.hp, 9);
        assert_eq!(stats.take_hit(Attack { damage: 8, stun: 0 }), 3);
        assert_eq!(stats.hp, 6);
    }

    #[test]
    fn hp_floors_at_zero() {
        let mut stats = Stats::new(3, 0, 0);
        assert_eq!(stats.take_hit(Attack { damage: 10, stun: 0 }), 10);
        assert_eq!(stats.hp, 0);
        assert!(stats.should_die());
    }

    #[test]
    fn two_weak_hits_kill_a_two_hp_monster() {
        let bestiary = crate::bestiary::Bestiary::standard();
        let rat = bestiary.id_of("rat").unwrap();
        let mut monster = Monster::spawn(0, rat, &bestiary[rat], Position::new(1, 1));
        assert_eq!(monster.stats.max_hp, 2);
        assert_eq!(monster.stats.armor, 0);
        monster.take_hit(Attack { damage: 1, stun: 0 });
        assert!(!monster.should_die());
        monster.take_hit(Attack { damage: 1, stun: 0 });
        assert!(monster.should_die());
    }

    #[test]
    fn stun_only_ratchets_up() {
        let mut stats = Stats::new(10, 0, 0);
        stats.take_hit(Attack { damage: 1, stun: 3 });
        assert_eq!(stats.stun, 3);
        stats.take_hit(Attack { damage: 1, stun: 1 });
        assert_eq!(stats.stun, 3);
        // A zero-damage hit still stuns but deals nothing.
        assert_eq!(stats.take_hit(Attack { damage: 0, stun: 5 }), 0);
        assert_eq!(stats.stun, 5);
        assert_eq!(stats.hp, 8);
    }

    #[test]
    fn monster_state_machine() {
        let bestiary = crate::bestiary::Bestiary::standard();
        let mut monster = Monster::spawn(1, 0, &bestiary[0], Position::new(2, 2));
        assert_eq!(monster.state(), MonsterState::Dormant);
        monster.aggro = true;
        assert_eq!(monster.state(), MonsterState::Aggroed);
        monster.stats.stun = 1;
        assert_eq!(monster.state(), MonsterState::Stunned);
        assert!(monster.stats.tick_stun());
        assert_eq!(monster.state(), MonsterState::Aggroed);
    }

    #[test]
    fn hidden_enemy_threshold() {
        let hidden = HiddenEnemy {
            position: Position::new(5, 5),
            kind: 0,
            spawn_steps: 10,
            unhide_threshold: 3,
        };
        assert!(!hidden.ready(12));
        assert!(hidden.ready(13));
        assert!(hidden.ready(40));
    }
}
