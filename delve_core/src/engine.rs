//! The per-tick turn pipeline and player movement.

use std::collections::HashSet;

use rand::{Rng, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    Direction, EntityId, Position,
    entity::{DynamicObject, Monster},
    error::ActionError,
    items::Attack,
    pathing::PathMap,
    tile::TileKind,
    world::World,
};

/// One monster hit landed on the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub attacker: EntityId,
    pub damage: u32,
    pub stun: u32,
}

/// What happened during one [`World::time_step`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub turn: u64,
    pub killed: Vec<EntityId>,
    pub hits: Vec<Hit>,
    /// Ambush markers that turned into live monsters.
    pub revealed: Vec<EntityId>,
    pub player_died: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveOutcome {
    Moved {
        to: Position,
        reached_destination: bool,
    },
    Attacked {
        target: EntityId,
        damage: u32,
        killed: bool,
    },
}

impl World {
    /// Advances the world by one tick.
    ///
    /// 1. cleanup
    /// 2. one BFS from the player toward every monster, doors not counted
    /// 3. player regeneration and stun decay
    /// 4. monsters act in ascending id order
    /// 5. dynamic objects advance
    /// 6. melee against the player
    /// 7. cleanup
    ///
    /// A player who starts the tick stunned takes damage but no new stun
    /// from this tick's hits, so a stun of N costs exactly N actions.
    pub fn time_step(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if self.ensure_built().is_err() {
            return report;
        }
        self.turn += 1;
        report.turn = self.turn;

        self.cleanup(&mut report);

        let targets: HashSet<Position> = self.monsters.values().map(|m| m.position).collect();
        let paths = PathMap::search(
            &self.grid,
            self.player.position,
            Some(&targets),
            false,
            &mut self.rng,
        );

        let stun_immune = self.player.stats.is_stunned();
        self.regenerate();

        let ids: Vec<EntityId> = self.monsters.keys().copied().collect();
        let mut acted = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(moved) = self.monster_turn(id, &paths) {
                acted.push((id, moved));
            }
        }

        self.advance_dynamic_objects(&mut report);

        for (id, moved) in acted {
            let Some(monster) = self.monsters.get(&id) else {
                continue;
            };
            let enemy = &self.bestiary[monster.kind];
            if monster.aggro
                && monster.position.is_adjacent(self.player.position)
                && (!moved || enemy.move_and_attack)
            {
                let mut attack = enemy.attack;
                if stun_immune {
                    attack.stun = 0;
                }
                let damage = self.player.stats.take_hit(attack);
                report.hits.push(Hit {
                    attacker: id,
                    damage,
                    stun: attack.stun,
                });
            }
        }

        self.cleanup(&mut report);
        report
    }

    fn cleanup(&mut self, report: &mut TickReport) {
        let dead: Vec<EntityId> = self
            .monsters
            .values()
            .filter(|m| m.should_die())
            .map(|m| m.id)
            .collect();
        for id in dead {
            if let Some(monster) = self.monsters.remove(&id) {
                self.dirty.insert(monster.position);
                debug!(monster = id, "monster died");
                report.killed.push(id);
            }
        }
        self.dynamic_objects.retain(|object| !object.is_expired());
        if self.player.stats.should_die() && !report.player_died {
            info!(turn = self.turn, "player died");
            report.player_died = true;
        }
    }

    fn regenerate(&mut self) {
        let player = &self.config.player;
        if self.player.stats.should_die() {
            return;
        }
        if player.hp_regen_interval > 0 && self.turn % player.hp_regen_interval == 0 {
            self.player.stats.heal(1);
        }
        if player.mana_regen_interval > 0 && self.turn % player.mana_regen_interval == 0 {
            self.player.stats.restore_mana(1);
        }
        self.player.stats.tick_stun();
    }

    /// Runs one monster's decision. `None` when it was stunned, otherwise
    /// whether it moved.
    fn monster_turn(&mut self, id: EntityId, paths: &PathMap) -> Option<bool> {
        let player_pos = self.player.position;
        let monster = self.monsters.get_mut(&id)?;
        if monster.stats.tick_stun() {
            return None;
        }
        let pos = monster.position;
        let enemy = &self.bestiary[monster.kind];
        let (stop_if_adjacent, walk_probability) = (enemy.stop_if_adjacent, enemy.random_walk_probability);

        let sees_player = self
            .visibility
            .get_or_compute(&self.grid, pos)
            .contains(&player_pos);
        if sees_player {
            monster.aggro = true;
        } else if monster.deaggro_on_lost_sight {
            monster.aggro = false;
        }
        if !monster.aggro || (stop_if_adjacent && pos.is_adjacent(player_pos)) {
            return Some(false);
        }

        let target = if self.rng.random::<f64>() < walk_probability {
            let options: Vec<Position> = pos
                .neighbors()
                .into_iter()
                .filter(|n| self.grid.get(*n).is_some_and(|t| t.is_passable(false)))
                .collect();
            options.choose(&mut self.rng).copied()
        } else {
            paths.parent(pos)
        };
        let Some(target) = target else {
            return Some(false);
        };
        if target == player_pos || self.monster_at(target).is_some() {
            return Some(false);
        }

        if let Some(monster) = self.monsters.get_mut(&id) {
            monster.position = target;
        }
        self.dirty.insert(pos);
        self.dirty.insert(target);
        Some(true)
    }

    fn advance_dynamic_objects(&mut self, report: &mut TickReport) {
        let player_pos = self.player.position;
        let player_steps = self.steps(player_pos);
        let in_view = self.visibility.get_or_compute(&self.grid, player_pos);
        let mut springing = Vec::new();
        let mut beacons = Vec::new();

        for object in &mut self.dynamic_objects {
            match object {
                DynamicObject::Ambush { id, hidden } => {
                    let Some(player_steps) = player_steps else {
                        continue;
                    };
                    if hidden.ready(player_steps) && in_view.contains(&hidden.position) {
                        springing.push((*id, hidden.clone()));
                    }
                }
                DynamicObject::ScryBeacon {
                    position,
                    turns_left,
                    ..
                } => {
                    *turns_left = turns_left.saturating_sub(1);
                    beacons.push(*position);
                }
            }
        }

        for position in beacons {
            self.see_from(position);
        }

        for (id, hidden) in springing {
            if self.is_occupied(hidden.position) {
                continue;
            }
            self.dynamic_objects.retain(|object| object.id() != id);
            let mut monster = Monster::spawn(id, hidden.kind, &self.bestiary[hidden.kind], hidden.position);
            monster.aggro = true;
            if hidden.position.is_adjacent(player_pos) {
                monster.stats.stun = monster.stats.stun.max(self.config.engine.ambush_stun);
            }
            self.monsters.insert(id, monster);
            self.dirty.insert(hidden.position);
            debug!(monster = id, position = ?hidden.position, "ambush sprung");
            report.revealed.push(id);
        }
    }

    /// The attack the player deals in melee, from the wielded weapon or
    /// bare hands.
    pub fn player_attack(&self) -> Attack {
        self.player
            .wielded
            .and_then(|id| self.items.get(id))
            .and_then(|item| item.attack())
            .unwrap_or(Attack {
                damage: self.config.player.unarmed_damage,
                stun: 0,
            })
    }

    /// Steps the player one cell, or attacks the monster standing there.
    ///
    /// Does not advance time; callers follow up with [`World::time_step`].
    pub fn attempt_move(&mut self, direction: Direction) -> Result<MoveOutcome, ActionError> {
        self.ensure_built()?;
        if self.pending.is_some() {
            return Err(ActionError::SelectionPending);
        }
        if self.player.stats.is_stunned() {
            return Err(ActionError::Stunned);
        }
        let target = self.player.position.step(direction);

        if let Some(id) = self.monster_at(target) {
            let attack = self.player_attack();
            let Some(monster) = self.monsters.get_mut(&id) else {
                return Err(ActionError::Blocked);
            };
            let damage = monster.take_hit(attack);
            monster.aggro = true;
            let killed = monster.should_die();
            self.dirty.insert(target);
            return Ok(MoveOutcome::Attacked {
                target: id,
                damage,
                killed,
            });
        }

        let Some(tile) = self.grid.get(target) else {
            return Err(ActionError::Blocked);
        };
        if !tile.is_passable(false) {
            return Err(ActionError::Blocked);
        }
        let reached_destination = tile.kind == TileKind::Destination;
        self.move_player(target);
        Ok(MoveOutcome::Moved {
            to: target,
            reached_destination,
        })
    }
}
