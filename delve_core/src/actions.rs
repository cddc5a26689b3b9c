//! Player-initiated item use, targeted selections and looting.
//!
//! Items that need a direction or a location do not block. `use_item`
//! records a [`SelectionRequest`] and returns; the caller runs its own
//! cursor loop against [`World::selection_valid`] and finishes with
//! [`World::complete_selection`]. Nothing is consumed and no terrain changes
//! until an effect actually applies.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    Direction, EntityId, Position,
    entity::DynamicObject,
    error::ActionError,
    items::{ItemEffect, ItemId, ItemType, Targeting},
    tile::{Content, TileKind},
    visibility,
    world::World,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selection {
    Direction(Direction),
    Location(Position),
}

/// An item use waiting for the caller to pick a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRequest {
    pub item: ItemId,
    pub targeting: Targeting,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UseOutcome {
    Done(UseReport),
    NeedsSelection(SelectionRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseReport {
    pub item: ItemId,
    pub effect: Applied,
    pub consumed: bool,
    /// Ticks the caller should advance to pay for the action.
    pub turn_cost: u32,
}

/// What an item did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Applied {
    Unlocked(Position),
    Revealed(usize),
    Moved(Position),
    Scrying(Position),
    Demolished(Position),
    Healed(u32),
    ManaRestored(u32),
    Stunned(EntityId),
    Wielded(ItemId),
}

/// Description of an item plus how many the player holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemInfo {
    pub id: ItemId,
    pub item: ItemType,
    pub count: u32,
    pub wielded: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LootReport {
    pub gold: u32,
    pub items: Vec<ItemId>,
    pub chests: usize,
}

impl World {
    pub fn lookup_item(&self, name: &str) -> Result<ItemInfo, ActionError> {
        let (id, item) = self
            .items
            .by_name(name)
            .ok_or_else(|| ActionError::UnknownItem(name.to_string()))?;
        Ok(ItemInfo {
            id,
            item: item.clone(),
            count: self.player.inventory.count(id),
            wielded: self.player.wielded == Some(id),
        })
    }

    pub fn pending_selection(&self) -> Option<&SelectionRequest> {
        self.pending.as_ref()
    }

    /// Uses an item by name. Untargeted items apply immediately; targeted
    /// ones return a request and wait for [`World::complete_selection`].
    pub fn use_item(&mut self, name: &str) -> Result<UseOutcome, ActionError> {
        self.ensure_built()?;
        if self.pending.is_some() {
            return Err(ActionError::SelectionPending);
        }
        let (id, item) = self
            .items
            .by_name(name)
            .ok_or_else(|| ActionError::UnknownItem(name.to_string()))?;
        let item = item.clone();
        self.check_usable(id, &item)?;

        match item.targeting() {
            Targeting::None => {
                let effect = self.apply(id, &item, None)?;
                Ok(UseOutcome::Done(self.pay_for(id, &item, effect)))
            }
            targeting => {
                let request = SelectionRequest {
                    item: id,
                    targeting,
                    prompt: prompt_for(&item),
                };
                debug!(item = %item.name, ?targeting, "selection requested");
                self.pending = Some(request.clone());
                Ok(UseOutcome::NeedsSelection(request))
            }
        }
    }

    /// Resumes a pending item use. `None` cancels it.
    ///
    /// An invalid location leaves the request pending so the caller can ask
    /// again. Any other failure clears it. The item is only consumed when
    /// the effect applies.
    pub fn complete_selection(&mut self, choice: Option<Selection>) -> Result<UseReport, ActionError> {
        let Some(request) = self.pending.clone() else {
            return Err(ActionError::NoPendingSelection);
        };
        let Some(choice) = choice else {
            self.pending = None;
            return Err(ActionError::Cancelled);
        };
        match (request.targeting, choice) {
            (Targeting::Direction, Selection::Direction(_)) => {}
            (Targeting::Location, Selection::Location(pos)) => {
                if !self.selection_valid(pos) {
                    return Err(ActionError::InvalidTarget(pos));
                }
            }
            _ => return Err(ActionError::SelectionMismatch),
        }

        self.pending = None;
        let item = self.items[request.item].clone();
        self.check_usable(request.item, &item)?;
        let effect = self.apply(request.item, &item, Some(choice))?;
        Ok(self.pay_for(request.item, &item, effect))
    }

    /// Whether `pos` is an acceptable location for the pending request.
    pub fn selection_valid(&self, pos: Position) -> bool {
        let Some(request) = &self.pending else {
            return false;
        };
        if request.targeting == Targeting::Direction {
            return pos.is_adjacent(self.player.position);
        }
        let Some(tile) = self.grid.get(pos) else {
            return false;
        };
        match self.items[request.item].effect {
            ItemEffect::Teleport { .. } => {
                let (w, h) = (self.grid.width() as i32, self.grid.height() as i32);
                (2..w - 2).contains(&pos.x)
                    && (2..h - 2).contains(&pos.y)
                    && self.monster_at(pos).is_none()
            }
            ItemEffect::Retreat => {
                self.revealed.contains(&pos)
                    && self.steps_doors_dont_count.contains_key(&pos)
                    && !self.is_occupied(pos)
            }
            ItemEffect::Scry => true,
            ItemEffect::Blink => {
                tile.is_passable(false)
                    && !self.is_occupied(pos)
                    && visibility::line_of_sight(&self.grid, self.player.position, pos)
            }
            _ => false,
        }
    }

    /// Moves everything on the player's cell into the inventory.
    pub fn loot_current_tile(&mut self) -> Result<LootReport, ActionError> {
        self.ensure_built()?;
        let pos = self.player.position;
        let contents = match self.grid.get_mut(pos) {
            Some(tile) if !tile.contents.is_empty() => std::mem::take(&mut tile.contents),
            _ => return Err(ActionError::NothingToLoot),
        };

        let mut report = LootReport::default();
        for content in contents {
            match content {
                Content::Gold(amount) => report.gold += amount,
                Content::Chest(chest) => {
                    report.chests += 1;
                    report.gold += chest.gold;
                    report.items.extend(chest.items);
                }
            }
        }
        self.player.gold += report.gold;
        for id in &report.items {
            self.player.inventory.add(*id, 1);
        }
        self.dirty.insert(pos);
        debug!(gold = report.gold, items = report.items.len(), "looted");
        Ok(report)
    }

    fn check_usable(&self, id: ItemId, item: &ItemType) -> Result<(), ActionError> {
        if self.player.inventory.count(id) == 0 {
            return Err(ActionError::NotHeld(item.name.clone()));
        }
        if !item.usable {
            return Err(ActionError::NotUsable(item.name.clone()));
        }
        if self.player.stats.mana < item.mana_cost {
            return Err(ActionError::InsufficientMana {
                needed: item.mana_cost,
                available: self.player.stats.mana,
            });
        }
        if self.player.stats.is_stunned() {
            return Err(ActionError::Stunned);
        }
        Ok(())
    }

    fn pay_for(&mut self, id: ItemId, item: &ItemType, effect: Applied) -> UseReport {
        let consumed = item.consumable && self.player.inventory.take_one(id);
        self.player.stats.mana -= item.mana_cost.min(self.player.stats.mana);
        debug!(item = %item.name, ?effect, "item used");
        UseReport {
            item: id,
            effect,
            consumed,
            turn_cost: item.turn_cost,
        }
    }

    /// Runs an item's effect. Every failure returns before any mutation.
    fn apply(&mut self, id: ItemId, item: &ItemType, choice: Option<Selection>) -> Result<Applied, ActionError> {
        let player = self.player.position;
        let engine = self.config.engine.clone();
        let toward = |choice: Option<Selection>| match choice {
            Some(Selection::Direction(direction)) => Ok(player.step(direction)),
            _ => Err(ActionError::SelectionMismatch),
        };
        let location = |choice: Option<Selection>| match choice {
            Some(Selection::Location(pos)) => Ok(pos),
            _ => Err(ActionError::SelectionMismatch),
        };

        match item.effect {
            ItemEffect::Unlock { magical } => {
                let target = toward(choice)?;
                match self.grid.get(target).map(|t| t.kind) {
                    Some(TileKind::Door) => {}
                    Some(TileKind::MagicBarrier) if magical => {}
                    _ => return Err(ActionError::NoEffect),
                }
                self.set_tile_kind(target, TileKind::Blank);
                Ok(Applied::Unlocked(target))
            }
            ItemEffect::Seeing { rounds } => {
                let mut locations = HashSet::from([player]);
                for _ in 0..rounds {
                    let mut next = HashSet::new();
                    for pos in &locations {
                        if self.grid.get(*pos).is_some_and(|t| t.is_transparent()) {
                            next.extend(self.visible_set(*pos).iter().copied());
                        }
                    }
                    locations = next;
                }
                Ok(Applied::Revealed(self.reveal(locations)))
            }
            ItemEffect::Revelation { greater } => {
                let radius = if greater {
                    engine.greater_revelation_radius
                } else {
                    engine.revelation_radius
                };
                // Matches the widest ring of the expanding reveal.
                let reach = (radius - 1).max(0);
                let cells: Vec<Position> = self
                    .grid
                    .positions()
                    .filter(|p| {
                        let (dx, dy) = (p.x - player.x, p.y - player.y);
                        dx * dx + dy * dy <= reach * reach
                    })
                    .collect();
                Ok(Applied::Revealed(self.reveal(cells)))
            }
            ItemEffect::Teleport { greater } => {
                let dest = if greater {
                    location(choice)?
                } else {
                    self.random_teleport_target()?
                };
                self.teleport(dest);
                Ok(Applied::Moved(dest))
            }
            ItemEffect::Retreat | ItemEffect::Blink => {
                let dest = location(choice)?;
                self.move_player(dest);
                Ok(Applied::Moved(dest))
            }
            ItemEffect::Scry => {
                let origin = location(choice)?;
                self.see_from(origin);
                let beacon = self.reserve_entity_id();
                self.dynamic_objects.push(DynamicObject::ScryBeacon {
                    id: beacon,
                    position: origin,
                    turns_left: engine.scry_duration,
                });
                Ok(Applied::Scrying(origin))
            }
            ItemEffect::Demolish => {
                let target = toward(choice)?;
                if !matches!(
                    self.grid.get(target).map(|t| t.kind),
                    Some(TileKind::Wall | TileKind::Door | TileKind::Glass)
                ) {
                    return Err(ActionError::NoEffect);
                }
                self.set_tile_kind(target, TileKind::Blank);
                if self.nether_crack() == Some(target) {
                    warn!(?target, "nether crack opened");
                }
                Ok(Applied::Demolished(target))
            }
            ItemEffect::Heal => {
                if self.player.stats.hp == self.player.stats.max_hp {
                    return Err(ActionError::NoEffect);
                }
                Ok(Applied::Healed(self.player.stats.heal(engine.potion_heal)))
            }
            ItemEffect::RestoreMana => {
                if self.player.stats.mana == self.player.stats.max_mana {
                    return Err(ActionError::NoEffect);
                }
                Ok(Applied::ManaRestored(
                    self.player.stats.restore_mana(engine.mana_potion_restore),
                ))
            }
            ItemEffect::StunBomb => {
                let target = toward(choice)?;
                let Some(monster_id) = self.monster_at(target) else {
                    return Err(ActionError::NoEffect);
                };
                if let Some(monster) = self.monsters.get_mut(&monster_id) {
                    monster.stats.stun = monster.stats.stun.max(engine.stun_bomb_turns);
                    monster.aggro = true;
                }
                self.dirty.insert(target);
                Ok(Applied::Stunned(monster_id))
            }
            ItemEffect::Wield(_) => {
                if self.player.wielded == Some(id) {
                    return Err(ActionError::NoEffect);
                }
                self.player.wielded = Some(id);
                Ok(Applied::Wielded(id))
            }
        }
    }

    /// A random unrevealed interior cell, or any interior cell once
    /// everything is revealed. Cells with monsters are never chosen.
    fn random_teleport_target(&mut self) -> Result<Position, ActionError> {
        let (w, h) = (self.grid.width() as i32, self.grid.height() as i32);
        let interior: Vec<Position> = (2..h - 2)
            .flat_map(|y| (2..w - 2).map(move |x| Position::new(x, y)))
            .filter(|p| self.monster_at(*p).is_none())
            .collect();
        let unrevealed: Vec<Position> = interior
            .iter()
            .copied()
            .filter(|p| !self.revealed.contains(p))
            .collect();
        let pool = if unrevealed.is_empty() {
            &interior
        } else {
            &unrevealed
        };
        pool.choose(&mut self.rng).copied().ok_or(ActionError::NoEffect)
    }

    /// Lands on `dest`, clearing a plus shape of terrain around it. Start
    /// and destination cells keep their kind, as do edge cells around the
    /// landing spot.
    fn teleport(&mut self, dest: Position) {
        let plus = [
            dest,
            dest.offset(-1, 0),
            dest.offset(1, 0),
            dest.offset(0, -1),
            dest.offset(0, 1),
        ];
        for pos in plus {
            let Some(tile) = self.grid.get_mut(pos) else {
                continue;
            };
            let kept = match tile.kind {
                TileKind::Start | TileKind::Destination => true,
                TileKind::Edge => pos != dest,
                _ => false,
            };
            if kept {
                continue;
            }
            tile.contents.clear();
            self.set_tile_kind(pos, TileKind::Blank);
        }
        self.reveal(plus);
        debug!(?dest, "teleported");
        self.move_player(dest);
    }
}

fn prompt_for(item: &ItemType) -> String {
    match item.effect {
        ItemEffect::Teleport { .. } => "Teleport where?".to_string(),
        ItemEffect::Retreat => "Retreat where?".to_string(),
        ItemEffect::Scry => "Scry where?".to_string(),
        ItemEffect::Blink => "Blink where? (Must be within eye-sight.)".to_string(),
        _ => format!("Use {} in which direction?", item.long_name),
    }
}
