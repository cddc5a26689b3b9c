//! Enemy placement and chest stocking.

use std::collections::HashMap;

use rand::{Rng, rngs::StdRng, seq::IndexedRandom};
use tracing::debug;

use crate::{
    Position,
    bestiary::{Bestiary, EnemyTypeId},
    config::{LootConfig, PopulationConfig},
    entity::HiddenEnemy,
    items::{Chest, ItemCatalog},
    map::Grid,
    pathing::DistanceField,
    tile::{Content, Tile},
    visibility::VisibilityCache,
};

/// One spawn decision made by [`place_enemies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Spawn {
    Monster { position: Position, kind: EnemyTypeId },
    Hidden(HiddenEnemy),
}

impl Spawn {
    pub fn position(&self) -> Position {
        match self {
            Spawn::Monster { position, .. } => *position,
            Spawn::Hidden(hidden) => hidden.position,
        }
    }
}

/// `1 - (1 - P0) * e^(-visible / K)`
pub fn spawn_probability(config: &PopulationConfig, visible: usize) -> f64 {
    1.0 - (1.0 - config.enemy_probability) * (-(visible as f64) / config.enemy_tile_constant).exp()
}

/// Greedy visibility-maximizing placement.
///
/// Every cell passable without doors starts as a candidate weighted by the
/// size of its visible set. Cells the start can see are removed first. Then
/// the best remaining cell is taken (ties to the lowest position), maybe
/// spawned on, and everything it can see is removed, whether or not a spawn
/// happened. No two spawn cells therefore start in view of each other.
pub fn place_enemies(
    grid: &Grid<Tile>,
    cache: &VisibilityCache,
    start: Position,
    steps: &DistanceField,
    bestiary: &Bestiary,
    config: &PopulationConfig,
    rng: &mut StdRng,
) -> Vec<Spawn> {
    let mut counts: HashMap<Position, usize> = grid
        .enumerate()
        .filter(|(_, tile)| tile.is_passable(false))
        .map(|(pos, _)| (pos, cache.get_or_compute(grid, pos).len()))
        .collect();

    let disqualify = |counts: &mut HashMap<Position, usize>, spot: Position| {
        for seen in cache.get_or_compute(grid, spot).iter() {
            counts.remove(seen);
        }
    };
    disqualify(&mut counts, start);

    let mut spawns = Vec::new();
    while let Some((spot, visible)) = counts
        .iter()
        .max_by(|(pa, ca), (pb, cb)| ca.cmp(cb).then_with(|| pb.cmp(pa)))
        .map(|(pos, count)| (*pos, *count))
    {
        if rng.random::<f64>() <= spawn_probability(config, visible) {
            if let Some(spawn) = choose_spawn(grid, cache, spot, visible, steps, bestiary, config, rng) {
                spawns.push(spawn);
            }
        }
        disqualify(&mut counts, spot);
    }
    debug!(spawns = spawns.len(), "enemies placed");
    spawns
}

#[allow(clippy::too_many_arguments)]
fn choose_spawn(
    grid: &Grid<Tile>,
    cache: &VisibilityCache,
    spot: Position,
    visible: usize,
    steps: &DistanceField,
    bestiary: &Bestiary,
    config: &PopulationConfig,
    rng: &mut StdRng,
) -> Option<Spawn> {
    let spot_steps = steps.get(&spot).copied().unwrap_or(0);
    let rating = (visible as u64 * spot_steps as u64) / config.difficulty_divisor.max(1);
    let kind = match bestiary.eligible(rating).choose(rng) {
        Some(kind) => *kind,
        None => bestiary.weakest()?,
    };

    if rng.random::<f64>() < bestiary[kind].hidden_probability {
        let advantage = cache
            .get_or_compute(grid, spot)
            .iter()
            .filter_map(|v| steps.get(v))
            .map(|s| s.saturating_sub(spot_steps))
            .max()
            .unwrap_or(0);
        return Some(Spawn::Hidden(HiddenEnemy {
            position: spot,
            kind,
            spawn_steps: spot_steps,
            unhide_threshold: advantage.min(config.hidden_unhide_steps),
        }));
    }
    Some(Spawn::Monster { position: spot, kind })
}

/// Rolls the contents of one chest `steps` away from start.
pub fn stock_chest(steps: u32, catalog: &ItemCatalog, config: &LootConfig, rng: &mut StdRng) -> Chest {
    let base = (steps / 4) * config.value_multiplier;
    let is_super = rng.random::<f64>() < config.super_chest_probability;
    let budget = if is_super {
        base * 2
    } else {
        rng.random_range(base / 3..=base)
    };

    let mut chest = Chest {
        is_super,
        budget,
        ..Chest::default()
    };
    let mut remaining = budget;
    let gold_only = rng.random::<f64>() < config.leftover_currency_probability;

    while !gold_only && remaining * 2 >= budget && chest.items.len() < config.max_chest_items {
        let affordable: Vec<_> = catalog
            .iter()
            .filter(|(_, item)| item.value > 0 && item.value <= remaining)
            .map(|(id, _)| id)
            .collect();
        let Some(&pick) = affordable.choose(rng) else {
            break;
        };
        chest.items.push(pick);
        remaining -= catalog[pick].value;
        if rng.random::<f64>() < config.early_stop_probability {
            break;
        }
    }
    chest.gold = remaining;
    chest
}

/// Fills every chest marker on the grid, scaling by doors-counted distance.
pub fn stock_chests(
    grid: &mut Grid<Tile>,
    steps: &DistanceField,
    catalog: &ItemCatalog,
    config: &LootConfig,
    rng: &mut StdRng,
) -> usize {
    let mut stocked = 0;
    for (pos, tile) in grid.enumerate_mut() {
        let distance = steps.get(&pos).copied().unwrap_or(0);
        for content in tile.contents.iter_mut() {
            if let Content::Chest(chest) = content {
                *chest = stock_chest(distance, catalog, config, rng);
                stocked += 1;
            }
        }
    }
    debug!(stocked, "chests stocked");
    stocked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileKind;
    use rand::SeedableRng;

    fn open_room(w: usize, h: usize) -> Grid<Tile> {
        Grid::from_generator(w, h, |p| {
            if p.x == 0 || p.y == 0 || p.x as usize == w - 1 || p.y as usize == h - 1 {
                Tile::new(TileKind::Wall)
            } else {
                Tile::new(TileKind::Blank)
            }
        })
    }

    #[test]
    fn probability_rises_with_visibility() {
        let config = PopulationConfig::default();
        assert!((spawn_probability(&config, 0) - 0.25).abs() < 1e-9);
        assert!(spawn_probability(&config, 40) > spawn_probability(&config, 10));
        assert!(spawn_probability(&config, 10_000) <= 1.0);
    }

    #[test]
    fn nothing_spawns_in_view_of_start() {
        let grid = open_room(9, 7);
        let cache = VisibilityCache::new();
        let mut rng = StdRng::seed_from_u64(3);
        let spawns = place_enemies(
            &grid,
            &cache,
            Position::new(1, 1),
            &DistanceField::new(),
            &Bestiary::standard(),
            &PopulationConfig::default(),
            &mut rng,
        );
        assert!(spawns.is_empty());
    }

    #[test]
    fn budget_is_never_exceeded() {
        let catalog = ItemCatalog::standard();
        let config = LootConfig::default();
        let mut rng = StdRng::seed_from_u64(9);
        for steps in [0, 3, 40, 200, 900] {
            for _ in 0..50 {
                let chest = stock_chest(steps, &catalog, &config, &mut rng);
                let spent: u32 = chest.items.iter().map(|id| catalog[*id].value).sum();
                assert!(spent <= chest.budget);
                assert_eq!(spent + chest.gold, chest.budget);
                assert!(chest.items.len() <= config.max_chest_items);
                let base = (steps / 4) * config.value_multiplier;
                if chest.is_super {
                    assert_eq!(chest.budget, base * 2);
                } else {
                    assert!(chest.budget <= base && chest.budget >= base / 3);
                }
            }
        }
    }

    #[test]
    fn gold_only_chests_skip_the_draw() {
        let catalog = ItemCatalog::standard();
        let config = LootConfig {
            leftover_currency_probability: 1.0,
            ..LootConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        let chest = stock_chest(400, &catalog, &config, &mut rng);
        assert!(chest.items.is_empty());
        assert_eq!(chest.gold, chest.budget);
    }
}
