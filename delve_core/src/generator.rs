//! Maze carving and connectivity-preserving feature placement.
//!
//! The carve produces a spanning tree over the coarse lattice (odd cells).
//! Every later phase either only adds passability, or checks connectivity
//! before committing the change.

use std::collections::HashSet;

use rand::{
    Rng,
    rngs::StdRng,
    seq::{IndexedRandom, SliceRandom},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::{
    Position,
    config::GenerationConfig,
    connectivity,
    error::GenerationError,
    items::Chest,
    map::Grid,
    pathing::{self, DistanceField},
    tile::{Content, Tile, TileKind},
};

/// Coarse phases reported to a progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationPhase {
    Maze,
    Gaps,
    Rooms,
    Doors,
    Trim,
    Glass,
    Distances,
    DoorEvaluation,
    NetherCrack,
    Population,
    Done,
}

/// A finished terrain layout with its distance fields.
#[derive(Debug, Clone)]
pub struct GeneratedLevel {
    pub grid: Grid<Tile>,
    pub start: Position,
    pub destination: Position,
    pub doors: Vec<Position>,
    pub chest_spots: Vec<Position>,
    pub steps: DistanceField,
    pub steps_doors_dont_count: DistanceField,
    pub nether_crack: Option<Position>,
}

/// The two open cells a wall at `pos` would separate if it became a door.
///
/// Requires a Wall whose left/right neighbors are blocked and up/down
/// neighbors open, or the reverse. Open means passable without doors.
pub fn door_sides(grid: &Grid<Tile>, pos: Position) -> Option<[Position; 2]> {
    if grid.get(pos)?.kind != TileKind::Wall {
        return None;
    }
    let [left, right, up, down] = pos.neighbors();
    let blocked = |p: Position| !grid.get(p).is_some_and(|t| t.is_passable(true));
    let open = |p: Position| grid.get(p).is_some_and(|t| t.is_passable(false));

    if blocked(left) && blocked(right) && open(up) && open(down) {
        Some([up, down])
    } else if open(left) && open(right) && blocked(up) && blocked(down) {
        Some([left, right])
    } else {
        None
    }
}

/// Steps a door between `sides` saves, given the doors-not-counted field.
/// `None` when either side is only reachable through doors.
pub fn steps_skipped(sides: [Position; 2], steps_doors_dont_count: &DistanceField) -> Option<u32> {
    let a = steps_doors_dont_count.get(&sides[0])?;
    let b = steps_doors_dont_count.get(&sides[1])?;
    Some(a.abs_diff(*b))
}

/// 3x3 templates: open everywhere except the center and one edge-adjacent
/// cell, in each of the four rotations.
fn cut_templates() -> [[bool; 9]; 4] {
    [1, 3, 5, 7].map(|closed| {
        let mut pattern = [true; 9];
        pattern[4] = false;
        pattern[closed] = false;
        pattern
    })
}

fn chest_templates() -> [[bool; 9]; 4] {
    cut_templates().map(|pattern| pattern.map(|open| !open))
}

pub struct Generator<'a> {
    config: &'a GenerationConfig,
    rng: &'a mut StdRng,
    coarse_width: usize,
    coarse_height: usize,
    grid: Grid<Tile>,
    start: Position,
    edge_ring: Vec<Position>,
    doors: Vec<Position>,
    chest_spots: Vec<Position>,
}

impl<'a> Generator<'a> {
    pub fn new(
        coarse_width: usize,
        coarse_height: usize,
        config: &'a GenerationConfig,
        rng: &'a mut StdRng,
    ) -> Result<Self, GenerationError> {
        if coarse_width < 2 || coarse_height < 2 {
            return Err(GenerationError::TooSmall {
                width: coarse_width,
                height: coarse_height,
            });
        }
        let (width, height) = (2 * coarse_width + 1, 2 * coarse_height + 1);
        let (w, h) = (width as i32, height as i32);

        let mut edge_ring = Vec::new();
        for x in 0..w {
            edge_ring.push(Position::new(x, 0));
            edge_ring.push(Position::new(x, h - 1));
        }
        for y in 1..h - 1 {
            edge_ring.push(Position::new(0, y));
            edge_ring.push(Position::new(w - 1, y));
        }

        let grid = Grid::from_generator(width, height, |p| {
            if p.x == 0 || p.y == 0 || p.x == w - 1 || p.y == h - 1 {
                Tile::new(TileKind::Edge)
            } else {
                Tile::new(TileKind::Wall)
            }
        });

        Ok(Generator {
            config,
            rng,
            coarse_width,
            coarse_height,
            grid,
            start: Position::new(1, 1),
            edge_ring,
            doors: Vec::new(),
            chest_spots: Vec::new(),
        })
    }

    /// Runs every terrain phase and returns the finished level.
    pub fn run(
        mut self,
        progress: &mut dyn FnMut(GenerationPhase),
    ) -> Result<GeneratedLevel, GenerationError> {
        progress(GenerationPhase::Maze);
        self.carve_maze();
        progress(GenerationPhase::Gaps);
        self.add_gaps();
        progress(GenerationPhase::Rooms);
        self.add_rooms();
        self.assert_connected("rooms")?;
        progress(GenerationPhase::Doors);
        self.add_doors();
        progress(GenerationPhase::Trim);
        self.trim();
        progress(GenerationPhase::Glass);
        self.add_glass();

        progress(GenerationPhase::Distances);
        let steps_doors_dont_count = self.distances(false);
        let destination = pathing::farthest(&steps_doors_dont_count).unwrap_or(self.start);
        self.grid[destination].set_kind(TileKind::Destination);
        self.grid[self.start].set_kind(TileKind::Start);
        debug!(?destination, "destination placed");

        progress(GenerationPhase::DoorEvaluation);
        self.evaluate_doors(&steps_doors_dont_count);
        let steps = self.distances(true);
        let steps_doors_dont_count = self.distances(false);

        progress(GenerationPhase::NetherCrack);
        let nether_crack = self.place_nether_crack(&steps, &steps_doors_dont_count);
        self.assert_connected("generation")?;

        Ok(GeneratedLevel {
            grid: self.grid,
            start: self.start,
            destination,
            doors: self.doors,
            chest_spots: self.chest_spots,
            steps,
            steps_doors_dont_count,
            nether_crack,
        })
    }

    fn width(&self) -> i32 {
        self.grid.width() as i32
    }

    fn height(&self) -> i32 {
        self.grid.height() as i32
    }

    fn attempts(&self, proportion: f64) -> usize {
        (proportion * (self.coarse_width * self.coarse_height) as f64) as usize
    }

    fn kind_at(&self, pos: Position) -> Option<TileKind> {
        self.grid.get(pos).map(|t| t.kind)
    }

    /// A random wall pillar: both coordinates even, never carved by the maze.
    fn random_pillar(&mut self) -> Position {
        Position::new(
            2 * self.rng.random_range(1..self.coarse_width as i32),
            2 * self.rng.random_range(1..self.coarse_height as i32),
        )
    }

    fn random_interior(&mut self) -> Position {
        let (w, h) = (self.width(), self.height());
        Position::new(self.rng.random_range(1..w - 1), self.rng.random_range(1..h - 1))
    }

    fn carve_maze(&mut self) {
        let mut stack: Vec<(Option<Position>, Position)> = vec![(None, self.start)];
        while let Some((prev, loc)) = stack.pop() {
            if self.kind_at(loc) == Some(TileKind::Blank) {
                continue;
            }
            if let Some(prev) = prev {
                let mid = Position::new((prev.x + loc.x) / 2, (prev.y + loc.y) / 2);
                self.grid[mid] = Tile::new(TileKind::Blank);
            }
            self.grid[loc] = Tile::new(TileKind::Blank);

            let mut next: Vec<Position> = loc
                .neighbors()
                .into_iter()
                .filter(|n| {
                    self.kind_at(*n) == Some(TileKind::Wall)
                        && self.kind_at(Position::new(2 * n.x - loc.x, 2 * n.y - loc.y))
                            == Some(TileKind::Wall)
                })
                .collect();
            next.shuffle(&mut *self.rng);
            for n in next {
                stack.push((Some(loc), Position::new(2 * n.x - loc.x, 2 * n.y - loc.y)));
            }
        }
        debug!(
            carved = self.grid.iter().filter(|t| t.kind == TileKind::Blank).count(),
            "maze carved"
        );
    }

    /// Blanks random pillars and interior walls, but only next to an
    /// existing Blank so no isolated pocket appears.
    fn add_gaps(&mut self) {
        let mut opened = 0;
        for i in 0..self.attempts(self.config.gap_proportion) {
            let pos = if i % 2 == 0 {
                self.random_pillar()
            } else {
                self.random_interior()
            };
            if self.kind_at(pos) != Some(TileKind::Wall) {
                continue;
            }
            if pos
                .neighbors()
                .iter()
                .any(|n| self.kind_at(*n) == Some(TileKind::Blank))
            {
                self.grid[pos] = Tile::new(TileKind::Blank);
                opened += 1;
            }
        }
        debug!(opened, "gaps added");
    }

    fn add_rooms(&mut self) {
        let (w, h) = (self.width(), self.height());
        let mut placed = 0;
        for _ in 0..self.attempts(self.config.room_proportion) {
            let (Some(&rw), Some(&rh)) = (
                self.config.room_sizes.choose(&mut *self.rng),
                self.config.room_sizes.choose(&mut *self.rng),
            ) else {
                return;
            };
            let (rw, rh) = (rw as i32, rh as i32);
            let xs: Vec<i32> = (1..w - rw).step_by(2).collect();
            let ys: Vec<i32> = (1..h - rh).step_by(2).collect();
            let (Some(&x0), Some(&y0)) = (xs.choose(&mut *self.rng), ys.choose(&mut *self.rng))
            else {
                continue;
            };

            for x in x0..x0 + rw {
                for y in y0..y0 + rh {
                    self.grid[Position::new(x, y)] = Tile::new(TileKind::Room);
                }
            }

            let mut borders = Vec::new();
            for x in x0 - 1..=x0 + rw {
                for y in y0 - 1..=y0 + rh {
                    let pos = Position::new(x, y);
                    match self.grid[pos].kind {
                        TileKind::Blank => borders.push(pos),
                        TileKind::Wall => self.grid[pos].set_kind(TileKind::Edge),
                        _ => {}
                    }
                }
            }
            self.close_borders(borders);
            placed += 1;
        }
        debug!(placed, "rooms added");
    }

    /// Closes room openings one at a time, keeping only closures that leave
    /// the level connected.
    fn close_borders(&mut self, mut borders: Vec<Position>) {
        loop {
            borders.shuffle(&mut *self.rng);
            let mut closed = None;
            for (i, &border) in borders.iter().enumerate() {
                self.grid[border] = Tile::new(TileKind::Edge);
                if connectivity::is_connected(&self.grid, self.start) {
                    closed = Some(i);
                    break;
                }
                self.grid[border] = Tile::new(TileKind::Blank);
            }
            match closed {
                Some(i) => {
                    borders.swap_remove(i);
                }
                None => break,
            }
        }
    }

    fn add_doors(&mut self) {
        for _ in 0..self.attempts(self.config.door_proportion) {
            let pos = self.random_pillar();
            if let Some(sides) = door_sides(&self.grid, pos) {
                self.grid[pos] = Tile::door(sides);
                self.doors.push(pos);
            }
        }
        debug!(doors = self.doors.len(), "doors placed");
    }

    fn trim(&mut self) {
        let cut = cut_templates();
        let probabilities = self.config.cut_probabilities.clone();
        for probability in probabilities {
            for pos in self.matching(&cut) {
                if self.rng.random::<f64>() > probability {
                    continue;
                }
                self.grid[pos] = Tile::new(TileKind::Blank);
            }
        }

        let chest = chest_templates();
        for pos in self.matching(&chest) {
            if self.rng.random::<f64>() > self.config.chest_probability {
                continue;
            }
            self.grid[pos].contents.push(Content::Chest(Chest::default()));
            self.chest_spots.push(pos);
        }
        debug!(chests = self.chest_spots.len(), "walls trimmed");
    }

    /// Interior cells whose doors-not-counted neighborhood matches a template.
    fn matching(&self, templates: &[[bool; 9]]) -> Vec<Position> {
        let mut out = Vec::new();
        for y in 1..self.height() - 1 {
            for x in 1..self.width() - 1 {
                let pos = Position::new(x, y);
                if self.grid[pos].kind == TileKind::Edge && !self.config.corner_cut_rooms {
                    continue;
                }
                let occupancy = pos
                    .neighborhood()
                    .map(|n| self.grid.get(n).is_some_and(|t| t.is_passable(false)));
                if templates.contains(&occupancy) {
                    out.push(pos);
                }
            }
        }
        out
    }

    fn add_glass(&mut self) {
        let mut converted = 0;
        for _ in 0..self.attempts(self.config.glass_proportion) {
            let mut stack = vec![self.random_pillar()];
            let mut hit = HashSet::new();
            while hit.len() < self.config.glass_wall_length {
                let Some(pos) = stack.pop() else {
                    break;
                };
                if self.kind_at(pos) != Some(TileKind::Wall) || !hit.insert(pos) {
                    continue;
                }
                self.grid[pos].set_kind(TileKind::Glass);
                stack.extend(pos.neighbors());
            }
            converted += hit.len();
        }
        debug!(converted, "glass placed");
    }

    fn distances(&mut self, doors_count: bool) -> DistanceField {
        pathing::distance_field(&self.grid, self.start, doors_count, &mut *self.rng)
    }

    fn evaluate_doors(&mut self, steps_doors_dont_count: &DistanceField) {
        for &pos in &self.doors {
            let Some(info) = self.grid[pos].door else {
                continue;
            };
            let tile = &mut self.grid[pos];
            let missing = info
                .sides
                .iter()
                .filter(|s| !steps_doors_dont_count.contains_key(s))
                .count();
            match missing {
                2 => tile.set_kind(TileKind::Blank),
                1 => tile.set_kind(TileKind::MagicBarrier),
                _ => {
                    let skipped = steps_skipped(info.sides, steps_doors_dont_count).unwrap_or(0);
                    if skipped < self.config.door_threshold {
                        tile.set_kind(TileKind::Wall);
                    } else if let Some(door) = tile.door.as_mut() {
                        door.steps_skipped = Some(skipped);
                    }
                }
            }
        }
        let grid = &self.grid;
        self.doors
            .retain(|p| matches!(grid[*p].kind, TileKind::Door | TileKind::MagicBarrier));
        debug!(doors = self.doors.len(), "doors evaluated");
    }

    /// Opens a breakable wall on the border next to a magical area.
    fn place_nether_crack(
        &mut self,
        steps: &DistanceField,
        steps_doors_dont_count: &DistanceField,
    ) -> Option<Position> {
        let magical_edges: Vec<Position> = self
            .edge_ring
            .iter()
            .copied()
            .filter(|e| {
                e.neighbors()
                    .iter()
                    .any(|n| steps.contains_key(n) && !steps_doors_dont_count.contains_key(n))
            })
            .collect();
        if magical_edges.is_empty()
            || self.rng.random::<f64>() > self.config.nether_crack_probability
        {
            return None;
        }
        let crack = *magical_edges.choose(&mut *self.rng)?;
        self.grid[crack] = Tile::new(TileKind::Wall);
        debug!(?crack, "nether crack placed");
        Some(crack)
    }

    fn assert_connected(&self, phase: &'static str) -> Result<(), GenerationError> {
        let report = connectivity::check(&self.grid, self.start);
        if report.connected {
            return Ok(());
        }
        let dump = connectivity::describe_reached(&self.grid, &report.reached);
        error!(phase, unreached = report.unreached, "level is not connected\n{dump}");
        Err(GenerationError::Disconnected {
            phase,
            unreached: report.unreached,
            reached: report.reached,
            dump,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn generate(seed: u64, w: usize, h: usize) -> GeneratedLevel {
        let config = GenerationConfig::default();
        let mut rng = StdRng::seed_from_u64(seed);
        Generator::new(w, h, &config, &mut rng)
            .unwrap()
            .run(&mut |_| {})
            .unwrap()
    }

    #[test]
    fn rejects_degenerate_sizes() {
        let config = GenerationConfig::default();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(matches!(
            Generator::new(1, 5, &config, &mut rng),
            Err(GenerationError::TooSmall { .. })
        ));
    }

    #[test]
    fn bare_maze_is_a_spanning_tree() {
        let config = GenerationConfig::default();
        let mut rng = StdRng::seed_from_u64(11);
        let mut generator = Generator::new(6, 4, &config, &mut rng).unwrap();
        generator.carve_maze();
        let grid = &generator.grid;
        let open: Vec<Position> = grid
            .enumerate()
            .filter(|(_, t)| t.kind == TileKind::Blank)
            .map(|(p, _)| p)
            .collect();
        // 24 coarse cells joined by 23 midpoints.
        assert_eq!(open.len(), 24 + 23);
        let edges: usize = open
            .iter()
            .map(|p| {
                p.neighbors()
                    .iter()
                    .filter(|n| grid.get(**n).is_some_and(|t| t.kind == TileKind::Blank))
                    .count()
            })
            .sum::<usize>()
            / 2;
        assert_eq!(edges, open.len() - 1);
        assert!(connectivity::is_connected(grid, Position::new(1, 1)));
    }

    #[test]
    fn level_has_single_start_and_destination() {
        for seed in 0..8 {
            let level = generate(seed, 12, 8);
            let starts = level.grid.iter().filter(|t| t.kind == TileKind::Start).count();
            let dests = level
                .grid
                .iter()
                .filter(|t| t.kind == TileKind::Destination)
                .count();
            assert_eq!((starts, dests), (1, 1));
            assert_ne!(level.start, level.destination);
            assert!(connectivity::is_connected(&level.grid, level.start));
        }
    }

    #[test]
    fn surviving_doors_save_enough_steps() {
        let level = generate(5, 30, 16);
        for &pos in &level.doors {
            let tile = &level.grid[pos];
            assert!(tile.door.is_some());
            if tile.kind == TileKind::Door {
                let skipped = tile.door.unwrap().steps_skipped.unwrap();
                assert!(skipped >= GenerationConfig::default().door_threshold);
            }
        }
    }

    #[test]
    fn chests_sit_in_dead_ends() {
        let level = generate(2, 14, 10);
        for &spot in &level.chest_spots {
            assert!(level.grid[spot].has_chest());
            assert!(level.grid[spot].is_passable(true));
        }
    }

    #[test]
    fn door_sides_need_two_blocked_and_two_open() {
        let rows = ["#####", "#...#", "#.#.#", "#...#", "#####"];
        let grid = Grid::from_generator(5, 5, |p| {
            Tile::new(match rows[p.y as usize].as_bytes()[p.x as usize] {
                b'.' => TileKind::Blank,
                _ => TileKind::Wall,
            })
        });
        // (2, 2) has open cells on all four sides.
        assert_eq!(door_sides(&grid, Position::new(2, 2)), None);
        // (2, 1) is not a wall at all.
        assert_eq!(door_sides(&grid, Position::new(2, 1)), None);

        let rows = ["#####", "#.#.#", "#####"];
        let grid = Grid::from_generator(5, 3, |p| {
            Tile::new(match rows[p.y as usize].as_bytes()[p.x as usize] {
                b'.' => TileKind::Blank,
                _ => TileKind::Wall,
            })
        });
        assert_eq!(
            door_sides(&grid, Position::new(2, 1)),
            Some([Position::new(1, 1), Position::new(3, 1)])
        );
    }

    /// 7x5 level: a door at (3, 1) leading out of the start pocket, and two
    /// doors at (5, 2) and (2, 3) beyond it.
    fn gated_pocket<'a>(config: &'a GenerationConfig, rng: &'a mut StdRng) -> Generator<'a> {
        let rows = ["#######", "#..D..#", "#####D#", "#.D...#", "#######"];
        let mut generator = Generator::new(3, 2, config, rng).unwrap();
        for pos in generator.grid.positions().collect::<Vec<_>>() {
            if generator.grid[pos].kind == TileKind::Wall
                && rows[pos.y as usize].as_bytes()[pos.x as usize] != b'#'
            {
                generator.grid[pos] = Tile::new(TileKind::Blank);
            }
        }
        let doors = [Position::new(3, 1), Position::new(5, 2), Position::new(2, 3)];
        for pos in doors {
            generator.grid[pos] = Tile::new(TileKind::Wall);
        }
        let sides: Vec<_> = doors
            .iter()
            .map(|&pos| door_sides(&generator.grid, pos).unwrap())
            .collect();
        for (&pos, sides) in doors.iter().zip(sides) {
            generator.grid[pos] = Tile::door(sides);
        }
        generator.doors = doors.to_vec();
        generator
    }

    #[test]
    fn destination_is_the_farthest_cell() {
        for seed in 0..6 {
            let level = generate(seed, 12, 8);
            let field = &level.steps_doors_dont_count;
            let best = field.values().copied().max().unwrap();
            assert_eq!(field[&level.destination], best);
            assert!(
                field
                    .iter()
                    .filter(|(_, d)| **d == best)
                    .all(|(p, _)| *p >= level.destination)
            );
        }
    }

    #[test]
    fn door_evaluation_by_reachable_sides() {
        let config = GenerationConfig::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut generator = gated_pocket(&config, &mut rng);
        let field = generator.distances(false);
        generator.evaluate_doors(&field);

        // One side reachable without doors.
        assert_eq!(generator.grid[Position::new(3, 1)].kind, TileKind::MagicBarrier);
        // Neither side reachable.
        assert_eq!(generator.grid[Position::new(5, 2)].kind, TileKind::Blank);
        assert_eq!(generator.grid[Position::new(2, 3)].kind, TileKind::Blank);
        assert!(generator.grid[Position::new(2, 3)].door.is_none());
        assert_eq!(generator.doors, vec![Position::new(3, 1)]);
    }

    #[test]
    fn nether_crack_borders_the_magical_area() {
        let config = GenerationConfig {
            nether_crack_probability: 1.0,
            ..GenerationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut generator = gated_pocket(&config, &mut rng);
        let field = generator.distances(false);
        generator.evaluate_doors(&field);
        let steps = generator.distances(true);
        let steps_ddc = generator.distances(false);

        let crack = generator.place_nether_crack(&steps, &steps_ddc).unwrap();
        assert!(generator.edge_ring.contains(&crack));
        assert_eq!(generator.grid[crack].kind, TileKind::Wall);
        assert!(
            crack
                .neighbors()
                .iter()
                .any(|n| steps.contains_key(n) && !steps_ddc.contains_key(n))
        );
    }

    #[test]
    fn nether_crack_needs_a_magical_area() {
        let config = GenerationConfig {
            nether_crack_probability: 1.0,
            ..GenerationConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(3);
        let mut generator = Generator::new(6, 4, &config, &mut rng).unwrap();
        generator.carve_maze();
        let steps = generator.distances(true);
        let steps_ddc = generator.distances(false);
        assert_eq!(generator.place_nether_crack(&steps, &steps_ddc), None);
    }

    #[test]
    fn glass_replaces_only_walls_up_to_the_length() {
        let config = GenerationConfig {
            glass_proportion: 0.05,
            glass_wall_length: 3,
            ..GenerationConfig::default()
        };
        for seed in 0..8 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut generator = Generator::new(6, 4, &config, &mut rng).unwrap();
            generator.carve_maze();
            let before = generator.grid.clone();
            generator.add_glass();

            let changed: Vec<Position> = generator
                .grid
                .enumerate()
                .filter(|(p, t)| t.kind != before[*p].kind)
                .map(|(p, _)| p)
                .collect();
            // 24 coarse cells at 5% is a single wall.
            assert!((1..=3).contains(&changed.len()), "seed {seed}: {changed:?}");
            for pos in changed {
                assert_eq!(before[pos].kind, TileKind::Wall);
                assert_eq!(generator.grid[pos].kind, TileKind::Glass);
            }
        }
    }

    #[test]
    fn templates_are_complements() {
        for (cut, chest) in cut_templates().iter().zip(chest_templates().iter()) {
            assert_eq!(cut.iter().filter(|b| !**b).count(), 2);
            assert_eq!(chest.iter().filter(|b| **b).count(), 2);
            assert!(!cut[4] && chest[4]);
        }
    }
}
