//! Line of sight and per-origin visible sets.
//!
//! `visible_set` is a flood fill that accepts a cell only when the origin has
//! line of sight to it, and on acceptance also queues the neighbors of every
//! neighbor. That two-hop push lets sight peek one cell around a wall corner.
//! Population and fog of war both depend on this exact shape.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use crate::{Position, map::Grid, tile::Tile};

/// Ray sampling from `a` to `b`.
///
/// Samples `floor(|b - a|) + 1` points along the unit direction, rounding each
/// with `floor(p + 0.5)`. Any sampled cell other than the endpoints that is
/// opaque (or off the grid) blocks. The ray is always cast from the smaller
/// endpoint, so `line_of_sight(a, b) == line_of_sight(b, a)`.
pub fn line_of_sight(grid: &Grid<Tile>, a: Position, b: Position) -> bool {
    if a == b {
        return true;
    }
    let (from, to) = if a <= b { (a, b) } else { (b, a) };

    let dx = (to.x - from.x) as f64;
    let dy = (to.y - from.y) as f64;
    let norm = (dx * dx + dy * dy).sqrt();
    let (ux, uy) = (dx / norm, dy / norm);

    for c in 0..=(norm as i32) {
        let c = c as f64;
        let sample = Position::new(
            (from.x as f64 + 0.5 + ux * c).floor() as i32,
            (from.y as f64 + 0.5 + uy * c).floor() as i32,
        );
        if sample == from || sample == to {
            continue;
        }
        if !grid.get(sample).is_some_and(Tile::is_transparent) {
            return false;
        }
    }
    true
}

/// Flood fill of every cell `origin` can see, including the opaque cells
/// that bound the view.
pub fn visible_set(grid: &Grid<Tile>, origin: Position) -> HashSet<Position> {
    let mut reached = HashSet::new();
    let mut stack = vec![origin];
    while let Some(pos) = stack.pop() {
        if reached.contains(&pos) || !grid.contains(pos) || !line_of_sight(grid, origin, pos) {
            continue;
        }
        reached.insert(pos);
        for n in pos.neighbors() {
            stack.push(n);
            if !reached.contains(&n) {
                stack.extend(n.neighbors());
            }
        }
    }
    reached
}

/// Memoized visible sets keyed by origin.
///
/// Entries stay valid while terrain transparency is unchanged. Whoever
/// changes the transparency of a cell must call [`VisibilityCache::invalidate`].
#[derive(Debug, Default)]
pub struct VisibilityCache {
    entries: RefCell<HashMap<Position, Rc<HashSet<Position>>>>,
}

impl VisibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(&self, grid: &Grid<Tile>, origin: Position) -> Rc<HashSet<Position>> {
        if let Some(hit) = self.entries.borrow().get(&origin) {
            return Rc::clone(hit);
        }
        let set = Rc::new(visible_set(grid, origin));
        self.entries.borrow_mut().insert(origin, Rc::clone(&set));
        set
    }

    /// Drops every memoized set.
    pub fn invalidate(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileKind;

    fn grid_from(rows: &[&str]) -> Grid<Tile> {
        Grid::from_generator(rows[0].len(), rows.len(), |p| {
            Tile::new(match rows[p.y as usize].as_bytes()[p.x as usize] {
                b'.' => TileKind::Blank,
                b'g' => TileKind::Glass,
                b'+' => TileKind::Door,
                _ => TileKind::Wall,
            })
        })
    }

    #[test]
    fn sight_is_reflexive_and_blocked_by_walls() {
        let grid = grid_from(&["#######", "#..#..#", "#######"]);
        let a = Position::new(1, 1);
        assert!(line_of_sight(&grid, a, a));
        assert!(line_of_sight(&grid, a, Position::new(2, 1)));
        // The wall itself is visible, what lies behind it is not.
        assert!(line_of_sight(&grid, a, Position::new(3, 1)));
        assert!(!line_of_sight(&grid, a, Position::new(4, 1)));
    }

    #[test]
    fn glass_passes_sight_but_doors_do_not() {
        let glass = grid_from(&["#####", "#.g.#", "#####"]);
        assert!(line_of_sight(&glass, Position::new(1, 1), Position::new(3, 1)));
        let door = grid_from(&["#####", "#.+.#", "#####"]);
        assert!(!line_of_sight(&door, Position::new(1, 1), Position::new(3, 1)));
    }

    #[test]
    fn symmetric_on_open_room() {
        let grid = grid_from(&[
            "#########",
            "#.......#",
            "#..#....#",
            "#.....#.#",
            "#.......#",
            "#########",
        ]);
        for a in grid.positions() {
            for b in grid.positions() {
                assert_eq!(line_of_sight(&grid, a, b), line_of_sight(&grid, b, a));
            }
        }
    }

    /// Corridor turning a corner:
    ///
    /// ```text
    /// #######
    /// #.....#
    /// #####.#
    /// #####.#
    /// #######
    /// ```
    #[test]
    fn corner_shape_from_far_end_and_from_the_bend() {
        let grid = grid_from(&["#######", "#.....#", "#####.#", "#####.#", "#######"]);

        let far = visible_set(&grid, Position::new(1, 1));
        assert!(far.contains(&Position::new(5, 1)));
        assert!(far.contains(&Position::new(6, 1)));
        assert!(!far.contains(&Position::new(5, 2)));
        assert!(!far.contains(&Position::new(5, 3)));
        // Bounding walls are part of the set.
        assert!(far.contains(&Position::new(3, 0)));
        assert!(far.contains(&Position::new(0, 1)));

        // One cell before the bend the viewer peeks diagonally into the
        // vertical leg, but only one cell deep.
        let near = visible_set(&grid, Position::new(4, 1));
        assert!(near.contains(&Position::new(5, 2)));
        assert!(!near.contains(&Position::new(5, 3)));
    }

    /// Sight slips between walls that only touch at their corners.
    ///
    /// ```text
    /// #####
    /// #.###
    /// ##.##
    /// ###.#
    /// #####
    /// ```
    #[test]
    fn diagonal_gaps_do_not_block() {
        let grid = grid_from(&["#####", "#.###", "##.##", "###.#", "#####"]);
        let seen = visible_set(&grid, Position::new(1, 1));
        assert!(seen.contains(&Position::new(2, 2)));
        assert!(seen.contains(&Position::new(3, 3)));
        assert!(seen.contains(&Position::new(4, 4)));
        assert!(line_of_sight(&grid, Position::new(3, 3), Position::new(1, 1)));
    }

    #[test]
    fn sealed_pocket_is_not_visible() {
        let grid = grid_from(&["#######", "#..#..#", "#######"]);
        let seen = visible_set(&grid, Position::new(1, 1));
        assert!(seen.contains(&Position::new(3, 1)));
        assert!(!seen.contains(&Position::new(4, 1)));
        assert!(!seen.contains(&Position::new(5, 1)));
    }

    #[test]
    fn cache_memoizes_until_invalidated() {
        let grid = grid_from(&["#####", "#...#", "#####"]);
        let cache = VisibilityCache::new();
        let first = cache.get_or_compute(&grid, Position::new(1, 1));
        let second = cache.get_or_compute(&grid, Position::new(1, 1));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
        cache.invalidate();
        assert!(cache.is_empty());
    }
}
