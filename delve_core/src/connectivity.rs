//! Global reachability check run between generation phases.

use std::collections::HashSet;

use crate::{Position, map::Grid, tile::Tile};

/// Result of a reachability sweep from the start cell.
#[derive(Debug, Clone)]
pub struct ConnectivityReport {
    pub connected: bool,
    pub reached: HashSet<Position>,
    /// Passable cells the sweep never touched.
    pub unreached: usize,
}

/// Depth-first sweep from `start` over doors-counted passability, compared
/// against every passable cell in the grid.
pub fn check(grid: &Grid<Tile>, start: Position) -> ConnectivityReport {
    let mut reached = HashSet::new();
    let mut stack = vec![start];
    while let Some(pos) = stack.pop() {
        if !reached.insert(pos) {
            continue;
        }
        for n in pos.neighbors() {
            if grid.get(n).is_some_and(|t| t.is_passable(true)) && !reached.contains(&n) {
                stack.push(n);
            }
        }
    }

    let unreached = grid
        .enumerate()
        .filter(|(pos, tile)| tile.is_passable(true) && !reached.contains(pos))
        .count();

    ConnectivityReport {
        connected: unreached == 0,
        reached,
        unreached,
    }
}

/// Convenience wrapper when only the verdict matters.
pub fn is_connected(grid: &Grid<Tile>, start: Position) -> bool {
    check(grid, start).connected
}

/// Text dump of the grid for diagnostics: `*` reached, `!` passable but
/// unreached, `#` anything else.
pub fn describe_reached(grid: &Grid<Tile>, reached: &HashSet<Position>) -> String {
    let mut out = String::with_capacity((grid.width() + 1) * grid.height());
    for y in 0..grid.height() as i32 {
        for x in 0..grid.width() as i32 {
            let pos = Position::new(x, y);
            let c = if reached.contains(&pos) {
                '*'
            } else if grid[pos].is_passable(true) {
                '!'
            } else {
                '#'
            };
            out.push(c);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tile::TileKind;

    fn grid_from(rows: &[&str]) -> Grid<Tile> {
        let height = rows.len();
        let width = rows[0].len();
        Grid::from_generator(width, height, |p| {
            let c = rows[p.y as usize].as_bytes()[p.x as usize];
            Tile::new(match c {
                b'.' => TileKind::Blank,
                b'+' => TileKind::Door,
                _ => TileKind::Wall,
            })
        })
    }

    #[test]
    fn corridor_is_connected() {
        let grid = grid_from(&["#####", "#...#", "#####"]);
        let report = check(&grid, Position::new(1, 1));
        assert!(report.connected);
        assert_eq!(report.reached.len(), 3);
    }

    #[test]
    fn isolated_pocket_is_reported() {
        let grid = grid_from(&["#####", "#.#.#", "#####"]);
        let report = check(&grid, Position::new(1, 1));
        assert!(!report.connected);
        assert_eq!(report.unreached, 1);
        let dump = describe_reached(&grid, &report.reached);
        assert_eq!(dump.lines().nth(1), Some("#*#!#"));
    }

    #[test]
    fn doors_connect_for_validation() {
        let grid = grid_from(&["#####", "#.+.#", "#####"]);
        assert!(is_connected(&grid, Position::new(1, 1)));
    }
}
