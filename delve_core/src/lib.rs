use serde::{Deserialize, Serialize};

pub mod actions;
pub mod bestiary;
pub mod config;
pub mod connectivity;
pub mod engine;
pub mod entity;
pub mod error;
pub mod generator;
pub mod items;
pub mod map;
pub mod pathing;
pub mod population;
pub mod tile;
pub mod visibility;
pub mod world;

pub use config::WorldConfig;
pub use error::{ActionError, GenerationError, GridError};
pub use world::World;

/// Unique identifier for entities (monsters, dynamic objects).
pub type EntityId = usize;

/// Represents a 2D coordinate.
///
/// Coordinates are signed so neighbor arithmetic never wraps; anything
/// outside the grid simply fails to resolve to a cell.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    /// Returns the position shifted by `(dx, dy)`.
    #[inline]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Position {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    #[inline]
    pub fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.delta();
        self.offset(dx, dy)
    }

    /// The four orthogonal neighbors, in left, right, up, down order.
    #[inline]
    pub fn neighbors(self) -> [Position; 4] {
        [
            self.offset(-1, 0),
            self.offset(1, 0),
            self.offset(0, -1),
            self.offset(0, 1),
        ]
    }

    /// The 3x3 block centered on this position, column-major
    /// (`dx` outer, `dy` inner). Index 4 is the center itself.
    pub fn neighborhood(self) -> [Position; 9] {
        let mut out = [self; 9];
        let mut i = 0;
        for dx in -1..=1 {
            for dy in -1..=1 {
                out[i] = self.offset(dx, dy);
                i += 1;
            }
        }
        out
    }

    /// Returns manhattan distance between two positions
    #[inline]
    pub fn manhattan(self, other: Position) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    #[inline]
    pub fn is_adjacent(self, other: Position) -> bool {
        self.manhattan(other) == 1
    }
}

/// One of the four movement directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    #[inline]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Converts a move between two adjacent positions into a direction.
    pub fn between(from: Position, to: Position) -> Option<Direction> {
        match (to.x - from.x, to.y - from.y) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neighborhood_is_column_major() {
        let hood = Position::new(5, 5).neighborhood();
        assert_eq!(hood[0], Position::new(4, 4));
        assert_eq!(hood[1], Position::new(4, 5));
        assert_eq!(hood[3], Position::new(5, 4));
        assert_eq!(hood[4], Position::new(5, 5));
        assert_eq!(hood[7], Position::new(6, 5));
    }

    #[test]
    fn direction_between_adjacent_cells() {
        let p = Position::new(3, 3);
        for dir in Direction::ALL {
            assert_eq!(Direction::between(p, p.step(dir)), Some(dir));
        }
        assert_eq!(Direction::between(p, p.offset(1, 1)), None);
    }
}
