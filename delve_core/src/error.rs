use std::collections::HashSet;

use crate::Position;

/// Represents errors that can occur within the grid operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GridError {
    #[error("Coordinates ({x}, {y}) are out of bounds for grid size ({width}, {height})")]
    OutOfBounds {
        x: i32,
        y: i32,
        width: usize,
        height: usize,
    },
    #[error("Layout is empty")]
    EmptyLayout,
    #[error("Inconsistent width at row {row}: expected {expected}, found {found}")]
    RaggedLayout {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("Unknown layout code '{code}' at ({x}, {y})")]
    UnknownCode { code: String, x: usize, y: usize },
    #[error("Layout has {found} '{code}' cells, expected exactly one")]
    SingletonCount { code: &'static str, found: usize },
}

/// Fatal failures while building a world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("Coarse dimensions {width}x{height} are too small (minimum 2x2)")]
    TooSmall { width: usize, height: usize },
    #[error("World has already been built")]
    AlreadyBuilt,
    /// Some passable cell cannot be reached from start. Carries the reached
    /// set and a text dump of the map with reached cells marked.
    #[error(
        "Generated level is not connected after {phase}: {unreached} passable cells unreachable\n{dump}"
    )]
    Disconnected {
        phase: &'static str,
        unreached: usize,
        reached: HashSet<Position>,
        dump: String,
    },
}

/// Gameplay action failures. None of these mutate the world.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    #[error("No matching item: {0:?}")]
    UnknownItem(String),
    #[error("You don't have any {0}")]
    NotHeld(String),
    #[error("{0} cannot be used")]
    NotUsable(String),
    #[error("Not enough mana: need {needed}, have {available}")]
    InsufficientMana { needed: u32, available: u32 },
    #[error("You are stunned")]
    Stunned,
    #[error("The way is blocked")]
    Blocked,
    #[error("No effect")]
    NoEffect,
    #[error("Invalid target at ({}, {})", .0.x, .0.y)]
    InvalidTarget(Position),
    #[error("Wrong kind of selection for the pending request")]
    SelectionMismatch,
    #[error("Cancelled")]
    Cancelled,
    #[error("No selection is pending")]
    NoPendingSelection,
    #[error("A selection is still pending")]
    SelectionPending,
    #[error("Nothing to loot here")]
    NothingToLoot,
    #[error("The world has not been built yet")]
    NotBuilt,
}
