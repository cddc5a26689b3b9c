//! Breadth-first distance fields and parent-pointer paths.
//!
//! Neighbor order is shuffled on every expansion, so among equally short
//! paths the one recorded is random. Only distances are stable.

use std::collections::{HashMap, HashSet, VecDeque};

use rand::{Rng, seq::SliceRandom};

use crate::{Position, map::Grid, tile::Tile};

/// Step counts from a single source, keyed by cell.
pub type DistanceField = HashMap<Position, u32>;

/// Output of one breadth-first expansion.
#[derive(Debug, Clone)]
pub struct PathMap {
    source: Position,
    parent: HashMap<Position, Option<Position>>,
    distance: DistanceField,
}

impl PathMap {
    /// Expands from `source` over cells passable under `doors_count`.
    ///
    /// With `targets`, expansion stops as soon as every target has been
    /// dequeued; unreachable targets simply mean a full expansion.
    pub fn search<R: Rng + ?Sized>(
        grid: &Grid<Tile>,
        source: Position,
        targets: Option<&HashSet<Position>>,
        doors_count: bool,
        rng: &mut R,
    ) -> PathMap {
        let mut parent = HashMap::new();
        let mut distance = HashMap::new();
        let mut queue = VecDeque::new();
        let mut remaining = targets.map(|t| t.len());

        parent.insert(source, None);
        distance.insert(source, 0);
        queue.push_back(source);

        while let Some(current) = queue.pop_front() {
            if let (Some(targets), Some(left)) = (targets, remaining.as_mut()) {
                if targets.contains(&current) {
                    *left -= 1;
                }
                if *left == 0 {
                    break;
                }
            }

            let steps = distance[&current];
            let mut neighbors = current.neighbors();
            neighbors.shuffle(rng);
            for n in neighbors {
                if parent.contains_key(&n) {
                    continue;
                }
                if !grid.get(n).is_some_and(|t| t.is_passable(doors_count)) {
                    continue;
                }
                parent.insert(n, Some(current));
                distance.insert(n, steps + 1);
                queue.push_back(n);
            }
        }

        PathMap {
            source,
            parent,
            distance,
        }
    }

    pub fn source(&self) -> Position {
        self.source
    }

    pub fn distance(&self, pos: Position) -> Option<u32> {
        self.distance.get(&pos).copied()
    }

    pub fn contains(&self, pos: Position) -> bool {
        self.parent.contains_key(&pos)
    }

    /// The cell one step closer to the source, or `None` at the source and
    /// for cells never reached.
    pub fn parent(&self, pos: Position) -> Option<Position> {
        self.parent.get(&pos).copied().flatten()
    }

    /// Path from the source to `dest`, both ends included.
    pub fn path_to(&self, dest: Position) -> Option<Vec<Position>> {
        if !self.contains(dest) {
            return None;
        }
        let mut path = vec![dest];
        let mut current = dest;
        while let Some(prev) = self.parent(current) {
            path.push(prev);
            current = prev;
        }
        path.reverse();
        Some(path)
    }

    /// The farthest reached cell; ties go to the smallest position.
    pub fn farthest(&self) -> Option<Position> {
        farthest(&self.distance)
    }

    pub fn into_distances(self) -> DistanceField {
        self.distance
    }
}

/// Full expansion from `source`, keeping only the distances.
pub fn distance_field<R: Rng + ?Sized>(
    grid: &Grid<Tile>,
    source: Position,
    doors_count: bool,
    rng: &mut R,
) -> DistanceField {
    PathMap::search(grid, source, None, doors_count, rng).into_distances()
}

pub fn farthest(field: &DistanceField) -> Option<Position> {
    field
        .iter()
        .max_by(|(pa, da), (pb, db)| da.cmp(db).then_with(|| pb.cmp(pa)))
        .map(|(pos, _)| *pos)
}
