use serde::{Deserialize, Serialize};

use crate::{Position, items::Chest};

/// The basic kind of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TileKind {
    Blank,
    #[default]
    Wall,
    Edge,
    Door,
    Start,
    Destination,
    Room,
    MagicBarrier,
    Glass,
}

impl TileKind {
    /// Door-like kinds only count as passable when doors count.
    #[inline]
    pub const fn is_passable(self, doors_count: bool) -> bool {
        match self {
            TileKind::Door | TileKind::MagicBarrier => doors_count,
            TileKind::Blank | TileKind::Room | TileKind::Start | TileKind::Destination => true,
            TileKind::Wall | TileKind::Edge | TileKind::Glass => false,
        }
    }

    #[inline]
    pub const fn is_transparent(self) -> bool {
        matches!(
            self,
            TileKind::Blank | TileKind::Room | TileKind::Glass | TileKind::Start | TileKind::Destination
        )
    }
}

/// Terrain-bound objects lying on a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Content {
    Gold(u32),
    Chest(Chest),
}

/// Door bookkeeping: the two open cells the door separates and how many
/// steps it saves over walking around (known once distances exist).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorInfo {
    pub sides: [Position; 2],
    pub steps_skipped: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Tile {
    pub kind: TileKind,
    pub contents: Vec<Content>,
    pub door: Option<DoorInfo>,
}

impl Tile {
    pub fn new(kind: TileKind) -> Self {
        Tile {
            kind,
            contents: Vec::new(),
            door: None,
        }
    }

    pub fn door(sides: [Position; 2]) -> Self {
        Tile {
            kind: TileKind::Door,
            contents: Vec::new(),
            door: Some(DoorInfo {
                sides,
                steps_skipped: None,
            }),
        }
    }

    #[inline]
    pub fn is_passable(&self, doors_count: bool) -> bool {
        self.kind.is_passable(doors_count)
    }

    #[inline]
    pub fn is_transparent(&self) -> bool {
        self.kind.is_transparent()
    }

    /// Changes the kind, dropping door metadata when the new kind is not
    /// door-like. Contents stay.
    pub fn set_kind(&mut self, kind: TileKind) {
        self.kind = kind;
        if !matches!(kind, TileKind::Door | TileKind::MagicBarrier) {
            self.door = None;
        }
    }

    pub fn has_chest(&self) -> bool {
        self.contents.iter().any(|c| matches!(c, Content::Chest(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TileKind; 9] = [
        TileKind::Blank,
        TileKind::Wall,
        TileKind::Edge,
        TileKind::Door,
        TileKind::Start,
        TileKind::Destination,
        TileKind::Room,
        TileKind::MagicBarrier,
        TileKind::Glass,
    ];

    #[test]
    fn doors_only_pass_when_counted() {
        for kind in [TileKind::Door, TileKind::MagicBarrier] {
            assert!(kind.is_passable(true));
            assert!(!kind.is_passable(false));
        }
    }

    #[test]
    fn passability_table() {
        let passable: Vec<_> = ALL.iter().filter(|k| k.is_passable(true)).collect();
        assert_eq!(passable.len(), 6);
        let no_doors: Vec<_> = ALL.iter().filter(|k| k.is_passable(false)).collect();
        assert_eq!(no_doors.len(), 4);
        assert!(!TileKind::Glass.is_passable(true));
    }

    #[test]
    fn glass_is_see_through_but_doors_are_not() {
        assert!(TileKind::Glass.is_transparent());
        assert!(!TileKind::Door.is_transparent());
        assert!(!TileKind::MagicBarrier.is_transparent());
        assert!(!TileKind::Wall.is_transparent());
        assert!(!TileKind::Edge.is_transparent());
    }

    #[test]
    fn leaving_door_kind_drops_metadata() {
        let mut tile = Tile::door([Position::new(1, 2), Position::new(3, 2)]);
        tile.set_kind(TileKind::MagicBarrier);
        assert!(tile.door.is_some());
        tile.set_kind(TileKind::Wall);
        assert!(tile.door.is_none());
    }
}
