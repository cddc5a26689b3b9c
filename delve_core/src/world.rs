use std::{
    collections::{BTreeMap, HashSet},
    rc::Rc,
};

use rand::{SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

use crate::{
    EntityId, Position,
    actions::SelectionRequest,
    bestiary::{Bestiary, EnemyTypeId},
    config::WorldConfig,
    entity::{DynamicObject, HiddenEnemy, Monster, Player, Stats},
    error::{ActionError, GenerationError, GridError},
    generator::{self, GenerationPhase, Generator},
    items::{Chest, ItemCatalog},
    map::Grid,
    pathing::{self, DistanceField, PathMap},
    population::{self, Spawn},
    tile::{Content, Tile, TileKind},
    visibility::VisibilityCache,
};

/// The single owner of terrain, entities, fog of war and caches.
///
/// Created unbuilt by [`World::new`]; [`World::build_world`] runs generation
/// and population. Every gameplay mutation goes through `&mut World`.
pub struct World {
    pub(crate) config: WorldConfig,
    coarse_width: usize,
    coarse_height: usize,
    pub(crate) rng: StdRng,
    pub(crate) grid: Grid<Tile>,
    pub(crate) start: Position,
    pub(crate) destination: Position,
    pub(crate) doors: Vec<Position>,
    pub(crate) steps: DistanceField,
    pub(crate) steps_doors_dont_count: DistanceField,
    nether_crack: Option<Position>,
    pub(crate) revealed: HashSet<Position>,
    pub(crate) dirty: HashSet<Position>,
    pub(crate) visibility: VisibilityCache,
    pub(crate) items: ItemCatalog,
    pub(crate) bestiary: Bestiary,
    pub(crate) player: Player,
    pub(crate) monsters: BTreeMap<EntityId, Monster>,
    pub(crate) dynamic_objects: Vec<DynamicObject>,
    next_entity_id: EntityId,
    pub(crate) pending: Option<SelectionRequest>,
    pub(crate) turn: u64,
    built: bool,
}

impl World {
    /// Creates an unbuilt world over a `coarse_width` by `coarse_height`
    /// lattice with the stock catalogs.
    pub fn new(
        coarse_width: usize,
        coarse_height: usize,
        config: WorldConfig,
        seed: u64,
    ) -> Result<Self, GenerationError> {
        Self::with_catalogs(
            coarse_width,
            coarse_height,
            config,
            seed,
            ItemCatalog::standard(),
            Bestiary::standard(),
        )
    }

    pub fn with_catalogs(
        coarse_width: usize,
        coarse_height: usize,
        config: WorldConfig,
        seed: u64,
        items: ItemCatalog,
        bestiary: Bestiary,
    ) -> Result<Self, GenerationError> {
        if coarse_width < 2 || coarse_height < 2 {
            return Err(GenerationError::TooSmall {
                width: coarse_width,
                height: coarse_height,
            });
        }
        Ok(Self::unbuilt(
            coarse_width,
            coarse_height,
            config,
            seed,
            items,
            bestiary,
        ))
    }

    fn unbuilt(
        coarse_width: usize,
        coarse_height: usize,
        config: WorldConfig,
        seed: u64,
        items: ItemCatalog,
        bestiary: Bestiary,
    ) -> Self {
        let grid = Grid::from_generator(2 * coarse_width + 1, 2 * coarse_height + 1, |_| {
            Tile::default()
        });
        let start = Position::new(1, 1);
        let player = new_player(&config, &items, start);
        World {
            config,
            coarse_width,
            coarse_height,
            rng: StdRng::seed_from_u64(seed),
            grid,
            start,
            destination: start,
            doors: Vec::new(),
            steps: DistanceField::new(),
            steps_doors_dont_count: DistanceField::new(),
            nether_crack: None,
            revealed: HashSet::new(),
            dirty: HashSet::new(),
            visibility: VisibilityCache::new(),
            items,
            bestiary,
            player,
            monsters: BTreeMap::new(),
            dynamic_objects: Vec::new(),
            next_entity_id: 0,
            pending: None,
            turn: 0,
            built: false,
        }
    }

    pub fn build_world(&mut self) -> Result<(), GenerationError> {
        self.build_world_with_progress(|_| {})
    }

    /// Generates terrain, stocks chests and places enemies, reporting each
    /// phase to `progress`. Can only run once.
    pub fn build_world_with_progress<F>(&mut self, mut progress: F) -> Result<(), GenerationError>
    where
        F: FnMut(GenerationPhase),
    {
        if self.built {
            return Err(GenerationError::AlreadyBuilt);
        }

        let level = Generator::new(
            self.coarse_width,
            self.coarse_height,
            &self.config.generation,
            &mut self.rng,
        )?
        .run(&mut progress)?;

        self.grid = level.grid;
        self.start = level.start;
        self.destination = level.destination;
        self.doors = level.doors;
        self.steps = level.steps;
        self.steps_doors_dont_count = level.steps_doors_dont_count;
        self.nether_crack = level.nether_crack;
        self.visibility.invalidate();

        progress(GenerationPhase::Population);
        population::stock_chests(
            &mut self.grid,
            &self.steps,
            &self.items,
            &self.config.loot,
            &mut self.rng,
        );
        let spawns = population::place_enemies(
            &self.grid,
            &self.visibility,
            self.start,
            &self.steps,
            &self.bestiary,
            &self.config.population,
            &mut self.rng,
        );
        for spawn in spawns {
            match spawn {
                Spawn::Monster { position, kind } => {
                    let id = self.reserve_entity_id();
                    let monster = Monster::spawn(id, kind, &self.bestiary[kind], position);
                    self.monsters.insert(id, monster);
                }
                Spawn::Hidden(hidden) => {
                    let id = self.reserve_entity_id();
                    self.dynamic_objects.push(DynamicObject::Ambush { id, hidden });
                }
            }
        }

        self.finish_setup();
        info!(
            width = self.grid.width(),
            height = self.grid.height(),
            monsters = self.monsters.len(),
            ambushes = self.dynamic_objects.len(),
            doors = self.doors.len(),
            "world built"
        );
        progress(GenerationPhase::Done);
        Ok(())
    }

    /// Builds a world from a whitespace-separated map of two-letter codes.
    ///
    /// | Code | Cell |
    /// |---|---|
    /// | `ED` | Edge |
    /// | `WL` | Wall |
    /// | `BL` | Blank |
    /// | `RM` | Room |
    /// | `GL` | Glass |
    /// | `DR` | Door |
    /// | `MB` | Magic barrier |
    /// | `CH` | Blank with a chest |
    /// | `ST` | Start (exactly one) |
    /// | `DS` | Destination (exactly one) |
    ///
    /// Door sides are the open horizontal neighbors when both are open,
    /// otherwise the vertical ones. The result is built and ready for play
    /// with no monsters.
    pub fn from_layout(layout: &str, config: WorldConfig, seed: u64) -> Result<Self, GridError> {
        let lines: Vec<&str> = layout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(GridError::EmptyLayout);
        }

        let mut rows: Vec<Vec<&str>> = Vec::with_capacity(lines.len());
        for (y, line) in lines.iter().enumerate() {
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if let Some(first) = rows.first() {
                if tokens.len() != first.len() {
                    return Err(GridError::RaggedLayout {
                        row: y,
                        expected: first.len(),
                        found: tokens.len(),
                    });
                }
            }
            rows.push(tokens);
        }

        let (width, height) = (rows[0].len(), rows.len());
        let mut grid = Grid::from_generator(width, height, |_| Tile::default());
        let mut starts = Vec::new();
        let mut destinations = Vec::new();
        for (y, row) in rows.iter().enumerate() {
            for (x, code) in row.iter().enumerate() {
                let pos = Position::new(x as i32, y as i32);
                let tile = match *code {
                    "ED" => Tile::new(TileKind::Edge),
                    "WL" => Tile::new(TileKind::Wall),
                    "BL" => Tile::new(TileKind::Blank),
                    "RM" => Tile::new(TileKind::Room),
                    "GL" => Tile::new(TileKind::Glass),
                    "DR" => Tile::new(TileKind::Door),
                    "MB" => Tile::new(TileKind::MagicBarrier),
                    "CH" => {
                        let mut tile = Tile::new(TileKind::Blank);
                        tile.contents.push(Content::Chest(Chest::default()));
                        tile
                    }
                    "ST" => {
                        starts.push(pos);
                        Tile::new(TileKind::Start)
                    }
                    "DS" => {
                        destinations.push(pos);
                        Tile::new(TileKind::Destination)
                    }
                    other => {
                        return Err(GridError::UnknownCode {
                            code: other.to_string(),
                            x,
                            y,
                        });
                    }
                };
                grid.set(pos, tile)?;
            }
        }

        let &[start] = starts.as_slice() else {
            return Err(GridError::SingletonCount {
                code: "ST",
                found: starts.len(),
            });
        };
        let &[destination] = destinations.as_slice() else {
            return Err(GridError::SingletonCount {
                code: "DS",
                found: destinations.len(),
            });
        };

        let mut doors = Vec::new();
        for pos in grid.positions() {
            if !matches!(grid[pos].kind, TileKind::Door | TileKind::MagicBarrier) {
                continue;
            }
            let [left, right, up, down] = pos.neighbors();
            let open = |p: Position| grid.get(p).is_some_and(|t| t.is_passable(false));
            let sides = if open(left) && open(right) {
                [left, right]
            } else {
                [up, down]
            };
            let kind = grid[pos].kind;
            grid[pos] = Tile::door(sides);
            grid[pos].kind = kind;
            doors.push(pos);
        }

        let mut world = World::unbuilt(
            width / 2,
            height / 2,
            config,
            seed,
            ItemCatalog::standard(),
            Bestiary::standard(),
        );
        world.grid = grid;
        world.start = start;
        world.destination = destination;
        world.doors = doors;
        world.recompute_distances();
        for &pos in &world.doors {
            if let Some(door) = world.grid[pos].door.as_mut() {
                door.steps_skipped =
                    generator::steps_skipped(door.sides, &world.steps_doors_dont_count);
            }
        }
        population::stock_chests(
            &mut world.grid,
            &world.steps,
            &world.items,
            &world.config.loot,
            &mut world.rng,
        );
        world.finish_setup();
        debug!(width, height, doors = world.doors.len(), "world loaded from layout");
        Ok(world)
    }

    fn finish_setup(&mut self) {
        self.player = new_player(&self.config, &self.items, self.start);
        self.built = true;
        self.revealed.clear();
        self.full_rerender();
        self.see_from(self.start);
    }

    pub(crate) fn recompute_distances(&mut self) {
        self.steps = pathing::distance_field(&self.grid, self.start, true, &mut self.rng);
        self.steps_doors_dont_count =
            pathing::distance_field(&self.grid, self.start, false, &mut self.rng);
    }

    pub(crate) fn reserve_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub(crate) fn ensure_built(&self) -> Result<(), ActionError> {
        if self.built {
            Ok(())
        } else {
            Err(ActionError::NotBuilt)
        }
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn grid(&self) -> &Grid<Tile> {
        &self.grid
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn tile(&self, pos: Position) -> Option<&Tile> {
        self.grid.get(pos)
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    /// Live monsters in ascending id order.
    pub fn monsters(&self) -> impl Iterator<Item = &Monster> {
        self.monsters.values()
    }

    pub fn monster(&self, id: EntityId) -> Option<&Monster> {
        self.monsters.get(&id)
    }

    pub fn monster_at(&self, pos: Position) -> Option<EntityId> {
        self.monsters
            .values()
            .find(|m| m.position == pos)
            .map(|m| m.id)
    }

    pub fn dynamic_objects(&self) -> &[DynamicObject] {
        &self.dynamic_objects
    }

    /// Whether the player or a monster stands on `pos`.
    pub fn is_occupied(&self, pos: Position) -> bool {
        self.player.position == pos || self.monster_at(pos).is_some()
    }

    /// Memoized visible set from `origin`.
    pub fn visible_set(&self, origin: Position) -> Rc<HashSet<Position>> {
        self.visibility.get_or_compute(&self.grid, origin)
    }

    pub fn is_revealed(&self, pos: Position) -> bool {
        self.revealed.contains(&pos)
    }

    pub fn revealed(&self) -> &HashSet<Position> {
        &self.revealed
    }

    /// Cells changed since the last call. Renderers drain this once per frame.
    pub fn take_dirty(&mut self) -> HashSet<Position> {
        std::mem::take(&mut self.dirty)
    }

    pub fn start(&self) -> Position {
        self.start
    }

    pub fn destination(&self) -> Position {
        self.destination
    }

    pub fn doors(&self) -> &[Position] {
        &self.doors
    }

    /// Doors-counted steps from start.
    pub fn steps(&self, pos: Position) -> Option<u32> {
        self.steps.get(&pos).copied()
    }

    pub fn steps_doors_dont_count(&self, pos: Position) -> Option<u32> {
        self.steps_doors_dont_count.get(&pos).copied()
    }

    pub fn nether_crack(&self) -> Option<Position> {
        self.nether_crack
    }

    pub fn items(&self) -> &ItemCatalog {
        &self.items
    }

    pub fn bestiary(&self) -> &Bestiary {
        &self.bestiary
    }

    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Reveals everything visible from `origin`.
    pub fn see_from(&mut self, origin: Position) {
        let seen = self.visible_set(origin);
        self.reveal(seen.iter().copied());
    }

    pub(crate) fn reveal(&mut self, cells: impl IntoIterator<Item = Position>) -> usize {
        let mut added = 0;
        for pos in cells {
            if self.revealed.insert(pos) {
                added += 1;
            }
            self.dirty.insert(pos);
        }
        added
    }

    pub fn reveal_all(&mut self) {
        self.revealed = self.grid.positions().collect();
        self.full_rerender();
    }

    pub fn hide_all(&mut self) {
        self.revealed.clear();
        self.full_rerender();
    }

    pub fn full_rerender(&mut self) {
        self.dirty = self.grid.positions().collect();
    }

    /// Shortest path between two cells, both included, or `None` when `b`
    /// cannot be reached.
    pub fn shortest_path(&mut self, a: Position, b: Position, doors_count: bool) -> Option<Vec<Position>> {
        let targets = HashSet::from([b]);
        PathMap::search(&self.grid, a, Some(&targets), doors_count, &mut self.rng).path_to(b)
    }

    /// Changes a cell's kind, clearing the visibility memo when its
    /// transparency flips.
    pub(crate) fn set_tile_kind(&mut self, pos: Position, kind: TileKind) {
        let Some(tile) = self.grid.get_mut(pos) else {
            return;
        };
        let was_transparent = tile.is_transparent();
        tile.set_kind(kind);
        if tile.is_transparent() != was_transparent {
            self.visibility.invalidate();
        }
        if tile.door.is_none() {
            self.doors.retain(|door| *door != pos);
        }
        self.dirty.insert(pos);
    }

    pub(crate) fn move_player(&mut self, to: Position) {
        self.dirty.insert(self.player.position);
        self.player.position = to;
        self.dirty.insert(to);
        self.see_from(to);
    }

    /// Places a live monster. Fails on impassable or occupied cells.
    pub fn spawn_monster(&mut self, kind: EnemyTypeId, pos: Position) -> Result<EntityId, ActionError> {
        self.ensure_built()?;
        let Some(enemy) = self.bestiary.get(kind) else {
            return Err(ActionError::InvalidTarget(pos));
        };
        if !self.grid.get(pos).is_some_and(|t| t.is_passable(false)) || self.is_occupied(pos) {
            return Err(ActionError::Blocked);
        }
        let id = self.next_entity_id;
        let monster = Monster::spawn(id, kind, enemy, pos);
        self.next_entity_id += 1;
        self.monsters.insert(id, monster);
        self.dirty.insert(pos);
        Ok(id)
    }

    /// Places an ambush marker at `pos` that springs once the player is
    /// `unhide_threshold` steps past it.
    pub fn spawn_hidden(
        &mut self,
        kind: EnemyTypeId,
        pos: Position,
        unhide_threshold: u32,
    ) -> Result<EntityId, ActionError> {
        self.ensure_built()?;
        if self.bestiary.get(kind).is_none() {
            return Err(ActionError::InvalidTarget(pos));
        }
        let Some(spawn_steps) = self.steps(pos) else {
            return Err(ActionError::Blocked);
        };
        let id = self.reserve_entity_id();
        self.dynamic_objects.push(DynamicObject::Ambush {
            id,
            hidden: HiddenEnemy {
                position: pos,
                kind,
                spawn_steps,
                unhide_threshold,
            },
        });
        Ok(id)
    }

    /// Restores the player to full strength at the start cell. A monster
    /// standing on start is pushed to the nearest free cell.
    pub fn respawn_player(&mut self) -> Result<(), ActionError> {
        self.ensure_built()?;
        let squatter = self.monster_at(self.start);
        self.player.stats.reset();
        self.player.deaths += 1;
        self.pending = None;
        self.move_player(self.start);
        if let Some(id) = squatter {
            self.evict_from_start(id);
        }
        info!(deaths = self.player.deaths, "player respawned");
        Ok(())
    }

    fn evict_from_start(&mut self, id: EntityId) {
        let field = pathing::distance_field(&self.grid, self.start, false, &mut self.rng);
        let spot = field
            .iter()
            .filter(|(pos, _)| !self.is_occupied(**pos))
            .min_by_key(|(pos, steps)| (**steps, **pos))
            .map(|(pos, _)| *pos);
        let Some(spot) = spot else {
            warn!(monster = id, "no free cell to move a monster off start");
            return;
        };
        if let Some(monster) = self.monsters.get_mut(&id) {
            monster.position = spot;
        }
        self.dirty.insert(spot);
        debug!(monster = id, ?spot, "monster moved off start");
    }
}

fn new_player(config: &WorldConfig, items: &ItemCatalog, start: Position) -> Player {
    let stats = Stats::new(config.player.max_hp, config.player.max_mana, config.player.armor);
    let mut player = Player::new(start, stats);
    for (name, count) in &config.player.starting_items {
        match items.id_of(name) {
            Some(id) => player.inventory.add(id, *count),
            None => warn!(item = %name, "unknown starting item skipped"),
        }
    }
    player
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR: &str = "
        ED ED ED ED ED ED ED
        ED ST BL DR BL DS ED
        ED ED ED ED ED ED ED
    ";

    #[test]
    fn unbuilt_world_rejects_actions() {
        let mut world = World::new(4, 4, WorldConfig::default(), 0).unwrap();
        assert!(!world.is_built());
        assert_eq!(world.respawn_player(), Err(ActionError::NotBuilt));
        assert!(matches!(
            World::new(1, 4, WorldConfig::default(), 0),
            Err(GenerationError::TooSmall { .. })
        ));
    }

    #[test]
    fn build_runs_once() {
        let mut world = World::new(6, 6, WorldConfig::default(), 17).unwrap();
        let mut phases = Vec::new();
        world.build_world_with_progress(|phase| phases.push(phase)).unwrap();
        assert_eq!(phases.first(), Some(&GenerationPhase::Maze));
        assert_eq!(phases.last(), Some(&GenerationPhase::Done));
        assert_eq!(world.player().position, world.start());
        assert!(world.is_revealed(world.start()));
        assert_eq!(world.build_world(), Err(GenerationError::AlreadyBuilt));
    }

    #[test]
    fn layout_loader_reads_codes() {
        let world = World::from_layout(CORRIDOR, WorldConfig::default(), 0).unwrap();
        assert_eq!(world.start(), Position::new(1, 1));
        assert_eq!(world.destination(), Position::new(5, 1));
        assert_eq!(world.doors(), &[Position::new(3, 1)]);
        let door = world.tile(Position::new(3, 1)).unwrap().door.unwrap();
        assert_eq!(door.sides, [Position::new(2, 1), Position::new(4, 1)]);
        assert_eq!(world.steps(Position::new(5, 1)), Some(4));
        assert_eq!(world.steps_doors_dont_count(Position::new(5, 1)), None);
    }

    #[test]
    fn layout_loader_errors() {
        assert_eq!(
            World::from_layout("   ", WorldConfig::default(), 0).err(),
            Some(GridError::EmptyLayout)
        );
        assert!(matches!(
            World::from_layout("ST BL\nBL", WorldConfig::default(), 0),
            Err(GridError::RaggedLayout { row: 1, .. })
        ));
        assert!(matches!(
            World::from_layout("ST XX DS", WorldConfig::default(), 0),
            Err(GridError::UnknownCode { x: 1, y: 0, .. })
        ));
        assert!(matches!(
            World::from_layout("ST ST DS", WorldConfig::default(), 0),
            Err(GridError::SingletonCount { code: "ST", found: 2 })
        ));
    }

    #[test]
    fn transparency_change_clears_the_memo() {
        let mut world = World::from_layout(CORRIDOR, WorldConfig::default(), 0).unwrap();
        let before = world.visible_set(Position::new(1, 1));
        assert!(!before.contains(&Position::new(4, 1)));
        world.set_tile_kind(Position::new(3, 1), TileKind::Blank);
        assert!(world.doors().is_empty());
        let after = world.visible_set(Position::new(1, 1));
        assert!(after.contains(&Position::new(4, 1)));
    }

    #[test]
    fn dirty_set_drains() {
        let mut world = World::from_layout(CORRIDOR, WorldConfig::default(), 0).unwrap();
        assert_eq!(world.take_dirty().len(), 21);
        assert!(world.take_dirty().is_empty());
        world.reveal_all();
        assert_eq!(world.revealed().len(), 21);
        world.hide_all();
        assert!(!world.is_revealed(Position::new(1, 1)));
    }

    #[test]
    fn shortest_path_respects_doors() {
        let mut world = World::from_layout(CORRIDOR, WorldConfig::default(), 0).unwrap();
        let (a, b) = (Position::new(1, 1), Position::new(5, 1));
        assert_eq!(world.shortest_path(a, b, true).map(|p| p.len()), Some(5));
        assert_eq!(world.shortest_path(a, b, false), None);
    }

    #[test]
    fn respawn_pushes_a_monster_off_start() {
        let mut world = World::from_layout(CORRIDOR, WorldConfig::default(), 0).unwrap();
        world.player.position = Position::new(2, 1);
        let rat = world.bestiary().id_of("rat").unwrap();
        let id = world.spawn_monster(rat, Position::new(1, 1)).unwrap();

        world.respawn_player().unwrap();
        assert_eq!(world.player().position, Position::new(1, 1));
        let monster = world.monster(id).unwrap();
        assert_eq!(monster.position, Position::new(2, 1));
        assert!(monster.position.is_adjacent(world.player().position));
    }

    #[test]
    fn starting_items_are_granted() {
        let world = World::from_layout(CORRIDOR, WorldConfig::default(), 0).unwrap();
        let potion = world.items().id_of("potion").unwrap();
        assert_eq!(world.player().inventory.count(potion), 2);
        assert_eq!(world.player().wielded, None);
    }
}
