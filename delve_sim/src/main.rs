use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use delve_core::{
    ActionError, Direction, Position, World, WorldConfig,
    actions::{Selection, UseOutcome},
    engine::{MoveOutcome, TickReport},
    tile::TileKind,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Seed for generation and play
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    /// Maze width in coarse cells
    #[arg(long, default_value_t = 12)]
    width: usize,

    /// Maze height in coarse cells
    #[arg(long, default_value_t = 8)]
    height: usize,

    /// Tick limit before giving up
    #[arg(short, long, default_value_t = 2_000)]
    turns: u64,

    /// JSON file overriding any subset of the world config
    #[arg(short, long, value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Hand-drawn layout to play instead of a generated maze
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Where to write the run summary as JSON
    #[arg(long, value_name = "SUMMARY_FILE")]
    summary_out: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    seed: u64,
    width: usize,
    height: usize,
    turns: u64,
    reached_destination: bool,
    deaths: u32,
    kills: usize,
    gold: u32,
    hits_taken: usize,
    damage_taken: u32,
    monsters_remaining: usize,
    revealed: usize,
}

/// Greedy autoplayer: loot, heal, fight whatever is adjacent, otherwise walk
/// toward the destination opening doors on the way.
struct Bot {
    world: World,
    summary: Summary,
}

impl Bot {
    fn new(world: World, seed: u64) -> Self {
        let summary = Summary {
            seed,
            width: world.width(),
            height: world.height(),
            ..Summary::default()
        };
        Bot { world, summary }
    }

    fn run(mut self, turn_limit: u64) -> Result<Summary> {
        while self.world.turn() < turn_limit && !self.summary.reached_destination {
            let cost = self.act()?;
            for _ in 0..cost.max(1) {
                let report = self.world.time_step();
                self.record(&report)?;
            }
        }
        let world = &self.world;
        self.summary.turns = world.turn();
        self.summary.deaths = world.player().deaths;
        self.summary.gold = world.player().gold;
        self.summary.monsters_remaining = world.monsters().count();
        self.summary.revealed = world.revealed().len();
        Ok(self.summary)
    }

    /// Takes one player action and returns how many ticks it costs.
    fn act(&mut self) -> Result<u32> {
        let here = self.world.player().position;
        if self.world.tile(here).is_some_and(|t| !t.contents.is_empty()) {
            match self.world.loot_current_tile() {
                Ok(loot) => debug!(gold = loot.gold, items = loot.items.len(), "looted"),
                Err(e) => debug!(error = %e, "nothing looted"),
            }
            return Ok(1);
        }

        let stats = self.world.player().stats;
        if stats.hp * 3 <= stats.max_hp && self.holds("potion") {
            if let Ok(UseOutcome::Done(report)) = self.world.use_item("potion") {
                debug!(effect = ?report.effect, "drank potion");
                return Ok(report.turn_cost);
            }
        }

        if let Some(target) = self.adjacent_monster() {
            if let Some(direction) = Direction::between(here, target) {
                return self.step(direction);
            }
        }

        let destination = self.world.destination();
        let path = self
            .world
            .shortest_path(here, destination, false)
            .or_else(|| self.world.shortest_path(here, destination, true));
        let Some(next) = path.as_ref().and_then(|p| p.get(1).copied()) else {
            debug!(?here, "no route to the destination, waiting");
            return Ok(1);
        };
        let Some(direction) = Direction::between(here, next) else {
            bail!("path step from {here:?} to {next:?} is not adjacent");
        };

        match self.world.tile(next).map(|t| t.kind) {
            Some(TileKind::Door) => self.unlock("key", direction),
            Some(TileKind::MagicBarrier) => self.unlock("m-key", direction),
            _ => self.step(direction),
        }
    }

    fn step(&mut self, direction: Direction) -> Result<u32> {
        match self.world.attempt_move(direction) {
            Ok(MoveOutcome::Moved {
                reached_destination,
                to,
            }) => {
                if reached_destination {
                    info!(turn = self.world.turn(), ?to, "reached the destination");
                    self.summary.reached_destination = true;
                }
            }
            Ok(MoveOutcome::Attacked { target, damage, killed }) => {
                debug!(monster = target, damage, killed, "player attacked");
            }
            Err(ActionError::Stunned | ActionError::Blocked) => {}
            Err(e) => return Err(e).context("moving the player"),
        }
        Ok(1)
    }

    fn unlock(&mut self, key: &str, direction: Direction) -> Result<u32> {
        if !self.holds(key) {
            debug!(key, "no key for the way ahead, waiting");
            return Ok(1);
        }
        let Ok(UseOutcome::NeedsSelection(_)) = self.world.use_item(key) else {
            return Ok(1);
        };
        match self
            .world
            .complete_selection(Some(Selection::Direction(direction)))
        {
            Ok(report) => Ok(report.turn_cost),
            Err(e) => {
                if self.world.pending_selection().is_some() {
                    self.world.complete_selection(None).ok();
                }
                warn!(error = %e, key, "unlock failed");
                Ok(1)
            }
        }
    }

    fn holds(&self, name: &str) -> bool {
        self.world.lookup_item(name).is_ok_and(|info| info.count > 0)
    }

    fn adjacent_monster(&self) -> Option<Position> {
        let here = self.world.player().position;
        here.neighbors()
            .into_iter()
            .find(|n| self.world.monster_at(*n).is_some())
    }

    fn record(&mut self, report: &TickReport) -> Result<()> {
        self.summary.kills += report.killed.len();
        self.summary.hits_taken += report.hits.len();
        self.summary.damage_taken += report.hits.iter().map(|h| h.damage).sum::<u32>();
        if report.player_died {
            self.world.respawn_player().context("respawning the player")?;
        }
        Ok(())
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("delve_core=info,delve_sim=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .compact()
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<WorldConfig> {
    let Some(path) = path else {
        return Ok(WorldConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    let world = match &args.map {
        Some(map_file) => {
            if !map_file.exists() {
                bail!("Map file does not exist: {}", map_file.display());
            }
            let layout = std::fs::read_to_string(map_file)
                .with_context(|| format!("reading map {}", map_file.display()))?;
            World::from_layout(&layout, config, args.seed)?
        }
        None => {
            let mut world = World::new(args.width, args.height, config, args.seed)?;
            world.build_world_with_progress(|phase| debug!(?phase, "generation"))?;
            world
        }
    };
    info!(
        seed = args.seed,
        width = world.width(),
        height = world.height(),
        monsters = world.monsters().count(),
        "level ready"
    );

    let summary = Bot::new(world, args.seed).run(args.turns)?;
    let json = serde_json::to_string_pretty(&summary)?;
    match &args.summary_out {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing summary {}", path.display()))?,
        None => info!(summary = %json, "run finished"),
    }
    Ok(())
}
