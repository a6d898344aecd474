//! World module
//!
//! The world registry:
//! - The table of connected players
//! - The AOI grid shared by every player
//! - Player id allocation and spawn placement
//! - Periodic statistics logging

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use rand::Rng;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{AoiConfig, ServerConfig, SpawnConfig};
use crate::error::{GameError, Result};
use crate::game::aoi::{AoiGrid, CellId};
use crate::game::player::{Player, PlayerId, Position, Transition};

/// Snapshot of world statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorldStats {
    /// Registered players
    pub players: usize,
    /// Player ids present in the grid
    pub grid_population: usize,
    /// Cells with at least one occupant
    pub populated_cells: usize,
    /// Total cells
    pub cells: usize,
}

/// The game world - player registry plus AOI grid
pub struct World {
    players: RwLock<HashMap<PlayerId, Arc<Player>>>,
    grid: AoiGrid,
    next_id: AtomicI32,
    spawn: SpawnConfig,
    max_players: usize,
    start_time: Instant,
}

impl World {
    /// Create a world with the given grid layout and spawn area
    pub fn new(layout: AoiConfig, spawn: SpawnConfig, max_players: usize) -> Result<Self> {
        let grid = AoiGrid::new(layout)?;

        let spawn_values = [spawn.origin_x, spawn.origin_z, spawn.jitter_x, spawn.jitter_z];
        let negative_jitter = spawn.jitter_x < 0.0 || spawn.jitter_z < 0.0;
        if negative_jitter || spawn_values.iter().any(|v| !v.is_finite()) {
            return Err(GameError::InvalidSpawn(format!(
                "origin ({}, {}) jitter ({}, {})",
                spawn.origin_x, spawn.origin_z, spawn.jitter_x, spawn.jitter_z
            ))
            .into());
        }

        info!(
            columns = layout.columns,
            rows = layout.rows,
            min_x = layout.min_x,
            max_x = layout.max_x,
            min_z = layout.min_z,
            max_z = layout.max_z,
            max_players = max_players,
            "Creating game world"
        );

        Ok(Self {
            players: RwLock::new(HashMap::new()),
            grid,
            next_id: AtomicI32::new(1),
            spawn,
            max_players,
            start_time: Instant::now(),
        })
    }

    /// Create a world from server configuration
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        Self::new(config.aoi, config.spawn, config.max_players as usize)
    }

    pub fn grid(&self) -> &AoiGrid {
        &self.grid
    }

    /// Allocate the next player id; ids start at 1 and never repeat
    pub fn allocate_id(&self) -> PlayerId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Random spawn position inside the configured jitter band
    pub fn spawn_position(&self) -> Position {
        let mut rng = rand::thread_rng();
        let dx = if self.spawn.jitter_x > 0.0 {
            rng.gen_range(0.0..self.spawn.jitter_x)
        } else {
            0.0
        };
        let dz = if self.spawn.jitter_z > 0.0 {
            rng.gen_range(0.0..self.spawn.jitter_z)
        } else {
            0.0
        };
        Position::planar(self.spawn.origin_x + dx, self.spawn.origin_z + dz)
    }

    /// Register a player and place it in the grid at its position
    ///
    /// Fails when the world is full, the id is taken, or the player was
    /// already placed.
    pub fn add_player(&self, player: Arc<Player>) -> Result<Transition> {
        let id = player.id();
        {
            let mut players = self.players.write();
            if players.len() >= self.max_players {
                warn!(
                    player_id = id,
                    max_players = self.max_players,
                    "World full, rejecting player"
                );
                return Err(GameError::WorldFull.into());
            }
            if players.contains_key(&id) {
                return Err(GameError::InvalidPlayerState(format!(
                    "player {} already registered",
                    id
                ))
                .into());
            }
            players.insert(id, player.clone());
        }

        match player.enter(&self.grid) {
            Some(transition) => {
                debug!(
                    player_id = id,
                    cell = ?transition.to,
                    "Player added to world"
                );
                Ok(transition)
            }
            None => {
                self.players.write().remove(&id);
                Err(GameError::InvalidPlayerState(format!(
                    "player {} is {}",
                    id,
                    player.state()
                ))
                .into())
            }
        }
    }

    /// Remove a player from the registry
    ///
    /// Grid membership is left to the caller (see [`Player::detach`]).
    pub fn remove_player(&self, id: PlayerId) -> Option<Arc<Player>> {
        let removed = self.players.write().remove(&id);
        if removed.is_some() {
            debug!(player_id = id, "Player removed from world");
        }
        removed
    }

    pub fn get_player(&self, id: PlayerId) -> Option<Arc<Player>> {
        self.players.read().get(&id).cloned()
    }

    /// Snapshot of every registered player
    pub fn all_players(&self) -> Vec<Arc<Player>> {
        self.players.read().values().cloned().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.read().len()
    }

    /// Players standing in exactly one cell
    ///
    /// Grid ids with no registered player are skipped.
    pub fn players_in_cell(&self, gid: CellId) -> Vec<Arc<Player>> {
        self.resolve(self.grid.occupants_of(gid))
    }

    /// Players in the neighborhood of a cell
    pub fn players_around(&self, gid: CellId) -> Vec<Arc<Player>> {
        self.resolve(self.grid.occupants_around(gid))
    }

    /// Players in a set of cells
    pub fn players_in_cells(&self, cells: &[CellId]) -> Vec<Arc<Player>> {
        let ids = cells
            .iter()
            .flat_map(|gid| self.grid.occupants_of(*gid))
            .collect();
        self.resolve(ids)
    }

    fn resolve(&self, ids: Vec<PlayerId>) -> Vec<Arc<Player>> {
        let players = self.players.read();
        ids.into_iter()
            .filter_map(|id| {
                let found = players.get(&id).cloned();
                if found.is_none() {
                    debug!(player_id = id, "Grid occupant not in registry, skipping");
                }
                found
            })
            .collect()
    }

    pub fn stats(&self) -> WorldStats {
        WorldStats {
            players: self.player_count(),
            grid_population: self.grid.population(),
            populated_cells: self.grid.populated_cells(),
            cells: self.grid.cell_count(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Log world statistics every `period` until shutdown
    pub async fn run_stats(&self, period: Duration, shutdown_rx: &mut broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.stats();
                    info!(
                        players = stats.players,
                        grid_population = stats.grid_population,
                        populated_cells = stats.populated_cells,
                        cells = stats.cells,
                        uptime_secs = self.uptime_secs(),
                        "World statistics"
                    );
                }
                _ = shutdown_rx.recv() => {
                    debug!("Stats logger stopping");
                    break;
                }
            }
        }
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("players", &self.player_count())
            .field("cells", &self.grid.cell_count())
            .field("max_players", &self.max_players)
            .finish()
    }
}
