//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name shown in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// Address to bind the game listener on
    #[serde(default = "default_host")]
    pub host: String,

    /// Game port (TCP)
    #[serde(default = "default_game_port")]
    pub game_port: u16,

    /// Maximum number of connected players
    #[serde(default = "default_max_players")]
    pub max_players: u32,

    /// Largest accepted frame payload in bytes
    #[serde(default = "default_max_packet_size")]
    pub max_packet_size: usize,

    /// Capacity of each connection's outbound queue (frames)
    #[serde(default = "default_outbound_queue_size")]
    pub outbound_queue_size: usize,

    /// Interval between world statistics log lines (0 to disable)
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,

    /// Area-of-interest grid layout
    #[serde(default)]
    pub aoi: AoiConfig,

    /// Spawn point configuration
    #[serde(default)]
    pub spawn: SpawnConfig,

    /// Outbound send throttle
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,

    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub log_json: bool,
}

/// Area-of-interest grid configuration
///
/// The world plane `[min_x, max_x] x [min_z, max_z]` is split into
/// `columns` cells along X and `rows` cells along Z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AoiConfig {
    #[serde(default = "default_aoi_min_x")]
    pub min_x: f32,
    #[serde(default = "default_aoi_max_x")]
    pub max_x: f32,
    #[serde(default = "default_aoi_columns")]
    pub columns: usize,
    #[serde(default = "default_aoi_min_z")]
    pub min_z: f32,
    #[serde(default = "default_aoi_max_z")]
    pub max_z: f32,
    #[serde(default = "default_aoi_rows")]
    pub rows: usize,
}

/// Spawn point configuration
///
/// New players appear at `origin + [0, jitter)` on each axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpawnConfig {
    #[serde(default = "default_spawn_origin_x")]
    pub origin_x: f32,
    #[serde(default = "default_spawn_origin_z")]
    pub origin_z: f32,
    #[serde(default = "default_spawn_jitter_x")]
    pub jitter_x: f32,
    #[serde(default = "default_spawn_jitter_z")]
    pub jitter_z: f32,
}

/// Per-connection outbound token bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Frames that may be written back-to-back before pacing kicks in
    #[serde(default = "default_throttle_burst")]
    pub burst: u32,
    /// Sustained frames per second (0 disables throttling)
    #[serde(default = "default_throttle_refill")]
    pub refill_per_sec: u32,
}

// Default value functions
fn default_server_name() -> String {
    "Gridscape".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_game_port() -> u16 {
    8999
}

fn default_max_players() -> u32 {
    2000
}

fn default_max_packet_size() -> usize {
    4096
}

fn default_outbound_queue_size() -> usize {
    1024
}

fn default_stats_interval() -> u64 {
    60
}

fn default_aoi_min_x() -> f32 {
    85.0
}

fn default_aoi_max_x() -> f32 {
    410.0
}

fn default_aoi_columns() -> usize {
    10
}

fn default_aoi_min_z() -> f32 {
    75.0
}

fn default_aoi_max_z() -> f32 {
    400.0
}

fn default_aoi_rows() -> usize {
    20
}

fn default_spawn_origin_x() -> f32 {
    160.0
}

fn default_spawn_origin_z() -> f32 {
    134.0
}

fn default_spawn_jitter_x() -> f32 {
    10.0
}

fn default_spawn_jitter_z() -> f32 {
    17.0
}

fn default_throttle_burst() -> u32 {
    64
}

fn default_throttle_refill() -> u32 {
    200
}

impl Default for AoiConfig {
    fn default() -> Self {
        Self {
            min_x: default_aoi_min_x(),
            max_x: default_aoi_max_x(),
            columns: default_aoi_columns(),
            min_z: default_aoi_min_z(),
            max_z: default_aoi_max_z(),
            rows: default_aoi_rows(),
        }
    }
}

impl Default for SpawnConfig {
    fn default() -> Self {
        Self {
            origin_x: default_spawn_origin_x(),
            origin_z: default_spawn_origin_z(),
            jitter_x: default_spawn_jitter_x(),
            jitter_z: default_spawn_jitter_z(),
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            burst: default_throttle_burst(),
            refill_per_sec: default_throttle_refill(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            host: default_host(),
            game_port: default_game_port(),
            max_players: default_max_players(),
            max_packet_size: default_max_packet_size(),
            outbound_queue_size: default_outbound_queue_size(),
            stats_interval_secs: default_stats_interval(),
            aoi: AoiConfig::default(),
            spawn: SpawnConfig::default(),
            throttle: ThrottleConfig::default(),
            debug: false,
            log_json: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        let config_path = env::var("GRIDSCAPE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            Self::from_toml(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            Self::default()
        };

        config.config_path = config_path;

        config.apply_env_overrides();

        config.validate()?;

        Ok(config)
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("GRIDSCAPE_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("GRIDSCAPE_HOST") {
            self.host = val;
        }
        if let Ok(val) = env::var("GRIDSCAPE_GAME_PORT") {
            if let Ok(port) = val.parse() {
                self.game_port = port;
            }
        }
        if let Ok(val) = env::var("GRIDSCAPE_MAX_PLAYERS") {
            if let Ok(max) = val.parse() {
                self.max_players = max;
            }
        }
        if let Ok(val) = env::var("GRIDSCAPE_OUTBOUND_QUEUE_SIZE") {
            if let Ok(size) = val.parse() {
                self.outbound_queue_size = size;
            }
        }
        if let Ok(val) = env::var("GRIDSCAPE_THROTTLE_REFILL") {
            if let Ok(rate) = val.parse() {
                self.throttle.refill_per_sec = rate;
            }
        }
        if let Ok(val) = env::var("GRIDSCAPE_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("GRIDSCAPE_LOG_JSON") {
            self.log_json = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_players == 0 || self.max_players > 100_000 {
            anyhow::bail!("Max players must be between 1 and 100000");
        }

        if self.max_packet_size == 0 {
            anyhow::bail!("Max packet size must be positive");
        }

        if self.outbound_queue_size == 0 {
            anyhow::bail!("Outbound queue size must be positive");
        }

        if self.aoi.columns == 0 || self.aoi.rows == 0 {
            anyhow::bail!("AOI grid must have at least one row and one column");
        }

        let bounds = [
            self.aoi.min_x,
            self.aoi.max_x,
            self.aoi.min_z,
            self.aoi.max_z,
        ];
        if bounds.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("AOI bounds must be finite");
        }

        if !(self.aoi.max_x > self.aoi.min_x) || !(self.aoi.max_z > self.aoi.min_z) {
            anyhow::bail!("AOI bounds must satisfy max > min on both axes");
        }

        let spawn = [
            self.spawn.origin_x,
            self.spawn.origin_z,
            self.spawn.jitter_x,
            self.spawn.jitter_z,
        ];
        if spawn.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("Spawn origin and jitter must be finite");
        }

        if self.spawn.jitter_x < 0.0 || self.spawn.jitter_z < 0.0 {
            anyhow::bail!("Spawn jitter must not be negative");
        }

        if self.throttle.refill_per_sec > 0 && self.throttle.burst == 0 {
            anyhow::bail!("Throttle burst must be positive when throttling is enabled");
        }

        Ok(())
    }

    /// Get the socket address string for the game listener
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.game_port)
    }
}
