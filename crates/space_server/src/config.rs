//! Configuration management for the space server.
//!
//! Loads the TOML configuration file, writing a default one when it is
//! missing, and validates it before the runtime starts.

use serde::{Deserialize, Serialize};
use space_actor_system::{ActorConfig, CellConfig};
use std::path::Path;
use tracing::info;

fn default_npc_count() -> usize {
    16
}

fn default_arena_radius() -> f64 {
    200.0
}

fn default_npc_speed() -> f64 {
    4.0
}

fn default_npc_aoi_radius() -> f64 {
    30.0
}

fn default_spectator_radius() -> f64 {
    60.0
}

fn default_map_path() -> String {
    "maps/arena.nav".to_string()
}

fn default_stats_interval_secs() -> u64 {
    30
}

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Entity actor settings
    #[serde(default)]
    pub runtime: ActorConfig,
    /// Cell and AOI settings
    #[serde(default)]
    pub space: CellConfig,
    /// Demo population
    #[serde(default)]
    pub simulation: SimulationSettings,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// The simulated population hosted by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Number of wandering NPCs
    #[serde(default = "default_npc_count")]
    pub npc_count: usize,
    /// NPCs pick destinations inside this radius around the origin
    #[serde(default = "default_arena_radius")]
    pub arena_radius: f64,
    /// Walking speed in units per second
    #[serde(default = "default_npc_speed")]
    pub npc_speed: f64,
    /// Interest radius of each NPC
    #[serde(default = "default_npc_aoi_radius")]
    pub npc_aoi_radius: f64,
    /// Interest radius of the spectator player parked at the origin
    #[serde(default = "default_spectator_radius")]
    pub spectator_radius: f64,
    /// Navigation data handed to the navigator
    #[serde(default = "default_map_path")]
    pub map_path: String,
    /// Period of the statistics log line
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            npc_count: default_npc_count(),
            arena_radius: default_arena_radius(),
            npc_speed: default_npc_speed(),
            npc_aoi_radius: default_npc_aoi_radius(),
            spectator_radius: default_spectator_radius(),
            map_path: default_map_path(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    /// Whether to output logs in JSON format
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, writes the default configuration to `path`
    /// and returns it.
    pub async fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Checks the configuration for values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), String> {
        self.runtime.validate().map_err(|e| e.to_string())?;
        self.space.validate().map_err(|e| e.to_string())?;

        let sim = &self.simulation;
        if sim.arena_radius.is_nan() || sim.arena_radius <= 0.0 {
            return Err(format!("Arena radius must be positive, got {}", sim.arena_radius));
        }
        if sim.npc_speed.is_nan() || sim.npc_speed < 0.0 {
            return Err(format!("NPC speed must be non-negative, got {}", sim.npc_speed));
        }
        let negative = |r: f64| r.is_nan() || r < 0.0;
        if negative(sim.npc_aoi_radius) || negative(sim.spectator_radius) {
            return Err("AOI radii must be non-negative".to_string());
        }
        if sim.map_path.is_empty() {
            return Err("Map path cannot be empty".to_string());
        }
        if sim.stats_interval_secs == 0 {
            return Err("Stats interval must be greater than zero".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}
