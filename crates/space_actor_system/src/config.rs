//! Runtime configuration for actors and cells.
//!
//! Both structures deserialize from the `[runtime]` / `[space]` tables of the
//! server's TOML file; every field has a default so partial tables are fine.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_tick_interval_ms() -> u64 {
    50 // 20 ticks per second
}

fn default_close_grace_ms() -> u64 {
    5_000
}

fn default_aoi_tick_interval_ms() -> u64 {
    100
}

fn default_aoi_radius() -> f64 {
    50.0
}

/// Settings shared by every entity actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorConfig {
    /// Period of the per-entity tick in milliseconds
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Delay between a close request and loop termination
    #[serde(default = "default_close_grace_ms")]
    pub close_grace_ms: u64,
    /// Forward unit-of-work failures to the gateway error channel
    #[serde(default)]
    pub debug: bool,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            close_grace_ms: default_close_grace_ms(),
            debug: false,
        }
    }
}

impl ActorConfig {
    /// Tick period as a [`Duration`].
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Grace period between a close request and loop termination.
    pub fn close_grace(&self) -> Duration {
        Duration::from_millis(self.close_grace_ms)
    }

    /// Rejects settings an actor loop cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] when the tick interval is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for cells and their AOI computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellConfig {
    /// How often each cell recomputes interest sets, in milliseconds
    #[serde(default = "default_aoi_tick_interval_ms")]
    pub aoi_tick_interval_ms: u64,
    /// AOI radius of entities created with `EntityRegistry::new_entity`
    #[serde(default = "default_aoi_radius")]
    pub default_aoi_radius: f64,
}

impl Default for CellConfig {
    fn default() -> Self {
        Self {
            aoi_tick_interval_ms: default_aoi_tick_interval_ms(),
            default_aoi_radius: default_aoi_radius(),
        }
    }
}

impl CellConfig {
    /// AOI tick period as a [`Duration`].
    pub fn aoi_tick_interval(&self) -> Duration {
        Duration::from_millis(self.aoi_tick_interval_ms)
    }

    /// Rejects a zero AOI tick and negative or NaN default radii.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.aoi_tick_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "aoi_tick_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.default_aoi_radius.is_nan() || self.default_aoi_radius < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_aoi_radius must be non-negative, got {}",
                self.default_aoi_radius
            )));
        }
        Ok(())
    }
}
