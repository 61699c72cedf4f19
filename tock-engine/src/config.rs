//! Defines all configuration structures for the Tock engine.
//!
//! These structs are deserialized with `serde` from an optional TOML file
//! overlaid by `TOCK_*` environment variables. Every field carries a default,
//! so an absent file yields the stock New York wall with a rattle power-on.

use crate::common::City;
use crate::components::sequencer::Sequence;
use crate::error::Result;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// The top-level configuration for the `TockEngine`.
#[derive(Debug, Clone, Deserialize)]
pub struct TockConfig {
    /// The fixed reference clock. Its zone drives the day-offset badges.
    #[serde(default = "default_primary")]
    pub primary: City,

    /// How the wall animates from blank to the live time at startup.
    #[serde(default)]
    pub power_on: PowerOnConfig,

    /// Period of the shared reconciliation loop.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Whether secondary (city) faces also carry seconds cells.
    #[serde(default)]
    pub secondary_seconds: bool,

    /// How long a simulated flip motion lasts in the bundled renderers.
    #[serde(default = "default_motion_ms")]
    pub motion_ms: u64,

    /// Location of the JSON key-value file backing settings and cities.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,

    #[serde(default)]
    pub weather: WeatherConfig,
}

/// Timing of the startup flourish.
#[derive(Debug, Clone, Deserialize)]
pub struct PowerOnConfig {
    #[serde(default = "default_strategy")]
    pub strategy: Sequence,

    /// Delay between consecutive cells of one face.
    #[serde(default = "default_cell_stagger_ms")]
    pub cell_stagger_ms: u64,

    /// Delay between the primary face and the first secondary face.
    #[serde(default = "default_secondary_base_delay_ms")]
    pub secondary_base_delay_ms: u64,

    /// Additional delay per secondary face.
    #[serde(default = "default_clock_stagger_ms")]
    pub clock_stagger_ms: u64,
}

/// Weather badge settings. The endpoints default to Open-Meteo.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Cadence of the weather refresh loop.
    #[serde(default = "default_weather_secs")]
    pub refresh_secs: u64,

    /// Age after which a cached reading is re-fetched.
    #[serde(default = "default_weather_secs")]
    pub ttl_secs: u64,

    #[serde(default = "default_geocoding_url")]
    pub geocoding_url: String,

    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,
}

impl TockConfig {
    /// Loads the configuration from `path` (if it exists) and the environment.
    ///
    /// Environment keys use the `TOCK_` prefix with `__` separating nested
    /// tables, e.g. `TOCK_POWER_ON__STRATEGY=cascade`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("TOCK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn motion(&self) -> Duration {
        Duration::from_millis(self.motion_ms)
    }
}

impl PowerOnConfig {
    pub fn cell_stagger(&self) -> Duration {
        Duration::from_millis(self.cell_stagger_ms)
    }

    /// Start delay of the secondary face at `index`, relative to the primary.
    pub fn secondary_delay(&self, index: usize) -> Duration {
        let index = u32::try_from(index).unwrap_or(u32::MAX);
        Duration::from_millis(self.secondary_base_delay_ms)
            + Duration::from_millis(self.clock_stagger_ms).saturating_mul(index)
    }
}

impl WeatherConfig {
    pub fn refresh(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }

    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.ttl_secs).unwrap_or(i64::MAX))
    }
}

// --- Default value functions for serde ---

fn default_primary() -> City {
    City::new("NEW YORK", "America/New_York")
}

fn default_strategy() -> Sequence {
    Sequence::Rattle
}

fn default_cell_stagger_ms() -> u64 {
    40
}

fn default_secondary_base_delay_ms() -> u64 {
    200
}

fn default_clock_stagger_ms() -> u64 {
    150
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_motion_ms() -> u64 {
    300
}

fn default_store_path() -> PathBuf {
    PathBuf::from("tock-store.json")
}

fn default_true() -> bool {
    true
}

fn default_weather_secs() -> u64 {
    30 * 60
}

fn default_geocoding_url() -> String {
    "https://geocoding-api.open-meteo.com/v1/search".to_string()
}

fn default_forecast_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

impl Default for PowerOnConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            cell_stagger_ms: default_cell_stagger_ms(),
            secondary_base_delay_ms: default_secondary_base_delay_ms(),
            clock_stagger_ms: default_clock_stagger_ms(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            refresh_secs: default_weather_secs(),
            ttl_secs: default_weather_secs(),
            geocoding_url: default_geocoding_url(),
            forecast_url: default_forecast_url(),
        }
    }
}

impl Default for TockConfig {
    fn default() -> Self {
        Self {
            primary: default_primary(),
            power_on: PowerOnConfig::default(),
            tick_interval_ms: default_tick_interval_ms(),
            secondary_seconds: false,
            motion_ms: default_motion_ms(),
            store_path: default_store_path(),
            weather: WeatherConfig::default(),
        }
    }
}
