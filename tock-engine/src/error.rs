//! Error types for the clock engine.
//!
//! Nothing in the engine is fatal: callers see these errors only for input
//! validation and for explicit store or config operations. Weather and
//! persistence failures inside the running loops are logged and swallowed.

/// Errors that can occur while configuring or driving the clock wall.
#[derive(Debug, thiserror::Error)]
pub enum TockError {
    /// The identifier is not a zone in the IANA database.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// A city could not be added (empty name and the like).
    #[error("invalid city: {0}")]
    InvalidCity(String),

    /// No configured city lives at the given position.
    #[error("no city at index {0}")]
    CityIndex(usize),

    /// Geocoding or the current-conditions fetch failed.
    #[error("weather error: {0}")]
    Weather(String),

    /// The key-value store could not persist a value.
    #[error("store error: {0}")]
    Store(String),

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    /// Serialization or deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for TockError {
    fn from(err: reqwest::Error) -> Self {
        Self::Weather(err.to_string())
    }
}

pub type Result<T, E = TockError> = std::result::Result<T, E>;
