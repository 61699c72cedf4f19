//! # Tock
//!
//! A split-flap world clock engine for Rust.
//!
//! Tock drives a wall of split-flap clock faces: one primary face for the
//! home zone plus a face per configured city. It decides which digits change
//! each second, animates only those cells, and keeps weather and day-offset
//! badges current. Drawing is delegated to a `Renderer`.
//!
//! ## Core Concepts
//!
//! - **Flap cells**: Each digit is a cell that flips from its old character to
//!   its new one. A cell mid-flip ignores further requests until it lands.
//! - **Reconciliation**: One shared tick samples every face against the same
//!   instant, diffs against the digits it last showed, and flips only the
//!   positions that changed.
//! - **Power-on**: At startup faces cascade or rattle into place, secondaries
//!   staggered after the primary, before the tick loop takes over.
//! - **Event-Driven**: The engine broadcasts `ClockEvent`s so shells and
//!   daemons can follow the wall without touching its state.
//! - **Configuration-Driven**: Primary city, timings and weather settings come
//!   from a `TockConfig`, usually loaded from `tock.toml` and `TOCK_` variables.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tock::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = TockConfig::default();
//!     let weather = OpenMeteo::new(&config.weather);
//!     let store = Arc::new(JsonFileStore::open(&config.store_path));
//!     let renderer = Arc::new(TerminalRenderer::new(config.motion()));
//!
//!     let mut engine = TockEngine::new(config, store, weather, renderer)?;
//!     let mut events = engine.subscribe_events();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Received Clock Event: {:?}", event);
//!         }
//!     });
//!
//!     engine.start().await?;
//!     tokio::signal::ctrl_c().await?;
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

pub const ENGINE_NAME: &str = "Tock Engine";
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod common;
pub mod components;
pub mod config;
pub mod controller;
pub mod diff;
pub mod engine;
pub mod error;
pub mod events;
pub mod render;
pub mod store;
pub mod time;
pub mod weather;

/// A prelude module for easy importing of the most common Tock types.
pub mod prelude {
    pub use crate::common::{City, FaceId, BLANK, PLACEHOLDER};
    pub use crate::components::sequencer::Sequence;
    pub use crate::config::TockConfig;
    pub use crate::engine::TockEngine;
    pub use crate::error::{Result, TockError};
    pub use crate::events::ClockEvent;
    pub use crate::render::{HeadlessRenderer, MotionMode, Renderer, TerminalRenderer};
    pub use crate::store::{JsonFileStore, KeyValueStore, MemoryStore};
    pub use crate::time::{ManualTimeSource, SystemTimeSource, TimeSource};
    pub use crate::weather::{OpenMeteo, WeatherService};
}
