use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tock::config::TockConfig;
use tock::engine::TockEngine;
use tock::events::{next_event, ClockEvent};
use tock::render::TerminalRenderer;
use tock::store::JsonFileStore;
use tock::weather::{OpenMeteo, WeatherService};
use tock::{ENGINE_NAME, VERSION};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize structured logging. The wall owns stdout, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    // 2. Load configuration from the given file, `TOCK_CONFIG`, or `tock.toml`.
    let path = env::args()
        .nth(1)
        .or_else(|| env::var("TOCK_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("tock.toml"));
    let config = TockConfig::load(Some(path.as_path()))
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    info!("{} v{} starting with {}", ENGINE_NAME, VERSION, path.display());

    // 3. Wire the collaborators and create the engine.
    let store = Arc::new(JsonFileStore::open(&config.store_path));
    let weather = OpenMeteo::new(&config.weather);
    let renderer = Arc::new(TerminalRenderer::new(config.motion()));
    let mut engine = TockEngine::new(config, store, weather, renderer)
        .context("failed to create the clock engine")?;

    // 4. Log the noteworthy events.
    spawn_event_logger(&engine);

    // 5. Run until Ctrl+C.
    engine.start().await?;
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;
    info!("Ctrl+C received, shutting down");
    engine.shutdown().await;

    Ok(())
}

fn spawn_event_logger<W: WeatherService>(engine: &TockEngine<W>) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            match event {
                ClockEvent::Tick { .. } => {}
                ClockEvent::WeatherFailed { city, reason } => {
                    warn!("[WEATHER] {city}: {reason}")
                }
                other => info!("[CLOCK] => {:?}", other),
            }
        }
    });
}
