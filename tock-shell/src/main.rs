use anyhow::Result;
use colored::Colorize;
use rustyline::highlight::Highlighter;
use rustyline::Editor;
use rustyline_derive::{Completer, Helper, Hinter, Validator};
use std::borrow::Cow;
use std::env;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tock::common::COMMON_TIMEZONES;
use tock::config::TockConfig;
use tock::engine::TockEngine;
use tock::events::{next_event, ClockEvent};
use tock::render::{HeadlessRenderer, MotionMode};
use tock::store::JsonFileStore;
use tock::weather::{OpenMeteo, WeatherService};
use tock::{ENGINE_NAME, VERSION as LIB_VERSION};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SHELL_VERSION: &str = env!("CARGO_PKG_VERSION");

const LOGO_TEXT: &str = r"
  _____  ___    ___  _  __
 |_   _|/ _ \  / __|| |/ /
   | | | (_) || (__ | ' <
   |_|  \___/  \___||_|\_\
";

/// A custom helper struct for rustyline that enables syntax highlighting.
#[derive(Completer, Helper, Hinter, Validator)]
struct CommandHighlighter;

impl Highlighter for CommandHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        if let Some((command, rest)) = line.split_once(' ') {
            let colored_command = command.yellow().bold();
            let colored_rest = rest.yellow();
            Cow::Owned(format!("{} {}", colored_command, colored_rest))
        } else {
            Cow::Owned(line.yellow().bold().to_string())
        }
    }
    fn highlight_char(&self, _line: &str, _pos: usize, _forced: bool) -> bool {
        true
    }
}

fn print_banner() {
    if env::var("QUIET_MODE").is_ok() {
        return;
    }
    println!("{}", LOGO_TEXT.cyan());

    let version_string = format!(
        "          Shell   v{:<8} Library   v{:<8}",
        SHELL_VERSION, LIB_VERSION
    );
    let rule = "------------------------------------------------------------".dimmed();
    let license_blurb = "
    This software is provided 'as is', without warranty of any kind.
    Distributed under the MIT OR Apache-2.0 license. Use at your own risk.
    ";

    println!("{}", rule);
    println!("{}", version_string);
    println!("{}", license_blurb.dimmed());
    println!("{}", rule);
}

fn print_help() {
    println!("Available commands:");
    println!("  show                  - Prints the wall as it looks right now.");
    println!("  list                  - Lists the configured cities with their indexes.");
    println!("  add <TZ> <NAME...>    - Adds a city, e.g. 'add Europe/Paris paris'.");
    println!("  remove <N>            - Removes the city at index N.");
    println!("  seconds on|off        - Shows or hides the seconds cells.");
    println!("  units c|f             - Switches weather badges between Celsius and Fahrenheit.");
    println!("  zones                 - Lists some common timezone identifiers.");
    println!("  watch on|off          - Starts or stops printing clock events.");
    println!("  exit                  - Quits the shell.");
}

/// Prints engine events while watching is on.
fn spawn_event_listener<W: WeatherService>(engine: &TockEngine<W>, is_watching: Arc<AtomicBool>) {
    let mut events = engine.subscribe_events();
    tokio::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if !is_watching.load(Ordering::Relaxed) {
                continue;
            }
            match event {
                ClockEvent::Tick { now } => {
                    println!("<-- [TICK] {}", now.format("%H:%M:%S UTC"));
                }
                ClockEvent::WeatherFailed { city, reason } => {
                    println!("<-- [WEATHER] {}: {}", city, reason.red());
                }
                other => println!("<-- [CLOCK EVENT] {:?}", other),
            }
        }
    });
}

fn parse_switch(arg: Option<&&str>, on: &str, off: &str) -> Option<bool> {
    match arg {
        Some(value) if value.eq_ignore_ascii_case(on) => Some(true),
        Some(value) if value.eq_ignore_ascii_case(off) => Some(false),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    print_banner();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config_path = env::var("TOCK_CONFIG").unwrap_or_else(|_| "tock.toml".to_string());
    let config = TockConfig::load(Some(Path::new(&config_path)))?;
    let store = Arc::new(JsonFileStore::open(&config.store_path));
    let weather = OpenMeteo::new(&config.weather);
    let renderer = Arc::new(
        HeadlessRenderer::new(MotionMode::Timed(config.motion())).without_motion_log(),
    );
    let mut engine = TockEngine::new(config, store, weather, renderer.clone())?;

    let is_watching = Arc::new(AtomicBool::new(false));
    spawn_event_listener(&engine, is_watching.clone());

    info!("Starting {}...", ENGINE_NAME);
    engine.start().await?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut rl = Editor::new()?;
    rl.set_helper(Some(CommandHighlighter));

    println!("{} is running. Type 'help' for commands or 'exit' to quit.", ENGINE_NAME.cyan());

    loop {
        let prompt = format!("{}", ">> ".cyan().bold());
        let line = match rl.readline(&prompt) {
            Ok(line) => line,
            Err(_) => {
                println!("Exiting tockshell...");
                break;
            }
        };
        rl.add_history_entry(line.as_str())?;
        let args = line.split_whitespace().collect::<Vec<_>>();
        let Some(command) = args.first() else {
            continue;
        };

        match *command {
            "show" => println!("{}", renderer.render_plain()),
            "list" => {
                println!("Primary: {} ({})", engine.primary().name, engine.primary().tz);
                for (index, city) in engine.cities().iter().enumerate() {
                    println!("  #{}: {} ({})", index, city.name, city.tz);
                }
            }
            "add" => match (args.get(1), args.get(2..)) {
                (Some(tz), Some(name)) if !name.is_empty() => {
                    match engine.add_city(&name.join(" "), tz).await {
                        Ok(()) => println!("--> Added {}.", name.join(" ").to_uppercase()),
                        Err(e) => println!("Error: {}", e),
                    }
                }
                _ => println!("Usage: add <TZ> <NAME...>"),
            },
            "remove" => match args.get(1).map(|n| n.parse::<usize>()) {
                Some(Ok(index)) => match engine.remove_city(index).await {
                    Ok(city) => println!("--> Removed {}.", city.name),
                    Err(e) => println!("Error: {}. Use 'list' to see indexes.", e),
                },
                Some(Err(_)) => println!("Error: Index must be a number (e.g., '0', '1')."),
                None => println!("Usage: remove <N>"),
            },
            "seconds" => match parse_switch(args.get(1), "on", "off") {
                Some(show) => {
                    engine.set_show_seconds(show).await;
                    println!("--> Seconds {}.", if show { "shown" } else { "hidden" });
                }
                None => println!("Usage: seconds on|off"),
            },
            "units" => match parse_switch(args.get(1), "c", "f") {
                Some(celsius) => {
                    engine.set_use_celsius(celsius).await;
                    println!("--> Temperatures in {}.", if celsius { "Celsius" } else { "Fahrenheit" });
                }
                None => println!("Usage: units c|f"),
            },
            "zones" => {
                for zone in COMMON_TIMEZONES {
                    println!("  {}", zone);
                }
            }
            "watch" => match parse_switch(args.get(1), "on", "off") {
                Some(watch) => {
                    is_watching.store(watch, Ordering::Relaxed);
                    println!("--> {} watching clock events.", if watch { "Started" } else { "Stopped" });
                }
                None => println!("Usage: watch on|off"),
            },
            "help" => print_help(),
            "exit" => break,
            _ => println!("Unknown command: '{}'. Type 'help'.", line.trim()),
        }
    }

    engine.shutdown().await;
    Ok(())
}
