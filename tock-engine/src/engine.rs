//! The core engine that orchestrates the whole clock wall.
//!
//! `TockEngine` owns one primary face and a face per configured city. It
//! runs the power-on flourish, then a single shared tick loop that
//! reconciles every face against the same instant, plus a slower weather
//! loop. Both loops are owned handles: every rebuild aborts them before
//! spawning their replacements.

use crate::common::{City, FaceId, FULL_DIGITS, SHORT_DIGITS};
use crate::components::sequencer::Sequence;
use crate::config::TockConfig;
use crate::controller::{ClockController, ClockFace};
use crate::error::{Result, TockError};
use crate::events::ClockEvent;
use crate::render::Renderer;
use crate::store::{KeyValueStore, SettingsStore};
use crate::time::{day_offset_at, parse_timezone, TimeSampler, TimeSource};
use crate::weather::{TempUnit, WeatherBadge, WeatherCache, WeatherCacheEntry, WeatherService};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use slotmap::SlotMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval, interval_at, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

/// All faces on the wall, primary first.
struct Board {
    faces: SlotMap<FaceId, ClockController>,
    primary: Option<FaceId>,
    secondaries: Vec<FaceId>,
    unit: TempUnit,
    renderer: Arc<dyn Renderer>,
}

impl Board {
    fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            faces: SlotMap::with_key(),
            primary: None,
            secondaries: Vec::new(),
            unit: TempUnit::Fahrenheit,
            renderer,
        }
    }

    fn len(&self) -> usize {
        self.faces.len()
    }

    fn ordered(&self) -> Vec<FaceId> {
        self.primary
            .iter()
            .chain(self.secondaries.iter())
            .copied()
            .collect()
    }

    fn primary_tz(&self) -> Option<Tz> {
        self.primary
            .and_then(|id| self.faces.get(id))
            .map(|controller| controller.face().tz())
    }

    /// Detaches and forgets every face.
    fn clear(&mut self) {
        for (_, controller) in self.faces.drain() {
            controller.face().detach();
        }
        self.primary = None;
        self.secondaries.clear();
    }

    /// Replaces every face. Cities whose zone no longer parses are skipped.
    fn build(
        &mut self,
        primary: &City,
        primary_tz: Tz,
        cities: &[City],
        primary_cells: usize,
        secondary_cells: usize,
    ) {
        self.clear();
        let renderer = self.renderer.clone();
        let id = self.faces.insert_with_key(|id| {
            ClockController::new(ClockFace::build(
                id,
                primary.clone(),
                primary_tz,
                primary_cells,
                true,
                renderer.clone(),
            ))
        });
        self.primary = Some(id);

        for city in cities {
            let tz = match parse_timezone(&city.tz) {
                Ok(tz) => tz,
                Err(err) => {
                    warn!(city = %city.name, "skipping city: {err}");
                    continue;
                }
            };
            let id = self.faces.insert_with_key(|id| {
                ClockController::new(ClockFace::build(
                    id,
                    city.clone(),
                    tz,
                    secondary_cells,
                    false,
                    renderer.clone(),
                ))
            });
            self.secondaries.push(id);
        }
    }

    /// Day-offset badge for secondaries, period tint for everyone.
    fn refresh_badges(&mut self, id: FaceId, primary_tz: Option<Tz>, now: DateTime<Utc>) {
        let is_secondary = self.primary != Some(id);
        let Some(controller) = self.faces.get_mut(id) else {
            return;
        };
        let face = controller.face_mut();
        if is_secondary {
            if let Some(reference) = primary_tz {
                face.set_day_badge(day_offset_at(face.tz(), reference, now));
            }
        }
        face.apply_tint(now);
    }

    /// Reconciles every face against `now`. Faces with no previous digits
    /// snap instead of flipping.
    async fn tick(&mut self, now: DateTime<Utc>) {
        let primary_tz = self.primary_tz();
        for id in self.ordered() {
            if let Some(controller) = self.faces.get_mut(id) {
                controller.tick(now).await;
            }
            self.refresh_badges(id, primary_tz, now);
        }
        self.renderer.present();
    }

    fn power_on(
        &mut self,
        id: FaceId,
        sequence: Sequence,
        stagger: Duration,
        now: DateTime<Utc>,
    ) -> Option<impl Future<Output = ()> + Send + 'static> {
        let primary_tz = self.primary_tz();
        self.refresh_badges(id, primary_tz, now);
        let animation = self
            .faces
            .get_mut(id)
            .map(|controller| controller.power_on(sequence, stagger, now));
        self.renderer.present();
        animation
    }

    fn apply_weather(&mut self, city: &str, entry: &WeatherCacheEntry) {
        let badge = WeatherBadge::from_entry(entry, self.unit);
        for (_, controller) in self.faces.iter_mut() {
            if controller.face().city().name == city {
                controller.face_mut().set_weather(badge);
            }
        }
    }

    /// Re-renders every badge from whatever the cache holds, stale or not.
    fn reapply_weather(&mut self, cache: &WeatherCache) {
        for (_, controller) in self.faces.iter_mut() {
            let face = controller.face_mut();
            if let Some(entry) = cache.entry(&face.city().name) {
                face.set_weather(WeatherBadge::from_entry(entry, self.unit));
            }
        }
    }
}

/// What the spawned loops share with the engine.
#[derive(Clone)]
struct LoopContext {
    config: Arc<TockConfig>,
    board: Arc<Mutex<Board>>,
    sampler: TimeSampler,
    events: broadcast::Sender<ClockEvent>,
}

/// The main Tock engine.
///
/// Holds the settings, the wall of faces and the two loop handles. Settings
/// changes go through `&mut self`, so a rebuild can never race another.
pub struct TockEngine<W: WeatherService> {
    config: Arc<TockConfig>,
    primary_tz: Tz,
    settings: SettingsStore,
    sampler: TimeSampler,
    weather: Arc<W>,
    cache: Arc<Mutex<WeatherCache>>,
    board: Arc<Mutex<Board>>,
    cities: Vec<City>,
    show_seconds: bool,
    use_celsius: bool,
    tick_task: Option<JoinHandle<()>>,
    weather_task: Option<JoinHandle<()>>,
    event_sender: broadcast::Sender<ClockEvent>,
}

// Core implementation block for internal logic.
impl<W: WeatherService> TockEngine<W> {
    /// Creates an engine. Fails only if the primary zone is invalid.
    pub fn new(
        config: TockConfig,
        store: Arc<dyn KeyValueStore>,
        weather: W,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        let primary_tz = parse_timezone(&config.primary.tz)?;
        let settings = SettingsStore::new(store);
        let (event_sender, _) = broadcast::channel(256);
        let cache = WeatherCache::new(config.weather.ttl());

        Ok(Self {
            primary_tz,
            show_seconds: settings.show_seconds(),
            use_celsius: settings.use_celsius(),
            cities: settings.cities(),
            settings,
            sampler: TimeSampler::system(),
            weather: Arc::new(weather),
            cache: Arc::new(Mutex::new(cache)),
            board: Arc::new(Mutex::new(Board::new(renderer))),
            tick_task: None,
            weather_task: None,
            event_sender,
            config: Arc::new(config),
        })
    }

    /// Replaces the clock the engine samples. Call before `start`.
    pub fn with_time_source(mut self, source: Arc<dyn TimeSource>) -> Self {
        self.sampler = TimeSampler::new(source);
        self
    }

    fn loop_context(&self) -> LoopContext {
        LoopContext {
            config: self.config.clone(),
            board: self.board.clone(),
            sampler: self.sampler.clone(),
            events: self.event_sender.clone(),
        }
    }

    fn emit(&self, event: ClockEvent) {
        self.event_sender.send(event).ok();
    }

    fn persist(&self, what: &str, result: Result<()>) {
        if let Err(err) = result {
            warn!("failed to persist {what}: {err}");
        }
    }

    fn cell_counts(&self) -> (usize, usize) {
        let cells = if self.show_seconds { FULL_DIGITS } else { SHORT_DIGITS };
        let secondary = if self.config.secondary_seconds { cells } else { SHORT_DIGITS };
        (cells, secondary)
    }

    /// Aborts the tick and weather loops. Must precede spawning new ones.
    fn stop_loops(&mut self) {
        if let Some(task) = self.tick_task.take() {
            task.abort();
        }
        if let Some(task) = self.weather_task.take() {
            task.abort();
        }
    }

    /// Builds the wall from the current settings and returns its face count.
    async fn build_board(&self) -> usize {
        let (primary_cells, secondary_cells) = self.cell_counts();
        let mut board = self.board.lock().await;
        board.unit = TempUnit::from_celsius_flag(self.use_celsius);
        board.build(
            &self.config.primary,
            self.primary_tz,
            &self.cities,
            primary_cells,
            secondary_cells,
        );
        board.reapply_weather(&*self.cache.lock().await);
        board.len()
    }

    fn start_weather_loop(&mut self) {
        if !self.config.weather.enabled {
            return;
        }
        let mut seen = HashSet::new();
        let names: Vec<String> = std::iter::once(&self.config.primary)
            .chain(self.cities.iter())
            .map(|city| city.name.clone())
            .filter(|name| seen.insert(name.clone()))
            .collect();

        self.weather_task = Some(tokio::spawn(run_weather_loop(
            self.loop_context(),
            self.weather.clone(),
            self.cache.clone(),
            names,
        )));
    }

    /// Rebuilds every face and snaps it to the current time, no power-on.
    async fn rebuild(&mut self) {
        self.stop_loops();
        let faces = self.build_board().await;
        let now = self.sampler.now();
        self.board.lock().await.tick(now).await;

        self.tick_task = Some(tokio::spawn(run_tick_loop(self.loop_context())));
        self.start_weather_loop();
        info!(faces, show_seconds = self.show_seconds, "clock wall rebuilt");
        self.emit(ClockEvent::Rebuilt { faces });
    }
}

// Public API implementation block.
impl<W: WeatherService> TockEngine<W> {
    /// Loads settings, builds the wall and plays the power-on flourish.
    ///
    /// Returns once everything is scheduled. The shared tick loop begins
    /// after every face has landed; `ClockEvent::PowerOnCompleted` marks it.
    pub async fn start(&mut self) -> Result<()> {
        self.stop_loops();
        self.show_seconds = self.settings.show_seconds();
        self.use_celsius = self.settings.use_celsius();
        self.cities = self.settings.cities();

        let faces = self.build_board().await;
        let (primary, secondaries) = {
            let board = self.board.lock().await;
            (board.primary, board.secondaries.clone())
        };
        info!(
            faces,
            strategy = ?self.config.power_on.strategy,
            show_seconds = self.show_seconds,
            "clock wall powering on"
        );
        self.emit(ClockEvent::PowerOnStarted { faces });

        self.tick_task = Some(tokio::spawn(power_on_then_tick(
            self.loop_context(),
            primary,
            secondaries,
        )));
        self.start_weather_loop();
        Ok(())
    }

    /// Stops both loops and detaches every face from the renderer.
    pub async fn shutdown(&mut self) {
        self.stop_loops();
        self.board.lock().await.clear();
        info!("clock wall shut down");
    }

    pub async fn set_show_seconds(&mut self, show: bool) {
        self.show_seconds = show;
        self.persist("show-seconds flag", self.settings.set_show_seconds(show));
        self.emit(ClockEvent::SettingsChanged {
            show_seconds: self.show_seconds,
            use_celsius: self.use_celsius,
        });
        self.rebuild().await;
    }

    /// Switches the temperature unit and redraws every weather badge from
    /// the cache. Faces are not rebuilt.
    pub async fn set_use_celsius(&mut self, celsius: bool) {
        self.use_celsius = celsius;
        self.persist("temperature unit", self.settings.set_use_celsius(celsius));
        {
            let mut board = self.board.lock().await;
            board.unit = TempUnit::from_celsius_flag(celsius);
            board.reapply_weather(&*self.cache.lock().await);
            board.renderer.present();
        }
        info!(celsius, "temperature unit changed");
        self.emit(ClockEvent::SettingsChanged {
            show_seconds: self.show_seconds,
            use_celsius: self.use_celsius,
        });
    }

    /// Adds a city after validating its zone, then rebuilds the wall.
    ///
    /// An invalid zone leaves the list and the store untouched.
    pub async fn add_city(&mut self, name: &str, tz: &str) -> Result<()> {
        let (name, tz) = (name.trim(), tz.trim());
        if name.is_empty() {
            return Err(TockError::InvalidCity("city name is empty".to_string()));
        }
        if let Err(err) = parse_timezone(tz) {
            info!(%tz, "rejected city with invalid timezone");
            self.emit(ClockEvent::InvalidTimezone { tz: tz.to_string() });
            return Err(err);
        }

        let city = City::new(name.to_uppercase(), tz);
        info!(city = %city.name, tz = %city.tz, "city added");
        self.cities.push(city.clone());
        self.persist("city list", self.settings.save_cities(&self.cities));
        self.emit(ClockEvent::CityAdded {
            name: city.name,
            tz: city.tz,
        });
        self.rebuild().await;
        Ok(())
    }

    /// Removes the city at `index`, then rebuilds the wall.
    pub async fn remove_city(&mut self, index: usize) -> Result<City> {
        if index >= self.cities.len() {
            return Err(TockError::CityIndex(index));
        }
        let city = self.cities.remove(index);
        info!(city = %city.name, "city removed");
        self.persist("city list", self.settings.save_cities(&self.cities));
        self.emit(ClockEvent::CityRemoved {
            name: city.name.clone(),
        });
        self.rebuild().await;
        Ok(city)
    }

    pub fn cities(&self) -> &[City] {
        &self.cities
    }

    pub fn primary(&self) -> &City {
        &self.config.primary
    }

    pub fn show_seconds(&self) -> bool {
        self.show_seconds
    }

    pub fn use_celsius(&self) -> bool {
        self.use_celsius
    }

    pub fn config(&self) -> &TockConfig {
        &self.config
    }

    /// Whether the power-on or tick loop task is alive.
    pub fn is_running(&self) -> bool {
        self.tick_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Face identities in display order, primary first.
    pub async fn face_ids(&self) -> Vec<FaceId> {
        self.board.lock().await.ordered()
    }

    /// The cached weather entry for a city name, if any.
    pub async fn weather_entry(&self, city: &str) -> Option<WeatherCacheEntry> {
        self.cache.lock().await.entry(city).copied()
    }

    /// Subscribes to the `ClockEvent` stream.
    pub fn subscribe_events(&self) -> broadcast::Receiver<ClockEvent> {
        self.event_sender.subscribe()
    }
}

impl<W: WeatherService> Drop for TockEngine<W> {
    fn drop(&mut self) {
        self.stop_loops();
    }
}

/// Powers on the primary at once and each secondary after its stagger,
/// waits for all of them to land, then runs the shared tick loop.
async fn power_on_then_tick(ctx: LoopContext, primary: Option<FaceId>, secondaries: Vec<FaceId>) {
    let power_on = ctx.config.power_on.clone();
    let mut landing = JoinSet::new();

    if let Some(id) = primary {
        let now = ctx.sampler.now();
        let animation =
            ctx.board
                .lock()
                .await
                .power_on(id, power_on.strategy, power_on.cell_stagger(), now);
        if let Some(animation) = animation {
            landing.spawn(animation);
        }
    }

    for (index, id) in secondaries.into_iter().enumerate() {
        let ctx = ctx.clone();
        let delay = power_on.secondary_delay(index);
        let (strategy, stagger) = (power_on.strategy, power_on.cell_stagger());
        landing.spawn(async move {
            sleep(delay).await;
            let now = ctx.sampler.now();
            let animation = ctx.board.lock().await.power_on(id, strategy, stagger, now);
            if let Some(animation) = animation {
                animation.await;
            }
        });
    }

    while let Some(result) = landing.join_next().await {
        if let Err(err) = result {
            warn!("power-on task failed: {err}");
        }
    }
    debug!("power-on complete, starting tick loop");
    ctx.events.send(ClockEvent::PowerOnCompleted).ok();

    run_tick_loop(ctx).await;
}

/// The single shared timer reconciling every face once per period.
async fn run_tick_loop(ctx: LoopContext) {
    let period = ctx.config.tick_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let now = ctx.sampler.now();
        trace!(%now, "tick");
        ctx.board.lock().await.tick(now).await;
        ctx.events.send(ClockEvent::Tick { now }).ok();
    }
}

/// Whether a weather fetch may be skipped for a fresh cached reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Refresh {
    /// First cycle of a restarted loop: only stale or missing readings.
    IfStale,
    /// Scheduled cycle: every city, whatever the cache holds.
    Always,
}

/// Refreshes every city now and then once per refresh period.
///
/// The immediate first cycle skips cities whose cached reading is still
/// fresh, so a rebuild does not refetch. Every later cycle fetches every
/// city. Each city is fetched on its own task so one slow or failing city
/// never holds up the rest. Fetches still in flight when the next cycle
/// starts are abandoned.
async fn run_weather_loop<W: WeatherService>(
    ctx: LoopContext,
    service: Arc<W>,
    cache: Arc<Mutex<WeatherCache>>,
    cities: Vec<String>,
) {
    let mut ticker = interval(ctx.config.weather.refresh());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut fetches = JoinSet::new();
    let mut mode = Refresh::IfStale;
    loop {
        ticker.tick().await;
        fetches.shutdown().await;
        debug!(cities = cities.len(), ?mode, "weather refresh cycle");
        for city in &cities {
            fetches.spawn(refresh_city(
                ctx.clone(),
                service.clone(),
                cache.clone(),
                city.clone(),
                mode,
            ));
        }
        mode = Refresh::Always;
    }
}

async fn refresh_city<W: WeatherService>(
    ctx: LoopContext,
    service: Arc<W>,
    cache: Arc<Mutex<WeatherCache>>,
    city: String,
    mode: Refresh,
) {
    match fetch_city(&ctx, service.as_ref(), &cache, &city, mode).await {
        Ok(true) => {
            debug!(%city, "weather updated");
            ctx.events.send(ClockEvent::WeatherUpdated { city }).ok();
        }
        Ok(false) => trace!(%city, "weather still fresh"),
        Err(err) => {
            warn!(%city, "weather refresh failed: {err}");
            ctx.events
                .send(ClockEvent::WeatherFailed {
                    city,
                    reason: err.to_string(),
                })
                .ok();
        }
    }
}

/// Returns `Ok(false)` when `mode` allowed skipping a fresh reading.
async fn fetch_city<W: WeatherService>(
    ctx: &LoopContext,
    service: &W,
    cache: &Mutex<WeatherCache>,
    city: &str,
    mode: Refresh,
) -> Result<bool> {
    let now = ctx.sampler.now();
    let known = {
        let cache = cache.lock().await;
        if mode == Refresh::IfStale && !cache.needs_refresh(city, now) {
            return Ok(false);
        }
        cache.coordinates(city)
    };

    let coordinates = match known {
        Some(coordinates) => coordinates,
        None => {
            let coordinates = service
                .geocode(city)
                .await?
                .ok_or_else(|| TockError::Weather(format!("no location found for {city}")))?;
            cache.lock().await.remember_coordinates(city, coordinates);
            coordinates
        }
    };

    let reading = service.current(coordinates).await?;
    let entry = cache
        .lock()
        .await
        .store(city, coordinates, reading, ctx.sampler.now());
    let mut board = ctx.board.lock().await;
    board.apply_weather(city, &entry);
    board.renderer.present();
    Ok(true)
}
