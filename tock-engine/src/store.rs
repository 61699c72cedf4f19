//! Best-effort key-value persistence for settings and the city list.

use crate::common::City;
use crate::error::{Result, TockError};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

pub const SHOW_SECONDS_KEY: &str = "tock-showSeconds";
pub const USE_CELSIUS_KEY: &str = "tock-useCelsius";
pub const CITIES_KEY: &str = "tock-cities";

/// A string-valued key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-local store. Counts writes so callers can observe persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            entries: Mutex::new(entries),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries().insert(key.to_string(), value.to_string());
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// A JSON object on disk, rewritten whole on every `set`.
///
/// A missing or unreadable file starts empty.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("ignoring unreadable store {}: {err}", path.display());
                BTreeMap::new()
            }),
            Err(_) => {
                debug!("no store at {}, starting empty", path.display());
                BTreeMap::new()
            }
        };
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        let serialized = serde_json::to_string_pretty(&*entries)?;
        fs::write(&self.path, serialized).map_err(|e| {
            TockError::Store(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

/// The cities shown when nothing usable is stored.
pub fn default_cities() -> Vec<City> {
    vec![
        City::new("NASHVILLE", "America/Chicago"),
        City::new("LOS ANGELES", "America/Los_Angeles"),
        City::new("AUCKLAND", "Pacific/Auckland"),
        City::new("TEL AVIV", "Asia/Jerusalem"),
    ]
}

/// Typed access to the persisted settings.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Defaults to `true` when absent.
    pub fn show_seconds(&self) -> bool {
        self.store
            .get(SHOW_SECONDS_KEY)
            .map_or(true, |value| value == "true")
    }

    pub fn set_show_seconds(&self, show: bool) -> Result<()> {
        self.store.set(SHOW_SECONDS_KEY, &show.to_string())
    }

    /// Defaults to Fahrenheit (`false`) when absent.
    pub fn use_celsius(&self) -> bool {
        self.store
            .get(USE_CELSIUS_KEY)
            .is_some_and(|value| value == "true")
    }

    pub fn set_use_celsius(&self, celsius: bool) -> Result<()> {
        self.store.set(USE_CELSIUS_KEY, &celsius.to_string())
    }

    /// The stored city list, or the defaults if it is absent, empty or corrupt.
    pub fn cities(&self) -> Vec<City> {
        let Some(raw) = self.store.get(CITIES_KEY) else {
            return default_cities();
        };
        match serde_json::from_str::<Vec<City>>(&raw) {
            Ok(cities) if !cities.is_empty() => cities,
            Ok(_) => default_cities(),
            Err(err) => {
                warn!("stored city list is unreadable, using defaults: {err}");
                default_cities()
            }
        }
    }

    pub fn save_cities(&self, cities: &[City]) -> Result<()> {
        self.store.set(CITIES_KEY, &serde_json::to_string(cities)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(store: MemoryStore) -> SettingsStore {
        SettingsStore::new(Arc::new(store))
    }

    #[test]
    fn absent_keys_use_defaults() {
        let settings = settings(MemoryStore::new());
        assert!(settings.show_seconds());
        assert!(!settings.use_celsius());
        assert_eq!(settings.cities(), default_cities());
    }

    #[test]
    fn flags_round_through_strings() {
        let store = MemoryStore::with_entries([(SHOW_SECONDS_KEY, "false"), (USE_CELSIUS_KEY, "true")]);
        let settings = settings(store);
        assert!(!settings.show_seconds());
        assert!(settings.use_celsius());
    }

    #[test]
    fn corrupt_or_empty_city_list_falls_back() {
        assert_eq!(
            settings(MemoryStore::with_entries([(CITIES_KEY, "{not json")])).cities(),
            default_cities()
        );
        assert_eq!(
            settings(MemoryStore::with_entries([(CITIES_KEY, "[]")])).cities(),
            default_cities()
        );
    }

    #[test]
    fn saved_cities_are_read_back() {
        let store = Arc::new(MemoryStore::new());
        let settings = SettingsStore::new(store.clone());
        let cities = vec![City::new("PARIS", "Europe/Paris")];
        settings.save_cities(&cities).unwrap();
        assert_eq!(settings.cities(), cities);
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn json_file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path);
        store.set(SHOW_SECONDS_KEY, "false").unwrap();

        let reopened = JsonFileStore::open(&path);
        assert_eq!(reopened.get(SHOW_SECONDS_KEY).as_deref(), Some("false"));
    }

    #[test]
    fn json_file_store_tolerates_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "garbage").unwrap();
        let store = JsonFileStore::open(&path);
        assert_eq!(store.get(CITIES_KEY), None);
    }
}
