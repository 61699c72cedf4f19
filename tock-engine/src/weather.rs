//! Weather badges: the service seam, the Open-Meteo client, and the cache.
//!
//! Coordinates are resolved once per city name and kept. Readings are kept
//! until replaced; the TTL only decides when a reading is fetched again.

use crate::config::WeatherConfig;
use crate::error::{Result, TockError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Current conditions as returned by the service.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub temperature_celsius: f64,
    /// WMO weather interpretation code.
    pub condition_code: u16,
}

/// The external weather provider.
pub trait WeatherService: Send + Sync + 'static {
    /// Resolves a free-text city name. `Ok(None)` means nothing matched.
    fn geocode(&self, name: &str) -> impl Future<Output = Result<Option<Coordinates>>> + Send;

    fn current(&self, at: Coordinates) -> impl Future<Output = Result<Reading>> + Send;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherCacheEntry {
    pub coordinates: Coordinates,
    pub temperature_celsius: f64,
    pub condition_code: u16,
    pub fetched_at: DateTime<Utc>,
}

impl WeatherCacheEntry {
    /// Stale once strictly more than `ttl` has passed since the fetch.
    pub fn is_stale(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now - self.fetched_at > ttl
    }
}

/// Weather state keyed by city name.
#[derive(Debug)]
pub struct WeatherCache {
    ttl: chrono::Duration,
    coordinates: HashMap<String, Coordinates>,
    entries: HashMap<String, WeatherCacheEntry>,
}

impl WeatherCache {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            ttl,
            coordinates: HashMap::new(),
            entries: HashMap::new(),
        }
    }

    pub fn coordinates(&self, city: &str) -> Option<Coordinates> {
        self.coordinates.get(city).copied()
    }

    pub fn remember_coordinates(&mut self, city: &str, at: Coordinates) {
        self.coordinates.insert(city.to_string(), at);
    }

    pub fn entry(&self, city: &str) -> Option<&WeatherCacheEntry> {
        self.entries.get(city)
    }

    /// Whether the city has no reading or only a stale one.
    pub fn needs_refresh(&self, city: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(city)
            .map_or(true, |entry| entry.is_stale(now, self.ttl))
    }

    pub fn store(
        &mut self,
        city: &str,
        coordinates: Coordinates,
        reading: Reading,
        now: DateTime<Utc>,
    ) -> WeatherCacheEntry {
        let entry = WeatherCacheEntry {
            coordinates,
            temperature_celsius: reading.temperature_celsius,
            condition_code: reading.condition_code,
            fetched_at: now,
        };
        self.entries.insert(city.to_string(), entry);
        entry
    }
}

/// Icon category derived from a WMO condition code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeatherIcon {
    Sun,
    CloudSun,
    Cloud,
    Fog,
    Drizzle,
    Rain,
    Snow,
    Thunderstorm,
}

impl WeatherIcon {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => WeatherIcon::Sun,
            1 | 2 => WeatherIcon::CloudSun,
            3 => WeatherIcon::Cloud,
            45 | 48 => WeatherIcon::Fog,
            51..=57 => WeatherIcon::Drizzle,
            61..=67 | 80..=82 => WeatherIcon::Rain,
            71..=77 | 85 | 86 => WeatherIcon::Snow,
            95..=99 => WeatherIcon::Thunderstorm,
            _ => WeatherIcon::Cloud,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WeatherIcon::Sun => "sun",
            WeatherIcon::CloudSun => "cloud-sun",
            WeatherIcon::Cloud => "cloud",
            WeatherIcon::Fog => "fog",
            WeatherIcon::Drizzle => "drizzle",
            WeatherIcon::Rain => "rain",
            WeatherIcon::Snow => "snow",
            WeatherIcon::Thunderstorm => "thunderstorm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TempUnit {
    Celsius,
    Fahrenheit,
}

impl TempUnit {
    pub fn from_celsius_flag(use_celsius: bool) -> Self {
        if use_celsius {
            TempUnit::Celsius
        } else {
            TempUnit::Fahrenheit
        }
    }

    pub fn symbol(self) -> char {
        match self {
            TempUnit::Celsius => 'C',
            TempUnit::Fahrenheit => 'F',
        }
    }
}

pub fn c_to_f(celsius: f64) -> i32 {
    (celsius * 9.0 / 5.0 + 32.0).round() as i32
}

/// What a face shows next to its city label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeatherBadge {
    pub icon: WeatherIcon,
    pub temperature: i32,
    pub unit: TempUnit,
}

impl WeatherBadge {
    pub fn from_entry(entry: &WeatherCacheEntry, unit: TempUnit) -> Self {
        let temperature = match unit {
            TempUnit::Celsius => entry.temperature_celsius.round() as i32,
            TempUnit::Fahrenheit => c_to_f(entry.temperature_celsius),
        };
        Self {
            icon: WeatherIcon::from_code(entry.condition_code),
            temperature,
            unit,
        }
    }
}

impl fmt::Display for WeatherBadge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}°{}",
            self.icon.as_str(),
            self.temperature,
            self.unit.symbol()
        )
    }
}

// ---------------------------------------------------------------------------
// Open-Meteo
// ---------------------------------------------------------------------------

/// Client for the Open-Meteo geocoding and forecast APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteo {
    client: reqwest::Client,
    geocoding_url: String,
    forecast_url: String,
}

#[derive(Deserialize)]
struct GeocodingResponse {
    #[serde(default)]
    results: Vec<GeocodingResult>,
}

#[derive(Deserialize)]
struct GeocodingResult {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    current: CurrentConditions,
}

#[derive(Deserialize)]
struct CurrentConditions {
    temperature_2m: f64,
    weather_code: u16,
}

impl OpenMeteo {
    pub fn new(config: &WeatherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            geocoding_url: config.geocoding_url.clone(),
            forecast_url: config.forecast_url.clone(),
        }
    }
}

impl WeatherService for OpenMeteo {
    async fn geocode(&self, name: &str) -> Result<Option<Coordinates>> {
        let response = self
            .client
            .get(&self.geocoding_url)
            .query(&[("name", name), ("count", "1"), ("language", "en"), ("format", "json")])
            .send()
            .await?
            .error_for_status()?;
        let body: GeocodingResponse = response.json().await?;
        Ok(body.results.first().map(|hit| Coordinates {
            lat: hit.latitude,
            lon: hit.longitude,
        }))
    }

    async fn current(&self, at: Coordinates) -> Result<Reading> {
        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", at.lat.to_string()),
                ("longitude", at.lon.to_string()),
                ("current", "temperature_2m,weather_code".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;
        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| TockError::Weather(format!("forecast response parse failed: {e}")))?;
        Ok(Reading {
            temperature_celsius: body.current.temperature_2m,
            condition_code: body.current.weather_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fahrenheit_conversion_rounds() {
        assert_eq!(c_to_f(0.0), 32);
        assert_eq!(c_to_f(37.0), 99);
        assert_eq!(c_to_f(100.0), 212);
        assert_eq!(c_to_f(-40.0), -40);
    }

    #[test]
    fn condition_codes_map_to_icons() {
        assert_eq!(WeatherIcon::from_code(0), WeatherIcon::Sun);
        assert_eq!(WeatherIcon::from_code(2), WeatherIcon::CloudSun);
        assert_eq!(WeatherIcon::from_code(3), WeatherIcon::Cloud);
        assert_eq!(WeatherIcon::from_code(45), WeatherIcon::Fog);
        assert_eq!(WeatherIcon::from_code(53), WeatherIcon::Drizzle);
        assert_eq!(WeatherIcon::from_code(61), WeatherIcon::Rain);
        assert_eq!(WeatherIcon::from_code(81), WeatherIcon::Rain);
        assert_eq!(WeatherIcon::from_code(71), WeatherIcon::Snow);
        assert_eq!(WeatherIcon::from_code(95), WeatherIcon::Thunderstorm);
        assert_eq!(WeatherIcon::from_code(999), WeatherIcon::Cloud);
    }

    #[test]
    fn staleness_is_strictly_after_ttl() {
        let fetched = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).unwrap();
        let ttl = chrono::Duration::minutes(30);
        let mut cache = WeatherCache::new(ttl);
        let at = Coordinates { lat: 1.0, lon: 2.0 };
        cache.store(
            "NASHVILLE",
            at,
            Reading {
                temperature_celsius: 21.0,
                condition_code: 0,
            },
            fetched,
        );

        let exactly = fetched + ttl;
        assert!(!cache.needs_refresh("NASHVILLE", exactly));
        assert!(cache.needs_refresh("NASHVILLE", exactly + chrono::Duration::seconds(1)));
        // Stale entries stay readable until replaced.
        assert!(cache.entry("NASHVILLE").is_some());
        assert!(cache.needs_refresh("AUCKLAND", fetched));
    }

    #[test]
    fn badge_follows_selected_unit() {
        let entry = WeatherCacheEntry {
            coordinates: Coordinates { lat: 0.0, lon: 0.0 },
            temperature_celsius: 37.0,
            condition_code: 61,
            fetched_at: Utc::now(),
        };
        let f = WeatherBadge::from_entry(&entry, TempUnit::Fahrenheit);
        assert_eq!(f.to_string(), "rain 99°F");
        let c = WeatherBadge::from_entry(&entry, TempUnit::Celsius);
        assert_eq!(c.to_string(), "rain 37°C");
    }

    #[test]
    fn open_meteo_payloads_deserialize() {
        let geo: GeocodingResponse =
            serde_json::from_str(r#"{"results":[{"latitude":36.16,"longitude":-86.78,"name":"Nashville"}]}"#)
                .unwrap();
        assert_eq!(geo.results.len(), 1);
        let empty: GeocodingResponse = serde_json::from_str(r#"{"generationtime_ms":0.5}"#).unwrap();
        assert!(empty.results.is_empty());

        let forecast: ForecastResponse = serde_json::from_str(
            r#"{"current":{"time":"2026-05-01T12:00","temperature_2m":18.4,"weather_code":3}}"#,
        )
        .unwrap();
        assert_eq!(forecast.current.weather_code, 3);
    }
}
