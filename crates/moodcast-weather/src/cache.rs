//! SQLite-backed weather observation cache.
//!
//! Observations are appended, never replaced, so each location keeps its
//! history. Lookups always return the newest reading by `recorded_at`.

use anyhow::Result;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::location::normalize_location_key;
use crate::types::{Coordinates, WeatherObservation};

/// Default freshness window.
pub const DEFAULT_FRESHNESS_MINUTES: i64 = 60;

const OBSERVATION_COLUMNS: &str = "location_key, location_name, latitude, longitude, temperature, \
     humidity, pressure, condition_text, condition_code, wind_speed, wind_direction, uv_index, \
     recorded_at_ms";

/// Read-through cache of weather observations.
pub struct FreshnessCache {
    conn: Connection,
}

impl FreshnessCache {
    /// Create a new cache at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache (for testing).
    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.init_schema()?;
        Ok(cache)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                location_key TEXT NOT NULL,
                location_name TEXT NOT NULL,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                temperature REAL NOT NULL,
                humidity INTEGER NOT NULL,
                pressure REAL NOT NULL,
                condition_text TEXT NOT NULL,
                condition_code INTEGER NOT NULL,
                wind_speed REAL NOT NULL,
                wind_direction TEXT NOT NULL,
                uv_index REAL NOT NULL,
                recorded_at_ms INTEGER NOT NULL,
                cached_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_observations_key_time
                ON weather_observations(location_key, recorded_at_ms DESC);
            "#,
        )?;
        Ok(())
    }

    /// Whether the newest observation for `key` is within `window` of now.
    pub fn is_fresh(&self, key: &str, window: Duration) -> Result<bool> {
        self.is_fresh_at(key, window, Utc::now())
    }

    /// Whether the newest observation for `key` has `recorded_at >= now - window`.
    pub fn is_fresh_at(&self, key: &str, window: Duration, now: DateTime<Utc>) -> Result<bool> {
        let threshold = (now - window).timestamp_millis();
        let newest: Option<i64> = self.conn.query_row(
            "SELECT MAX(recorded_at_ms) FROM weather_observations WHERE location_key = ?1",
            params![normalize_location_key(key)],
            |row| row.get(0),
        )?;
        Ok(newest.is_some_and(|recorded| recorded >= threshold))
    }

    /// Most recent observation for `key`, fresh or not.
    pub fn get(&self, key: &str) -> Result<Option<WeatherObservation>> {
        let observation = self
            .conn
            .query_row(
                &format!(
                    "SELECT {OBSERVATION_COLUMNS} FROM weather_observations
                     WHERE location_key = ?1
                     ORDER BY recorded_at_ms DESC, id DESC
                     LIMIT 1"
                ),
                params![normalize_location_key(key)],
                Self::row_to_observation,
            )
            .optional()?;
        Ok(observation)
    }

    /// Append an observation under its normalized key.
    pub fn put(&self, observation: &WeatherObservation) -> Result<()> {
        let key = normalize_location_key(&observation.location_key);
        let now = Utc::now().timestamp_millis();

        self.conn.execute(
            &format!(
                "INSERT INTO weather_observations ({OBSERVATION_COLUMNS}, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                key,
                observation.location_name,
                observation.coordinates.latitude,
                observation.coordinates.longitude,
                observation.temperature,
                observation.humidity,
                observation.pressure,
                observation.condition_text,
                observation.condition_code,
                observation.wind_speed,
                observation.wind_direction,
                observation.uv_index,
                observation.recorded_at.timestamp_millis(),
                now,
            ],
        )?;

        tracing::debug!("Cached observation for {}", key);
        Ok(())
    }

    /// Past observations for `key`, newest first.
    pub fn history(&self, key: &str, limit: u32) -> Result<Vec<WeatherObservation>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {OBSERVATION_COLUMNS} FROM weather_observations
             WHERE location_key = ?1
             ORDER BY recorded_at_ms DESC, id DESC
             LIMIT ?2"
        ))?;

        let rows = stmt.query_map(
            params![normalize_location_key(key), i64::from(limit)],
            Self::row_to_observation,
        )?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Number of stored observations across all locations.
    pub fn observation_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM weather_observations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn row_to_observation(row: &rusqlite::Row) -> rusqlite::Result<WeatherObservation> {
        let recorded_at_ms: i64 = row.get(12)?;
        let recorded_at = Utc
            .timestamp_millis_opt(recorded_at_ms)
            .single()
            .ok_or(rusqlite::Error::IntegralValueOutOfRange(12, recorded_at_ms))?;

        Ok(WeatherObservation {
            location_key: row.get(0)?,
            location_name: row.get(1)?,
            coordinates: Coordinates {
                latitude: row.get(2)?,
                longitude: row.get(3)?,
            },
            temperature: row.get(4)?,
            humidity: row.get(5)?,
            pressure: row.get(6)?,
            condition_text: row.get(7)?,
            condition_code: row.get(8)?,
            wind_speed: row.get(9)?,
            wind_direction: row.get(10)?,
            uv_index: row.get(11)?,
            recorded_at,
        })
    }
}
