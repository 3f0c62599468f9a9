//! Read-through weather fetching with stale fallback.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use tracing::instrument;

use crate::cache::FreshnessCache;
use crate::location::normalize_location_key;
use crate::provider::WeatherProvider;
use crate::types::{
    FetchedWeather, ForecastBundle, LocationMatch, WeatherError, WeatherObservation, WeatherSource,
};

/// Message attached to observations served from a stale cache.
pub const STALE_WARNING: &str = "Using cached data due to API error";

/// Weather fetching over an upstream provider and a freshness cache.
#[derive(Clone)]
pub struct WeatherService {
    provider: WeatherProvider,
    cache: Arc<Mutex<FreshnessCache>>,
    freshness: Duration,
}

impl WeatherService {
    pub fn new(
        provider: WeatherProvider,
        cache: Arc<Mutex<FreshnessCache>>,
        freshness: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            freshness,
        }
    }

    async fn with_cache<T, F>(&self, op: F) -> Result<T, WeatherError>
    where
        T: Send + 'static,
        F: FnOnce(&FreshnessCache) -> anyhow::Result<T> + Send + 'static,
    {
        let cache = Arc::clone(&self.cache);
        tokio::task::spawn_blocking(move || {
            let cache = cache.lock();
            op(&*cache)
        })
        .await
        .map_err(|e| WeatherError::Cache(format!("Cache task failed: {}", e)))?
        .map_err(|e| WeatherError::Cache(e.to_string()))
    }

    /// Current conditions for `location`.
    ///
    /// A fresh cached reading is served as `Cache`. Otherwise upstream is asked
    /// and the result stored (`Api`). If upstream fails the newest cached
    /// reading is served as `Fallback`, however old.
    ///
    /// # Errors
    /// Returns `WeatherError::UpstreamUnavailable` when upstream fails and
    /// nothing is cached for the location.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_current(
        &self,
        location: &str,
        force_refresh: bool,
    ) -> Result<FetchedWeather, WeatherError> {
        let key = normalize_location_key(location);

        if !force_refresh {
            if let Some(observation) = self.fresh_observation(&key).await {
                tracing::debug!("Serving fresh cached weather for {}", key);
                return Ok(FetchedWeather {
                    observation,
                    source: WeatherSource::Cache,
                    warning: None,
                    cached: true,
                });
            }
        }

        match self.provider.fetch_current(location).await {
            Ok(observation) => {
                let stored = observation.clone();
                let cached = match self.with_cache(move |cache| cache.put(&stored)).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Failed to cache weather for {}: {}", key, e);
                        false
                    }
                };
                Ok(FetchedWeather {
                    observation,
                    source: WeatherSource::Api,
                    warning: None,
                    cached,
                })
            }
            Err(upstream) => {
                tracing::warn!("Weather upstream failed for {}: {}", key, upstream);
                let lookup = key.clone();
                match self.with_cache(move |cache| cache.get(&lookup)).await {
                    Ok(Some(observation)) => Ok(FetchedWeather {
                        observation,
                        source: WeatherSource::Fallback,
                        warning: Some(STALE_WARNING.to_string()),
                        cached: true,
                    }),
                    Ok(None) => Err(WeatherError::UpstreamUnavailable(upstream.to_string())),
                    Err(e) => {
                        tracing::warn!("Weather cache unreadable for {}: {}", key, e);
                        Err(WeatherError::UpstreamUnavailable(upstream.to_string()))
                    }
                }
            }
        }
    }

    /// Newest cached reading if it is within the freshness window.
    async fn fresh_observation(&self, key: &str) -> Option<WeatherObservation> {
        let key = key.to_string();
        let window = self.freshness;
        let result = self
            .with_cache(move |cache| {
                if cache.is_fresh(&key, window)? {
                    cache.get(&key)
                } else {
                    Ok(None)
                }
            })
            .await;

        match result {
            Ok(observation) => observation,
            Err(e) => {
                tracing::warn!("Weather cache check failed: {}", e);
                None
            }
        }
    }

    /// Daily forecast. Not cached.
    pub async fn fetch_forecast(
        &self,
        location: &str,
        days: u8,
    ) -> Result<ForecastBundle, WeatherError> {
        self.provider.fetch_forecast(location, days).await
    }

    /// Location search. Not cached.
    pub async fn search_locations(&self, query: &str) -> Result<Vec<LocationMatch>, WeatherError> {
        self.provider.search_locations(query).await
    }

    /// Past cached readings for `location`, newest first.
    pub async fn history(
        &self,
        location: &str,
        limit: u32,
    ) -> Result<Vec<WeatherObservation>, WeatherError> {
        let key = normalize_location_key(location);
        self.with_cache(move |cache| cache.history(&key, limit)).await
    }
}
