//! Upstream weather API client (WeatherAPI.com compatible).

use chrono::{NaiveDate, TimeZone, Utc};
use moodcast_core::{NetworkError, ReqwestErrorExt, WeatherConfig};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;
use url::Url;

use crate::location::normalize_location_key;
use crate::types::{
    Coordinates, ForecastBundle, ForecastDay, LocationMatch, WeatherError, WeatherObservation,
};

/// Most forecast days the upstream serves.
pub const MAX_FORECAST_DAYS: u8 = 10;

#[derive(Debug, Deserialize)]
struct ApiLocation {
    name: String,
    lat: f64,
    lon: f64,
    #[serde(default)]
    localtime_epoch: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiCondition {
    text: String,
    code: i32,
}

#[derive(Debug, Deserialize)]
struct ApiCurrent {
    temp_c: f64,
    humidity: u8,
    pressure_mb: f64,
    condition: ApiCondition,
    wind_kph: f64,
    wind_dir: String,
    uv: f64,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    location: ApiLocation,
    current: ApiCurrent,
}

#[derive(Debug, Deserialize)]
struct ApiDay {
    maxtemp_c: f64,
    mintemp_c: f64,
    avgtemp_c: f64,
    maxwind_kph: f64,
    avghumidity: f64,
    #[serde(default)]
    daily_chance_of_rain: u8,
    #[serde(default)]
    daily_chance_of_snow: u8,
    uv: f64,
    condition: ApiCondition,
}

#[derive(Debug, Deserialize)]
struct ApiForecastDay {
    date: NaiveDate,
    day: ApiDay,
}

#[derive(Debug, Deserialize)]
struct ApiForecast {
    forecastday: Vec<ApiForecastDay>,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    location: ApiLocation,
    forecast: ApiForecast,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResult {
    id: i64,
    name: String,
    #[serde(default)]
    region: String,
    #[serde(default)]
    country: String,
    lat: f64,
    lon: f64,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl From<ApiForecastDay> for ForecastDay {
    fn from(api: ApiForecastDay) -> Self {
        Self {
            date: api.date,
            max_temperature: api.day.maxtemp_c,
            min_temperature: api.day.mintemp_c,
            avg_temperature: api.day.avgtemp_c,
            condition_text: api.day.condition.text,
            condition_code: api.day.condition.code,
            max_wind_speed: api.day.maxwind_kph,
            avg_humidity: api.day.avghumidity,
            chance_of_rain: api.day.daily_chance_of_rain,
            chance_of_snow: api.day.daily_chance_of_snow,
            uv_index: api.day.uv,
        }
    }
}

impl From<ApiSearchResult> for LocationMatch {
    fn from(api: ApiSearchResult) -> Self {
        Self {
            id: api.id,
            name: api.name,
            region: api.region,
            country: api.country,
            latitude: api.lat,
            longitude: api.lon,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    base_url: String,
    api_key: Option<String>,
}

impl WeatherProvider {
    pub fn new(config: &WeatherConfig) -> Result<Self, WeatherError> {
        Self::with_base_url(
            &config.api_url,
            config.api_key.clone().filter(|k| !k.is_empty()),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, WeatherError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| WeatherError::Parse(format!("Invalid weather API URL: {}", e)))?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        Ok(Self {
            client: Arc::new(client),
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<T, WeatherError> {
        let key = self.api_key.as_deref().ok_or(WeatherError::NotConfigured)?;
        let url = format!("{}/{}", self.base_url, endpoint);

        let response = self
            .client
            .get(&url)
            .query(&[("key", key)])
            .query(query)
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.into_network_error()))?;

        self.handle_response(response).await
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, WeatherError> {
        let status = response.status();

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| WeatherError::Parse(format!("JSON parse error: {}", e)));
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiErrorBody>(&text)
            .ok()
            .and_then(|body| body.error)
            .map(|detail| detail.message)
            .unwrap_or(text);

        if status.is_server_error() {
            Err(WeatherError::Network(NetworkError::ServerError {
                status: status.as_u16(),
                message,
            }))
        } else {
            Err(WeatherError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Current conditions for a location query.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_current(&self, location: &str) -> Result<WeatherObservation, WeatherError> {
        let resp: CurrentResponse = self
            .get("current.json", &[("q", location.to_string())])
            .await?;

        let recorded_at = resp
            .location
            .localtime_epoch
            .and_then(|epoch| Utc.timestamp_opt(epoch, 0).single())
            .unwrap_or_else(Utc::now);

        tracing::info!("Fetched current weather for {}", resp.location.name);
        Ok(WeatherObservation {
            location_key: normalize_location_key(location),
            location_name: resp.location.name,
            coordinates: Coordinates {
                latitude: resp.location.lat,
                longitude: resp.location.lon,
            },
            temperature: resp.current.temp_c,
            humidity: resp.current.humidity,
            pressure: resp.current.pressure_mb,
            condition_text: resp.current.condition.text,
            condition_code: resp.current.condition.code,
            wind_speed: resp.current.wind_kph,
            wind_direction: resp.current.wind_dir,
            uv_index: resp.current.uv,
            recorded_at,
        })
    }

    /// Daily forecast. `days` is clamped to 1..=10.
    #[instrument(skip(self), level = "info")]
    pub async fn fetch_forecast(
        &self,
        location: &str,
        days: u8,
    ) -> Result<ForecastBundle, WeatherError> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        let resp: ForecastResponse = self
            .get(
                "forecast.json",
                &[("q", location.to_string()), ("days", days.to_string())],
            )
            .await?;

        Ok(ForecastBundle {
            location_name: resp.location.name,
            coordinates: Coordinates {
                latitude: resp.location.lat,
                longitude: resp.location.lon,
            },
            days: resp
                .forecast
                .forecastday
                .into_iter()
                .map(ForecastDay::from)
                .collect(),
        })
    }

    /// Locations matching a free-text query.
    #[instrument(skip(self), level = "info")]
    pub async fn search_locations(&self, query: &str) -> Result<Vec<LocationMatch>, WeatherError> {
        let results: Vec<ApiSearchResult> =
            self.get("search.json", &[("q", query.to_string())]).await?;
        Ok(results.into_iter().map(LocationMatch::from).collect())
    }
}
