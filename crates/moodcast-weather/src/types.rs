use chrono::{DateTime, NaiveDate, Utc};
use moodcast_core::NetworkError;
use serde::{Deserialize, Serialize};

/// Weather condition categories mapped from upstream condition codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WeatherCondition {
    #[default]
    Clear,
    PartlyCloudy,
    Cloudy,
    Fog,
    Drizzle,
    Rain,
    HeavyRain,
    Snow,
    Sleet,
    Thunderstorm,
}

impl WeatherCondition {
    /// Convert a WeatherAPI condition code to WeatherCondition
    /// See: https://www.weatherapi.com/docs/weather_conditions.json
    pub fn from_code(code: i32) -> Self {
        match code {
            1000 => Self::Clear,
            1003 => Self::PartlyCloudy,
            1006 | 1009 => Self::Cloudy,
            1030 | 1135 | 1147 => Self::Fog,
            1072 | 1150 | 1153 => Self::Drizzle,
            1063 | 1180 | 1183 | 1186 | 1189 | 1240 => Self::Rain,
            1192 | 1195 | 1243 | 1246 => Self::HeavyRain,
            1168 | 1171 | 1198 | 1201 | 1069 | 1204 | 1207 | 1249 | 1252 => Self::Sleet,
            1066 | 1114 | 1117 | 1210..=1225 | 1237 | 1255 | 1258 | 1261 | 1264 => Self::Snow,
            1087 | 1273 | 1276 | 1279 | 1282 => Self::Thunderstorm,
            _ => Self::Clear, // Unknown codes default to clear
        }
    }

    /// Get a human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Clear => "Clear",
            Self::PartlyCloudy => "Partly Cloudy",
            Self::Cloudy => "Cloudy",
            Self::Fog => "Fog",
            Self::Drizzle => "Drizzle",
            Self::Rain => "Rain",
            Self::HeavyRain => "Heavy Rain",
            Self::Snow => "Snow",
            Self::Sleet => "Sleet",
            Self::Thunderstorm => "Thunderstorm",
        }
    }
}

/// Geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// A point-in-time weather reading for one location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Normalized form of the query that produced this reading
    pub location_key: String,
    /// Display name reported upstream
    pub location_name: String,
    pub coordinates: Coordinates,
    /// Degrees Celsius
    pub temperature: f64,
    /// Percent
    pub humidity: u8,
    /// Millibars
    pub pressure: f64,
    pub condition_text: String,
    pub condition_code: i32,
    /// Kilometres per hour
    pub wind_speed: f64,
    /// Compass direction, e.g. "NNE"
    pub wind_direction: String,
    pub uv_index: f64,
    pub recorded_at: DateTime<Utc>,
}

impl WeatherObservation {
    pub fn condition(&self) -> WeatherCondition {
        WeatherCondition::from_code(self.condition_code)
    }
}

/// Daily forecast entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub max_temperature: f64,
    pub min_temperature: f64,
    pub avg_temperature: f64,
    pub condition_text: String,
    pub condition_code: i32,
    pub max_wind_speed: f64,
    pub avg_humidity: f64,
    pub chance_of_rain: u8,
    pub chance_of_snow: u8,
    pub uv_index: f64,
}

/// Multi-day forecast. Never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastBundle {
    pub location_name: String,
    pub coordinates: Coordinates,
    pub days: Vec<ForecastDay>,
}

/// A location search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationMatch {
    pub id: i64,
    pub name: String,
    pub region: String,
    pub country: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Where a fetched observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherSource {
    /// A fresh cached reading
    Cache,
    /// A new upstream reading
    Api,
    /// A stale cached reading served because upstream failed
    Fallback,
}

/// Result of the read-through fetch protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchedWeather {
    pub observation: WeatherObservation,
    pub source: WeatherSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    /// Whether the observation is held in the cache
    pub cached: bool,
}

/// Weather errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),
    #[error("Weather API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Cache error: {0}")]
    Cache(String),
    #[error("Weather API key not configured")]
    NotConfigured,
    #[error("Weather unavailable and nothing cached: {0}")]
    UpstreamUnavailable(String),
}

impl WeatherError {
    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(e) => e.user_message(),
            Self::Api { status, .. } if *status == 400 => "Location not found.",
            Self::Api { .. } => "The weather service rejected the request.",
            Self::Parse(_) => "Received unexpected weather data.",
            Self::Cache(_) => "Local weather cache error.",
            Self::NotConfigured => "Weather is not configured. Check settings.",
            Self::UpstreamUnavailable(_) => "Weather is unavailable right now. Please try again later.",
        }
    }
}
