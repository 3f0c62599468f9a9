use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;

type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Add an error
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a user-friendly message summarizing all errors
    pub fn error_summary(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Local embedded storage
    #[serde(default)]
    pub storage: StorageConfig,

    /// Remote record store (PostgREST endpoint)
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Weather upstream and cache settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Emotion journal defaults
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the local records database. Defaults to `<config_dir>/moodcast.db`.
    #[serde(default)]
    pub records_path: Option<PathBuf>,

    /// Path of the weather cache database. Defaults to `<config_dir>/weather_cache.db`.
    #[serde(default)]
    pub weather_cache_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote store, e.g. `https://project.supabase.co`
    pub url: String,

    /// Service credential sent with every request (can be set via `SUPABASE_SERVICE_KEY`)
    #[serde(default)]
    pub service_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_remote_timeout")]
    pub timeout_secs: u64,
}

fn default_remote_timeout() -> u64 {
    30
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: "https://your-project.supabase.co".to_string(),
            service_key: None,
            timeout_secs: default_remote_timeout(),
        }
    }
}

impl RemoteConfig {
    /// Check if the remote store is configured (not the placeholder project)
    pub fn is_configured(&self) -> bool {
        self.service_key.as_deref().is_some_and(|k| !k.is_empty())
            && !self.url.contains("your-project")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// Base URL of the upstream weather API
    #[serde(default = "default_weather_api_url")]
    pub api_url: String,

    /// API key (can be set via `WEATHER_API_KEY`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds
    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,

    /// How long a cached observation is served without refetching
    #[serde(default = "default_freshness_minutes")]
    pub freshness_minutes: u32,

    /// Location query used when the caller gives none
    #[serde(default = "default_location")]
    pub default_location: String,

    /// Forecast length used when the caller gives none
    #[serde(default = "default_forecast_days")]
    pub forecast_days: u8,
}

fn default_weather_api_url() -> String {
    "https://api.weatherapi.com/v1".to_string()
}

fn default_weather_timeout() -> u64 {
    10
}

fn default_freshness_minutes() -> u32 {
    60
}

fn default_location() -> String {
    "auto:ip".to_string()
}

fn default_forecast_days() -> u8 {
    3
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_url: default_weather_api_url(),
            api_key: None,
            timeout_secs: default_weather_timeout(),
            freshness_minutes: default_freshness_minutes(),
            default_location: default_location(),
            forecast_days: default_forecast_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Maximum entries returned by a listing
    #[serde(default = "default_list_limit")]
    pub list_limit: u32,

    /// Look-back window in days for listings and insights
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

fn default_list_limit() -> u32 {
    30
}

fn default_window_days() -> u32 {
    30
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            list_limit: default_list_limit(),
            window_days: default_window_days(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("moodcast");

        Self {
            config_dir,
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
            weather: WeatherConfig::default(),
            journal: JournalConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if it doesn't exist.
    ///
    /// Environment overrides are applied after the file is read.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = Self::load_from(&config_path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from an explicit path, writing defaults there if missing.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", config_path.display(), e)))?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings.
    /// Returns `ConfigError::Invalid` if validation fails with critical errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()));
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    /// Fill secrets and endpoints from the environment when present.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("SUPABASE_URL") {
            self.remote.url = url;
        }
        if let Ok(key) = std::env::var("SUPABASE_SERVICE_KEY") {
            self.remote.service_key = Some(key);
        }
        if let Ok(key) = std::env::var("WEATHER_API_KEY") {
            self.weather.api_key = Some(key);
        }
    }

    /// Validate the configuration
    ///
    /// Returns a ValidationResult containing any errors or warnings.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.validate_url(&self.remote.url, "remote.url", &mut result);
        self.validate_url(&self.weather.api_url, "weather.api_url", &mut result);

        if !self.remote.is_configured() {
            result.add_warning(
                "remote",
                "Remote store not configured - records will only be kept locally",
            );
        }

        if self.remote.timeout_secs == 0 {
            result.add_error("remote.timeout_secs", "Timeout must be greater than 0");
        }

        if self.weather.timeout_secs == 0 {
            result.add_error("weather.timeout_secs", "Timeout must be greater than 0");
        }

        if self.weather.api_key.as_deref().map_or(true, str::is_empty) {
            result.add_warning(
                "weather.api_key",
                "Weather API key not set - only cached observations will be served",
            );
        }

        if self.weather.freshness_minutes == 0 {
            result.add_warning(
                "weather.freshness_minutes",
                "Freshness window disabled (0 minutes) - every request hits the upstream",
            );
        } else if self.weather.freshness_minutes > 1440 {
            result.add_warning(
                "weather.freshness_minutes",
                "Freshness window is more than 24 hours",
            );
        }

        if !(1..=10).contains(&self.weather.forecast_days) {
            result.add_error(
                "weather.forecast_days",
                "Forecast days must be between 1 and 10",
            );
        }

        if self.journal.list_limit == 0 {
            result.add_error("journal.list_limit", "List limit must be greater than 0");
        }

        result
    }

    /// Validate a URL field
    fn validate_url(&self, url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }

                if let Some(port) = url.port() {
                    if port == 0 {
                        result.add_error(field_name, "Port cannot be 0");
                    }
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    /// Resolved path of the local records database
    pub fn records_path(&self) -> PathBuf {
        self.storage
            .records_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("moodcast.db"))
    }

    /// Resolved path of the weather cache database
    pub fn weather_cache_path(&self) -> PathBuf {
        self.storage
            .weather_cache_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("weather_cache.db"))
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit path
    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ConfigError::Io(format!("{}: {}", parent.display(), e)))?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        std::fs::write(config_path, contents)
            .map_err(|e| ConfigError::Io(format!("{}: {}", config_path.display(), e)))?;

        Ok(())
    }

    /// Get the path to the configuration file
    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| ConfigError::NotFound("no platform config directory".to_string()))?
            .join("moodcast");

        Ok(config_dir.join("config.toml"))
    }
}
