use anyhow::Context;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

use moodcast_core::{AppError, Config};
use moodcast_store::{
    Argon2Hasher, EmotionEntry, Insights, RecordSynchronizer, RemoteStore, SqliteRecordStore,
    StoreResult,
};
use moodcast_weather::{
    ForecastBundle, FreshnessCache, WeatherError, WeatherProvider, WeatherService,
};

/// Application state: configuration plus the store and weather handles built
/// from it. Handles are cheap to clone and are passed to whoever needs them.
pub struct App {
    config: Arc<Config>,
    records: RecordSynchronizer,
    weather: WeatherService,
}

impl App {
    /// Build every handle from configuration.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let local = SqliteRecordStore::new(config.records_path())
            .with_context(|| format!("Failed to open records at {}", config.records_path().display()))?;
        let remote = RemoteStore::new(&config.remote)?;
        if !remote.is_configured() {
            tracing::warn!("Remote store not configured; records will be kept locally");
        }
        let records = RecordSynchronizer::new(
            remote,
            Arc::new(Mutex::new(local)),
            Arc::new(Argon2Hasher),
        );

        let cache = FreshnessCache::new(config.weather_cache_path()).with_context(|| {
            format!(
                "Failed to open weather cache at {}",
                config.weather_cache_path().display()
            )
        })?;
        let provider = WeatherProvider::new(&config.weather)
            .map_err(|e| AppError::Service(e.to_string()))?;
        if !provider.is_configured() {
            tracing::warn!("Weather API key not set; only cached weather is available");
        }
        let weather = WeatherService::new(
            provider,
            Arc::new(Mutex::new(cache)),
            chrono::Duration::minutes(i64::from(config.weather.freshness_minutes)),
        );

        tracing::info!("Application initialized");
        Ok(Self {
            config: Arc::new(config),
            records,
            weather,
        })
    }

    /// Get reference to application config
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn records(&self) -> &RecordSynchronizer {
        &self.records
    }

    pub fn weather(&self) -> &WeatherService {
        &self.weather
    }

    /// Number of users held in the local store.
    pub fn local_user_count(&self) -> StoreResult<usize> {
        self.records.local().lock().user_count()
    }

    /// A user's journal over the configured window, newest first.
    pub async fn recent_entries(&self, user_id: Uuid) -> StoreResult<Vec<EmotionEntry>> {
        let journal = &self.config.journal;
        self.records
            .recent_emotions(user_id, journal.window_days, journal.list_limit)
            .await
    }

    /// Insights over the configured window.
    pub async fn insights(&self, user_id: Uuid) -> StoreResult<Insights> {
        self.records
            .insights(user_id, self.config.journal.window_days)
            .await
    }

    /// Forecast of the configured length.
    pub async fn forecast(&self, location: &str) -> Result<ForecastBundle, WeatherError> {
        self.weather
            .fetch_forecast(location, self.config.weather.forecast_days)
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use moodcast_store::{NewEmotion, NewUser, StoreSource};

    fn offline_config(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.config_dir = dir.to_path_buf();
        config.remote.url = "http://127.0.0.1:9".to_string();
        config.remote.service_key = None;
        config.weather.api_key = None;
        config
    }

    #[tokio::test]
    async fn test_offline_app_journals_locally() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(offline_config(dir.path())).unwrap();

        let user = app
            .records()
            .create_user(NewUser {
                email: "ada@example.com".to_string(),
                name: "Ada".to_string(),
                password: "correct horse".to_string(),
                weather_preferences: Default::default(),
            })
            .await
            .unwrap();
        assert_eq!(user.source, StoreSource::Fallback);
        assert_eq!(app.local_user_count().unwrap(), 1);

        let entry = app
            .records()
            .create_emotion(NewEmotion {
                user_id: user.value.id,
                weather_log_id: None,
                emotion_type: "calm".to_string(),
                intensity: 5,
                notes: None,
                weather_liked: None,
            })
            .await
            .unwrap();
        assert!(entry.is_fallback());

        let insights = app.insights(user.value.id).await.unwrap();
        assert_eq!(insights.total_entries, 1);

        let entries = app.recent_entries(user.value.id).await.unwrap();
        assert_eq!(entries, vec![entry.value]);

        assert!(dir.path().join("moodcast.db").exists());
        assert!(dir.path().join("weather_cache.db").exists());
    }

    #[tokio::test]
    async fn test_offline_weather_without_cache_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(offline_config(dir.path())).unwrap();

        let result = app.weather().fetch_current("London", false).await;
        assert!(matches!(
            result,
            Err(moodcast_weather::WeatherError::UpstreamUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_journal_listing_honours_configured_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = offline_config(dir.path());
        config.journal.list_limit = 2;
        let app = App::new(config).unwrap();

        let user = app
            .records()
            .create_user(NewUser {
                email: "grace@example.com".to_string(),
                name: "Grace".to_string(),
                password: "battery staple".to_string(),
                weather_preferences: Default::default(),
            })
            .await
            .unwrap();
        for intensity in [3, 6, 9] {
            app.records()
                .create_emotion(NewEmotion {
                    user_id: user.value.id,
                    weather_log_id: None,
                    emotion_type: "content".to_string(),
                    intensity,
                    notes: None,
                    weather_liked: Some(true),
                })
                .await
                .unwrap();
        }

        assert_eq!(app.recent_entries(user.value.id).await.unwrap().len(), 2);
        // Insights scan the whole window, not the listing limit.
        assert_eq!(app.insights(user.value.id).await.unwrap().total_entries, 3);
    }

    #[tokio::test]
    async fn test_forecast_without_key_is_not_configured() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::new(offline_config(dir.path())).unwrap();

        let result = app.forecast("London").await;
        assert!(matches!(result, Err(WeatherError::NotConfigured)));
    }

    #[test]
    fn test_unopenable_records_path_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "").unwrap();

        let mut config = offline_config(dir.path());
        config.storage.records_path = Some(blocker.join("moodcast.db"));

        let err = App::new(config).err().unwrap();
        assert!(matches!(err, AppError::Other(_)));
        assert_eq!(
            err.user_message(),
            "An unexpected error occurred. Please try again."
        );
    }
}
