//! Integration tests for the weather fetch protocol.
//!
//! The upstream is a wiremock server; the cache is an on-disk SQLite file in a
//! temp directory.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use moodcast_weather::{
    Coordinates, FreshnessCache, WeatherError, WeatherObservation, WeatherProvider,
    WeatherService, WeatherSource, STALE_WARNING,
};
use parking_lot::Mutex;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn current_body(name: &str, temp_c: f64) -> serde_json::Value {
    serde_json::json!({
        "location": {
            "name": name, "region": "", "country": "UK",
            "lat": 51.52, "lon": -0.11,
            "localtime_epoch": Utc::now().timestamp()
        },
        "current": {
            "temp_c": temp_c, "humidity": 70, "pressure_mb": 1010.0,
            "condition": {"text": "Sunny", "icon": "", "code": 1000},
            "wind_kph": 5.0, "wind_dir": "N", "uv": 4.0
        }
    })
}

fn stale_observation(key: &str, hours_old: i64) -> WeatherObservation {
    WeatherObservation {
        location_key: key.to_string(),
        location_name: "London".to_string(),
        coordinates: Coordinates {
            latitude: 51.52,
            longitude: -0.11,
        },
        temperature: 9.0,
        humidity: 90,
        pressure: 1002.0,
        condition_text: "Overcast".to_string(),
        condition_code: 1009,
        wind_speed: 20.0,
        wind_direction: "W".to_string(),
        uv_index: 0.0,
        recorded_at: Utc::now() - Duration::hours(hours_old),
    }
}

struct Harness {
    _dir: TempDir,
    cache: Arc<Mutex<FreshnessCache>>,
    service: WeatherService,
}

fn harness(server: &MockServer) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let cache = FreshnessCache::new(dir.path().join("weather.db")).unwrap();
    let cache = Arc::new(Mutex::new(cache));
    let provider = WeatherProvider::with_base_url(
        &server.uri(),
        Some("test-key".to_string()),
        std::time::Duration::from_secs(5),
    )
    .unwrap();
    let service = WeatherService::new(provider, Arc::clone(&cache), Duration::minutes(60));
    Harness {
        _dir: dir,
        cache,
        service,
    }
}

#[tokio::test]
async fn test_second_fetch_is_served_from_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body("London", 18.0)))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(&server);

    let first = h.service.fetch_current("London", false).await.unwrap();
    assert_eq!(first.source, WeatherSource::Api);
    assert!(first.cached);

    let second = h.service.fetch_current("  london ", false).await.unwrap();
    assert_eq!(second.source, WeatherSource::Cache);
    assert_eq!(second.observation.temperature, 18.0);
    assert_eq!(second.warning, None);
}

#[tokio::test]
async fn test_force_refresh_skips_fresh_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body("London", 18.0)))
        .expect(2)
        .mount(&server)
        .await;
    let h = harness(&server);

    h.service.fetch_current("London", false).await.unwrap();
    let refreshed = h.service.fetch_current("London", true).await.unwrap();
    assert_eq!(refreshed.source, WeatherSource::Api);
    assert_eq!(h.cache.lock().observation_count().unwrap(), 2);
}

#[tokio::test]
async fn test_stale_cache_is_refetched() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .and(query_param("q", "London"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body("London", 21.0)))
        .expect(1)
        .mount(&server)
        .await;
    let h = harness(&server);
    h.cache.lock().put(&stale_observation("london", 2)).unwrap();

    let fetched = h.service.fetch_current("London", false).await.unwrap();
    assert_eq!(fetched.source, WeatherSource::Api);
    assert_eq!(fetched.observation.temperature, 21.0);

    let history = h.service.history("London", 10).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].temperature, 21.0);
}

#[tokio::test]
async fn test_upstream_failure_serves_stale_cache() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let h = harness(&server);
    h.cache.lock().put(&stale_observation("london", 5)).unwrap();

    let fetched = h.service.fetch_current("London", false).await.unwrap();
    assert_eq!(fetched.source, WeatherSource::Fallback);
    assert_eq!(fetched.warning.as_deref(), Some(STALE_WARNING));
    assert_eq!(fetched.observation.temperature, 9.0);
}

#[tokio::test]
async fn test_upstream_failure_without_cache_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/current.json"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let h = harness(&server);

    let err = h.service.fetch_current("London", false).await.unwrap_err();
    assert!(matches!(err, WeatherError::UpstreamUnavailable(_)));
    assert_eq!(h.cache.lock().observation_count().unwrap(), 0);
}

#[tokio::test]
async fn test_forecast_is_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/forecast.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": {"name": "London", "lat": 51.52, "lon": -0.11},
            "forecast": {"forecastday": []}
        })))
        .expect(2)
        .mount(&server)
        .await;
    let h = harness(&server);

    h.service.fetch_forecast("London", 3).await.unwrap();
    h.service.fetch_forecast("London", 3).await.unwrap();
    assert_eq!(h.cache.lock().observation_count().unwrap(), 0);
}
