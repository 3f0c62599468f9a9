//! Remote system-of-record client (PostgREST over HTTP).
//!
//! Every failure that is not a recognizable constraint rejection comes back as
//! `StoreError::Remote`, which the synchronizer treats as a reason to use the
//! local store instead.

use std::collections::BTreeSet;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use moodcast_core::{NetworkError, RemoteConfig, ReqwestErrorExt};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use url::Url;
use uuid::Uuid;

use crate::backend::{StoreError, StoreResult};
use crate::types::{format_timestamp, EmotionEntry, StoredUser, WeatherPreferences};

const USERS_TABLE: &str = "users";
const EMOTIONS_TABLE: &str = "emotions";

/// PostgreSQL check-constraint violation.
const PG_CHECK_VIOLATION: &str = "23514";

/// PostgreSQL unique-constraint violation.
const PG_UNIQUE_VIOLATION: &str = "23505";

/// User row as the remote sends it.
#[derive(Debug, Deserialize)]
struct RemoteUserRow {
    id: Uuid,
    email: String,
    name: String,
    #[serde(default)]
    password_hash: Option<String>,
    #[serde(default)]
    preferred_weather: Option<PreferencesField>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RemoteUserRow> for StoredUser {
    fn from(row: RemoteUserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            name: row.name,
            credential_digest: row.password_hash.unwrap_or_default(),
            weather_preferences: row
                .preferred_weather
                .map(PreferencesField::into_preferences)
                .unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// User row as we write it. Preferences travel as a JSON-encoded string.
#[derive(Debug, Serialize)]
struct NewRemoteUserRow<'a> {
    id: Uuid,
    email: &'a str,
    name: &'a str,
    password_hash: &'a str,
    preferred_weather: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Serialize)]
struct PreferencesPatch {
    preferred_weather: String,
    updated_at: String,
}

/// The shapes `preferred_weather` has been stored in remotely.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PreferencesField {
    List(Vec<String>),
    Map(serde_json::Map<String, serde_json::Value>),
    Encoded(String),
}

impl PreferencesField {
    fn into_preferences(self) -> WeatherPreferences {
        match self {
            Self::List(items) => items.into_iter().collect(),
            Self::Map(map) => map
                .into_iter()
                .filter_map(|(key, value)| match value {
                    serde_json::Value::String(tag) => Some(tag),
                    serde_json::Value::Bool(true) => Some(key),
                    _ => None,
                })
                .collect(),
            Self::Encoded(text) => match serde_json::from_str::<PreferencesField>(&text) {
                Ok(Self::Encoded(_)) | Err(_) => text
                    .split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect::<BTreeSet<_>>(),
                Ok(inner) => inner.into_preferences(),
            },
        }
    }
}

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Async client for the remote record store.
#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base_url: String,
    service_key: Option<String>,
}

impl RemoteStore {
    /// Create a client from configuration.
    ///
    /// An unconfigured remote still yields a client; its calls fail with
    /// `NetworkError::NotConfigured` so callers fall back locally.
    pub fn new(config: &RemoteConfig) -> anyhow::Result<Self> {
        let service_key = if config.is_configured() {
            config.service_key.clone()
        } else {
            None
        };
        Self::with_base_url(
            &config.url,
            service_key,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// Create a client against an explicit base URL.
    pub fn with_base_url(
        base_url: &str,
        service_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let parsed = Url::parse(base_url).context("Invalid remote store URL")?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            service_key,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.service_key.is_some()
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    /// Attach auth headers to a request.
    fn build_request(&self, req: RequestBuilder) -> StoreResult<RequestBuilder> {
        let key = self.service_key.as_deref().ok_or_else(|| {
            StoreError::Remote(NetworkError::NotConfigured("remote store".to_string()))
        })?;
        Ok(req
            .header("apikey", key)
            .header(header::AUTHORIZATION, format!("Bearer {}", key))
            .header(header::ACCEPT, "application/json"))
    }

    /// Map a non-success response to a store error.
    async fn check_response(&self, response: Response) -> StoreResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let body: PostgrestError = serde_json::from_str(&text).unwrap_or_default();
        let detail = body.message.clone().unwrap_or_else(|| text.clone());

        // Only uniqueness and check violations are answers. Other conflicts
        // (e.g. a foreign key to a user the remote has not seen) are outages
        // from the caller's point of view.
        match (status, body.code.as_deref()) {
            (_, Some(PG_UNIQUE_VIOLATION)) | (StatusCode::CONFLICT, None) => {
                Err(StoreError::DuplicateEmail(detail))
            }
            (StatusCode::BAD_REQUEST, Some(PG_CHECK_VIOLATION)) => {
                Err(StoreError::ConstraintViolation(detail))
            }
            _ => Err(StoreError::Remote(NetworkError::ServerError {
                status: status.as_u16(),
                message: detail,
            })),
        }
    }

    async fn send(&self, req: RequestBuilder) -> StoreResult<Response> {
        let response = self
            .build_request(req)?
            .send()
            .await
            .map_err(|e| e.into_network_error())?;
        self.check_response(response).await
    }

    async fn rows<T: serde::de::DeserializeOwned>(response: Response) -> StoreResult<Vec<T>> {
        response
            .json::<Vec<T>>()
            .await
            .map_err(|e| StoreError::Remote(NetworkError::InvalidResponse(e.to_string())))
    }

    /// Insert a user, returning the stored representation.
    #[instrument(skip(self, user), fields(id = %user.id), level = "info")]
    pub async fn insert_user(&self, user: &StoredUser) -> StoreResult<StoredUser> {
        let row = NewRemoteUserRow {
            id: user.id,
            email: &user.email,
            name: &user.name,
            password_hash: &user.credential_digest,
            preferred_weather: encode_preferences(&user.weather_preferences)?,
            created_at: format_timestamp(&user.created_at),
            updated_at: format_timestamp(&user.updated_at),
        };

        let request = self
            .client
            .post(self.table_url(USERS_TABLE))
            .header("Prefer", "return=representation")
            .json(&row);

        let response = self.send(request).await.map_err(|e| match e {
            StoreError::DuplicateEmail(_) => StoreError::DuplicateEmail(user.email.clone()),
            other => other,
        })?;
        let mut rows: Vec<RemoteUserRow> = Self::rows(response).await?;

        tracing::debug!("Remote accepted user {}", user.id);
        Ok(match rows.pop() {
            Some(row) => row.into(),
            None => user.clone(),
        })
    }

    #[instrument(skip(self), level = "info")]
    pub async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        self.find_user("email", email).await
    }

    #[instrument(skip(self), level = "info")]
    pub async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<StoredUser>> {
        self.find_user("id", &id.to_string()).await
    }

    async fn find_user(&self, column: &str, value: &str) -> StoreResult<Option<StoredUser>> {
        let request = self.client.get(self.table_url(USERS_TABLE)).query(&[
            ("select", "*".to_string()),
            (column, format!("eq.{}", value)),
            ("limit", "1".to_string()),
        ]);

        let response = self.send(request).await?;
        let rows: Vec<RemoteUserRow> = Self::rows(response).await?;
        Ok(rows.into_iter().next().map(StoredUser::from))
    }

    /// Replace a user's preferences.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` when no remote row matched.
    #[instrument(skip(self, preferences), level = "info")]
    pub async fn update_user_preferences(
        &self,
        id: Uuid,
        preferences: &WeatherPreferences,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let patch = PreferencesPatch {
            preferred_weather: encode_preferences(preferences)?,
            updated_at: format_timestamp(&updated_at),
        };

        let request = self
            .client
            .patch(self.table_url(USERS_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation")
            .json(&patch);

        let response = self.send(request).await?;
        let rows: Vec<serde_json::Value> = Self::rows(response).await?;
        if rows.is_empty() {
            return Err(StoreError::not_found(id.to_string()));
        }
        Ok(())
    }

    /// Insert an emotion entry, returning the stored representation.
    #[instrument(skip(self, entry), fields(id = %entry.id), level = "info")]
    pub async fn insert_emotion(&self, entry: &EmotionEntry) -> StoreResult<EmotionEntry> {
        let request = self
            .client
            .post(self.table_url(EMOTIONS_TABLE))
            .header("Prefer", "return=representation")
            .json(entry);

        let response = self.send(request).await.map_err(|e| match e {
            StoreError::DuplicateEmail(detail) => StoreError::ConstraintViolation(detail),
            other => other,
        })?;
        let mut rows: Vec<EmotionEntry> = Self::rows(response).await?;
        Ok(rows.pop().unwrap_or_else(|| entry.clone()))
    }

    /// Entries of a user created at or after `since`, newest first.
    #[instrument(skip(self), level = "info")]
    pub async fn list_emotions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<EmotionEntry>> {
        let request = self.client.get(self.table_url(EMOTIONS_TABLE)).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{}", user_id)),
            ("created_at", format!("gte.{}", format_timestamp(&since))),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);

        let response = self.send(request).await?;
        let entries: Vec<EmotionEntry> = Self::rows(response).await?;
        tracing::debug!("Remote returned {} emotion entries", entries.len());
        Ok(entries)
    }

    /// Delete an entry. Returns whether a remote row was removed.
    #[instrument(skip(self), level = "info")]
    pub async fn delete_emotion(&self, id: Uuid) -> StoreResult<bool> {
        let request = self
            .client
            .delete(self.table_url(EMOTIONS_TABLE))
            .query(&[("id", format!("eq.{}", id))])
            .header("Prefer", "return=representation");

        let response = self.send(request).await?;
        let rows: Vec<serde_json::Value> = Self::rows(response).await?;
        Ok(!rows.is_empty())
    }
}

fn encode_preferences(preferences: &WeatherPreferences) -> StoreResult<String> {
    serde_json::to_string(preferences)
        .map_err(|e| StoreError::validation(format!("Unencodable preferences: {}", e)))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use crate::types::record_timestamp;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RemoteStore {
        RemoteStore::with_base_url(
            &server.uri(),
            Some("service-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    fn user_json(id: Uuid, email: &str, prefs: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": id,
            "email": email,
            "name": "Ada",
            "password_hash": "$argon2id$fake",
            "preferred_weather": prefs,
            "created_at": "2026-03-01T10:00:00.000000+00:00",
            "updated_at": "2026-03-01T10:00:00+00:00"
        })
    }

    fn sample_user() -> StoredUser {
        let now = record_timestamp();
        StoredUser {
            id: Uuid::new_v4(),
            email: "ada@example.com".to_string(),
            name: "Ada".to_string(),
            credential_digest: "digest".to_string(),
            weather_preferences: WeatherPreferences::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_entry() -> EmotionEntry {
        EmotionEntry {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            weather_log_id: None,
            emotion_type: "happy".to_string(),
            intensity: 5,
            notes: None,
            weather_liked: None,
            created_at: record_timestamp(),
        }
    }

    #[test]
    fn test_preferences_accepts_every_shape() {
        let expected: WeatherPreferences =
            ["rain".to_string(), "sunny".to_string()].into_iter().collect();

        for raw in [
            serde_json::json!(["sunny", "rain"]),
            serde_json::json!("[\"sunny\",\"rain\"]"),
            serde_json::json!({"sunny": true, "rain": true, "snow": false}),
            serde_json::json!("sunny, rain"),
        ] {
            let field: PreferencesField = serde_json::from_value(raw.clone()).unwrap();
            assert_eq!(field.into_preferences(), expected, "shape {}", raw);
        }
    }

    #[tokio::test]
    async fn test_find_user_by_email() {
        let server = MockServer::start().await;
        let id = Uuid::new_v4();

        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .and(query_param("email", "eq.ada@example.com"))
            .and(header("apikey", "service-key"))
            .and(header("Authorization", "Bearer service-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                user_json(id, "ada@example.com", serde_json::json!("[\"sunny\"]"))
            ])))
            .mount(&server)
            .await;

        let user = client(&server)
            .find_user_by_email("ada@example.com")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(user.id, id);
        assert_eq!(user.credential_digest, "$argon2id$fake");
        assert!(user.weather_preferences.contains("sunny"));
    }

    #[tokio::test]
    async fn test_empty_result_is_a_miss() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let found = client(&server).find_user_by_id(Uuid::new_v4()).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_conflict_is_duplicate_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .and(header("Prefer", "return=representation"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint \"users_email_key\""
            })))
            .mount(&server)
            .await;

        let result = client(&server).insert_user(&sample_user()).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail(ref e)) if e == "ada@example.com"));
    }

    #[tokio::test]
    async fn test_foreign_key_conflict_is_fallback_trigger() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/emotions"))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "code": "23503",
                "message": "insert or update on table \"emotions\" violates foreign key constraint \"emotions_user_id_fkey\""
            })))
            .mount(&server)
            .await;

        let err = client(&server).insert_emotion(&sample_entry()).await.unwrap_err();
        assert!(err.is_fallback_trigger());
        assert!(matches!(
            err,
            StoreError::Remote(NetworkError::ServerError { status: 409, .. })
        ));
    }

    #[tokio::test]
    async fn test_bare_conflict_on_users_is_duplicate_email() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;

        let result = client(&server).insert_user(&sample_user()).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail(ref e)) if e == "ada@example.com"));
    }

    #[tokio::test]
    async fn test_check_violation_is_constraint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/emotions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "23514",
                "message": "new row violates check constraint \"emotions_intensity_check\""
            })))
            .mount(&server)
            .await;

        let result = client(&server).insert_emotion(&sample_entry()).await;
        assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_server_error_is_fallback_trigger() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/emotions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_emotions(Uuid::new_v4(), Utc::now(), 10)
            .await
            .unwrap_err();
        assert!(err.is_fallback_trigger());
        assert!(matches!(
            err,
            StoreError::Remote(NetworkError::ServerError { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_unconfigured_remote_fails_without_request() {
        let store =
            RemoteStore::with_base_url("http://127.0.0.1:9", None, Duration::from_secs(1)).unwrap();
        assert!(!store.is_configured());

        let err = store.find_user_by_email("ada@example.com").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Remote(NetworkError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn test_update_preferences_empty_patch_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/rest/v1/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let result = client(&server)
            .update_user_preferences(Uuid::new_v4(), &WeatherPreferences::new(), Utc::now())
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
