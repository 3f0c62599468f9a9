//! SQLite-based record storage implementation.
//!
//! `SqliteRecordStore` is the embedded, always-available side of the
//! persistence layer. It enforces the email uniqueness and intensity range
//! constraints itself, so a record written during a remote outage is held to
//! the same rules.

use chrono::{DateTime, Utc};
use moodcast_core::{DatabaseError, RusqliteErrorExt};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

use crate::backend::{validate_intensity, RecordBackend, StoreError, StoreResult};
use crate::types::{format_timestamp, EmotionEntry, StoredUser, WeatherPreferences};

const SCHEMA_VERSION: i32 = 1;

const USER_COLUMNS: &str =
    "id, email, name, credential_digest, preferred_weather, created_at, updated_at";

const EMOTION_COLUMNS: &str =
    "id, user_id, weather_log_id, emotion_type, intensity, notes, weather_liked, created_at";

/// SQLite-based record storage.
pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Open or create a record store at the given path.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn new<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory record store.
    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> anyhow::Result<()> {
        self.conn
            .execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)", [])?;

        let version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .optional()?
            .unwrap_or(0);

        if version > SCHEMA_VERSION {
            anyhow::bail!(
                "Records database schema v{} is newer than supported v{}",
                version,
                SCHEMA_VERSION
            );
        }

        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT UNIQUE NOT NULL,
                name TEXT NOT NULL,
                credential_digest TEXT NOT NULL DEFAULT '',
                preferred_weather TEXT NOT NULL DEFAULT '[]',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS emotions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                weather_log_id TEXT,
                emotion_type TEXT NOT NULL,
                intensity INTEGER NOT NULL CHECK (intensity >= 1 AND intensity <= 10),
                notes TEXT,
                weather_liked INTEGER DEFAULT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_emotions_user_created ON emotions(user_id, created_at DESC);
            "#,
        )?;

        if version < SCHEMA_VERSION {
            self.conn.execute("DELETE FROM schema_version", [])?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<StoredUser> {
        let id: String = row.get(0)?;
        let preferences_str: String = row.get(4)?;
        let created_at_str: String = row.get(5)?;
        let updated_at_str: String = row.get(6)?;

        Ok(StoredUser {
            id: parse_uuid(0, &id)?,
            email: row.get(1)?,
            name: row.get(2)?,
            credential_digest: row.get(3)?,
            weather_preferences: serde_json::from_str(&preferences_str).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
            })?,
            created_at: parse_timestamp(5, &created_at_str)?,
            updated_at: parse_timestamp(6, &updated_at_str)?,
        })
    }

    fn row_to_emotion(row: &rusqlite::Row) -> rusqlite::Result<EmotionEntry> {
        let id: String = row.get(0)?;
        let user_id: String = row.get(1)?;
        let weather_liked: Option<i32> = row.get(6)?;
        let created_at_str: String = row.get(7)?;

        Ok(EmotionEntry {
            id: parse_uuid(0, &id)?,
            user_id: parse_uuid(1, &user_id)?,
            weather_log_id: row.get(2)?,
            emotion_type: row.get(3)?,
            intensity: row.get(4)?,
            notes: row.get(5)?,
            weather_liked: weather_liked.map(|v| v != 0),
            created_at: parse_timestamp(7, &created_at_str)?,
        })
    }

    fn query_user(&self, column: &str, value: &str) -> StoreResult<Option<StoredUser>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1 LIMIT 1");
        self.conn
            .query_row(&sql, params![value], Self::row_to_user)
            .optional()
            .map_err(storage_error)
    }

    /// Number of users stored locally.
    pub fn user_count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
            .map_err(storage_error)?;
        Ok(count as usize)
    }

    /// Number of emotion entries stored locally.
    pub fn emotion_count(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM emotions", [], |row| row.get(0))
            .map_err(storage_error)?;
        Ok(count as usize)
    }
}

impl RecordBackend for SqliteRecordStore {
    fn insert_user(&self, user: &StoredUser) -> StoreResult<()> {
        let preferences = encode_preferences(&user.weather_preferences)?;
        self.conn
            .execute(
                &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    user.id.to_string(),
                    user.email,
                    user.name,
                    user.credential_digest,
                    preferences,
                    format_timestamp(&user.created_at),
                    format_timestamp(&user.updated_at),
                ],
            )
            .map_err(|e| write_error(e, &user.email))?;

        tracing::debug!("Inserted local user {}", user.id);
        Ok(())
    }

    fn upsert_user(&self, user: &StoredUser) -> StoreResult<()> {
        let preferences = encode_preferences(&user.weather_preferences)?;
        let id = user.id.to_string();
        let tx = self.conn.unchecked_transaction().map_err(storage_error)?;

        // The incoming record owns both its id and its email. A local row
        // sharing either one is the same user and is replaced; the row
        // matching by email takes precedence.
        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT id, credential_digest FROM users
                 WHERE email = ?1 OR id = ?2
                 ORDER BY (email = ?1) DESC
                 LIMIT 1",
                params![user.email, id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(storage_error)?;

        let digest = match &existing {
            Some((_, local_digest)) if user.credential_digest.is_empty() => local_digest.clone(),
            _ => user.credential_digest.clone(),
        };

        tx.execute(
            "DELETE FROM users WHERE email = ?1 OR id = ?2",
            params![user.email, id],
        )
        .map_err(storage_error)?;
        tx.execute(
            &format!("INSERT INTO users ({USER_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                id,
                user.email,
                user.name,
                digest,
                preferences,
                format_timestamp(&user.created_at),
                format_timestamp(&user.updated_at),
            ],
        )
        .map_err(|e| write_error(e, &user.email))?;

        if let Some((previous_id, _)) = existing.filter(|(previous, _)| *previous != id) {
            let moved = tx
                .execute(
                    "UPDATE emotions SET user_id = ?1 WHERE user_id = ?2",
                    params![id, previous_id],
                )
                .map_err(storage_error)?;
            tracing::debug!(
                "Re-keyed local user {} to {} ({} entries)",
                previous_id,
                id,
                moved
            );
        }

        tx.commit().map_err(storage_error)?;
        tracing::debug!("Mirrored user {} into local store", user.id);
        Ok(())
    }

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        self.query_user("email", email)
    }

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<StoredUser>> {
        self.query_user("id", &id.to_string())
    }

    fn update_user_preferences(
        &self,
        id: Uuid,
        preferences: &WeatherPreferences,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let encoded = encode_preferences(preferences)?;
        let changed = self
            .conn
            .execute(
                "UPDATE users SET preferred_weather = ?1, updated_at = ?2 WHERE id = ?3",
                params![encoded, format_timestamp(&updated_at), id.to_string()],
            )
            .map_err(storage_error)?;

        if changed == 0 {
            return Err(StoreError::not_found(id.to_string()));
        }
        tracing::debug!("Updated local preferences for user {}", id);
        Ok(())
    }

    fn insert_emotion(&self, entry: &EmotionEntry) -> StoreResult<()> {
        validate_intensity(entry.intensity)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO emotions ({EMOTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params_from_iter(emotion_params(entry)),
            )
            .map_err(|e| write_error(e, ""))?;

        tracing::debug!("Inserted local emotion {}", entry.id);
        Ok(())
    }

    fn upsert_emotion(&self, entry: &EmotionEntry) -> StoreResult<bool> {
        validate_intensity(entry.intensity)?;
        let written = self
            .conn
            .execute(
                &format!(
                    "INSERT OR IGNORE INTO emotions ({EMOTION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params_from_iter(emotion_params(entry)),
            )
            .map_err(|e| write_error(e, ""))?;
        Ok(written > 0)
    }

    fn list_emotions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<EmotionEntry>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {EMOTION_COLUMNS}
                 FROM emotions
                 WHERE user_id = ?1 AND created_at >= ?2
                 ORDER BY created_at DESC
                 LIMIT ?3"
            ))
            .map_err(storage_error)?;

        let rows = stmt
            .query_map(
                params![user_id.to_string(), format_timestamp(&since), i64::from(limit)],
                Self::row_to_emotion,
            )
            .map_err(storage_error)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(storage_error)
    }

    fn delete_emotion(&self, id: Uuid) -> StoreResult<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM emotions WHERE id = ?1", params![id.to_string()])
            .map_err(storage_error)?;

        tracing::debug!("Deleted {} local emotion row(s) for {}", removed, id);
        Ok(removed > 0)
    }
}

fn emotion_params(entry: &EmotionEntry) -> [Box<dyn rusqlite::ToSql + '_>; 8] {
    [
        Box::new(entry.id.to_string()),
        Box::new(entry.user_id.to_string()),
        Box::new(entry.weather_log_id.as_deref()),
        Box::new(entry.emotion_type.as_str()),
        Box::new(entry.intensity),
        Box::new(entry.notes.as_deref()),
        Box::new(entry.weather_liked.map(i32::from)),
        Box::new(format_timestamp(&entry.created_at)),
    ]
}

fn encode_preferences(preferences: &WeatherPreferences) -> StoreResult<String> {
    serde_json::to_string(preferences)
        .map_err(|e| StoreError::storage(format!("Failed to encode preferences: {}", e)))
}

fn parse_uuid(column: usize, value: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn storage_error(e: rusqlite::Error) -> StoreError {
    StoreError::storage(e.into_database_error().to_string())
}

/// Classify a failed write, surfacing constraint violations by kind.
fn write_error(e: rusqlite::Error, email: &str) -> StoreError {
    let extended = match &e {
        rusqlite::Error::SqliteFailure(err, _) => Some(err.extended_code),
        _ => None,
    };
    let message = e.to_string();

    match e.into_database_error() {
        DatabaseError::Constraint(detail) => match extended {
            Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) if message.contains("users.email") => {
                StoreError::DuplicateEmail(email.to_string())
            }
            _ => StoreError::ConstraintViolation(detail),
        },
        other => StoreError::storage(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::types::record_timestamp;
    use chrono::Duration;

    fn create_test_store() -> SqliteRecordStore {
        SqliteRecordStore::in_memory().expect("Failed to create in-memory store")
    }

    fn user(email: &str) -> StoredUser {
        let now = record_timestamp();
        StoredUser {
            id: Uuid::new_v4(),
            email: email.to_string(),
            name: "Test User".to_string(),
            credential_digest: "digest".to_string(),
            weather_preferences: ["sunny".to_string(), "windy".to_string()].into_iter().collect(),
            created_at: now,
            updated_at: now,
        }
    }

    fn emotion(user_id: Uuid, intensity: u8, created_at: DateTime<Utc>) -> EmotionEntry {
        EmotionEntry {
            id: Uuid::new_v4(),
            user_id,
            weather_log_id: None,
            emotion_type: "happy".to_string(),
            intensity,
            notes: None,
            weather_liked: Some(true),
            created_at,
        }
    }

    #[test]
    fn test_insert_and_find_user() {
        let store = create_test_store();
        let u = user("ada@example.com");
        store.insert_user(&u).unwrap();

        let by_email = store.find_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, u.id);
        assert_eq!(by_email.credential_digest, "digest");
        assert_eq!(by_email.weather_preferences, u.weather_preferences);

        let by_id = store.find_user_by_id(u.id).unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");
    }

    #[test]
    fn test_email_lookup_is_case_sensitive() {
        let store = create_test_store();
        store.insert_user(&user("Ada@example.com")).unwrap();
        assert!(store.find_user_by_email("ada@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = create_test_store();
        store.insert_user(&user("ada@example.com")).unwrap();

        let result = store.insert_user(&user("ada@example.com"));
        assert!(matches!(result, Err(StoreError::DuplicateEmail(ref e)) if e == "ada@example.com"));
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_refreshes_but_keeps_digest() {
        let store = create_test_store();
        let original = user("ada@example.com");
        store.insert_user(&original).unwrap();

        let mut mirrored = original.clone();
        mirrored.name = "Ada L.".to_string();
        mirrored.credential_digest = String::new();
        mirrored.weather_preferences = ["snow".to_string()].into_iter().collect();
        store.upsert_user(&mirrored).unwrap();

        let found = store.find_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(found.name, "Ada L.");
        assert_eq!(found.credential_digest, "digest");
        assert!(found.weather_preferences.contains("snow"));
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_takes_incoming_id_for_known_email() {
        let store = create_test_store();
        let local = user("ada@example.com");
        store.insert_user(&local).unwrap();
        let entry = emotion(local.id, 5, record_timestamp());
        store.insert_emotion(&entry).unwrap();

        let mut incoming = local.clone();
        incoming.id = Uuid::new_v4();
        incoming.credential_digest = String::new();
        store.upsert_user(&incoming).unwrap();

        let found = store.find_user_by_id(incoming.id).unwrap().unwrap();
        assert_eq!(found.email, "ada@example.com");
        assert_eq!(found.credential_digest, "digest");
        assert!(store.find_user_by_id(local.id).unwrap().is_none());
        assert_eq!(store.user_count().unwrap(), 1);

        let listed = store
            .list_emotions(incoming.id, entry.created_at - Duration::days(1), 10)
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, entry.id);
    }

    #[test]
    fn test_upsert_takes_incoming_email_for_known_id() {
        let store = create_test_store();
        let local = user("old@example.com");
        store.insert_user(&local).unwrap();

        let mut incoming = local.clone();
        incoming.email = "new@example.com".to_string();
        store.upsert_user(&incoming).unwrap();

        assert!(store.find_user_by_email("old@example.com").unwrap().is_none());
        let found = store.find_user_by_email("new@example.com").unwrap().unwrap();
        assert_eq!(found.id, local.id);
        assert_eq!(store.user_count().unwrap(), 1);
    }

    #[test]
    fn test_upsert_inserts_missing_user() {
        let store = create_test_store();
        store.upsert_user(&user("new@example.com")).unwrap();
        assert!(store.find_user_by_email("new@example.com").unwrap().is_some());
    }

    #[test]
    fn test_update_preferences() {
        let store = create_test_store();
        let u = user("ada@example.com");
        store.insert_user(&u).unwrap();

        let later = u.updated_at + Duration::seconds(5);
        let prefs: WeatherPreferences = ["rain".to_string()].into_iter().collect();
        store.update_user_preferences(u.id, &prefs, later).unwrap();

        let found = store.find_user_by_id(u.id).unwrap().unwrap();
        assert_eq!(found.weather_preferences, prefs);
        assert!(found.updated_at > u.updated_at);
    }

    #[test]
    fn test_update_preferences_unknown_user() {
        let store = create_test_store();
        let result =
            store.update_user_preferences(Uuid::new_v4(), &WeatherPreferences::new(), Utc::now());
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_insert_emotion_rejects_out_of_range_intensity() {
        let store = create_test_store();
        let user_id = Uuid::new_v4();

        for bad in [0u8, 11] {
            let result = store.insert_emotion(&emotion(user_id, bad, Utc::now()));
            assert!(matches!(result, Err(StoreError::InvalidIntensity(v)) if v == bad));
        }
        assert_eq!(store.emotion_count().unwrap(), 0);
    }

    #[test]
    fn test_list_emotions_orders_filters_and_limits() {
        let store = create_test_store();
        let user_id = Uuid::new_v4();
        let other_user = Uuid::new_v4();
        let now = Utc::now();

        let old = emotion(user_id, 2, now - Duration::days(40));
        let boundary = emotion(user_id, 5, now - Duration::days(30));
        let recent = emotion(user_id, 7, now - Duration::hours(1));
        let newest = emotion(user_id, 9, now);
        for e in [&old, &boundary, &recent, &newest] {
            store.insert_emotion(e).unwrap();
        }
        store.insert_emotion(&emotion(other_user, 4, now)).unwrap();

        let since = now - Duration::days(30);
        let listed = store.list_emotions(user_id, since, 10).unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![newest.id, recent.id, boundary.id]);

        let capped = store.list_emotions(user_id, since, 2).unwrap();
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[0].id, newest.id);
    }

    #[test]
    fn test_emotion_round_trip_keeps_optional_fields() {
        let store = create_test_store();
        let mut entry = emotion(Uuid::new_v4(), 3, record_timestamp());
        entry.weather_log_id = Some("log-1".to_string());
        entry.notes = Some("grey skies".to_string());
        entry.weather_liked = Some(false);
        store.insert_emotion(&entry).unwrap();

        let mut unset = emotion(entry.user_id, 4, entry.created_at - Duration::minutes(1));
        unset.weather_liked = None;
        store.insert_emotion(&unset).unwrap();

        let listed = store
            .list_emotions(entry.user_id, entry.created_at - Duration::days(1), 10)
            .unwrap();
        assert_eq!(listed[0], entry);
        assert_eq!(listed[1].weather_liked, None);
    }

    #[test]
    fn test_upsert_emotion_ignores_existing() {
        let store = create_test_store();
        let entry = emotion(Uuid::new_v4(), 6, Utc::now());

        assert!(store.upsert_emotion(&entry).unwrap());
        assert!(!store.upsert_emotion(&entry).unwrap());
        assert_eq!(store.emotion_count().unwrap(), 1);
    }

    #[test]
    fn test_delete_emotion() {
        let store = create_test_store();
        let entry = emotion(Uuid::new_v4(), 6, Utc::now());
        store.insert_emotion(&entry).unwrap();

        assert!(store.delete_emotion(entry.id).unwrap());
        assert!(!store.delete_emotion(entry.id).unwrap());
        assert_eq!(store.emotion_count().unwrap(), 0);
    }

    #[test]
    fn test_storage_check_backs_up_validation() {
        let store = create_test_store();
        let result = store.conn.execute(
            "INSERT INTO emotions (id, user_id, emotion_type, intensity, created_at) VALUES ('a', 'b', 'sad', 42, 'now')",
            [],
        );
        assert!(matches!(
            result.map_err(|e| write_error(e, "")),
            Err(StoreError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn test_corrupt_timestamp_is_a_storage_error() {
        let store = create_test_store();
        let entry = emotion(Uuid::new_v4(), 5, record_timestamp());
        store.insert_emotion(&entry).unwrap();
        store
            .conn
            .execute("UPDATE emotions SET created_at = 'yesterday-ish'", [])
            .unwrap();

        let result = store.list_emotions(entry.user_id, entry.created_at - Duration::days(400), 10);
        assert!(matches!(result, Err(StoreError::Storage(_))));
    }

    #[test]
    fn test_reopen_on_disk_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("records.db");
        let u = user("disk@example.com");
        {
            let store = SqliteRecordStore::new(&path).unwrap();
            store.insert_user(&u).unwrap();
        }
        let reopened = SqliteRecordStore::new(&path).unwrap();
        assert_eq!(reopened.find_user_by_id(u.id).unwrap().unwrap().email, u.email);
    }
}
