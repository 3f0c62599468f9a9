//! Record types shared by the local and remote stores.
//!
//! `StoredUser` is the storage-facing shape (it carries the credential digest);
//! `User` is what callers get back and never carries it.

use std::collections::BTreeSet;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unordered set of weather preference tags (e.g. "sunny", "snow").
pub type WeatherPreferences = BTreeSet<String>;

/// Lowest accepted emotion intensity.
pub const MIN_INTENSITY: u8 = 1;

/// Highest accepted emotion intensity.
pub const MAX_INTENSITY: u8 = 10;

/// A user as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub weather_preferences: WeatherPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user as persisted, including the credential digest.
///
/// An empty digest marks a record that was mirrored without its credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub credential_digest: String,
    pub weather_preferences: WeatherPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredUser {
    /// Drop the credential digest.
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            email: self.email,
            name: self.name,
            weather_preferences: self.weather_preferences,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.credential_digest.is_empty()
    }
}

impl From<StoredUser> for User {
    fn from(stored: StoredUser) -> Self {
        stored.into_user()
    }
}

/// Registration request.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password: String,
    pub weather_preferences: WeatherPreferences,
}

/// A journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weather_log_id: Option<String>,
    pub emotion_type: String,
    pub intensity: u8,
    pub notes: Option<String>,
    pub weather_liked: Option<bool>,
    pub created_at: DateTime<Utc>,
}

/// Request to record a new emotion entry.
#[derive(Debug, Clone)]
pub struct NewEmotion {
    pub user_id: Uuid,
    pub weather_log_id: Option<String>,
    pub emotion_type: String,
    pub intensity: u8,
    pub notes: Option<String>,
    pub weather_liked: Option<bool>,
}

impl NewEmotion {
    /// Assign an id and creation time.
    pub fn into_entry(self, id: Uuid, created_at: DateTime<Utc>) -> EmotionEntry {
        EmotionEntry {
            id,
            user_id: self.user_id,
            weather_log_id: self.weather_log_id,
            emotion_type: self.emotion_type,
            intensity: self.intensity,
            notes: self.notes,
            weather_liked: self.weather_liked,
            created_at,
        }
    }
}

/// Current time at the precision both stores persist.
///
/// Records stamped with this compare equal to their stored copies.
pub fn record_timestamp() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp the way both stores persist it.
///
/// Fixed microsecond precision with a `Z` suffix keeps text ordering equal to
/// time ordering.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
