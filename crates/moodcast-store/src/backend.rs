//! Record storage backend trait and error types.
//!
//! `RecordBackend` is the capability surface of the local store. The remote
//! store exposes the same operations asynchronously on `RemoteStore`.

use chrono::{DateTime, Utc};
use moodcast_core::NetworkError;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{EmotionEntry, StoredUser, WeatherPreferences, MAX_INTENSITY, MIN_INTENSITY};

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A user with this email already exists.
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// The addressed record does not exist.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Emotion intensity outside 1..=10.
    #[error("Intensity must be between 1 and 10, got {0}")]
    InvalidIntensity(u8),

    /// Both the remote and the local store rejected the operation.
    #[error("Persistence unavailable")]
    PersistenceUnavailable,

    /// Storage-level check failure not otherwise classified.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Request rejected before reaching any store.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The hashing capability failed.
    #[error("Credential error: {0}")]
    Credential(String),

    /// Local storage engine failure.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote transport or protocol failure.
    #[error("Remote store error: {0}")]
    Remote(#[from] NetworkError),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Whether this failure should send the operation down the other store.
    ///
    /// Constraint violations are answers, not outages, so they never trigger
    /// a fallback.
    pub fn is_fallback_trigger(&self) -> bool {
        matches!(
            self,
            Self::Remote(_) | Self::Storage(_) | Self::PersistenceUnavailable
        )
    }

    /// User-friendly error message for UI display.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::DuplicateEmail(_) => "An account with this email already exists.",
            Self::NotFound(_) => "The requested record was not found.",
            Self::InvalidIntensity(_) => "Intensity must be between 1 and 10.",
            Self::PersistenceUnavailable => "Storage is unavailable. Please try again later.",
            Self::ConstraintViolation(_) | Self::Validation(_) => {
                "The data was rejected. Check the values and try again."
            }
            Self::Credential(_) => "Could not process the password. Please try again.",
            Self::Storage(_) | Self::Remote(_) => "A data operation failed. Please try again.",
        }
    }
}

/// Result type for record store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for record storage backends.
///
/// Implementations don't need to be Sync - the synchronizer wraps the local
/// backend in a Mutex.
pub trait RecordBackend: Send {
    /// Insert a new user.
    ///
    /// # Errors
    /// Returns `StoreError::DuplicateEmail` if the email is taken.
    fn insert_user(&self, user: &StoredUser) -> StoreResult<()>;

    /// Insert or refresh a user from the system of record.
    ///
    /// Any stored row sharing the id or the email is replaced, so the incoming
    /// id and email both win. An empty credential digest never overwrites a
    /// stored one.
    fn upsert_user(&self, user: &StoredUser) -> StoreResult<()>;

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>>;

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<StoredUser>>;

    /// Replace a user's preferences and advance `updated_at`.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    fn update_user_preferences(
        &self,
        id: Uuid,
        preferences: &WeatherPreferences,
        updated_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Insert a new emotion entry.
    ///
    /// # Errors
    /// Returns `StoreError::InvalidIntensity` if intensity is outside 1..=10.
    fn insert_emotion(&self, entry: &EmotionEntry) -> StoreResult<()>;

    /// Insert an entry unless one with the same id exists. Returns whether a
    /// row was written.
    fn upsert_emotion(&self, entry: &EmotionEntry) -> StoreResult<bool>;

    /// Entries of a user with `created_at >= since`, newest first, at most `limit`.
    fn list_emotions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<EmotionEntry>>;

    /// Delete an entry. Returns whether a row was removed.
    fn delete_emotion(&self, id: Uuid) -> StoreResult<bool>;
}

/// Validate emotion intensity.
///
/// # Errors
/// Returns `StoreError::InvalidIntensity` outside `MIN_INTENSITY..=MAX_INTENSITY`.
pub fn validate_intensity(intensity: u8) -> StoreResult<()> {
    if (MIN_INTENSITY..=MAX_INTENSITY).contains(&intensity) {
        Ok(())
    } else {
        Err(StoreError::InvalidIntensity(intensity))
    }
}

/// Validate the identity fields of a registration.
pub fn validate_identity(email: &str, name: &str) -> StoreResult<()> {
    if email.trim().is_empty() {
        return Err(StoreError::validation("Email cannot be empty"));
    }
    if name.trim().is_empty() {
        return Err(StoreError::validation("Name cannot be empty"));
    }
    Ok(())
}
