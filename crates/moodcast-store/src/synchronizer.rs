//! Remote-preferred, local-fallback record orchestration.
//!
//! `RecordSynchronizer` is the only writer of users and emotion entries. It
//! tries the remote store first, mirrors successful remote results into the
//! local store, and answers from the local store when the remote fails. Reads
//! hide which store answered; writes report it through `Synced`.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::backend::{
    validate_identity, validate_intensity, RecordBackend, StoreError, StoreResult,
};
use crate::credentials::CredentialHasher;
use crate::insights::{compute_insights, Insights};
use crate::local_store::SqliteRecordStore;
use crate::outcome::Synced;
use crate::remote_store::RemoteStore;
use crate::types::{
    record_timestamp, EmotionEntry, NewEmotion, NewUser, StoredUser, User, WeatherPreferences,
};

/// Upper bound on entries pulled for one insights computation.
pub const INSIGHTS_MAX_ENTRIES: u32 = 10_000;

/// Coordinates the remote and local record stores.
pub struct RecordSynchronizer<L: RecordBackend = SqliteRecordStore> {
    remote: RemoteStore,
    local: Arc<Mutex<L>>,
    hasher: Arc<dyn CredentialHasher>,
}

impl<L: RecordBackend> Clone for RecordSynchronizer<L> {
    fn clone(&self) -> Self {
        Self {
            remote: self.remote.clone(),
            local: Arc::clone(&self.local),
            hasher: Arc::clone(&self.hasher),
        }
    }
}

impl<L: RecordBackend + 'static> RecordSynchronizer<L> {
    pub fn new(remote: RemoteStore, local: Arc<Mutex<L>>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            remote,
            local,
            hasher,
        }
    }

    /// Shared handle to the local store.
    pub fn local(&self) -> &Arc<Mutex<L>> {
        &self.local
    }

    /// Run a local store operation on the blocking pool.
    async fn with_local<T, F>(&self, op: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&L) -> StoreResult<T> + Send + 'static,
    {
        let local = Arc::clone(&self.local);
        tokio::task::spawn_blocking(move || {
            let store = local.lock();
            op(&*store)
        })
        .await
        .map_err(|e| StoreError::storage(format!("Local store task failed: {}", e)))?
    }

    /// Best-effort copy of a remote user into the local store.
    async fn mirror_user(&self, user: StoredUser) -> Option<String> {
        let id = user.id;
        match self.with_local(move |store| store.upsert_user(&user)).await {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to mirror user {} locally: {}", id, e);
                Some(format!("Local mirror failed: {}", e))
            }
        }
    }

    /// Register a new user.
    ///
    /// # Errors
    /// - `StoreError::Validation` for an empty email or name.
    /// - `StoreError::DuplicateEmail` if either store already holds the email.
    /// - `StoreError::PersistenceUnavailable` if neither store accepted the write.
    pub async fn create_user(&self, new_user: NewUser) -> StoreResult<Synced<User>> {
        validate_identity(&new_user.email, &new_user.name)?;

        if self.lookup_by_email(&new_user.email).await?.is_some() {
            return Err(StoreError::DuplicateEmail(new_user.email));
        }

        let hasher = Arc::clone(&self.hasher);
        let password = new_user.password;
        let digest = tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| StoreError::Credential(format!("Hashing task failed: {}", e)))??;

        let now = record_timestamp();
        let stored = StoredUser {
            id: Uuid::new_v4(),
            email: new_user.email,
            name: new_user.name,
            credential_digest: digest,
            weather_preferences: new_user.weather_preferences,
            created_at: now,
            updated_at: now,
        };

        match self.remote.insert_user(&stored).await {
            Ok(mut accepted) => {
                if !accepted.has_credential() {
                    accepted.credential_digest = stored.credential_digest.clone();
                }
                let warning = self.mirror_user(accepted.clone()).await;
                tracing::info!("Created user {}", accepted.id);
                Ok(Synced::primary(accepted.into_user()).with_warning(warning))
            }
            Err(e) if e.is_fallback_trigger() => {
                tracing::warn!("Remote user insert failed, using local store: {}", e);
                let local_copy = stored.clone();
                self.with_local(move |store| store.insert_user(&local_copy))
                    .await
                    .map_err(local_write_failure)?;
                tracing::info!("Created user {} locally", stored.id);
                Ok(Synced::fallback(stored.into_user()))
            }
            Err(e) => Err(e),
        }
    }

    /// Look up a user by email. Exact, case-sensitive match.
    pub async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.lookup_by_email(email).await?.map(StoredUser::into_user))
    }

    /// Look up a user by id.
    pub async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let remote = self.remote.find_user_by_id(id).await;
        let found = self
            .read_through(remote, move |store| store.find_user_by_id(id))
            .await?;
        Ok(found.map(StoredUser::into_user))
    }

    async fn lookup_by_email(&self, email: &str) -> StoreResult<Option<StoredUser>> {
        let remote = self.remote.find_user_by_email(email).await;
        let email = email.to_string();
        self.read_through(remote, move |store| store.find_user_by_email(&email))
            .await
    }

    /// Resolve a user read given the remote's answer.
    ///
    /// A remote hit is mirrored and returned. A remote miss or failure is
    /// answered from the local store.
    async fn read_through<Q>(
        &self,
        remote: StoreResult<Option<StoredUser>>,
        local_query: Q,
    ) -> StoreResult<Option<StoredUser>>
    where
        Q: FnOnce(&L) -> StoreResult<Option<StoredUser>> + Send + 'static,
    {
        let remote_answered = match remote {
            Ok(Some(user)) => {
                self.mirror_user(user.clone()).await;
                return Ok(Some(user));
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Remote user lookup failed, using local store: {}", e);
                false
            }
        };

        match self.with_local(local_query).await {
            Ok(found) => Ok(found),
            Err(e) if remote_answered => {
                tracing::warn!("Local user lookup failed after remote miss: {}", e);
                Ok(None)
            }
            Err(e) => {
                tracing::warn!("Local user lookup failed: {}", e);
                Err(StoreError::PersistenceUnavailable)
            }
        }
    }

    /// Replace a user's weather preferences in both stores.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if neither store knows the user.
    /// - `StoreError::PersistenceUnavailable` if neither store accepted the write.
    pub async fn update_preferences(
        &self,
        user_id: Uuid,
        preferences: WeatherPreferences,
    ) -> StoreResult<Synced<()>> {
        let now = record_timestamp();
        let remote = self
            .remote
            .update_user_preferences(user_id, &preferences, now)
            .await;
        let local = self
            .with_local(move |store| store.update_user_preferences(user_id, &preferences, now))
            .await;

        match (remote, local) {
            (Ok(()), Ok(())) => Ok(Synced::primary(())),
            (Ok(()), Err(e)) => {
                tracing::warn!("Local preference mirror failed for {}: {}", user_id, e);
                Ok(Synced::primary(()).with_warning(Some(format!("Local mirror failed: {}", e))))
            }
            (Err(e), Ok(())) => {
                tracing::warn!("Remote preference update failed for {}: {}", user_id, e);
                Ok(Synced::fallback(()))
            }
            (Err(StoreError::NotFound(_)), Err(StoreError::NotFound(_))) => {
                Err(StoreError::not_found(user_id.to_string()))
            }
            (Err(remote), Err(local)) => {
                tracing::warn!(
                    "Preference update failed in both stores for {}: remote: {}, local: {}",
                    user_id,
                    remote,
                    local
                );
                Err(StoreError::PersistenceUnavailable)
            }
        }
    }

    /// Check a plaintext credential against a digest.
    pub fn verify_credential(&self, plain: &str, digest: &str) -> bool {
        self.hasher.verify(plain, digest)
    }

    /// Log a user in. Returns the user if the credential matches.
    pub async fn authenticate(&self, email: &str, password: &str) -> StoreResult<Option<User>> {
        let Some(mut stored) = self.lookup_by_email(email).await? else {
            return Ok(None);
        };

        if !stored.has_credential() {
            let email = email.to_string();
            if let Ok(Some(local)) = self
                .with_local(move |store| store.find_user_by_email(&email))
                .await
            {
                stored.credential_digest = local.credential_digest;
            }
        }

        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        let digest = std::mem::take(&mut stored.credential_digest);
        let verified = tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
            .await
            .map_err(|e| StoreError::Credential(format!("Verification task failed: {}", e)))?;

        if verified {
            tracing::debug!("Authenticated user {}", stored.id);
            Ok(Some(stored.into_user()))
        } else {
            Ok(None)
        }
    }

    /// Record a new emotion entry.
    ///
    /// # Errors
    /// - `StoreError::InvalidIntensity` before any store is touched.
    /// - `StoreError::PersistenceUnavailable` if neither store accepted the write.
    pub async fn create_emotion(&self, new_emotion: NewEmotion) -> StoreResult<Synced<EmotionEntry>> {
        validate_intensity(new_emotion.intensity)?;
        if new_emotion.emotion_type.trim().is_empty() {
            return Err(StoreError::validation("Emotion type cannot be empty"));
        }

        let entry = new_emotion.into_entry(Uuid::new_v4(), record_timestamp());

        match self.remote.insert_emotion(&entry).await {
            Ok(accepted) => {
                let mirrored = accepted.clone();
                let warning = match self
                    .with_local(move |store| store.upsert_emotion(&mirrored))
                    .await
                {
                    Ok(_) => None,
                    Err(e) => {
                        tracing::warn!("Failed to mirror emotion {} locally: {}", accepted.id, e);
                        Some(format!("Local mirror failed: {}", e))
                    }
                };
                Ok(Synced::primary(accepted).with_warning(warning))
            }
            Err(e) if e.is_fallback_trigger() => {
                tracing::warn!("Remote emotion insert failed, using local store: {}", e);
                let local_copy = entry.clone();
                self.with_local(move |store| store.insert_emotion(&local_copy))
                    .await
                    .map_err(local_write_failure)?;
                Ok(Synced::fallback(entry))
            }
            Err(e) => Err(e),
        }
    }

    /// Entries of a user created at or after `since`, newest first.
    pub async fn list_emotions(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<EmotionEntry>> {
        match self.remote.list_emotions(user_id, since, limit).await {
            Ok(entries) => {
                let mirrored = entries.clone();
                let result = self
                    .with_local(move |store| {
                        let mut written = 0;
                        for entry in &mirrored {
                            if store.upsert_emotion(entry)? {
                                written += 1;
                            }
                        }
                        Ok(written)
                    })
                    .await;
                match result {
                    Ok(written) if written > 0 => {
                        tracing::debug!("Mirrored {} remote emotion entries locally", written)
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("Failed to mirror emotion entries locally: {}", e),
                }
                Ok(entries)
            }
            Err(e) => {
                tracing::warn!("Remote emotion listing failed, using local store: {}", e);
                self.with_local(move |store| store.list_emotions(user_id, since, limit))
                    .await
                    .map_err(|e| {
                        tracing::warn!("Local emotion listing failed: {}", e);
                        StoreError::PersistenceUnavailable
                    })
            }
        }
    }

    /// Entries of the last `days` days, newest first.
    pub async fn recent_emotions(
        &self,
        user_id: Uuid,
        days: u32,
        limit: u32,
    ) -> StoreResult<Vec<EmotionEntry>> {
        let since = Utc::now() - Duration::days(i64::from(days));
        self.list_emotions(user_id, since, limit).await
    }

    /// Delete an emotion entry.
    ///
    /// A remote success is mirrored locally; a missing local row is then not
    /// an error. When the remote fails, the local outcome decides.
    ///
    /// # Errors
    /// - `StoreError::NotFound` if no store held the entry.
    /// - `StoreError::PersistenceUnavailable` if neither store could be reached.
    pub async fn delete_emotion(&self, id: Uuid) -> StoreResult<Synced<()>> {
        let remote = self.remote.delete_emotion(id).await;
        let local = self.with_local(move |store| store.delete_emotion(id)).await;

        match (remote, local) {
            (Ok(true), Ok(_)) => Ok(Synced::primary(())),
            (Ok(true), Err(e)) => {
                tracing::warn!("Local delete of emotion {} failed: {}", id, e);
                Ok(Synced::primary(()).with_warning(Some(format!("Local mirror failed: {}", e))))
            }
            (Ok(false), Ok(true)) => Ok(Synced::primary(())),
            (Ok(false), Ok(false)) => Err(StoreError::not_found(id.to_string())),
            (Ok(false), Err(e)) => {
                tracing::warn!("Local delete of emotion {} failed: {}", id, e);
                Err(StoreError::not_found(id.to_string()))
            }
            (Err(e), Ok(removed)) => {
                tracing::warn!("Remote delete of emotion {} failed, used local store: {}", id, e);
                if removed {
                    Ok(Synced::fallback(()))
                } else {
                    Err(StoreError::not_found(id.to_string()))
                }
            }
            (Err(remote), Err(local)) => {
                tracing::warn!(
                    "Delete of emotion {} failed in both stores: remote: {}, local: {}",
                    id,
                    remote,
                    local
                );
                Err(StoreError::PersistenceUnavailable)
            }
        }
    }

    /// Analytics over the last `days` days of a user's journal.
    pub async fn insights(&self, user_id: Uuid, days: u32) -> StoreResult<Insights> {
        let entries = self
            .recent_emotions(user_id, days, INSIGHTS_MAX_ENTRIES)
            .await?;
        Ok(compute_insights(&entries))
    }
}

/// Local write failure after the remote already failed.
///
/// Constraint rejections are answers and pass through. Anything else means
/// neither store is usable.
fn local_write_failure(e: StoreError) -> StoreError {
    if e.is_fallback_trigger() {
        tracing::warn!("Local write failed: {}", e);
        StoreError::PersistenceUnavailable
    } else {
        e
    }
}
