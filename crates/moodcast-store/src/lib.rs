//! Record persistence for Moodcast
//!
//! Users and emotion journal entries live in a remote PostgREST store with an
//! embedded SQLite copy. `RecordSynchronizer` prefers the remote and falls
//! back to the local store when it is unreachable.

pub mod backend;
pub mod credentials;
pub mod insights;
pub mod local_store;
pub mod outcome;
pub mod remote_store;
pub mod synchronizer;
pub mod types;

pub use backend::{validate_intensity, RecordBackend, StoreError, StoreResult};
pub use credentials::{Argon2Hasher, CredentialHasher};
pub use insights::{compute_insights, compute_insights_in, Insights, WeatherCorrelation};
pub use local_store::SqliteRecordStore;
pub use outcome::{StoreSource, Synced};
pub use remote_store::RemoteStore;
pub use synchronizer::{RecordSynchronizer, INSIGHTS_MAX_ENTRIES};
pub use types::{
    format_timestamp, record_timestamp, EmotionEntry, NewEmotion, NewUser, StoredUser, User,
    WeatherPreferences, MAX_INTENSITY, MIN_INTENSITY,
};
