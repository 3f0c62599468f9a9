//! Weather service for Moodcast
//!
//! Fetches conditions from a WeatherAPI-compatible upstream and keeps a
//! SQLite history of observations that doubles as a freshness cache.
//! `suggest_mood` turns a reading into a mood suggestion.

pub mod cache;
pub mod location;
pub mod mood;
pub mod provider;
pub mod service;
pub mod types;

pub use cache::{FreshnessCache, DEFAULT_FRESHNESS_MINUTES};
pub use location::normalize_location_key;
pub use mood::{suggest_mood, MoodSuggestion, SuggestedMood};
pub use provider::{WeatherProvider, MAX_FORECAST_DAYS};
pub use service::{WeatherService, STALE_WARNING};
pub use types::*;
