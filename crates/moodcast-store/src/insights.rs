//! Journal analytics over a slice of emotion entries.

use std::collections::BTreeMap;

use chrono::{Local, NaiveDate, TimeZone};
use serde::Serialize;

use crate::types::EmotionEntry;

/// How entries split by the user's reaction to the weather.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WeatherCorrelation {
    #[serde(rename = "liked_weather_count")]
    pub liked: usize,
    #[serde(rename = "disliked_weather_count")]
    pub disliked: usize,
    #[serde(rename = "neutral_weather_count")]
    pub neutral: usize,
}

/// Summary statistics for a set of entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Insights {
    pub total_entries: usize,
    /// Mean intensity, one decimal place. Zero when there are no entries.
    pub average_mood: f64,
    /// Mean intensity per calendar day, one decimal place.
    pub mood_trends: BTreeMap<NaiveDate, f64>,
    pub weather_correlation: WeatherCorrelation,
    pub emotion_distribution: BTreeMap<String, usize>,
}

/// Compute insights, bucketing days in the process's local timezone.
pub fn compute_insights(entries: &[EmotionEntry]) -> Insights {
    compute_insights_in(entries, &Local)
}

/// Compute insights, bucketing days in `tz`.
pub fn compute_insights_in<Tz: TimeZone>(entries: &[EmotionEntry], tz: &Tz) -> Insights {
    if entries.is_empty() {
        return Insights::default();
    }

    let total = entries.len();
    let intensity_sum: u32 = entries.iter().map(|e| u32::from(e.intensity)).sum();

    let mut days: BTreeMap<NaiveDate, (u32, u32)> = BTreeMap::new();
    let mut emotion_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut correlation = WeatherCorrelation::default();

    for entry in entries {
        let day = entry.created_at.with_timezone(tz).date_naive();
        let bucket = days.entry(day).or_insert((0, 0));
        bucket.0 += u32::from(entry.intensity);
        bucket.1 += 1;

        *emotion_distribution
            .entry(entry.emotion_type.clone())
            .or_insert(0) += 1;

        match entry.weather_liked {
            Some(true) => correlation.liked += 1,
            Some(false) => correlation.disliked += 1,
            None => {}
        }
    }
    correlation.neutral = total - correlation.liked - correlation.disliked;

    let mood_trends = days
        .into_iter()
        .map(|(day, (sum, count))| (day, round_one(f64::from(sum) / f64::from(count))))
        .collect();

    Insights {
        total_entries: total,
        average_mood: round_one(f64::from(intensity_sum) / total as f64),
        mood_trends,
        weather_correlation: correlation,
        emotion_distribution,
    }
}

/// Round half away from zero to one decimal place.
fn round_one(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
