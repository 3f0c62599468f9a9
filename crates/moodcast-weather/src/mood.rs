//! Mood suggestion derived from a single weather reading.

use serde::Serialize;

use crate::types::{WeatherCondition, WeatherObservation};

const BASELINE: i32 = 50;

/// Mood a reading tends to put people in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedMood {
    Happy,
    Calm,
    Energetic,
    Peaceful,
    Neutral,
}

impl SuggestedMood {
    /// Activity ideas for this mood. Callers pick one.
    pub fn recommendations(&self) -> &'static [&'static str] {
        match self {
            Self::Happy => &[
                "Perfect weather for outdoor activities!",
                "Great day to spend time with friends",
                "Ideal conditions for a walk or exercise",
            ],
            Self::Calm => &[
                "Perfect weather for reading or meditation",
                "Good time for indoor creative activities",
                "Cozy weather for relaxation",
            ],
            Self::Energetic => &[
                "Great weather for high-energy activities",
                "Perfect for indoor workouts",
                "Good time to tackle challenging projects",
            ],
            Self::Peaceful => &[
                "Beautiful weather for quiet contemplation",
                "Perfect for indoor hobbies",
                "Great time to enjoy warm beverages",
            ],
            Self::Neutral => &[
                "Moderate weather for various activities",
                "Good balance for indoor and outdoor plans",
                "Flexible conditions for any mood",
            ],
        }
    }
}

/// Suggested mood plus the scores behind it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MoodSuggestion {
    pub mood: SuggestedMood,
    pub condition: WeatherCondition,
    /// 0..=100
    pub happiness: u8,
    /// 0..=100
    pub energy: u8,
    pub recommendations: &'static [&'static str],
}

/// Score a reading for happiness and energy and pick the matching mood.
///
/// Pure: the same observation always yields the same suggestion.
pub fn suggest_mood(observation: &WeatherObservation) -> MoodSuggestion {
    let mut happiness = BASELINE;
    let mut energy = BASELINE;

    let temperature = observation.temperature;
    if (20.0..=25.0).contains(&temperature) {
        happiness += 20;
        energy += 10;
    } else if temperature < 10.0 || temperature > 30.0 {
        happiness -= 10;
        energy -= 15;
    }

    let condition = observation.condition();
    let mood = match condition {
        WeatherCondition::Clear => {
            happiness += 25;
            energy += 20;
            SuggestedMood::Happy
        }
        WeatherCondition::PartlyCloudy | WeatherCondition::Cloudy => {
            happiness -= 5;
            energy -= 10;
            SuggestedMood::Neutral
        }
        WeatherCondition::Drizzle | WeatherCondition::Rain | WeatherCondition::HeavyRain => {
            happiness -= 15;
            energy -= 20;
            SuggestedMood::Calm
        }
        WeatherCondition::Thunderstorm => {
            happiness -= 10;
            energy += 15;
            SuggestedMood::Energetic
        }
        WeatherCondition::Snow => {
            happiness += 5;
            energy -= 5;
            SuggestedMood::Peaceful
        }
        WeatherCondition::Fog | WeatherCondition::Sleet => SuggestedMood::Neutral,
    };

    if observation.humidity > 80 {
        energy -= 10;
    } else if observation.humidity < 30 {
        energy -= 5;
    }

    if observation.uv_index > 6.0 {
        energy += 10;
    }

    MoodSuggestion {
        mood,
        condition,
        happiness: score(happiness),
        energy: score(energy),
        recommendations: mood.recommendations(),
    }
}

fn score(value: i32) -> u8 {
    // clamped to 0..=100, so the cast is lossless
    value.clamp(0, 100) as u8
}
