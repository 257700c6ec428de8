// ── Display terminal configuration ──
//
// What a paired terminal renders: settings for its listing, the guest
// currently in residence, and optionally current weather.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity_id::EntityId;
use super::guest::Guest;
use super::media::UnifiedMediaState;

/// Measurement system for weather lookups.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Units {
    #[default]
    Imperial,
    Metric,
}

impl Units {
    pub fn temperature_suffix(self) -> &'static str {
        match self {
            Self::Imperial => "°F",
            Self::Metric => "°C",
        }
    }
}

/// A city to look up, when weather is enabled for the listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherTarget {
    pub city: String,
    pub units: Units,
}

/// Per-listing display settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySettings {
    pub listing_id: EntityId,
    pub welcome_message: Option<String>,
    pub wifi_name: Option<String>,
    pub wifi_password: Option<String>,
    pub show_checkout_time: bool,
    /// `None` unless weather is enabled and a city is configured.
    pub weather: Option<WeatherTarget>,
    pub media: UnifiedMediaState,
}

// ── Weather ─────────────────────────────────────────────────────────

/// Whether a weather value came from the provider or is a placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WeatherSource {
    Live,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weather {
    pub city: String,
    pub units: Units,
    pub temperature: f64,
    pub description: String,
    pub icon: String,
    pub humidity: Option<u8>,
    pub wind_speed: Option<f64>,
    pub source: WeatherSource,
}

impl Weather {
    pub const FALLBACK_DESCRIPTION: &'static str = "Weather unavailable";

    /// Placeholder shown when the provider cannot be reached.
    pub fn fallback(city: &str, units: Units) -> Self {
        Self {
            city: city.to_owned(),
            units,
            temperature: match units {
                Units::Imperial => 72.0,
                Units::Metric => 22.0,
            },
            description: Self::FALLBACK_DESCRIPTION.into(),
            icon: "01d".into(),
            humidity: None,
            wind_speed: None,
            source: WeatherSource::Fallback,
        }
    }

    pub fn is_live(&self) -> bool {
        self.source == WeatherSource::Live
    }
}

// ── ConfigSnapshot ──────────────────────────────────────────────────

/// Everything a terminal needs to render, as of `fetched_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub settings: DisplaySettings,
    pub occupant: Option<Arc<Guest>>,
    pub weather: Option<Weather>,
    pub fetched_at: DateTime<Utc>,
}
