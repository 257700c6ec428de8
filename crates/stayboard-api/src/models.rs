// Raw wire types for the hosted backend and the weather provider.
//
// Field names mirror the database columns and JSON payloads exactly.
// `stayboard-core` converts every type here into its domain counterpart;
// nothing outside the conversion layer reads these fields directly.

use serde::{Deserialize, Serialize};

// ── Table rows ──────────────────────────────────────────────────────

/// Row of the `listings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListingRow {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub managed_by_admin_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// Row of the `guests` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestRow {
    pub id: String,
    pub listing_id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// ISO-8601 date or timestamp.
    #[serde(default)]
    pub check_in: Option<String>,
    #[serde(default)]
    pub check_out: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Row of the `qr_codes` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrCodeRow {
    pub id: String,
    pub listing_id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub scan_count: Option<u64>,
}

/// Row of the `devices` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceRow {
    pub id: String,
    pub listing_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub otp: Option<String>,
    /// ISO-8601 timestamp of the last heartbeat.
    #[serde(default)]
    pub last_seen_at: Option<String>,
}

// ── Device configuration RPC ────────────────────────────────────────

/// One media entry inside the display settings document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRow {
    pub id: String,
    pub url: String,
    /// `"predefined"` or `"uploaded"`.
    #[serde(default)]
    pub source: Option<String>,
}

/// The `display_settings` document for one listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplaySettingsRow {
    pub listing_id: String,
    #[serde(default)]
    pub welcome_message: Option<String>,
    #[serde(default)]
    pub wifi_name: Option<String>,
    #[serde(default)]
    pub wifi_password: Option<String>,
    #[serde(default)]
    pub show_checkout_time: bool,
    #[serde(default)]
    pub weather_enabled: bool,
    #[serde(default)]
    pub weather_city: Option<String>,
    /// `"imperial"` or `"metric"`.
    #[serde(default)]
    pub weather_units: Option<String>,
    /// `"image"` or `"video"`.
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub images: Vec<MediaRow>,
    #[serde(default)]
    pub videos: Vec<MediaRow>,
    #[serde(default)]
    pub rotation_interval: Option<i64>,
}

/// Response body of the `get_device_config` remote procedure.
///
/// The procedure reports a rejected token in-band via `error`
/// (HTTP 200), so the envelope carries both shapes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfigResponse {
    #[serde(default)]
    pub display_settings: Option<DisplaySettingsRow>,
    #[serde(default)]
    pub active_guest: Option<GuestRow>,
    #[serde(default)]
    pub error: Option<String>,
}

/// PostgREST-style structured error body.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct RpcErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

// ── Realtime change payload ─────────────────────────────────────────

/// One row change as delivered by the realtime channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowChange {
    /// `"INSERT"`, `"UPDATE"` or `"DELETE"`.
    #[serde(rename = "type", alias = "eventType")]
    pub event_type: String,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    /// New row image; absent for deletes.
    #[serde(default)]
    pub record: Option<serde_json::Value>,
    /// Previous row image; for deletes usually only the primary key.
    #[serde(default)]
    pub old_record: Option<serde_json::Value>,
    #[serde(default)]
    pub commit_timestamp: Option<String>,
}

// ── Weather provider ────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WeatherResponse {
    pub main: WeatherMain,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
    #[serde(default)]
    pub wind: Option<WeatherWind>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WeatherMain {
    pub temp: f64,
    #[serde(default)]
    pub humidity: Option<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WeatherCondition {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WeatherWind {
    #[serde(default)]
    pub speed: Option<f64>,
}

/// Current conditions as returned by the provider, flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub city: String,
    pub temp: f64,
    pub description: String,
    pub icon: String,
    pub humidity: Option<u8>,
    pub wind_speed: Option<f64>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn device_config_with_in_band_error() {
        let resp: DeviceConfigResponse =
            serde_json::from_str(r#"{"error":"invalid_token"}"#).unwrap();
        assert_eq!(resp.error.as_deref(), Some("invalid_token"));
        assert!(resp.display_settings.is_none());
    }

    #[test]
    fn row_change_accepts_event_type_alias() {
        let change: RowChange = serde_json::from_value(serde_json::json!({
            "eventType": "DELETE",
            "table": "guests",
            "old_record": { "id": "g1" }
        }))
        .unwrap();
        assert_eq!(change.event_type, "DELETE");
        assert!(change.record.is_none());
    }

    #[test]
    fn display_settings_defaults() {
        let row: DisplaySettingsRow =
            serde_json::from_str(r#"{"listing_id":"l1"}"#).unwrap();
        assert!(!row.weather_enabled);
        assert!(row.images.is_empty());
        assert!(row.rotation_interval.is_none());
    }
}
