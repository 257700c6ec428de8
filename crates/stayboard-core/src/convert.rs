// ── Wire-to-domain conversions ──
//
// Bridges raw `stayboard_api` rows into canonical `crate::model` types.
// Each `From` impl fills defaults for missing optional data; timestamps
// that fail to parse are dropped rather than failing the whole row.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use stayboard_api::models::{
    CurrentWeather, DeviceRow, DisplaySettingsRow, GuestRow, ListingRow, MediaRow, QrCodeRow,
    RowChange,
};

use crate::error::CoreError;
use crate::model::{
    ChangeEvent, Device, DisplaySettings, Entity, EntityId, Guest, Listing, MediaItem, MediaKind,
    MediaOrigin, QrCode, RotationInterval, UnifiedMediaState, Units, UserId, Weather,
    WeatherSource, WeatherTarget,
};

// ── Helpers ────────────────────────────────────────────────────────

/// Parse a backend timestamp.
///
/// Accepts RFC 3339, Postgres `timestamp without time zone` text (taken
/// as UTC) and bare dates (midnight UTC).
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn non_empty(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty())
}

// ── Synchronized tables ────────────────────────────────────────────

impl From<ListingRow> for Listing {
    fn from(row: ListingRow) -> Self {
        Self {
            id: EntityId::from(row.id),
            user_id: UserId::new(row.user_id),
            managed_by: non_empty(row.managed_by_admin_id).map(UserId::new),
            name: non_empty(row.name).unwrap_or_else(|| "Untitled listing".into()),
            address: non_empty(row.address),
            city: non_empty(row.city),
            timezone: non_empty(row.timezone),
        }
    }
}

impl From<GuestRow> for Guest {
    fn from(row: GuestRow) -> Self {
        Self {
            id: EntityId::from(row.id),
            listing_id: EntityId::from(row.listing_id),
            first_name: non_empty(row.first_name).unwrap_or_else(|| "Guest".into()),
            last_name: non_empty(row.last_name),
            check_in: parse_timestamp(row.check_in.as_deref()),
            check_out: parse_timestamp(row.check_out.as_deref()),
            notes: non_empty(row.notes),
        }
    }
}

impl From<QrCodeRow> for QrCode {
    fn from(row: QrCodeRow) -> Self {
        Self {
            id: EntityId::from(row.id),
            listing_id: EntityId::from(row.listing_id),
            label: non_empty(row.label).unwrap_or_default(),
            target_url: non_empty(row.target_url),
            scans: row.scan_count.unwrap_or(0),
        }
    }
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Self {
            id: EntityId::from(row.id),
            listing_id: EntityId::from(row.listing_id),
            name: non_empty(row.name).unwrap_or_else(|| "Display".into()),
            token: non_empty(row.otp),
            last_seen: parse_timestamp(row.last_seen_at.as_deref()),
        }
    }
}

// ── Display configuration ──────────────────────────────────────────

impl From<MediaRow> for MediaItem {
    fn from(row: MediaRow) -> Self {
        Self {
            id: row.id,
            url: row.url,
            origin: row
                .source
                .as_deref()
                .and_then(|s| s.parse().ok())
                .unwrap_or(MediaOrigin::Predefined),
        }
    }
}

impl From<DisplaySettingsRow> for DisplaySettings {
    fn from(row: DisplaySettingsRow) -> Self {
        let units = row
            .weather_units
            .as_deref()
            .and_then(|u| u.parse::<Units>().ok())
            .unwrap_or_default();
        let weather = non_empty(row.weather_city)
            .filter(|_| row.weather_enabled)
            .map(|city| WeatherTarget { city, units });

        let media = UnifiedMediaState {
            active_type: row
                .media_type
                .as_deref()
                .and_then(|t| t.parse::<MediaKind>().ok())
                .unwrap_or_default(),
            images: row.images.into_iter().map(MediaItem::from).collect(),
            videos: row.videos.into_iter().map(MediaItem::from).collect(),
            rotation_interval: row
                .rotation_interval
                .map_or(RotationInterval::DEFAULT, RotationInterval::clamped),
        };

        Self {
            listing_id: EntityId::from(row.listing_id),
            welcome_message: non_empty(row.welcome_message),
            wifi_name: non_empty(row.wifi_name),
            wifi_password: non_empty(row.wifi_password),
            show_checkout_time: row.show_checkout_time,
            weather,
            media,
        }
    }
}

pub(crate) fn weather_from_current(current: CurrentWeather, units: Units) -> Weather {
    Weather {
        city: current.city,
        units,
        temperature: current.temp,
        description: current.description,
        icon: current.icon,
        humidity: current.humidity,
        wind_speed: current.wind_speed,
        source: WeatherSource::Live,
    }
}

// ── Change payloads ────────────────────────────────────────────────

/// Decode one raw table record into its entity type.
pub(crate) fn decode_record<T: Entity>(record: Value) -> Result<T, CoreError> {
    serde_json::from_value::<T::Row>(record)
        .map(T::from_row)
        .map_err(|e| CoreError::Decode {
            entity: T::KIND.to_string(),
            message: e.to_string(),
        })
}

fn record_id(record: Option<&Value>) -> Option<EntityId> {
    match record?.get("id")? {
        Value::String(s) => Some(EntityId::from(s.as_str())),
        Value::Number(n) => Some(EntityId::from(n.to_string())),
        _ => None,
    }
}

/// Normalize a raw row-change payload into an untyped `ChangeEvent`.
pub(crate) fn decode_change(change: RowChange) -> Result<ChangeEvent<Value>, CoreError> {
    let malformed = |message: &str| CoreError::Decode {
        entity: change.table.clone(),
        message: message.to_owned(),
    };

    match change.event_type.to_ascii_uppercase().as_str() {
        "INSERT" => change
            .record
            .clone()
            .filter(Value::is_object)
            .map(ChangeEvent::Insert)
            .ok_or_else(|| malformed("insert without a record")),
        "UPDATE" => {
            let id = record_id(change.record.as_ref())
                .ok_or_else(|| malformed("update without a record id"))?;
            let previous_id = record_id(change.old_record.as_ref()).filter(|old| *old != id);
            Ok(ChangeEvent::Update {
                entity: change.record.clone().unwrap_or(Value::Null),
                previous_id,
            })
        }
        "DELETE" => record_id(change.old_record.as_ref())
            .or_else(|| record_id(change.record.as_ref()))
            .map(|id| ChangeEvent::Delete { id })
            .ok_or_else(|| malformed("delete without a record id")),
        other => Err(malformed(&format!("unknown event type '{other}'"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn change(event_type: &str, record: Value, old_record: Value) -> RowChange {
        serde_json::from_value(json!({
            "type": event_type,
            "table": "guests",
            "schema": "public",
            "record": record,
            "old_record": old_record,
        }))
        .unwrap()
    }

    #[test]
    fn timestamps_accept_common_shapes() {
        let expected = Utc.with_ymd_and_hms(2026, 5, 1, 15, 0, 0).unwrap();
        assert_eq!(parse_timestamp(Some("2026-05-01T15:00:00Z")), Some(expected));
        assert_eq!(parse_timestamp(Some("2026-05-01T17:00:00+02:00")), Some(expected));
        assert_eq!(parse_timestamp(Some("2026-05-01 15:00:00")), Some(expected));
        assert_eq!(
            parse_timestamp(Some("2026-05-01")),
            Some(Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp(Some("soon")), None);
        assert_eq!(parse_timestamp(None), None);
    }

    #[test]
    fn settings_clamp_rotation_and_gate_weather() {
        let row: DisplaySettingsRow = serde_json::from_value(json!({
            "listing_id": "l1",
            "show_checkout_time": true,
            "weather_enabled": false,
            "weather_city": "Denver",
            "media_type": "video",
            "images": [],
            "videos": [{"id": "v1", "url": "https://cdn.example/a.mp4", "source": "uploaded"}],
            "rotation_interval": 1
        }))
        .unwrap();
        let settings = DisplaySettings::from(row);

        assert_eq!(settings.weather, None);
        assert_eq!(settings.media.active_type, MediaKind::Video);
        assert_eq!(settings.media.rotation_interval.seconds(), 3);
        assert_eq!(settings.media.videos[0].origin, MediaOrigin::Uploaded);
    }

    #[test]
    fn enabled_weather_with_city_becomes_target() {
        let row: DisplaySettingsRow = serde_json::from_value(json!({
            "listing_id": "l1",
            "weather_enabled": true,
            "weather_city": " Denver ",
            "weather_units": "metric"
        }))
        .unwrap();
        let settings = DisplaySettings::from(row);
        assert_eq!(
            settings.weather,
            Some(WeatherTarget {
                city: "Denver".into(),
                units: Units::Metric
            })
        );
        assert_eq!(settings.media.rotation_interval, RotationInterval::DEFAULT);
    }

    #[test]
    fn normalizes_insert_update_delete() {
        let insert = decode_change(change("INSERT", json!({"id": "g1"}), Value::Null)).unwrap();
        assert!(matches!(insert, ChangeEvent::Insert(_)));

        let update = decode_change(change(
            "UPDATE",
            json!({"id": "g2"}),
            json!({"id": "g1"}),
        ))
        .unwrap();
        match update {
            ChangeEvent::Update { previous_id, .. } => {
                assert_eq!(previous_id, Some(EntityId::from("g1")));
            }
            other => panic!("expected update, got {other:?}"),
        }

        let delete = decode_change(change("DELETE", Value::Null, json!({"id": "g1"}))).unwrap();
        assert_eq!(
            delete,
            ChangeEvent::Delete {
                id: EntityId::from("g1")
            }
        );
    }

    #[test]
    fn unchanged_id_has_no_previous() {
        let update = decode_change(change(
            "UPDATE",
            json!({"id": "g1", "first_name": "B"}),
            json!({"id": "g1"}),
        ))
        .unwrap();
        assert!(matches!(
            update,
            ChangeEvent::Update {
                previous_id: None,
                ..
            }
        ));
    }

    #[test]
    fn malformed_payloads_are_decode_errors() {
        let err = decode_change(change("DELETE", Value::Null, Value::Null)).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));

        let err = decode_change(change("TRUNCATE", Value::Null, Value::Null)).unwrap_err();
        assert!(matches!(err, CoreError::Decode { .. }));
    }

    #[test]
    fn decode_typed_guest() {
        let event = ChangeEvent::Insert(json!({
            "id": "g1",
            "listing_id": "l1",
            "first_name": "Ada",
            "check_in": "2026-05-01"
        }));
        let typed: ChangeEvent<Guest> = event.decode().unwrap();
        match typed {
            ChangeEvent::Insert(guest) => {
                assert_eq!(guest.first_name, "Ada");
                assert!(guest.check_in.is_some());
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }
}
