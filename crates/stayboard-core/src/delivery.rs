// ── Display configuration delivery ──
//
// Resolves a device token into everything a terminal renders. Backend
// failures are classified into the three outcomes the pairing state
// machine branches on: invalid credential, not configured, transient.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use stayboard_api::BackendClient;

use crate::error::CoreError;
use crate::model::{ConfigSnapshot, DisplaySettings, Guest};
use crate::weather::WeatherCache;

/// Settings and occupant as stored for a device, before weather is merged.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceConfig {
    pub settings: Option<DisplaySettings>,
    pub occupant: Option<Guest>,
}

/// Backend operations a terminal needs.
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn device_config(&self, token: &str) -> Result<DeviceConfig, CoreError>;

    async fn heartbeat(&self, token: &str) -> Result<(), CoreError>;
}

// ── Error classification ─────────────────────────────────────────────

const INVALID_TOKEN_CODES: &[&str] = &["invalid_token", "token_revoked", "unknown_device"];
const NOT_CONFIGURED_CODES: &[&str] = &["not_configured", "no_display_settings"];

fn classify(err: stayboard_api::Error) -> CoreError {
    if let stayboard_api::Error::Rpc { code, message, .. } = &err {
        let matches = |codes: &[&str]| {
            codes
                .iter()
                .any(|c| code.eq_ignore_ascii_case(c) || message.eq_ignore_ascii_case(c))
        };
        if matches(INVALID_TOKEN_CODES) {
            return CoreError::InvalidCredential {
                message: message.clone(),
            };
        }
        if matches(NOT_CONFIGURED_CODES) {
            return CoreError::NotConfigured {
                message: message.clone(),
            };
        }
    }
    CoreError::transient(err.to_string())
}

#[async_trait]
impl DeviceBackend for BackendClient {
    async fn device_config(&self, token: &str) -> Result<DeviceConfig, CoreError> {
        let response = self.get_device_config(token).await.map_err(classify)?;
        Ok(DeviceConfig {
            settings: response.display_settings.map(DisplaySettings::from),
            occupant: response.active_guest.map(Guest::from),
        })
    }

    async fn heartbeat(&self, token: &str) -> Result<(), CoreError> {
        self.ping_device(token).await.map_err(classify)
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Fetches configuration snapshots for paired devices.
#[derive(Clone)]
pub struct ConfigDeliveryClient {
    backend: Arc<dyn DeviceBackend>,
    weather: Arc<WeatherCache>,
}

impl ConfigDeliveryClient {
    pub fn new(backend: Arc<dyn DeviceBackend>, weather: Arc<WeatherCache>) -> Self {
        Self { backend, weather }
    }

    /// Fetch and assemble the configuration for `token`.
    ///
    /// Weather is merged only when enabled for the listing; a fallback
    /// value is left out of the snapshot.
    #[instrument(skip_all)]
    pub async fn fetch(&self, token: &str) -> Result<ConfigSnapshot, CoreError> {
        let config = self.backend.device_config(token).await?;
        let settings = config.settings.ok_or_else(|| CoreError::NotConfigured {
            message: "no display settings for this device".into(),
        })?;

        let weather = match &settings.weather {
            Some(target) => {
                let weather = self.weather.get(&target.city, target.units).await;
                weather.is_live().then_some(weather)
            }
            None => None,
        };
        debug!(
            listing = %settings.listing_id,
            has_guest = config.occupant.is_some(),
            has_weather = weather.is_some(),
            "configuration fetched"
        );

        Ok(ConfigSnapshot {
            settings,
            occupant: config.occupant.map(Arc::new),
            weather,
            fetched_at: Utc::now(),
        })
    }

    /// Record a liveness heartbeat.
    pub async fn ping(&self, token: &str) -> Result<(), CoreError> {
        self.backend.heartbeat(token).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::config::WeatherCacheConfig;
    use crate::model::{EntityId, UnifiedMediaState, Units, Weather, WeatherTarget};
    use crate::weather::WeatherLookup;

    struct StaticBackend(Mutex<Result<DeviceConfig, CoreError>>);

    #[async_trait]
    impl DeviceBackend for StaticBackend {
        async fn device_config(&self, _token: &str) -> Result<DeviceConfig, CoreError> {
            self.0.lock().unwrap().clone()
        }

        async fn heartbeat(&self, _token: &str) -> Result<(), CoreError> {
            Ok(())
        }
    }

    struct DownLookup;

    #[async_trait]
    impl WeatherLookup for DownLookup {
        async fn lookup(&self, _city: &str, _units: Units) -> Result<Weather, CoreError> {
            Err(CoreError::ThirdPartyDegraded {
                message: "down".into(),
            })
        }
    }

    fn settings(weather: Option<WeatherTarget>) -> DisplaySettings {
        DisplaySettings {
            listing_id: EntityId::from("l1"),
            welcome_message: Some("Welcome!".into()),
            wifi_name: None,
            wifi_password: None,
            show_checkout_time: false,
            weather,
            media: UnifiedMediaState::default(),
        }
    }

    fn client(result: Result<DeviceConfig, CoreError>) -> ConfigDeliveryClient {
        let weather = Arc::new(WeatherCache::new(
            Arc::new(DownLookup),
            WeatherCacheConfig::default(),
        ));
        ConfigDeliveryClient::new(Arc::new(StaticBackend(Mutex::new(result))), weather)
    }

    #[tokio::test]
    async fn missing_settings_is_not_configured() {
        let client = client(Ok(DeviceConfig {
            settings: None,
            occupant: None,
        }));
        let err = client.fetch("123456").await.unwrap_err();
        assert!(matches!(err, CoreError::NotConfigured { .. }));
    }

    #[tokio::test]
    async fn failed_weather_is_omitted() {
        let client = client(Ok(DeviceConfig {
            settings: Some(settings(Some(WeatherTarget {
                city: "Denver".into(),
                units: Units::Imperial,
            }))),
            occupant: None,
        }));
        let snapshot = client.fetch("123456").await.unwrap();
        assert_eq!(snapshot.weather, None);
        assert_eq!(snapshot.settings.welcome_message.as_deref(), Some("Welcome!"));
    }

    #[test]
    fn rpc_codes_are_classified() {
        let rpc = |code: &str| stayboard_api::Error::Rpc {
            function: "get_device_config".into(),
            code: code.into(),
            message: code.into(),
        };
        assert!(matches!(
            classify(rpc("invalid_token")),
            CoreError::InvalidCredential { .. }
        ));
        assert!(matches!(
            classify(rpc("not_configured")),
            CoreError::NotConfigured { .. }
        ));
        assert!(classify(rpc("P0001")).is_transient());
        assert!(
            classify(stayboard_api::Error::Http {
                status: 500,
                message: String::new(),
            })
            .is_transient()
        );
    }
}
