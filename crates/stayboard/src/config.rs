//! CLI configuration: thin wrapper around `stayboard_config`.
//!
//! Applies global flag overrides (`--config`, `--url`) and builds the
//! clients the commands share.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use stayboard_api::{BackendClient, TransportConfig, WeatherClient};
use stayboard_config::ConfigError;
use stayboard_core::{BackendConfig, CoreError, Units, Weather, WeatherCache, WeatherLookup};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use stayboard_config::Config;

/// The config file in effect: `--config`, else the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(stayboard_config::config_path)
}

/// Load config from file + environment, then apply flag overrides.
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = stayboard_config::load_config_from(&config_file(global))?;
    if let Some(ref url) = global.url {
        cfg.backend.url = Some(url.clone());
    }
    Ok(cfg)
}

/// Resolve the backend section, reporting a missing URL helpfully.
pub fn backend_config(cfg: &Config, global: &GlobalOpts) -> Result<BackendConfig, CliError> {
    if cfg.backend.url.is_none() {
        return Err(CliError::NoConfig {
            path: config_file(global).display().to_string(),
        });
    }
    Ok(cfg.backend_config()?)
}

pub fn backend_client(backend: &BackendConfig) -> Result<Arc<BackendClient>, CliError> {
    let transport = TransportConfig {
        timeout: backend.timeout,
        ..TransportConfig::default()
    };
    let client = BackendClient::new(backend.url.clone(), backend.api_key.clone(), &transport)?;
    Ok(Arc::new(client))
}

// ── Weather ─────────────────────────────────────────────────────────

/// Stand-in provider when no weather key is configured. Every lookup
/// degrades to the cache's fallback value.
struct NoWeatherKey;

#[async_trait]
impl WeatherLookup for NoWeatherKey {
    async fn lookup(&self, _city: &str, _units: Units) -> Result<Weather, CoreError> {
        Err(CoreError::ThirdPartyDegraded {
            message: "no weather API key configured".into(),
        })
    }
}

pub fn weather_cache(cfg: &Config) -> Result<Arc<WeatherCache>, CliError> {
    let lookup: Arc<dyn WeatherLookup> = match stayboard_config::resolve_weather_key(cfg) {
        Ok(key) => Arc::new(WeatherClient::new(
            cfg.weather_url()?,
            key,
            &TransportConfig::default(),
        )?),
        Err(ConfigError::NoCredentials { .. }) => {
            warn!("no weather API key configured, weather will use fallback values");
            Arc::new(NoWeatherKey)
        }
        Err(e) => return Err(e.into()),
    };
    Ok(Arc::new(WeatherCache::new(lookup, cfg.weather_cache_config()?)))
}
