//! Shared configuration for the stayboard CLI.
//!
//! TOML file + `STAYBOARD_` environment overrides (figment), credential
//! resolution (env → keyring → plaintext), and translation into the
//! runtime configs `stayboard_core` consumes.

mod token_store;

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use stayboard_api::weather::DEFAULT_WEATHER_URL;
use stayboard_core::{
    BackendConfig, RealtimeTuning, ResubscribePolicy, RetryBackoff, TerminalConfig, Units,
    WeatherCacheConfig,
};

pub use token_store::FileTokenStore;

/// Keyring service name under which secrets are stored.
pub const KEYRING_SERVICE: &str = "stayboard";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no {slot} configured")]
    NoCredentials { slot: CredentialSlot },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub realtime: RealtimeSection,
    #[serde(default)]
    pub terminal: TerminalSection,
    #[serde(default)]
    pub weather: WeatherSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendSection {
    /// Project URL (e.g. "https://abc.supabase.co").
    pub url: Option<String>,

    /// Project key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable holding the project key.
    #[serde(default = "default_backend_key_env")]
    pub api_key_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            api_key_env: default_backend_key_env(),
            timeout: default_timeout(),
        }
    }
}

fn default_backend_key_env() -> String {
    "STAYBOARD_API_KEY".into()
}
fn default_timeout() -> u64 {
    30
}

/// Realtime channel and resubscription tuning, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RealtimeSection {
    #[serde(default = "default_join_timeout")]
    pub join_timeout: u64,
    #[serde(default = "default_channel_heartbeat")]
    pub heartbeat_interval: u64,
    #[serde(default = "default_resubscribe_delay")]
    pub resubscribe_delay: u64,
    #[serde(default = "default_max_error_retries")]
    pub max_error_retries: u32,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            join_timeout: default_join_timeout(),
            heartbeat_interval: default_channel_heartbeat(),
            resubscribe_delay: default_resubscribe_delay(),
            max_error_retries: default_max_error_retries(),
        }
    }
}

fn default_join_timeout() -> u64 {
    10
}
fn default_channel_heartbeat() -> u64 {
    30
}
fn default_resubscribe_delay() -> u64 {
    5
}
fn default_max_error_retries() -> u32 {
    1
}

/// Display terminal pacing, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TerminalSection {
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval: u64,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    #[serde(default = "default_retry_initial")]
    pub retry_initial_delay: u64,
    #[serde(default = "default_retry_max")]
    pub retry_max_delay: u64,
    /// Where the device token is persisted. Defaults to the platform
    /// data directory.
    pub token_file: Option<PathBuf>,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            heartbeat_interval: default_heartbeat_interval(),
            refresh_interval: default_refresh_interval(),
            retry_initial_delay: default_retry_initial(),
            retry_max_delay: default_retry_max(),
            token_file: None,
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    60
}
fn default_refresh_interval() -> u64 {
    30 * 60
}
fn default_retry_initial() -> u64 {
    1
}
fn default_retry_max() -> u64 {
    300
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WeatherSection {
    #[serde(default = "default_weather_url")]
    pub url: String,

    /// Provider key (plaintext; prefer keyring or env var).
    pub api_key: Option<String>,

    #[serde(default = "default_weather_key_env")]
    pub api_key_env: String,

    /// Units used when a lookup doesn't specify any.
    #[serde(default)]
    pub units: Units,

    /// Seconds a successful lookup is cached.
    #[serde(default = "default_weather_ttl")]
    pub ttl: u64,

    /// Seconds a fallback value is cached after a failed lookup.
    #[serde(default = "default_weather_failure_ttl")]
    pub failure_ttl: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for WeatherSection {
    fn default() -> Self {
        Self {
            url: default_weather_url(),
            api_key: None,
            api_key_env: default_weather_key_env(),
            units: Units::default(),
            ttl: default_weather_ttl(),
            failure_ttl: default_weather_failure_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_weather_url() -> String {
    DEFAULT_WEATHER_URL.into()
}
fn default_weather_key_env() -> String {
    "STAYBOARD_WEATHER_KEY".into()
}
fn default_weather_ttl() -> u64 {
    30 * 60
}
fn default_weather_failure_ttl() -> u64 {
    5 * 60
}
fn default_max_entries() -> usize {
    256
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "stayboard", "stayboard")
}

fn home_fallback(leaf: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(leaf);
    p.push("stayboard");
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the persisted device token.
pub fn default_token_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join("terminal.toml"),
        |dirs| dirs.data_dir().join("terminal.toml"),
    )
}

// ── Loading / saving ────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file. Environment variables such as
/// `STAYBOARD_BACKEND__URL` override file values.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let config: Config = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("STAYBOARD_").split("__"))
        .extract()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

/// Write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

// ── Credentials ─────────────────────────────────────────────────────

/// Which secret is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSlot {
    BackendKey,
    WeatherKey,
}

impl CredentialSlot {
    /// Keyring account name.
    pub fn account(self) -> &'static str {
        match self {
            Self::BackendKey => "backend/api-key",
            Self::WeatherKey => "weather/api-key",
        }
    }
}

impl std::fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::BackendKey => "backend API key",
            Self::WeatherKey => "weather API key",
        })
    }
}

fn keyring_lookup(slot: CredentialSlot) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, slot.account())
        .ok()?
        .get_password()
        .ok()
}

/// Store a secret in the system keyring.
pub fn store_secret(slot: CredentialSlot, secret: &str) -> Result<(), ConfigError> {
    keyring::Entry::new(KEYRING_SERVICE, slot.account())?.set_password(secret)?;
    Ok(())
}

/// Walk the chain: named env var, then keyring, then plaintext.
fn resolve_chain(
    slot: CredentialSlot,
    env_name: &str,
    plaintext: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
    keyring: impl Fn(CredentialSlot) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    env(env_name)
        .filter(|v| !v.is_empty())
        .or_else(|| keyring(slot))
        .or_else(|| plaintext.map(str::to_owned))
        .map(SecretString::from)
        .ok_or(ConfigError::NoCredentials { slot })
}

/// Resolve the backend project key.
pub fn resolve_api_key(cfg: &Config) -> Result<SecretString, ConfigError> {
    resolve_chain(
        CredentialSlot::BackendKey,
        &cfg.backend.api_key_env,
        cfg.backend.api_key.as_deref(),
        |name| std::env::var(name).ok(),
        keyring_lookup,
    )
}

/// Resolve the weather provider key.
pub fn resolve_weather_key(cfg: &Config) -> Result<SecretString, ConfigError> {
    resolve_chain(
        CredentialSlot::WeatherKey,
        &cfg.weather.api_key_env,
        cfg.weather.api_key.as_deref(),
        |name| std::env::var(name).ok(),
        keyring_lookup,
    )
}

// ── Translation to runtime configs ──────────────────────────────────

fn positive_secs(field: &str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(invalid(field, "must be at least 1 second"));
    }
    Ok(Duration::from_secs(secs))
}

impl Config {
    /// The backend URL, parsed.
    pub fn backend_url(&self) -> Result<Url, ConfigError> {
        let raw = self
            .backend
            .url
            .as_deref()
            .ok_or_else(|| invalid("backend.url", "not set"))?;
        raw.parse()
            .map_err(|_| invalid("backend.url", format!("invalid URL: {raw}")))
    }

    /// Full backend config, resolving the project key.
    pub fn backend_config(&self) -> Result<BackendConfig, ConfigError> {
        Ok(BackendConfig {
            url: self.backend_url()?,
            api_key: resolve_api_key(self)?,
            timeout: positive_secs("backend.timeout", self.backend.timeout)?,
            realtime: self.realtime_tuning()?,
        })
    }

    pub fn realtime_tuning(&self) -> Result<RealtimeTuning, ConfigError> {
        Ok(RealtimeTuning {
            join_timeout: positive_secs("realtime.join_timeout", self.realtime.join_timeout)?,
            heartbeat_interval: positive_secs(
                "realtime.heartbeat_interval",
                self.realtime.heartbeat_interval,
            )?,
        })
    }

    pub fn resubscribe_policy(&self) -> ResubscribePolicy {
        ResubscribePolicy {
            delay: Duration::from_secs(self.realtime.resubscribe_delay),
            max_error_retries: self.realtime.max_error_retries,
        }
    }

    pub fn terminal_config(&self) -> Result<TerminalConfig, ConfigError> {
        let t = &self.terminal;
        let retry = RetryBackoff {
            initial_delay: positive_secs("terminal.retry_initial_delay", t.retry_initial_delay)?,
            max_delay: positive_secs("terminal.retry_max_delay", t.retry_max_delay)?,
        };
        if retry.max_delay < retry.initial_delay {
            return Err(invalid(
                "terminal.retry_max_delay",
                "must not be shorter than retry_initial_delay",
            ));
        }
        Ok(TerminalConfig {
            heartbeat_interval: positive_secs("terminal.heartbeat_interval", t.heartbeat_interval)?,
            refresh_interval: positive_secs("terminal.refresh_interval", t.refresh_interval)?,
            retry,
        })
    }

    pub fn token_path(&self) -> PathBuf {
        self.terminal
            .token_file
            .clone()
            .unwrap_or_else(default_token_path)
    }

    pub fn weather_url(&self) -> Result<Url, ConfigError> {
        self.weather
            .url
            .parse()
            .map_err(|_| invalid("weather.url", format!("invalid URL: {}", self.weather.url)))
    }

    pub fn weather_cache_config(&self) -> Result<WeatherCacheConfig, ConfigError> {
        let w = &self.weather;
        if w.max_entries == 0 {
            return Err(invalid("weather.max_entries", "must be at least 1"));
        }
        Ok(WeatherCacheConfig {
            ttl: positive_secs("weather.ttl", w.ttl)?,
            failure_ttl: positive_secs("weather.failure_ttl", w.failure_ttl)?,
            max_entries: w.max_entries,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    #[test]
    fn defaults_match_runtime_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.terminal_config().unwrap().refresh_interval, TerminalConfig::default().refresh_interval);
        assert_eq!(cfg.terminal_config().unwrap().retry, RetryBackoff::default());
        assert_eq!(cfg.resubscribe_policy(), ResubscribePolicy::default());
        assert_eq!(cfg.weather_cache_config().unwrap(), WeatherCacheConfig::default());
        assert_eq!(cfg.weather_url().unwrap().as_str(), DEFAULT_WEATHER_URL);
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[backend]
url = "https://abc.example.co"
api_key = "plain"

[terminal]
heartbeat_interval = 15

[weather]
units = "metric"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.backend_url().unwrap().host_str(), Some("abc.example.co"));
        assert_eq!(cfg.backend.timeout, 30);
        assert_eq!(
            cfg.terminal_config().unwrap().heartbeat_interval,
            Duration::from_secs(15)
        );
        assert_eq!(cfg.weather.units, Units::Metric);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = Config::default();
        cfg.backend.url = Some("https://abc.example.co".into());
        cfg.terminal.token_file = Some(dir.path().join("token.toml"));

        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.backend.url, cfg.backend.url);
        assert_eq!(loaded.token_path(), dir.path().join("token.toml"));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let mut cfg = Config::default();
        cfg.terminal.heartbeat_interval = 0;
        assert!(matches!(
            cfg.terminal_config(),
            Err(ConfigError::Validation { ref field, .. }) if field == "terminal.heartbeat_interval"
        ));

        let mut cfg = Config::default();
        cfg.terminal.retry_max_delay = 0;
        assert!(cfg.terminal_config().is_err());
    }

    #[test]
    fn missing_backend_url_is_reported() {
        let err = Config::default().backend_url().unwrap_err();
        assert!(err.to_string().contains("backend.url"));
    }

    // ── Credential chain ────────────────────────────────────────────

    fn resolve(
        env: Option<&str>,
        keyring: Option<&str>,
        plaintext: Option<&str>,
    ) -> Result<SecretString, ConfigError> {
        resolve_chain(
            CredentialSlot::BackendKey,
            "STAYBOARD_API_KEY",
            plaintext,
            |name| {
                assert_eq!(name, "STAYBOARD_API_KEY");
                env.map(str::to_owned)
            },
            |_| keyring.map(str::to_owned),
        )
    }

    #[test]
    fn env_wins_over_keyring_and_plaintext() {
        let key = resolve(Some("from-env"), Some("from-keyring"), Some("plain")).unwrap();
        assert_eq!(key.expose_secret(), "from-env");
    }

    #[test]
    fn keyring_wins_over_plaintext() {
        let key = resolve(None, Some("from-keyring"), Some("plain")).unwrap();
        assert_eq!(key.expose_secret(), "from-keyring");

        // An empty env var is treated as unset.
        let key = resolve(Some(""), None, Some("plain")).unwrap();
        assert_eq!(key.expose_secret(), "plain");
    }

    #[test]
    fn no_source_is_an_error() {
        assert!(matches!(
            resolve(None, None, None),
            Err(ConfigError::NoCredentials {
                slot: CredentialSlot::BackendKey
            })
        ));
    }
}
