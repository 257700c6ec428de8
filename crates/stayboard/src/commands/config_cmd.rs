//! Config subcommand handlers.

use std::fmt::Write;

use dialoguer::{Confirm, Input, Password, Select};

use stayboard_config::{CredentialSlot, store_secret};
use stayboard_core::Units;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Format config for display, masking secrets.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();
    let mask = |v: &Option<String>| if v.is_some() { "\"****\"" } else { "(unset)" };

    let _ = writeln!(out, "[backend]");
    let _ = writeln!(
        out,
        "url = {}",
        cfg.backend
            .url
            .as_deref()
            .map_or_else(|| "(unset)".to_owned(), |u| format!("\"{u}\""))
    );
    let _ = writeln!(out, "api_key = {}", mask(&cfg.backend.api_key));
    let _ = writeln!(out, "api_key_env = \"{}\"", cfg.backend.api_key_env);
    let _ = writeln!(out, "timeout = {}", cfg.backend.timeout);

    let _ = writeln!(out, "\n[realtime]");
    let _ = writeln!(out, "join_timeout = {}", cfg.realtime.join_timeout);
    let _ = writeln!(out, "heartbeat_interval = {}", cfg.realtime.heartbeat_interval);
    let _ = writeln!(out, "resubscribe_delay = {}", cfg.realtime.resubscribe_delay);
    let _ = writeln!(out, "max_error_retries = {}", cfg.realtime.max_error_retries);

    let _ = writeln!(out, "\n[terminal]");
    let _ = writeln!(out, "heartbeat_interval = {}", cfg.terminal.heartbeat_interval);
    let _ = writeln!(out, "refresh_interval = {}", cfg.terminal.refresh_interval);
    let _ = writeln!(out, "retry_initial_delay = {}", cfg.terminal.retry_initial_delay);
    let _ = writeln!(out, "retry_max_delay = {}", cfg.terminal.retry_max_delay);
    let _ = writeln!(out, "token_file = \"{}\"", cfg.token_path().display());

    let _ = writeln!(out, "\n[weather]");
    let _ = writeln!(out, "url = \"{}\"", cfg.weather.url);
    let _ = writeln!(out, "api_key = {}", mask(&cfg.weather.api_key));
    let _ = writeln!(out, "api_key_env = \"{}\"", cfg.weather.api_key_env);
    let _ = writeln!(out, "units = \"{}\"", cfg.weather.units);
    let _ = writeln!(out, "ttl = {}", cfg.weather.ttl);
    let _ = writeln!(out, "failure_ttl = {}", cfg.weather.failure_ttl);
    let _ = write!(out, "max_entries = {}", cfg.weather.max_entries);

    out
}

/// Map a dialoguer / interactive I/O failure into CliError.
fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Offer to store a secret in the system keyring.
///
/// Returns `Some(secret)` if the user chose plaintext, `None` if stored
/// in the keyring.
fn prompt_keyring_storage(slot: CredentialSlot, secret: String) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt(format!("Where to store the {slot}?"))
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        store_secret(slot, &secret)?;
        eprintln!("   ✓ {slot} stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(secret))
    }
}

fn prompt_secret(label: &str, allow_empty: bool) -> Result<String, CliError> {
    Password::new()
        .with_prompt(label)
        .allow_empty_password(allow_empty)
        .interact()
        .map_err(prompt_err)
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&config::config_file(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            output::print_output(&format_config_redacted(&cfg), global.quiet);
            Ok(())
        }

        ConfigCommand::Init => init(global),
    }
}

fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_file(global);
    eprintln!("stayboard configuration wizard");
    eprintln!("   Config path: {}\n", path.display());

    if path.exists()
        && !Confirm::new()
            .with_prompt("A config file already exists. Overwrite it?")
            .default(false)
            .interact()
            .map_err(prompt_err)?
    {
        return Ok(());
    }

    let mut cfg = Config::default();

    // 1. Backend
    let url: String = Input::new()
        .with_prompt("Backend project URL")
        .validate_with(|input: &String| -> Result<(), String> {
            url::Url::parse(input).map(|_| ()).map_err(|e| e.to_string())
        })
        .interact_text()
        .map_err(prompt_err)?;
    cfg.backend.url = Some(url);

    let key = prompt_secret("Backend API key", false)?;
    cfg.backend.api_key = prompt_keyring_storage(CredentialSlot::BackendKey, key)?;

    // 2. Weather (optional)
    let weather_key = prompt_secret("Weather API key (leave empty to skip)", true)?;
    if !weather_key.is_empty() {
        cfg.weather.api_key = prompt_keyring_storage(CredentialSlot::WeatherKey, weather_key)?;
    }
    let units = Select::new()
        .with_prompt("Default weather units")
        .items(&["imperial", "metric"])
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    cfg.weather.units = if units == 0 { Units::Imperial } else { Units::Metric };

    stayboard_config::save_config_to(&cfg, &path)?;
    eprintln!("\n   ✓ Config written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secrets_are_masked() {
        let mut cfg = Config::default();
        cfg.backend.url = Some("https://abc.example.co".into());
        cfg.backend.api_key = Some("super-secret".into());

        let text = format_config_redacted(&cfg);
        assert!(!text.contains("super-secret"));
        assert!(text.contains("api_key = \"****\""));
        assert!(text.contains("url = \"https://abc.example.co\""));
    }
}
