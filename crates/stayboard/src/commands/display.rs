//! `stayboard display` handler.
//!
//! Runs an unattended display terminal in the foreground: pairs when
//! needed, prints every screen change and every playback step, and tears
//! everything down on Ctrl-C.

use std::fmt::Write;
use std::io::IsTerminal;
use std::sync::Arc;

use dialoguer::Input;

use stayboard_config::FileTokenStore;
use stayboard_core::{
    ConfigDeliveryClient, ConfigSnapshot, CoreError, DisplayTerminal, LocalStorage, MemoryStorage,
    PairingCode, PlaybackScheduler, PlaybackView, Screen, SurfaceRegistry, TerminalState,
};

use crate::cli::{DisplayArgs, GlobalOpts, OutputFormat};
use crate::commands::weather::format_weather;
use crate::config;
use crate::error::CliError;
use crate::output::{self, Tone};

pub async fn handle(args: DisplayArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let backend = config::backend_config(&cfg, global)?;
    let delivery = ConfigDeliveryClient::new(
        config::backend_client(&backend)?,
        config::weather_cache(&cfg)?,
    );
    let storage: Arc<dyn LocalStorage> = if args.ephemeral {
        Arc::new(MemoryStorage::new())
    } else {
        Arc::new(FileTokenStore::new(cfg.token_path()))
    };

    let terminal = DisplayTerminal::new(delivery, storage, cfg.terminal_config()?);
    let surfaces = SurfaceRegistry::new();
    let playback = surfaces.scheduler_for(&args.surface);

    let result = run(&terminal, &playback, args.code, global).await;

    terminal.shutdown().await;
    surfaces.release(&args.surface);
    result
}

async fn run(
    terminal: &DisplayTerminal,
    playback: &PlaybackScheduler,
    mut code: Option<String>,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let color = output::should_color(global.color);
    let mut states = terminal.subscribe();
    let mut views = playback.subscribe();
    let mut last_screen: Option<Screen> = None;

    terminal.start().await?;

    loop {
        let state = states.borrow_and_update().clone();
        let screen = state.screen();
        if last_screen.as_ref() != Some(&screen) {
            print_screen(&screen, global, color)?;
            last_screen = Some(screen);
        }

        match &state {
            TerminalState::Unpaired => {
                let entered = match code.take() {
                    Some(code) => code,
                    None => prompt_code().await?,
                };
                match terminal.submit_code(&entered).await {
                    Ok(()) => {}
                    Err(CoreError::ValidationFailed { message }) => {
                        eprintln!("{}", output::status_line(Tone::Error, &message, color));
                    }
                    Err(e) => return Err(e.into()),
                }
                continue;
            }
            TerminalState::Displaying(snapshot) => {
                playback.set_media(snapshot.settings.media.clone());
            }
            TerminalState::Loading | TerminalState::Error { .. } => {}
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = views.borrow_and_update().clone();
                if !global.quiet {
                    println!("{}", describe_playback(&view, color));
                }
            }
        }
    }
    Ok(())
}

/// Ask for a pairing code on the controlling terminal.
async fn prompt_code() -> Result<String, CliError> {
    if !std::io::stdin().is_terminal() {
        return Err(CliError::PairingRequired);
    }
    tokio::task::spawn_blocking(|| {
        Input::<String>::new()
            .with_prompt("Pairing code")
            .validate_with(|input: &String| -> Result<(), String> {
                input
                    .parse::<PairingCode>()
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            })
            .interact_text()
    })
    .await
    .map_err(|e| CliError::Io(std::io::Error::other(e)))?
    .map_err(|e| CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    })
}

// ── Rendering ────────────────────────────────────────────────────────

fn print_screen(screen: &Screen, global: &GlobalOpts, color: bool) -> Result<(), CliError> {
    let out = match screen {
        Screen::Pairing => output::status_line(
            Tone::Info,
            "Not paired. Enter the six-digit code shown in the host dashboard.",
            color,
        ),
        Screen::Spinner => output::status_line(Tone::Info, "Loading…", color),
        Screen::RetryPrompt(message) => output::status_line(Tone::Warn, message, color),
        Screen::Display(snapshot) if global.output == OutputFormat::Table => {
            format_snapshot(snapshot, color)
        }
        Screen::Display(snapshot) => output::render_single(
            global.output,
            snapshot.as_ref(),
            |s| format_snapshot(s, color),
            |s| s.settings.listing_id.to_string(),
        )?,
    };
    output::print_output(&out, global.quiet);
    Ok(())
}

fn format_snapshot(snapshot: &ConfigSnapshot, color: bool) -> String {
    let settings = &snapshot.settings;
    let mut out = output::status_line(
        Tone::Ok,
        &format!("Displaying listing {}", settings.listing_id),
        color,
    );

    if let Some(ref welcome) = settings.welcome_message {
        let _ = write!(out, "\n\n  {welcome}");
    }
    if let Some(ref guest) = snapshot.occupant {
        let _ = write!(out, "\n  Guest: {}", guest.full_name());
        if let (true, Some(check_out)) = (settings.show_checkout_time, guest.check_out) {
            let _ = write!(out, " (check-out {})", check_out.format("%a %b %-d, %H:%M"));
        }
    }
    if let Some(ref ssid) = settings.wifi_name {
        let _ = write!(
            out,
            "\n  Wi-Fi: {ssid} / {}",
            settings.wifi_password.as_deref().unwrap_or("(open)")
        );
    }
    if let Some(ref weather) = snapshot.weather {
        let summary = format_weather(weather, color);
        let first = summary.lines().next().unwrap_or_default();
        let _ = write!(out, "\n  Weather: {first}");
    }

    let media = &settings.media;
    let _ = write!(
        out,
        "\n  Media: {} image(s), {} video(s); showing {}s, rotating every {}s",
        media.images.len(),
        media.videos.len(),
        media.active_type,
        media.rotation_interval.seconds()
    );
    let _ = write!(
        out,
        "\n  Fetched {}",
        snapshot.fetched_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out
}

fn describe_playback(view: &PlaybackView, color: bool) -> String {
    match view.current_item {
        Some(ref item) => output::status_line(
            Tone::Info,
            &format!(
                "{} #{}: {}",
                view.active_type,
                view.current_index + 1,
                item.url
            ),
            color,
        ),
        None => output::status_line(Tone::Info, &format!("no {}s to show", view.active_type), color),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stayboard_core::{DisplaySettings, EntityId, MediaKind, UnifiedMediaState};

    fn snapshot() -> ConfigSnapshot {
        ConfigSnapshot {
            settings: DisplaySettings {
                listing_id: EntityId::from("l1"),
                welcome_message: Some("Welcome to the cabin".into()),
                wifi_name: Some("cabin".into()),
                wifi_password: None,
                show_checkout_time: true,
                weather: None,
                media: UnifiedMediaState::default(),
            },
            occupant: None,
            weather: None,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn snapshot_summary_lists_settings() {
        let text = format_snapshot(&snapshot(), false);
        assert!(text.contains("Displaying listing l1"));
        assert!(text.contains("Welcome to the cabin"));
        assert!(text.contains("Wi-Fi: cabin / (open)"));
        assert!(text.contains("0 image(s)"));
    }

    #[test]
    fn empty_playlist_is_a_placeholder() {
        let view = PlaybackView {
            active_type: MediaKind::Video,
            current_item: None,
            current_index: 0,
        };
        assert_eq!(describe_playback(&view, false), "○ no videos to show");
    }
}
