//! `stayboard weather` handler.

use std::fmt::Write;

use stayboard_core::{Units, Weather};

use crate::cli::{GlobalOpts, WeatherArgs};
use crate::config;
use crate::error::CliError;
use crate::output::{self, Tone};

pub async fn handle(args: WeatherArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let units = args.units.map_or(cfg.weather.units, Units::from);
    let cache = config::weather_cache(&cfg)?;

    let weather = cache.get(&args.city, units).await;
    let color = output::should_color(global.color);
    let out = output::render_single(
        global.output,
        &weather,
        |w| format_weather(w, color),
        |w| format!("{:.0}", w.temperature),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

/// Human-readable weather summary.
pub fn format_weather(w: &Weather, color: bool) -> String {
    let mut out = format!(
        "{}  {:.0}{}  {}",
        w.city,
        w.temperature,
        w.units.temperature_suffix(),
        w.description
    );
    if let Some(humidity) = w.humidity {
        let _ = write!(out, "\nhumidity  {humidity}%");
    }
    if let Some(wind) = w.wind_speed {
        let unit = match w.units {
            Units::Imperial => "mph",
            Units::Metric => "m/s",
        };
        let _ = write!(out, "\nwind      {wind:.1} {unit}");
    }
    if !w.is_live() {
        out.push('\n');
        out.push_str(&output::status_line(
            Tone::Warn,
            "provider unavailable, showing fallback",
            color,
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_is_flagged() {
        let text = format_weather(&Weather::fallback("Miami", Units::Imperial), false);
        assert!(text.starts_with("Miami  72°F  Weather unavailable"));
        assert!(text.contains("fallback"));
    }
}
