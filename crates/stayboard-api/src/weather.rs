// Third-party weather lookup
//
// Thin client over an OpenWeatherMap-compatible "current weather"
// endpoint. Errors are classified (unknown city, bad key, transport)
// but never retried here; caching and fallback live in core.

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{CurrentWeather, WeatherResponse};
use crate::transport::TransportConfig;

/// Default provider endpoint.
pub const DEFAULT_WEATHER_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

/// HTTP client for the weather provider.
pub struct WeatherClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: SecretString,
}

impl WeatherClient {
    pub fn new(
        endpoint: Url,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            endpoint,
            api_key,
        })
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: Url, api_key: SecretString) -> Self {
        Self {
            http,
            endpoint,
            api_key,
        }
    }

    /// Current conditions for `city` in `units` (`"imperial"` or `"metric"`).
    ///
    /// `GET {endpoint}?q={city}&units={units}&appid={key}`
    pub async fn current(&self, city: &str, units: &str) -> Result<CurrentWeather, Error> {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("q", city)
            .append_pair("units", units)
            .append_pair("appid", self.api_key.expose_secret());
        debug!(city, units, "weather lookup");

        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        match status.as_u16() {
            401 => return Err(Error::WeatherUnauthorized),
            404 => {
                return Err(Error::CityNotFound {
                    city: city.to_owned(),
                });
            }
            _ if !status.is_success() => {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Http {
                    status: status.as_u16(),
                    message: body.chars().take(200).collect(),
                });
            }
            _ => {}
        }

        let body = resp.text().await?;
        let raw: WeatherResponse = serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: body.clone(),
        })?;
        Ok(flatten(city, raw))
    }
}

fn flatten(city: &str, raw: WeatherResponse) -> CurrentWeather {
    let condition = raw.weather.into_iter().next();
    CurrentWeather {
        city: raw.name.unwrap_or_else(|| city.to_owned()),
        temp: raw.main.temp,
        description: condition
            .as_ref()
            .and_then(|c| c.description.clone())
            .unwrap_or_default(),
        icon: condition.and_then(|c| c.icon).unwrap_or_default(),
        humidity: raw.main.humidity,
        wind_speed: raw.wind.and_then(|w| w.speed),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn flatten_takes_first_condition() {
        let raw: WeatherResponse = serde_json::from_value(serde_json::json!({
            "main": {"temp": 81.5, "humidity": 70},
            "weather": [
                {"description": "scattered clouds", "icon": "03d"},
                {"description": "mist", "icon": "50d"}
            ],
            "wind": {"speed": 9.2}
        }))
        .unwrap();

        let w = flatten("Miami", raw);
        assert_eq!(w.city, "Miami");
        assert_eq!(w.description, "scattered clouds");
        assert_eq!(w.icon, "03d");
        assert_eq!(w.humidity, Some(70));
        assert_eq!(w.wind_speed, Some(9.2));
    }
}
