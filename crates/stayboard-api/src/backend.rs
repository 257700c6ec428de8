// Backend HTTP client
//
// Wraps `reqwest::Client` with row-select URL construction, filter
// rendering, remote procedure calls and error-body decoding. The
// realtime channel lives in `realtime.rs`; this module only covers
// request/response traffic.

use std::fmt;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::models::{DeviceConfigResponse, RpcErrorBody};
use crate::transport::TransportConfig;

const REST_PREFIX: &str = "rest/v1";
const REALTIME_PATH: &str = "realtime/v1/websocket";
const REALTIME_PROTOCOL_VERSION: &str = "1.0.0";

// ── Row filters ─────────────────────────────────────────────────────

/// Server-side row filter, rendered in PostgREST syntax.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowFilter {
    /// `column=eq.value`
    Eq { column: String, value: String },
    /// `column=in.(a,b,c)`
    In { column: String, values: Vec<String> },
}

impl RowFilter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            column: column.into(),
            value: value.into(),
        }
    }

    pub fn any_of(column: impl Into<String>, values: impl IntoIterator<Item = String>) -> Self {
        Self::In {
            column: column.into(),
            values: values.into_iter().collect(),
        }
    }

    pub fn column(&self) -> &str {
        match self {
            Self::Eq { column, .. } | Self::In { column, .. } => column,
        }
    }

    /// The operator expression without the column, e.g. `eq.42`.
    pub fn expression(&self) -> String {
        match self {
            Self::Eq { value, .. } => format!("eq.{value}"),
            Self::In { values, .. } => format!("in.({})", values.join(",")),
        }
    }
}

impl fmt::Display for RowFilter {
    /// Realtime filter syntax: `column=eq.value`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column(), self.expression())
    }
}

// ── Client ──────────────────────────────────────────────────────────

/// HTTP client for the hosted backend.
///
/// Every request carries the project key both as `apikey` and as a
/// bearer token. Row selects return raw rows; callers map them into
/// domain types.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<SecretString>,
}

impl BackendClient {
    /// Create a client from a project URL and key.
    pub fn new(
        base_url: Url,
        api_key: SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut headers = HeaderMap::new();
        let mut key_value = HeaderValue::from_str(api_key.expose_secret())
            .map_err(|e| Error::ClientSetup(format!("invalid api key header: {e}")))?;
        key_value.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", api_key.expose_secret()))
            .map_err(|e| Error::ClientSetup(format!("invalid authorization header: {e}")))?;
        bearer.set_sensitive(true);
        headers.insert("apikey", key_value);
        headers.insert(AUTHORIZATION, bearer);

        let http = transport.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            base_url,
            api_key: Some(api_key),
        })
    }

    /// Create a client with a pre-built `reqwest::Client` and no key.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            api_key: None,
        }
    }

    /// The backend base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    fn join(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// `{base}/rest/v1/{table}`
    pub(crate) fn table_url(&self, table: &str) -> Result<Url, Error> {
        self.join(&format!("{REST_PREFIX}/{table}"))
    }

    /// `{base}/rest/v1/rpc/{function}`
    pub(crate) fn rpc_url(&self, function: &str) -> Result<Url, Error> {
        self.join(&format!("{REST_PREFIX}/rpc/{function}"))
    }

    /// WebSocket endpoint for the realtime channel.
    ///
    /// Swaps the scheme (`https` → `wss`, `http` → `ws`) and appends the
    /// key and protocol version as query parameters.
    pub fn realtime_url(&self) -> Result<Url, Error> {
        let mut url = self.join(REALTIME_PATH)?;
        let scheme = if self.base_url.scheme() == "https" {
            "wss"
        } else {
            "ws"
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::ClientSetup(format!("cannot use scheme {scheme}")))?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(ref key) = self.api_key {
                query.append_pair("apikey", key.expose_secret());
            }
            query.append_pair("vsn", REALTIME_PROTOCOL_VERSION);
        }
        Ok(url)
    }

    // ── Row access ───────────────────────────────────────────────────

    /// Select all rows of `table`, optionally filtered server-side.
    ///
    /// `GET /rest/v1/{table}?select=*[&column=op.value]`
    pub async fn select_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        filter: Option<&RowFilter>,
    ) -> Result<Vec<T>, Error> {
        let mut url = self.table_url(table)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("select", "*");
            if let Some(filter) = filter {
                query.append_pair(filter.column(), &filter.expression());
            }
        }
        debug!(table, "GET {}", url);

        let resp = self.http.get(url).send().await?;
        self.parse_json(resp).await
    }

    // ── Remote procedures ────────────────────────────────────────────

    /// Invoke a remote procedure with a JSON body.
    ///
    /// `POST /rest/v1/rpc/{function}`
    pub async fn rpc<T: DeserializeOwned>(
        &self,
        function: &str,
        body: &(impl Serialize + Sync),
    ) -> Result<T, Error> {
        let url = self.rpc_url(function)?;
        debug!(function, "POST {}", url);

        let resp = self.http.post(url).json(body).send().await?;
        let status = resp.status();
        if status.is_client_error() && status.as_u16() != 401 && status.as_u16() != 403 {
            let body = resp.text().await.unwrap_or_default();
            return Err(rpc_error(function, status.as_u16(), &body));
        }
        self.parse_json(resp).await
    }

    /// Fetch the composed display configuration for a device token.
    ///
    /// An in-band `{"error": "..."}` response is surfaced as
    /// [`Error::Rpc`] so callers branch on one error shape.
    pub async fn get_device_config(&self, token: &str) -> Result<DeviceConfigResponse, Error> {
        let resp: DeviceConfigResponse = self
            .rpc("get_device_config", &json!({ "p_token": token }))
            .await?;
        if let Some(code) = resp.error {
            return Err(Error::Rpc {
                function: "get_device_config".into(),
                message: code.clone(),
                code,
            });
        }
        Ok(resp)
    }

    /// Record a liveness heartbeat for a device token.
    pub async fn ping_device(&self, token: &str) -> Result<(), Error> {
        let _: serde_json::Value = self
            .rpc("ping_device", &json!({ "p_token": token }))
            .await?;
        trace!("device heartbeat accepted");
        Ok(())
    }

    // ── Response decoding ────────────────────────────────────────────

    async fn parse_json<T: DeserializeOwned>(&self, resp: reqwest::Response) -> Result<T, Error> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http {
                status: status.as_u16(),
                message: preview(&body).to_owned(),
            });
        }

        let body = resp.text().await?;
        // Void procedures answer with an empty body.
        let body_ref = if body.trim().is_empty() { "null" } else { &body };
        serde_json::from_str(body_ref).map_err(|e| Error::Deserialization {
            message: format!("{e} (body preview: {:?})", preview(&body)),
            body: body.clone(),
        })
    }
}

/// Decode a PostgREST error body, falling back to the HTTP status.
fn rpc_error(function: &str, status: u16, body: &str) -> Error {
    match serde_json::from_str::<RpcErrorBody>(body) {
        Ok(RpcErrorBody {
            code,
            message: Some(message),
        }) => Error::Rpc {
            function: function.to_owned(),
            code: code.unwrap_or_else(|| status.to_string()),
            message,
        },
        _ => Error::Http {
            status,
            message: preview(body).to_owned(),
        },
    }
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(200);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(base: &str) -> BackendClient {
        BackendClient::with_client(reqwest::Client::new(), Url::parse(base).unwrap())
    }

    #[test]
    fn filter_rendering() {
        let f = RowFilter::eq("listing_id", "abc");
        assert_eq!(f.to_string(), "listing_id=eq.abc");

        let f = RowFilter::any_of("user_id", vec!["u1".to_owned(), "u2".to_owned()]);
        assert_eq!(f.expression(), "in.(u1,u2)");
    }

    #[test]
    fn realtime_url_swaps_scheme() {
        let url = client("https://project.example.com").realtime_url().unwrap();
        assert_eq!(url.scheme(), "wss");
        assert_eq!(url.path(), "/realtime/v1/websocket");
        assert!(url.query().unwrap().contains("vsn=1.0.0"));

        let url = client("http://localhost:54321/").realtime_url().unwrap();
        assert_eq!(url.scheme(), "ws");
    }

    #[test]
    fn rpc_error_prefers_structured_body() {
        let err = rpc_error(
            "get_device_config",
            400,
            r#"{"code":"P0001","message":"not_configured"}"#,
        );
        assert!(matches!(err, Error::Rpc { ref message, .. } if message == "not_configured"));

        let err = rpc_error("ping_device", 404, "nope");
        assert!(err.is_not_found());
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(150);
        assert!(preview(&body).len() <= 200);
    }
}
