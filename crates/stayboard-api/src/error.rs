use thiserror::Error;

/// Top-level error type for the `stayboard-api` crate.
///
/// Covers every failure mode across the API surfaces: REST row access,
/// remote procedure calls, the realtime channel, and the weather provider.
/// `stayboard-core` maps these into the domain taxonomy.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Client could not be built (TLS backend, bad header value).
    #[error("Client setup failed: {0}")]
    ClientSetup(String),

    // ── Backend ─────────────────────────────────────────────────────
    /// Non-success HTTP status from the backend.
    #[error("Backend returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A remote procedure returned a structured error.
    #[error("RPC {function} failed ({code}): {message}")]
    Rpc {
        function: String,
        code: String,
        message: String,
    },

    // ── Realtime ────────────────────────────────────────────────────
    /// WebSocket connection failed.
    #[error("Realtime connection failed: {0}")]
    RealtimeConnect(String),

    /// WebSocket closed unexpectedly.
    #[error("Realtime channel closed (code {code}): {reason}")]
    RealtimeClosed { code: u16, reason: String },

    // ── Weather provider ────────────────────────────────────────────
    /// The provider does not know the requested city.
    #[error("Weather lookup: city '{city}' not found")]
    CityNotFound { city: String },

    /// The provider rejected the API key.
    #[error("Weather lookup: invalid provider credentials")]
    WeatherUnauthorized,

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the backend rejected our credentials or token.
    pub fn is_unauthorized(&self) -> bool {
        match self {
            Self::Http { status, .. } => *status == 401 || *status == 403,
            Self::Transport(e) => matches!(e.status().map(|s| s.as_u16()), Some(401 | 403)),
            Self::WeatherUnauthorized => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::RealtimeConnect(_) | Self::RealtimeClosed { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if this is a "not found" error.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Transport(e) => e.status() == Some(reqwest::StatusCode::NOT_FOUND),
            Self::Http { status: 404, .. } | Self::CityNotFound { .. } => true,
            _ => false,
        }
    }

    /// Extract the RPC error code, if available.
    pub fn rpc_code(&self) -> Option<&str> {
        match self {
            Self::Rpc { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_statuses() {
        let e = Error::Http {
            status: 401,
            message: String::new(),
        };
        assert!(e.is_unauthorized());
        assert!(!e.is_transient());
    }

    #[test]
    fn server_errors_are_transient() {
        let e = Error::Http {
            status: 503,
            message: "unavailable".into(),
        };
        assert!(e.is_transient());
        assert!(!e.is_not_found());
    }

    #[test]
    fn rpc_code_is_exposed() {
        let e = Error::Rpc {
            function: "get_device_config".into(),
            code: "invalid_token".into(),
            message: "Invalid token".into(),
        };
        assert_eq!(e.rpc_code(), Some("invalid_token"));
    }
}
