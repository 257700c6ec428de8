// ── Core error types ──
//
// Domain-level failures. Consumers never see HTTP status codes or raw
// JSON parse errors; `From<stayboard_api::Error>` folds transport
// failures into the categories that drive retry and pairing decisions.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // ── Retry-worthy ─────────────────────────────────────────────────
    /// Network failure, timeout or server-side hiccup.
    #[error("Temporarily unavailable: {message}")]
    Transient { message: String },

    /// A realtime subscription ended and could not be recovered.
    #[error("Subscription to {topic} lost: {reason}")]
    SubscriptionLost { topic: String, reason: String },

    // ── Pairing outcomes ─────────────────────────────────────────────
    /// The stored device token is unknown or has been revoked.
    #[error("Device credential rejected: {message}")]
    InvalidCredential { message: String },

    /// The device is paired but no display settings exist yet.
    #[error("Display not configured: {message}")]
    NotConfigured { message: String },

    // ── Degraded dependencies ────────────────────────────────────────
    /// An optional third-party service failed; a fallback may be shown.
    #[error("Third-party service degraded: {message}")]
    ThirdPartyDegraded { message: String },

    // ── Input / data ─────────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Could not decode {entity}: {message}")]
    Decode { entity: String, message: String },

    #[error("Local storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for failures that may succeed if the same call is repeated.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::SubscriptionLost { .. })
    }

    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<stayboard_api::Error> for CoreError {
    fn from(err: stayboard_api::Error) -> Self {
        use stayboard_api::Error as ApiError;

        match err {
            ApiError::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            ApiError::ClientSetup(message) => CoreError::Config { message },
            ApiError::CityNotFound { city } => CoreError::ThirdPartyDegraded {
                message: format!("weather provider does not know '{city}'"),
            },
            ApiError::WeatherUnauthorized => CoreError::ThirdPartyDegraded {
                message: "weather provider rejected the API key".into(),
            },
            ApiError::RealtimeConnect(reason) => CoreError::SubscriptionLost {
                topic: String::new(),
                reason,
            },
            ApiError::RealtimeClosed { code, reason } => CoreError::SubscriptionLost {
                topic: String::new(),
                reason: format!("closed with code {code}: {reason}"),
            },
            ApiError::Deserialization { message, body: _ } => CoreError::Decode {
                entity: "response".into(),
                message,
            },
            other => CoreError::Transient {
                message: other.to_string(),
            },
        }
    }
}
