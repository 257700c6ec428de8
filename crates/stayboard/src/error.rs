//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use stayboard_config::{ConfigError, CredentialSlot};
use stayboard_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_CONFIGURED: i32 = 4;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────
    #[error("Backend URL is not configured")]
    #[diagnostic(
        code(stayboard::no_config),
        help(
            "Create a config with: stayboard config init\n\
             Or pass --url / set STAYBOARD_URL.\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("No {slot} configured")]
    #[diagnostic(
        code(stayboard::no_credentials),
        help(
            "Store one with: stayboard config init\n\
             Or set the environment variable named in the config (default STAYBOARD_API_KEY)."
        )
    )]
    NoCredentials { slot: CredentialSlot },

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(stayboard::validation))]
    Validation { field: String, reason: String },

    #[error("Configuration error: {0}")]
    #[diagnostic(code(stayboard::config))]
    Config(String),

    // ── Terminal ─────────────────────────────────────────────────────
    #[error("This display is not paired")]
    #[diagnostic(
        code(stayboard::pairing_required),
        help("Run interactively to enter a pairing code, or pass --code.")
    )]
    PairingRequired,

    #[error("The pairing code or device token was rejected")]
    #[diagnostic(
        code(stayboard::invalid_credential),
        help("Generate a new pairing code for this display and try again.")
    )]
    InvalidCredential,

    #[error("Nothing is configured yet: {message}")]
    #[diagnostic(code(stayboard::not_configured))]
    NotConfigured { message: String },

    // ── Backend ──────────────────────────────────────────────────────
    #[error("Backend request failed: {message}")]
    #[diagnostic(
        code(stayboard::backend),
        help("Check your network connection and the backend URL.")
    )]
    Backend { message: String },

    #[error("Live subscription to {topic} was lost: {reason}")]
    #[diagnostic(code(stayboard::subscription_lost))]
    SubscriptionLost { topic: String, reason: String },

    #[error("Local storage failed: {message}")]
    #[diagnostic(code(stayboard::storage))]
    Storage { message: String },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize output: {0}")]
    #[diagnostic(code(stayboard::serialize))]
    Serialize(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } => exit_code::USAGE,
            Self::NoCredentials { .. } | Self::InvalidCredential | Self::PairingRequired => {
                exit_code::AUTH
            }
            Self::NoConfig { .. } | Self::NotConfigured { .. } => exit_code::NOT_CONFIGURED,
            Self::Backend { .. } | Self::SubscriptionLost { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidCredential { .. } => Self::InvalidCredential,
            CoreError::NotConfigured { message } => Self::NotConfigured { message },
            CoreError::SubscriptionLost { topic, reason } => {
                Self::SubscriptionLost { topic, reason }
            }
            CoreError::ValidationFailed { message } => Self::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Storage { message } => Self::Storage { message },
            CoreError::Config { message } => Self::Config(message),
            other => Self::Backend {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { slot } => Self::NoCredentials { slot },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

impl From<stayboard_api::Error> for CliError {
    fn from(err: stayboard_api::Error) -> Self {
        CoreError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_exit_with_auth_code() {
        let err = CliError::from(CoreError::InvalidCredential {
            message: "invalid_token".into(),
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);

        let err = CliError::from(ConfigError::NoCredentials {
            slot: CredentialSlot::BackendKey,
        });
        assert_eq!(err.exit_code(), exit_code::AUTH);
    }

    #[test]
    fn transient_failures_are_connection_errors() {
        let err = CliError::from(CoreError::Transient {
            message: "connection reset".into(),
        });
        assert_eq!(err.exit_code(), exit_code::CONNECTION);
        assert!(err.to_string().contains("connection reset"));
    }
}
