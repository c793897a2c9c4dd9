//! Error types for backend configuration.

use thiserror::Error;

/// Result type for loading backend options.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors that can occur while loading backend options.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The options document is not valid JSON for this backend.
    #[error("invalid options: {0}")]
    Json(#[from] serde_json::Error),

    /// A required option is missing or empty.
    #[error("missing option: {0}")]
    Missing(&'static str),

    /// An option has a value the backend cannot use.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Option name as it appears in the JSON document.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
