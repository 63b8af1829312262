//! Error types for plughub.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for plughub operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in registry and dispatch operations.
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Lookup errors
    #[error("No capable plugin: {0}")]
    NoCapableProvider(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    // Plugin lifecycle errors
    #[error("Plugin {plugin} failed to initialize: {message}")]
    ProviderInitialization { plugin: String, message: String },

    #[error("Plugin {plugin} failed: {message}")]
    ProviderExecution { plugin: String, message: String },

    #[error("Plugin {plugin} failed to dispose: {message}")]
    ProviderDisposal { plugin: String, message: String },

    // Ambient errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable wire code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::NoCapableProvider(_) => "NO_PLUGIN_AVAILABLE",
            Error::PluginNotFound(_) => "PLUGIN_NOT_FOUND",
            Error::ProviderInitialization { .. } => "INITIALIZATION_ERROR",
            Error::ProviderExecution { .. } => "PROCESSING_ERROR",
            Error::ProviderDisposal { .. } => "DISPOSAL_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Io(_) => "IO_ERROR",
        }
    }

    /// Convert into an `{errorCode, message}` body.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.error_code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Serializable error pair handed to upstream consumers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    /// Machine-readable code
    pub error_code: String,
    /// Human-readable message
    pub message: String,
}
