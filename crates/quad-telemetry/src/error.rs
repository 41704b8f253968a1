//! Telemetry pipeline error types

use quad_domain::DomainError;
use thiserror::Error;

/// Telemetry pipeline errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Malformed device message: {0}")]
    Decode(String),

    #[error("Unknown message type: {0}")]
    UnknownType(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl TelemetryError {
    /// Stable code for the outer HTTP/socket layer
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "DECODE_ERROR",
            Self::UnknownType(_) => "UNKNOWN_TYPE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Domain(DomainError::InvalidMode(_)) => "INVALID_MODE",
            Self::Domain(_) => "INVALID_INPUT",
        }
    }
}

impl From<serde_json::Error> for TelemetryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TelemetryError>;
