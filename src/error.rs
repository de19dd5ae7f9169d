//! Error types for the investment dashboard

use axum::http::StatusCode;
use thiserror::Error;

/// Result type alias for dashboard operations
pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Error, Debug)]
pub enum DashboardError {

    // =============================
    // Financial Model Errors
    // =============================

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Division by zero: total project cost must be positive (got {0})")]
    DivisionByZero(f64),

    // =============================
    // Report & Session Errors
    // =============================

    #[error("No narrative available: run the photo analysis first")]
    MissingNarrative,

    #[error("Session not found: {0}")]
    SessionNotFound(uuid::Uuid),

    // =============================
    // Language Model Errors
    // =============================

    #[error("Language model API key not configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("Language model error: {0}")]
    ExternalService(String),

    #[error("Stream cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Base64 decode error: {0}")]
    DecodeError(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DashboardError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalService(msg.into())
    }

    /// Stable error code for API clients
    pub fn code(&self) -> &'static str {
        match self {
            DashboardError::InvalidInput(_) => "INVALID_INPUT",
            DashboardError::DivisionByZero(_) => "DIVISION_BY_ZERO",
            DashboardError::MissingNarrative => "MISSING_NARRATIVE",
            DashboardError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            DashboardError::MissingApiKey => "MISSING_API_KEY",
            DashboardError::ExternalService(_) | DashboardError::HttpError(_) => {
                "EXTERNAL_SERVICE_ERROR"
            }
            DashboardError::Cancelled(_) => "CANCELLED",
            DashboardError::Config(_) => "CONFIG_ERROR",
            DashboardError::SerializationError(_) => "SERIALIZATION_ERROR",
            DashboardError::DecodeError(_) => "INVALID_INPUT",
            DashboardError::IoError(_) => "IO_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::InvalidInput(_)
            | DashboardError::DivisionByZero(_)
            | DashboardError::DecodeError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DashboardError::MissingNarrative => StatusCode::CONFLICT,
            DashboardError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::MissingApiKey => StatusCode::SERVICE_UNAVAILABLE,
            DashboardError::ExternalService(_) | DashboardError::HttpError(_) => {
                StatusCode::BAD_GATEWAY
            }
            DashboardError::Cancelled(_)
            | DashboardError::Config(_)
            | DashboardError::SerializationError(_)
            | DashboardError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            DashboardError::DivisionByZero(0.0).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(DashboardError::MissingNarrative.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            DashboardError::external("quota exceeded").code(),
            "EXTERNAL_SERVICE_ERROR"
        );
    }
}
