//! Centralized error handling module
//!
//! `MonitorError` covers everything that can go wrong inside a fetch cycle and
//! never leaves the cycle boundary. `AppError` maps failures of the published
//! HTTP surface to JSON responses.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

/// Failures of a single telemetry refresh attempt
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream {endpoint} answered with status {status}")]
    UpstreamStatus { endpoint: String, status: u16 },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Push channel error: {0}")]
    PushChannel(String),
}

impl MonitorError {
    /// Short classification used in structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            MonitorError::Transport(_) | MonitorError::UpstreamStatus { .. } => "transport",
            MonitorError::MalformedPayload(_) | MonitorError::InvalidField { .. } => "payload",
            MonitorError::PushChannel(_) => "push",
        }
    }
}

/// Result type alias for cycle-level errors
pub type MonitorResult<T> = Result<T, MonitorError>;

/// HTTP surface error types
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Standardized error response format
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Unique correlation ID for tracing
    pub correlation_id: String,
    /// Error type classification
    pub error_type: String,
    /// Human-readable error message (safe for clients)
    pub message: String,
    /// HTTP status code
    pub status_code: u16,
    /// Timestamp of the error
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, message: &str, status_code: StatusCode) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            error_type: error_type.to_string(),
            message: message.to_string(),
            status_code: status_code.as_u16(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type, self.message)
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let (status, error_type, message) = match self {
            AppError::ValidationError(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.as_str())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.as_str()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.as_str()),
        };

        let error_response = ErrorResponse::new(error_type, message, status);

        error!(
            correlation_id = %error_response.correlation_id,
            error_type = %error_type,
            status_code = %status.as_u16(),
            "Error response generated"
        );

        HttpResponse::build(status).json(error_response)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Result type alias for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status() {
        let error = AppError::ValidationError("limit must be positive".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_not_found_error_status() {
        let error = AppError::NotFound("No reading yet".to_string());
        assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_response_format() {
        let response = ErrorResponse::new("TEST_ERROR", "Test message", StatusCode::BAD_REQUEST);
        assert!(!response.correlation_id.is_empty());
        assert_eq!(response.error_type, "TEST_ERROR");
        assert_eq!(response.message, "Test message");
        assert_eq!(response.status_code, 400);
    }

    #[test]
    fn test_monitor_error_kinds() {
        let status = MonitorError::UpstreamStatus {
            endpoint: "/iot/latest".to_string(),
            status: 503,
        };
        assert_eq!(status.kind(), "transport");
        assert_eq!(status.to_string(), "Upstream /iot/latest answered with status 503");

        let payload = MonitorError::MalformedPayload("expected object".to_string());
        assert_eq!(payload.kind(), "payload");
        assert_eq!(MonitorError::PushChannel("closed".into()).kind(), "push");
    }
}
