//! Application error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::terminal::types::BrokerDetails;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Client-supplied data is malformed (HTTP 400)
    #[error("{0}")]
    Validation(String),

    /// The terminal rejected or could not execute an order (HTTP 500).
    /// `retcode` and `details` are passed through from the terminal untouched.
    #[error("{message}")]
    Order {
        message: String,
        retcode: Option<u32>,
        details: Option<BrokerDetails>,
    },

    /// Terminal unreachable or not logged in, after one reconnect attempt
    #[error("MT5 connection failed: {0}")]
    Connectivity(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// ngrok could not be started or reports no public URL
    #[error("Tunnel error: {0}")]
    Tunnel(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Order failure without a terminal result payload
    pub fn order(message: impl Into<String>) -> Self {
        AppError::Order {
            message: message.into(),
            retcode: None,
            details: None,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON error envelope returned to HTTP callers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BrokerDetails>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Order {
                message, details, ..
            } => ErrorResponse {
                success: false,
                message,
                details,
            },
            AppError::Connectivity(_) => ErrorResponse::new("MT5 connection failed"),
            other => ErrorResponse::new(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_maps_to_bad_request() {
        let err = AppError::Validation("Missing required field: side".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = ErrorResponse::from(err);
        assert!(!body.success);
        assert_eq!(body.message, "Missing required field: side");
        assert!(body.details.is_none());
    }

    #[test]
    fn test_order_error_keeps_details() {
        let mut details = BrokerDetails::default();
        details.insert("retcode", serde_json::json!(10004));

        let err = AppError::Order {
            message: "Order failed. Error code: 10004".to_string(),
            retcode: Some(10004),
            details: Some(details),
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = ErrorResponse::from(err);
        assert_eq!(body.message, "Order failed. Error code: 10004");
        assert_eq!(body.details.unwrap().retcode(), Some(10004));
    }

    #[test]
    fn test_connectivity_message_is_generic() {
        let body = ErrorResponse::from(AppError::Connectivity("login rejected".to_string()));
        assert_eq!(body.message, "MT5 connection failed");
    }
}
