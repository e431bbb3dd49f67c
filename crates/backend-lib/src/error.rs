// crates/backend-lib/src/error.rs

//! Central error type + Axum integration.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Application error types with error codes and context
///
/// Business denials (not found, not started, expired) and infrastructure
/// faults (IO, misconfigured issuer) keep distinct codes even where the
/// user-facing copy is deliberately generic.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing lookup key")]
    MissingLookupKey,

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Meeting not started yet")]
    MeetingNotStarted,

    #[error("Meeting expired")]
    MeetingExpired,

    #[error("Token issuer misconfigured: {0}")]
    TokenIssuerMisconfigured(String),

    #[error("Invalid credential")]
    InvalidCredential,

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingLookupKey => StatusCode::BAD_REQUEST,
            AppError::BookingNotFound => StatusCode::NOT_FOUND,
            AppError::MeetingNotStarted | AppError::MeetingExpired => StatusCode::FORBIDDEN,
            AppError::InvalidCredential => StatusCode::UNAUTHORIZED,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::MissingLookupKey => "LOOKUP_001",
            AppError::BookingNotFound => "BOOKING_001",
            AppError::MeetingNotStarted => "GATE_001",
            AppError::MeetingExpired => "GATE_002",
            AppError::TokenIssuerMisconfigured(_) => "TOKEN_001",
            AppError::InvalidCredential => "TOKEN_002",
            AppError::RateLimitExceeded => "RATE_001",
            AppError::Io(_) => "IO_001",
            AppError::Json(_) => "JSON_001",
            AppError::Internal(_) => "INT_001",
        }
    }

    /// True for faults in our own plumbing, as opposed to expected business
    /// denials. Infrastructure faults are retryable from the caller's side.
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            AppError::TokenIssuerMisconfigured(_)
                | AppError::Io(_)
                | AppError::Json(_)
                | AppError::Internal(_)
        )
    }

    /// Get a sanitized message suitable for production use
    pub fn sanitized_message(&self) -> String {
        match self {
            AppError::MissingLookupKey => "Missing meeting identifier".to_string(),
            AppError::BookingNotFound => "booking not found".to_string(),
            AppError::MeetingNotStarted => "meeting not started yet".to_string(),
            AppError::MeetingExpired => "meeting expired".to_string(),
            AppError::TokenIssuerMisconfigured(_) => "error fetching token".to_string(),
            AppError::InvalidCredential => "Invalid credential".to_string(),
            AppError::RateLimitExceeded => {
                "Rate limit exceeded, please try again later".to_string()
            },
            AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => {
                "internal error".to_string()
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Use detailed messages in development, sanitized in production
        let message = if cfg!(debug_assertions) {
            self.to_string()
        } else {
            self.sanitized_message()
        };

        let body = serde_json::json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_app_error_display() {
        assert_eq!(
            AppError::BookingNotFound.to_string(),
            "Booking not found"
        );
        let io_error = AppError::Io(IoError::new(ErrorKind::NotFound, "file missing"));
        assert!(io_error.to_string().contains("IO error"));
        assert_eq!(
            AppError::RateLimitExceeded.to_string(),
            "Rate limit exceeded"
        );
    }

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::MissingLookupKey.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::BookingNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::MeetingExpired.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::TokenIssuerMisconfigured("no key".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::RateLimitExceeded.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[test]
    fn test_business_vs_infrastructure_split() {
        // A denial and a fault must never collapse into the same class,
        // even though both surface a generic message.
        assert!(!AppError::BookingNotFound.is_infrastructure());
        assert!(!AppError::MeetingExpired.is_infrastructure());
        assert!(AppError::Internal("store down".to_string()).is_infrastructure());
        assert!(AppError::TokenIssuerMisconfigured("n/a".to_string()).is_infrastructure());

        assert_ne!(
            AppError::BookingNotFound.error_code(),
            AppError::Internal("store down".to_string()).error_code()
        );
    }

    #[test]
    fn test_app_error_into_response() {
        let error = AppError::BookingNotFound;
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_error_from_impls() {
        let io_err = IoError::new(ErrorKind::PermissionDenied, "denied");
        let app_err: AppError = io_err.into();
        assert!(matches!(app_err, AppError::Io(_)));

        let json_err: serde_json::Error =
            serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let app_err: AppError = json_err.into();
        assert!(matches!(app_err, AppError::Json(_)));

        let app_err: AppError = "boom".into();
        assert!(matches!(app_err, AppError::Internal(_)));
    }
}
