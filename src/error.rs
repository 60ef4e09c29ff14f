//! # Error Handling
//!
//! HTTP-level error type and its conversion to JSON error responses.
//!
//! Failures inside the skill never reach this layer: the router turns them into spoken
//! apologies with a 200 status, which is what the voice platform expects. `AppError`
//! covers what happens before an event exists (malformed envelopes) and around the
//! service itself (unknown routes).
//!
//! ## Key Rust Concepts for Error Handling:
//!
//! ### Enums for Error Types
//! - **Variants**: Each enum variant represents a different kind of error
//! - **Pattern matching**: `match` maps each variant to a status code
//!
//! ### Traits for Error Conversion
//! - **From trait**: lets `?` convert parser and envelope errors automatically
//! - **ResponseError trait**: Converts errors to HTTP responses
//! - **Display trait**: Defines how errors are formatted as strings

use crate::skill::event::EnvelopeError;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;

/// Custom error types for the application.
///
/// ## Error Categories:
/// - **BadRequest**: Client sent invalid data (400 errors)
/// - **NotFound**: Requested resource doesn't exist (404 errors)
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
        }
    }
}

/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "bad_request",
///     "message": "envelope has no user id",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let (error_type, message) = match self {
            AppError::BadRequest(msg) => ("bad_request", msg),
            AppError::NotFound(msg) => ("not_found", msg),
        };

        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// JSON parsing errors are almost always the client's fault, hence 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// The envelope parsed but lacks something every event needs.
impl From<EnvelopeError> for AppError {
    fn from(err: EnvelopeError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use actix_web::http::StatusCode;

    #[actix_web::test]
    async fn test_bad_request_body() {
        let err = AppError::from(EnvelopeError::MissingUser);
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["type"], "bad_request");
        assert!(json["error"]["timestamp"].is_string());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }
}
