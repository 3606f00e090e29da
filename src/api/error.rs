//! Unified API error handling.
//!
//! Every failure (store, auth, token, cast) funnels into `ApiError`, which
//! renders the response envelope: `{status:"fail"|"error", message}`.
//! Development mode adds the underlying error and a backtrace; production
//! mode returns operational errors as-is and collapses everything else to a
//! generic 500, logging the detail server-side only.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::{self, Environment};
use crate::db::StoreError;

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    /// Anticipated, user-facing failures. Anything else is treated as a
    /// defect and hidden in production.
    operational: bool,
    detail: Option<String>,
    stack: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>, operational: bool) -> Self {
        let stack = match config::environment() {
            Environment::Development => {
                Some(std::backtrace::Backtrace::force_capture().to_string())
            }
            Environment::Production => None,
        };
        Self {
            status,
            message: message.into(),
            operational,
            detail: None,
            stack,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Bad request (400)
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, true)
    }

    /// Validation failure (400)
    pub fn validation(errors: &[String]) -> Self {
        Self::bad_request(format!("Invalid input: {}", errors.join(", ")))
    }

    /// Malformed identifier or value in a query (400)
    pub fn cast(field: &str, value: &str) -> Self {
        Self::bad_request(format!("Invalid {field}: {value}"))
    }

    /// Unique-constraint violation (400)
    pub fn duplicate(field: &str) -> Self {
        Self::bad_request(format!(
            "Duplicate field value: {field}. Please use another value"
        ))
    }

    /// Authentication / authorization failure (401)
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message, true)
    }

    /// Not found (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message, true)
    }

    /// Too many requests (429)
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message, true)
    }

    /// An anticipated server-side failure (500), e.g. a mail transport error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, true)
    }

    /// An unexpected defect (500); detail never leaves the server in
    /// production
    pub fn unexpected(detail: impl Into<String>) -> Self {
        let mut err = Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong",
            false,
        );
        err.detail = Some(detail.into());
        err
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // 4xx → "fail", 5xx → "error"
        let status_word = if self.status.is_client_error() {
            "fail"
        } else {
            "error"
        };

        match config::environment() {
            Environment::Development => {
                let mut body = json!({
                    "status": status_word,
                    "message": self.message,
                });
                if let Some(detail) = &self.detail {
                    body["error"] = json!(detail);
                }
                if let Some(stack) = &self.stack {
                    body["stack"] = json!(stack);
                }
                (self.status, Json(body)).into_response()
            }
            Environment::Production => {
                if self.operational {
                    let body = json!({
                        "status": status_word,
                        "message": self.message,
                    });
                    (self.status, Json(body)).into_response()
                } else {
                    tracing::error!(
                        detail = self.detail.as_deref().unwrap_or("unknown"),
                        "Unexpected error"
                    );
                    let body = json!({
                        "status": "error",
                        "message": "Something went wrong",
                    });
                    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
                }
            }
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.status, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(errors) => ApiError::validation(&errors),
            StoreError::Duplicate(field) => ApiError::duplicate(field),
            StoreError::Cast { field, value } => ApiError::cast(&field, &value),
            StoreError::NotFound => ApiError::not_found("No document found with that ID"),
            StoreError::Database(db_err) => {
                tracing::error!("Database error: {}", db_err);
                ApiError::unexpected(db_err.to_string())
            }
        }
    }
}

impl From<jsonwebtoken::errors::Error> for ApiError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                ApiError::unauthorized("Token has expired, please log in again")
            }
            _ => ApiError::unauthorized("Invalid token, please log in again"),
        }
    }
}
