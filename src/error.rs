use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::error::Error;
use std::fmt;

use crate::reply::{Details, PaginationError, Reply};

/// The primary error type for the application.
///
/// Every variant renders as an [`ErrorResponse`](crate::reply::ErrorResponse)
/// whose `code` matches the HTTP status. None of these are retried.
#[derive(Debug)]
pub enum AppError {
    /// For internal server errors that are not expected to be handled by the client.
    Internal(anyhow::Error),
    /// For client errors due to invalid requests.
    BadRequest(String),
    /// For when the caller is not authenticated.
    Unauthorized(String),
    /// For when the caller is authenticated but not permitted.
    Forbidden(String),
    /// For when a requested resource is not found.
    NotFound(String),
    /// For when a request conflicts with the current state of the server.
    Conflict(String),
    /// For when a service is temporarily unavailable.
    ServiceUnavailable(String),
    /// For errors related to database operations.
    Database(String),
    /// For when request fields fail validation.
    ValidationFailure(Details),
}

impl AppError {
    /// `NotFound` with the canonical "`{resource}` not found" message.
    pub fn not_found(resource: &str) -> Self {
        AppError::NotFound(format!("{} not found", resource))
    }

    /// `ValidationFailure` for a single offending field.
    pub fn invalid_field(field: &str, message: &str) -> Self {
        let mut details = Details::new();
        details.insert(field.to_string(), json!(message));
        AppError::ValidationFailure(details)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::ServiceUnavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::Database(msg) => write!(f, "Database error: {}", msg),
            AppError::ValidationFailure(details) => {
                let fields: Vec<&str> = details.keys().map(String::as_str).collect();
                write!(f, "Validation failed for: {}", fields.join(", "))
            }
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self {
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(error_id = %error_id, "Internal error: {:?}", e);
                let mut details = Details::new();
                details.insert("error_id".to_string(), json!(error_id.to_string()));
                Reply::error("An internal server error occurred", 500).with_details(details)
            }
            AppError::BadRequest(msg) => Reply::bad_request(msg, None),
            AppError::Unauthorized(msg) => Reply::unauthorized(Some(&msg)),
            AppError::Forbidden(msg) => Reply::forbidden(Some(&msg)),
            AppError::NotFound(msg) => Reply::error(msg, 404),
            AppError::Conflict(msg) => Reply::error(msg, 409),
            AppError::ServiceUnavailable(msg) => Reply::error(msg, 503),
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                Reply::error("A database error occurred", 500)
            }
            AppError::ValidationFailure(details) => Reply::validation_error(details, None),
        };

        body.into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(format!("Duplicate record: {}", db_err.message()))
            }
            sqlx::Error::Database(db_err) => AppError::Database(db_err.message().to_string()),
            sqlx::Error::PoolTimedOut => {
                AppError::ServiceUnavailable("Database connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                AppError::ServiceUnavailable("Database connection pool is closed".to_string())
            }
            _ => AppError::Database(err.to_string()),
        }
    }
}

// Extractor rejections carry axum's own status; they all reach the caller as 400.
impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(err: PathRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::BadRequest(err.body_text())
    }
}

impl From<PaginationError> for AppError {
    fn from(err: PaginationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// Converts an `Option` into a `NotFound` result.
pub trait OptionExt<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_not_found(self, entity: &str) -> AppResult<T> {
        self.ok_or_else(|| AppError::not_found(entity))
    }
}
