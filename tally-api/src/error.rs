//! Error Types for the Tally API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum, one code per error kind
//! - ApiError struct for structured error responses
//! - IntoResponse implementation for Axum HTTP responses
//!
//! All errors are serialized as JSON `{code, message}` with the status code
//! of their [`ErrorCode`].

use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::{ErrorKind, TallyError, ValidationError};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// No store exists under the requested name
    StoreNotFound,

    /// No route matches the request
    RouteNotFound,

    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Store name has invalid characters or length
    InvalidStoreName,

    /// Grouping property is not in the allow-list
    InvalidProperty,

    /// Start or end is not RFC 3339
    InvalidTimeFormat,

    /// End precedes start
    InvalidTimeRange,

    /// Interval is not a positive integer, or yields too many buckets
    InvalidInterval,

    /// Ingest payload is not valid JSON for its route
    #[serde(rename = "INVALID_JSON")]
    InvalidJson,

    /// Path segment or query string could not be decoded
    InvalidParameter,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Store is held by another request past the checkout timeout
    StoreBusy,

    /// Storage write failed
    InsertFailed,

    /// Storage removal failed
    DeleteFailed,

    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::StoreNotFound | ErrorCode::RouteNotFound => StatusCode::NOT_FOUND,

            ErrorCode::InvalidStoreName
            | ErrorCode::InvalidProperty
            | ErrorCode::InvalidTimeFormat
            | ErrorCode::InvalidTimeRange
            | ErrorCode::InvalidInterval
            | ErrorCode::InvalidJson
            | ErrorCode::InvalidParameter => StatusCode::BAD_REQUEST,

            ErrorCode::StoreBusy => StatusCode::SERVICE_UNAVAILABLE,

            ErrorCode::InsertFailed | ErrorCode::DeleteFailed | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::StoreNotFound => "Store not found",
            ErrorCode::RouteNotFound => "Route not found",
            ErrorCode::InvalidStoreName => "Invalid store name",
            ErrorCode::InvalidProperty => "Invalid property",
            ErrorCode::InvalidTimeFormat => "Invalid time format",
            ErrorCode::InvalidTimeRange => "Invalid time range",
            ErrorCode::InvalidInterval => "Invalid interval",
            ErrorCode::InvalidJson => "Invalid JSON",
            ErrorCode::InvalidParameter => "Invalid request parameter",
            ErrorCode::StoreBusy => "Store is busy",
            ErrorCode::InsertFailed => "Insert failed",
            ErrorCode::DeleteFailed => "Delete failed",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::StoreNotFound => ErrorCode::StoreNotFound,
            ErrorKind::InvalidStoreName => ErrorCode::InvalidStoreName,
            ErrorKind::InvalidProperty => ErrorCode::InvalidProperty,
            ErrorKind::InvalidTimeFormat => ErrorCode::InvalidTimeFormat,
            ErrorKind::InvalidTimeRange => ErrorCode::InvalidTimeRange,
            ErrorKind::InvalidInterval => ErrorCode::InvalidInterval,
            ErrorKind::InvalidJson => ErrorCode::InvalidJson,
            ErrorKind::StoreBusy => ErrorCode::StoreBusy,
            ErrorKind::InsertFailed => ErrorCode::InsertFailed,
            ErrorKind::DeleteFailed => ErrorCode::DeleteFailed,
            ErrorKind::InternalError => ErrorCode::InternalError,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error response for API operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    /// Create an InvalidJson error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidJson, message)
    }

    /// Create an InternalError error.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a RouteNotFound error.
    pub fn route_not_found() -> Self {
        Self::from_code(ErrorCode::RouteNotFound)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self);
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

/// Convert from the domain error. Internal details are logged, not returned.
impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        let code = ErrorCode::from(err.kind());
        if err.is_user_error() {
            ApiError::new(code, err.to_string())
        } else {
            tracing::error!(error = %err, code = %code, "Request failed");
            ApiError::from_code(code)
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        TallyError::from(ValidationError::InvalidJson {
            reason: err.to_string(),
        })
        .into()
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::new(ErrorCode::InvalidParameter, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        if rejection.status().is_server_error() {
            tracing::error!(error = %rejection.body_text(), "Path extraction failed");
            return ApiError::internal_error(ErrorCode::InternalError.default_message());
        }
        ApiError::new(ErrorCode::InvalidParameter, rejection.body_text())
    }
}

// ============================================================================
// RESULT TYPE ALIAS
// ============================================================================

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
