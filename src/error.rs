// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

use crate::store::StoreError;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
///
/// Every variant carries a stable machine-readable `code`, a human message and
/// optional structured `details` which end up in the standard error body.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest {
        code: &'static str,
        message: String,
        details: Value,
    },

    // 404 Not Found
    NotFound {
        code: &'static str,
        message: String,
        details: Value,
    },

    // 409 Conflict (e.g., quiz already submitted)
    Conflict {
        code: &'static str,
        message: String,
        details: Value,
    },

    // 413 Payload Too Large
    PayloadTooLarge { message: String, details: Value },

    // 415 Unsupported Media Type
    UnsupportedMediaType { message: String, details: Value },

    // 503 Service Unavailable (store or upstream down)
    ServiceUnavailable { code: &'static str, message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        AppError::BadRequest {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        AppError::NotFound {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
            details: json!({}),
        }
    }

    /// Attaches structured details. No-op for variants without a details slot.
    pub fn with_details(mut self, value: Value) -> Self {
        match &mut self {
            AppError::BadRequest { details, .. }
            | AppError::NotFound { details, .. }
            | AppError::Conflict { details, .. }
            | AppError::PayloadTooLarge { details, .. }
            | AppError::UnsupportedMediaType { details, .. } => *details = value,
            AppError::InternalServerError(_) | AppError::ServiceUnavailable { .. } => {}
        }
        self
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::InternalServerError(_) => "INTERNAL_ERROR",
            AppError::BadRequest { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::ServiceUnavailable { code, .. } => *code,
            AppError::PayloadTooLarge { .. } => "FILE_TOO_LARGE",
            AppError::UnsupportedMediaType { .. } => "INVALID_FILE_TYPE",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Builds the standard error body shared by every failing endpoint.
pub fn error_body(code: &str, message: &str, details: Value) -> Value {
    json!({
        "error": true,
        "code": code,
        "message": message,
        "details": details,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let (message, details) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                ("Internal Server Error".to_string(), json!({}))
            }
            AppError::ServiceUnavailable { message, .. } => {
                tracing::error!("Service unavailable: {}", message);
                (message, json!({}))
            }
            AppError::BadRequest {
                message, details, ..
            }
            | AppError::NotFound {
                message, details, ..
            }
            | AppError::Conflict {
                message, details, ..
            }
            | AppError::PayloadTooLarge { message, details }
            | AppError::UnsupportedMediaType { message, details } => (message, details),
        };

        (status, Json(error_body(code, &message, details))).into_response()
    }
}

/// Store failures surface as 503 so clients can retry later.
impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Backend(msg) => AppError::ServiceUnavailable {
                code: "STORE_UNAVAILABLE",
                message: format!("Storage backend unavailable: {msg}"),
            },
            StoreError::Serialization(e) => AppError::InternalServerError(e.to_string()),
        }
    }
}
