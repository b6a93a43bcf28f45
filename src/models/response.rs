use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Success envelope shared by every endpoint: `{success, message, data, timestamp}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
    pub timestamp: DateTime<Utc>,
}

pub fn success<T: Serialize>(data: T, message: impl Into<String>) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        message: message.into(),
        data,
        timestamp: Utc::now(),
    })
}
