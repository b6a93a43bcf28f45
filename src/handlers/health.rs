// src/handlers/health.rs

use axum::{Json, extract::State, response::IntoResponse};
use serde_json::json;

use crate::{error::error_body, state::AppState};

/// Liveness plus capacity advertisement for the client.
///
/// Outside production the payload also carries store health and the AI client
/// configuration (never the API key).
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.config;
    let store = state.quizzes.store();
    let store_error = store.ping().await.err();
    if let Some(e) = &store_error {
        tracing::warn!(error = %e, "Health check: store ping failed");
    }

    let mut body = json!({
        "status": if store_error.is_none() { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "capacity": {
            "maxFileSize": config.upload.max_file_size,
            "maxFiles": config.upload.max_files,
            "allowedFileTypes": config.upload.allowed_file_types,
            "searchEnabled": state.quizzes.search_configured(),
        },
    });

    if !config.is_production() {
        body["environment"] = json!(config.server.environment.as_str());
        body["store"] = json!({
            "backend": store.backend(),
            "connected": store_error.is_none(),
            "error": store_error.map(|e| e.to_string()),
        });
        body["ai"] = json!({
            "configured": !config.ai.api_key.is_empty(),
            "model": config.ai.model,
            "baseUrl": config.ai.base_url,
            "timeoutMs": config.ai.timeout.as_millis() as u64,
            "maxRetries": config.ai.max_retries,
            "pdfEngine": config.ai.pdf_engine,
            "searchConfigured": config.search.enabled(),
        });
    }

    Json(body)
}

/// JSON 404 for unknown API routes.
pub async fn endpoint_not_found(uri: axum::http::Uri) -> impl IntoResponse {
    (
        axum::http::StatusCode::NOT_FOUND,
        Json(error_body(
            "ENDPOINT_NOT_FOUND",
            &format!("Endpoint {} not found", uri.path()),
            json!({}),
        )),
    )
}
