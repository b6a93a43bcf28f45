// src/routes.rs

use std::{path::Path, sync::Arc};

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::{
    error::error_body,
    handlers::{health, quiz},
    state::AppState,
};

/// Multipart framing and option fields on top of the raw file bytes.
const UPLOAD_OVERHEAD: usize = 1024 * 1024;

/// Assembles the main application router.
///
/// * Mounts the quiz API and health check under `/api/v1`.
/// * Rate-limits generate/submit per client IP when enabled.
/// * Applies global middleware (Trace, CORS).
/// * Serves the client bundle from `STATIC_DIR` when configured.
pub fn create_router(state: AppState) -> Router {
    let config = &state.config;

    let origins: Vec<HeaderValue> = config
        .server
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let body_limit = config
        .upload
        .max_files
        .saturating_mul(config.upload.max_file_size)
        .saturating_add(UPLOAD_OVERHEAD);

    let mut limited_routes: Router<AppState> = Router::new()
        .route(
            "/quiz/generate",
            post(quiz::generate_quiz).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/quiz/{quiz_id}/submit", post(quiz::submit_quiz));

    if config.rate_limit.enabled {
        let per_minute = u64::from(config.rate_limit.quizzes_per_minute.max(1));
        let governor_conf = GovernorConfigBuilder::default()
            .per_millisecond(60_000 / per_minute)
            .burst_size(config.rate_limit.quizzes_per_minute.max(1))
            .finish();

        match governor_conf {
            Some(conf) => {
                limited_routes = limited_routes
                    .layer(GovernorLayer::new(Arc::new(conf)))
                    .layer(middleware::map_response(rate_limited_body));
            }
            None => tracing::warn!("Invalid rate limit configuration, rate limiting disabled"),
        }
    }

    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/quiz/processing/{quiz_id}", get(quiz::get_processing_status))
        .route("/quiz/{quiz_id}", get(quiz::get_quiz))
        .route("/quiz/{quiz_id}/results", get(quiz::get_results))
        .merge(limited_routes)
        .fallback(health::endpoint_not_found);

    let mut router = Router::new().nest("/api/v1", api_routes);

    if let Some(dir) = &config.server.static_dir {
        let index = Path::new(dir).join("index.html");
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Gives governor's plain-text 429 the standard error body.
async fn rate_limited_body(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }
    let retry_after = response.headers().get(header::RETRY_AFTER).cloned();
    let mut limited = (
        StatusCode::TOO_MANY_REQUESTS,
        Json(error_body(
            "RATE_LIMITED",
            "Too many requests, please try again later",
            json!({}),
        )),
    )
        .into_response();
    if let Some(value) = retry_after {
        limited.headers_mut().insert(header::RETRY_AFTER, value);
    }
    limited
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::Request,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        clients::ScriptedCompletion,
        config::{
            AiConfig, Config, Environment, QuizConfig, RateLimitConfig, SearchConfig,
            ServerConfig, StoreConfig, UploadConfig,
        },
        store::MemoryStore,
    };

    fn config(static_dir: Option<String>) -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 3000,
                environment: Environment::Production,
                static_dir,
                cors_origins: vec!["not a header\n".into(), "http://localhost:5173".into()],
            },
            ai: AiConfig {
                api_key: "k".into(),
                base_url: "http://127.0.0.1:9".into(),
                model: "m".into(),
                pdf_engine: "native".into(),
                temperature: 0.3,
                max_tokens: 1000,
                timeout: Duration::from_secs(1),
                max_retries: 0,
                retry_base_delay: Duration::from_millis(1),
            },
            search: SearchConfig {
                api_key: None,
                base_url: "http://127.0.0.1:9".into(),
                timeout: Duration::from_secs(5),
            },
            store: StoreConfig {
                url: "memory://".into(),
            },
            quiz: QuizConfig {
                min_questions: 1,
                max_questions: 10,
                ttl: Duration::from_secs(60),
                processing_ttl: Duration::from_secs(60),
                status_retention: Duration::from_secs(60),
            },
            upload: UploadConfig {
                max_file_size: 1024,
                max_files: 1,
                allowed_file_types: vec!["application/pdf".into()],
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                quizzes_per_minute: 2,
            },
            rust_log: "error".into(),
            log_dir: "logs".into(),
        }
    }

    fn router(static_dir: Option<String>) -> Router {
        let state = AppState::new(
            config(static_dir),
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedCompletion::new()),
        );
        create_router(state)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let request = Request::builder()
            .uri(uri)
            .body(Body::empty())
            .expect("build request");
        let response = app.oneshot(request).await.expect("router call");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_unknown_api_route_is_json_404() {
        let (status, body) = get(router(None), "/api/v1/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "ENDPOINT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_production_health_hides_internals() {
        let (status, body) = get(router(None), "/api/v1/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert!(json.get("capacity").is_some());
        assert!(json.get("ai").is_none());
        assert!(json.get("store").is_none());
    }

    #[tokio::test]
    async fn test_static_dir_falls_back_to_index() {
        let dir = std::env::temp_dir().join(format!("synapse-static-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("index.html"), "<html>app</html>").unwrap();

        let app = router(Some(dir.to_string_lossy().into_owned()));
        let (status, body) = get(app, "/quiz/some-client-route").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<html>app</html>");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_cors_allows_configured_server_origin() {
        let request = Request::builder()
            .uri("/api/v1/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .expect("build request");
        let response = router(None).oneshot(request).await.expect("router call");
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("http://localhost:5173"))
        );

        let request = Request::builder()
            .uri("/api/v1/health")
            .header(header::ORIGIN, "http://evil.example")
            .body(Body::empty())
            .expect("build request");
        let response = router(None).oneshot(request).await.expect("router call");
        assert!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .is_none()
        );
    }
}
