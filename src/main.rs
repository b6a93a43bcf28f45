// src/main.rs

use std::{net::SocketAddr, sync::Arc, time::Duration};

use synapse_server::{
    clients::ChatCompletionClient, config::Config, routes, state::AppState, store,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Load configuration from environment (.env included)
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let problems = config.validate();
    if !problems.is_empty() {
        for problem in &problems {
            tracing::error!("Configuration error: {}", problem);
        }
        if config.is_production() {
            panic!("Invalid configuration, refusing to start in production");
        }
        tracing::warn!("Continuing with invalid configuration outside production");
    }

    // Connect the store with retry
    let mut retry_count = 0;
    let kv = loop {
        match store::connect(&config.store.url).await {
            Ok(kv) => break kv,
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    panic!("Failed to connect to store after 5 retries: {}", e);
                }
                tracing::warn!("Store not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    };

    tracing::info!(backend = kv.backend(), "Store connected");

    let completion = Arc::new(ChatCompletionClient::new(&config.ai));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .expect("HOST and PORT must form a valid socket address");
    let environment = config.server.environment.as_str();

    let state = AppState::new(config, kv, completion);
    let app = routes::create_router(state);

    tracing::info!("Synapse server ({}) listening on {}", environment, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listening address");

    // ConnectInfo feeds the per-IP rate limiter
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Server error");

    tracing::info!("Server shut down");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
