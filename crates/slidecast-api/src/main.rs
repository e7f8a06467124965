//! Axum API server binary.

use std::net::SocketAddr;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use slidecast_api::{create_router, metrics, ApiConfig, AppState};
use slidecast_storage::validate_base_path;
use slidecast_worker::WorkerConfig;

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("slidecast=info".parse().unwrap());

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting slidecast-api");

    let config = ApiConfig::from_env();
    let worker_config = WorkerConfig::from_env();
    info!(
        "API config: host={}, port={}, base_path={}, max_jobs={}",
        config.host,
        config.port,
        config.api_prefix(),
        worker_config.max_concurrent_jobs
    );

    if let Err(e) = validate_base_path(&worker_config.storage_path).await {
        error!("Storage path unusable: {}", e);
        std::process::exit(1);
    }

    let state = AppState::new(config.clone(), &worker_config);

    // Refuse to accept uploads nobody can convert
    let missing: Vec<String> = state
        .service
        .probe_readiness()
        .await
        .into_iter()
        .filter(|tool| !tool.ready)
        .map(|tool| {
            error!(
                tool = %tool.name,
                error = tool.error.as_deref().unwrap_or("unavailable"),
                "Conversion tool not ready"
            );
            tool.name
        })
        .collect();
    if !missing.is_empty() {
        error!("Required tools unavailable: {}", missing.join(", "));
        std::process::exit(1);
    }

    let metrics_handle = if config.metrics_enabled {
        info!("Prometheus metrics enabled at /metrics");
        Some(metrics::init_metrics())
    } else {
        None
    };

    let app = create_router(state.clone(), metrics_handle);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");

    info!("Listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {}", e);
    }

    if !state
        .executor
        .shutdown_and_wait(worker_config.shutdown_timeout)
        .await
    {
        warn!("Shutdown timed out with jobs still running");
    }

    info!("Server shutdown complete");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
