//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    cancel_job, convert, delete_job, download_job, get_job_status, health, list_jobs,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, redact_server_errors, request_id, request_logging, security_headers,
};
use crate::state::AppState;

/// Create the API router.
///
/// Everything except `/metrics` lives under `{base_path}/api/v1`.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/convert", post(convert))
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", delete(delete_job))
        .route("/jobs/:job_id/status", get(get_job_status))
        .route("/jobs/:job_id/download", get(download_job))
        .route("/jobs/:job_id/cancel", post(cancel_job));

    let api_routes = Router::new()
        .merge(job_routes)
        .route("/health", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let mut router = Router::new()
        .nest(&state.config.api_prefix(), api_routes)
        .merge(metrics_routes);
    if state.config.is_production() {
        router = router.layer(middleware::from_fn(redact_server_errors));
    }

    router
        // Uploads are bounded by the layer below instead of axum's 2MB default
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size()))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
