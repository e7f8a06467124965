//! Axum HTTP API for slide deck conversion.
//!
//! This crate provides:
//! - Multipart deck upload with validation
//! - Job status polling, listing, cancellation and removal
//! - Video download once a job completed
//! - Tool health checks and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
