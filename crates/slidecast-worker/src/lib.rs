//! Conversion worker.
//!
//! This crate provides:
//! - The three-stage conversion pipeline (render, rasterize, encode)
//! - The job state machine that persists every transition
//! - A bounded job executor with admission control and cancellation
//! - Structured job logging and metrics

pub mod config;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod service;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use pipeline::{ConversionPipeline, PipelineRequest, PipelineStage, ToolReadiness};
pub use service::JobService;
