//! Shared data models for the slidecast backend.
//!
//! This crate provides Serde-serializable types for:
//! - Conversion jobs and their lifecycle
//! - Validated conversion configuration
//! - Encoder settings

pub mod conversion;
pub mod encoding;
pub mod error;
pub mod job;

// Re-export common types
pub use conversion::{ConversionConfig, SUPPORTED_RESOLUTIONS};
pub use encoding::EncodingConfig;
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobStatus};
