//! Job repository.
//!
//! This crate provides:
//! - The `JobRepository` contract used by the orchestrator and the API
//! - A concurrent in-memory implementation
//! - An atomic `claim` (Pending -> Processing) so a job runs at most once

pub mod error;
pub mod memory;

pub use error::{StoreError, StoreResult};
pub use memory::{InMemoryJobStore, JobRepository};
