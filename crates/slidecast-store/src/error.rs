//! Store error types.

use thiserror::Error;

use slidecast_models::{JobStatus, ModelError};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job is still processing: {0}")]
    Busy(String),

    #[error("Model error: {0}")]
    Model(ModelError),
}

impl StoreError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    pub fn already_exists(id: impl Into<String>) -> Self {
        Self::AlreadyExists(id.into())
    }

    /// Lift a model error, attaching the job ID to transition failures.
    pub fn from_model(id: impl Into<String>, err: ModelError) -> Self {
        match err {
            ModelError::InvalidTransition { from, to } => Self::InvalidTransition {
                id: id.into(),
                from,
                to,
            },
            other => Self::Model(other),
        }
    }

    pub fn busy(id: impl Into<String>) -> Self {
        Self::Busy(id.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
