//! Worker error types.

use thiserror::Error;

use slidecast_models::ModelError;
use slidecast_store::StoreError;
use slidecast_storage::StorageError;

use crate::pipeline::PipelineStage;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// A pipeline stage failed; `diagnostic` carries the tool's own output.
    #[error("{stage} stage failed: {diagnostic}")]
    StageFailed {
        stage: PipelineStage,
        diagnostic: String,
    },

    #[error("Job queue is full ({0} waiting)")]
    QueueFull(usize),

    #[error("Job executor is shutting down")]
    ShuttingDown,

    #[error("Job {0} is still processing")]
    JobBusy(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),
}

impl WorkerError {
    pub fn stage_failed(stage: PipelineStage, diagnostic: impl Into<String>) -> Self {
        Self::StageFailed {
            stage,
            diagnostic: diagnostic.into(),
        }
    }

    /// Check if the job or record was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, WorkerError::Store(e) if e.is_not_found())
    }
}
