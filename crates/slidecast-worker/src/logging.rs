//! Conversion lifecycle logging.
//!
//! [`JobLogger`] emits one event per lifecycle step of a conversion, all inside
//! a `conversion` span carrying the job ID, so a single deck can be followed
//! through claim, checkpoints and its terminal state.

use std::fmt::Display;

use tracing::{error, info, warn, Span};

use slidecast_models::{JobId, JobStatus};

use crate::error::WorkerError;

#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: JobId,
}

impl JobLogger {
    pub fn new(job_id: &JobId) -> Self {
        Self {
            job_id: job_id.clone(),
        }
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Span wrapping the whole conversion.
    pub fn span(&self) -> Span {
        tracing::info_span!("conversion", job_id = %self.job_id)
    }

    /// The job moved to `Processing`.
    pub fn claimed(&self, deck: &str) {
        info!(job_id = %self.job_id, deck, "Conversion claimed");
    }

    /// A progress checkpoint was persisted.
    pub fn checkpoint(&self, progress: u8, step: &str) {
        info!(job_id = %self.job_id, progress, step, "Conversion checkpoint");
    }

    /// The run failed; stage failures carry the tool's diagnostic.
    pub fn failed(&self, err: &WorkerError) {
        match err {
            WorkerError::StageFailed { stage, diagnostic } => error!(
                job_id = %self.job_id,
                stage = %stage,
                diagnostic = %diagnostic,
                "Conversion failed"
            ),
            other => error!(job_id = %self.job_id, error = %other, "Conversion failed"),
        }
    }

    /// Something went wrong that does not change the job's outcome.
    pub fn non_fatal(&self, context: &str, err: &dyn Display) {
        warn!(job_id = %self.job_id, error = %err, "{}", context);
    }

    /// The job reached a terminal state.
    pub fn finished(&self, status: JobStatus, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            status = %status,
            elapsed_secs,
            "Conversion finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineStage;

    #[test]
    fn test_logger_keeps_job_id() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id);
        assert_eq!(logger.job_id(), &job_id);

        // Smoke test without a subscriber installed
        let _guard = logger.span().entered();
        logger.claimed("deck.pptx");
        logger.checkpoint(40, "render");
        logger.failed(&WorkerError::stage_failed(PipelineStage::Encode, "boom"));
        logger.non_fatal("cleanup failed", &"disk full");
        logger.finished(JobStatus::Failed, 1.5);
    }
}
