//! Conversion job record and lifecycle.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversion::ConversionConfig;
use crate::error::{ModelError, ModelResult};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
///
/// Status only moves forward: `Pending -> Processing -> {Completed, Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, waiting for a worker
    #[default]
    Pending,
    /// Pipeline is running
    Processing,
    /// Output video is available
    Completed,
    /// Pipeline failed; see the job error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Processing)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One deck-to-video conversion request and its tracked outcome.
///
/// State fields are private; they change only through the transition
/// methods, which keep `completed_at` and `output_file` consistent with
/// `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique job ID
    #[serde(rename = "jobId")]
    id: JobId,

    /// Current lifecycle status
    status: JobStatus,

    /// Progress (0-100)
    progress: u8,

    /// Error message (only when failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,

    /// Conversion parameters, fixed at creation
    config: ConversionConfig,

    /// Name of the uploaded document as the client sent it
    original_file: String,

    /// Where the uploaded document is stored
    #[serde(skip)]
    source_path: PathBuf,

    /// Rendered video (only when completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    output_file: Option<PathBuf>,

    /// Creation timestamp
    created_at: DateTime<Utc>,

    /// Last update timestamp
    updated_at: DateTime<Utc>,

    /// First time the job reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a new pending job with a fresh ID.
    pub fn new(
        original_file: impl Into<String>,
        source_path: impl Into<PathBuf>,
        config: ConversionConfig,
    ) -> Self {
        Self::with_id(JobId::new(), original_file, source_path, config)
    }

    /// Create a new pending job with a caller-chosen ID.
    ///
    /// Intake uses this when the upload has to be stored under the ID
    /// before the record exists.
    pub fn with_id(
        id: JobId,
        original_file: impl Into<String>,
        source_path: impl Into<PathBuf>,
        config: ConversionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::Pending,
            progress: 0,
            error: None,
            config,
            original_file: original_file.into(),
            source_path: source_path.into(),
            output_file: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    pub fn original_file(&self) -> &str {
        &self.original_file
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == JobStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    /// Pending -> Processing.
    pub fn start(&mut self) -> ModelResult<()> {
        self.transition(JobStatus::Processing)
    }

    /// Processing -> Completed, recording the output and forcing progress to 100.
    pub fn complete(&mut self, output_file: impl Into<PathBuf>) -> ModelResult<()> {
        self.transition(JobStatus::Completed)?;
        self.output_file = Some(output_file.into());
        self.progress = 100;
        Ok(())
    }

    /// Processing -> Failed, recording the diagnostic.
    pub fn fail(&mut self, error: impl Into<String>) -> ModelResult<()> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Set progress, clamped into `0..=100`.
    pub fn update_progress(&mut self, progress: i32) {
        self.progress = progress.clamp(0, 100) as u8;
        self.updated_at = Utc::now();
    }

    fn transition(&mut self, next: JobStatus) -> ModelResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ModelError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() && self.completed_at.is_none() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}
