//! Job metrics.
//!
//! Recorded through the `metrics` facade; the API binary installs the
//! Prometheus recorder. Without a recorder these calls are no-ops.

use metrics::{counter, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_CREATED_TOTAL: &str = "slidecast_jobs_created_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "slidecast_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "slidecast_jobs_failed_total";
    pub const JOBS_REJECTED_TOTAL: &str = "slidecast_jobs_rejected_total";
    pub const STAGE_DURATION_SECONDS: &str = "slidecast_stage_duration_seconds";
    pub const JOB_DURATION_SECONDS: &str = "slidecast_job_duration_seconds";
}

pub fn record_job_created() {
    counter!(names::JOBS_CREATED_TOTAL).increment(1);
}

pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::JOB_DURATION_SECONDS).record(duration_secs);
}

/// Record a failed job. `stage` is `"setup"` when no pipeline stage ran.
pub fn record_job_failed(stage: &str) {
    let labels = [("stage", stage.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

/// Record a submission turned away by admission control.
pub fn record_job_rejected() {
    counter!(names::JOBS_REJECTED_TOTAL).increment(1);
}

pub fn record_stage_duration(stage: &str, success: bool, duration_secs: f64) {
    let labels = [
        ("stage", stage.to_string()),
        ("success", success.to_string()),
    ];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(duration_secs);
}
