//! Job status, download, listing and removal.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::services::ServeFile;
use tracing::info;

use slidecast_models::{ConversionConfig, Job, JobId, JobStatus};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Every download is offered to the browser as `output.mp4`.
const DOWNLOAD_DISPOSITION: &str = "attachment; filename=\"output.mp4\"";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id().clone(),
            status: job.status(),
            progress: job.progress(),
            error: job.error().map(str::to_string),
        }
    }
}

/// A job as listed to clients. Server-side paths stay private.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub original_file: String,
    pub config: ConversionConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id().clone(),
            status: job.status(),
            progress: job.progress(),
            error: job.error().map(str::to_string),
            original_file: job.original_file().to_string(),
            config: *job.config(),
            created_at: job.created_at(),
            updated_at: job.updated_at(),
            completed_at: job.completed_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: JobId,
    pub cancelling: bool,
}

/// Current status and progress of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.service.get_job(&job_id)?;
    Ok(Json(JobStatusResponse::from(&job)))
}

/// Stream the finished video as an attachment.
///
/// Range requests are passed through so players can seek.
pub async fn download_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.service.get_job(&job_id)?;

    if job.status() != JobStatus::Completed {
        return Err(ApiError::bad_request(format!(
            "Job is not completed (status: {})",
            job.status()
        )));
    }

    let path = state.service.storage().output_file(&job_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::not_found("Converted video not found")
        } else {
            ApiError::Storage(e)
        }
    })?;

    let mut request = Request::builder();
    if let Some(range) = headers.get(header::RANGE) {
        request = request.header(header::RANGE, range.clone());
    }
    let request = request
        .body(Body::empty())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let mut response = ServeFile::new(&path)
        .try_call(request)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to serve file: {}", e)))?
        .into_response();

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static(DOWNLOAD_DISPOSITION),
    );

    info!(job_id = %job_id, path = %path.display(), "Serving download");
    Ok(response)
}

/// All jobs, newest first.
pub async fn list_jobs(State(state): State<AppState>) -> ApiResult<Json<JobListResponse>> {
    let jobs: Vec<JobSummary> = state
        .service
        .get_all_jobs()?
        .iter()
        .map(JobSummary::from)
        .collect();
    Ok(Json(JobListResponse {
        total: jobs.len(),
        jobs,
    }))
}

/// Remove a job and its files. Running jobs must be cancelled first.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<StatusCode> {
    let job_id = parse_job_id(&job_id)?;
    state.service.delete_job(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Ask a queued or running job to stop. The job ends up `failed`.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<(StatusCode, Json<CancelResponse>)> {
    let job_id = parse_job_id(&job_id)?;
    let job = state.service.get_job(&job_id)?;

    if job.is_terminal() || !state.executor.cancel(&job_id) {
        return Err(ApiError::conflict(format!(
            "Job is not running (status: {})",
            job.status()
        )));
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(CancelResponse {
            job_id,
            cancelling: true,
        }),
    ))
}

// ============================================================================
// Helpers
// ============================================================================

/// Job IDs are generated UUIDs; anything else is rejected before lookup.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
fn is_valid_job_id(id: &str) -> bool {
    if id.len() > 64 || id.len() < 8 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn parse_job_id(raw: &str) -> ApiResult<JobId> {
    if is_valid_job_id(raw) {
        Ok(JobId::from_string(raw))
    } else {
        Err(ApiError::bad_request("Invalid job ID format"))
    }
}
