//! Deck upload handler.

use axum::body::Bytes;
use axum::extract::multipart::{Field, Multipart, MultipartError};
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use tracing::{info, warn};
use validator::Validate;

use slidecast_models::{ConversionConfig, JobId, JobStatus};
use slidecast_storage::sanitize_filename;

use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Only OOXML presentations are accepted.
pub const ALLOWED_EXTENSION: &str = "pptx";

/// Local file header signature every zip container starts with.
const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";

/// Conversion parameters from the upload form.
#[derive(Debug, Clone, Validate)]
pub struct ConvertParams {
    pub fps: u32,
    pub resolution: u32,
    pub duration: u32,
    #[validate(range(min = 0.0, max = 3.0, message = "must be between 0 and 3 seconds"))]
    pub transition_duration: f64,
}

impl ConvertParams {
    /// Full range checks; the transition bound above is the stricter request-layer rule.
    pub fn into_config(self) -> ApiResult<ConversionConfig> {
        self.validate()
            .map_err(|e| ApiError::validation(e.to_string()))?;
        ConversionConfig::new(
            self.fps,
            self.resolution,
            self.duration,
            self.transition_duration,
        )
        .map_err(|e| ApiError::validation(e.to_string()))
    }
}

/// The uploaded deck.
#[derive(Debug)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

#[derive(Debug, Default)]
struct ConvertForm {
    file: Option<UploadedFile>,
    fps: Option<String>,
    resolution: Option<String>,
    duration: Option<String>,
    transition_duration: Option<String>,
}

impl ConvertForm {
    async fn read(multipart: &mut Multipart) -> ApiResult<Self> {
        let mut form = Self::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match name.as_str() {
                "file" => {
                    let file_name = field.file_name().unwrap_or_default().to_string();
                    let data = field.bytes().await.map_err(multipart_error)?;
                    form.file = Some(UploadedFile { file_name, data });
                }
                "fps" => form.fps = Some(text(field).await?),
                "resolution" => form.resolution = Some(text(field).await?),
                "duration" => form.duration = Some(text(field).await?),
                "transitionDuration" => form.transition_duration = Some(text(field).await?),
                other => {
                    tracing::debug!(field = other, "Ignoring unknown form field");
                }
            }
        }

        Ok(form)
    }

    fn params(&self) -> ApiResult<ConvertParams> {
        Ok(ConvertParams {
            fps: required(&self.fps, "fps")?,
            resolution: required(&self.resolution, "resolution")?,
            duration: required(&self.duration, "duration")?,
            transition_duration: match self.transition_duration.as_deref() {
                None | Some("") => 0.0,
                Some(raw) => parse(raw, "transitionDuration")?,
            },
        })
    }
}

async fn text(field: Field<'_>) -> ApiResult<String> {
    field
        .text()
        .await
        .map(|s| s.trim().to_string())
        .map_err(multipart_error)
}

fn required<T: std::str::FromStr>(value: &Option<String>, name: &str) -> ApiResult<T> {
    match value.as_deref() {
        None | Some("") => Err(ApiError::validation(format!("{} is required", name))),
        Some(raw) => parse(raw, name),
    }
}

fn parse<T: std::str::FromStr>(raw: &str, name: &str) -> ApiResult<T> {
    raw.parse()
        .map_err(|_| ApiError::validation(format!("{} is not a valid number: {:?}", name, raw)))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::bad_request(err.body_text())
    }
}

/// Check name, size and container signature of an upload.
pub fn validate_upload(file: &UploadedFile, max_file_size: usize) -> ApiResult<()> {
    let extension = std::path::Path::new(&file.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    if extension.as_deref() != Some(ALLOWED_EXTENSION) {
        metrics::record_upload_rejected("extension");
        return Err(ApiError::validation(format!(
            "only .{} files are supported",
            ALLOWED_EXTENSION
        )));
    }

    if file.data.is_empty() {
        metrics::record_upload_rejected("empty");
        return Err(ApiError::validation("uploaded file is empty"));
    }

    if file.data.len() > max_file_size {
        metrics::record_upload_rejected("size");
        return Err(ApiError::validation(format!(
            "file exceeds the {} byte limit",
            max_file_size
        )));
    }

    if !file.data.starts_with(ZIP_MAGIC) {
        metrics::record_upload_rejected("signature");
        return Err(ApiError::validation("file is not a valid PPTX document"));
    }

    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub job_id: JobId,
    pub status: JobStatus,
}

/// Accept a deck and queue its conversion.
pub async fn convert(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ConvertResponse>)> {
    let form = ConvertForm::read(&mut multipart).await?;

    let config = form.params()?.into_config().inspect_err(|_| {
        metrics::record_upload_rejected("config");
    })?;

    let file = form.file.ok_or_else(|| {
        metrics::record_upload_rejected("missing_file");
        ApiError::validation("file is required")
    })?;
    validate_upload(&file, state.config.max_file_size)?;
    metrics::record_upload_size(file.data.len());

    let job = state
        .service
        .intake_upload(
            sanitize_filename(&file.file_name),
            ALLOWED_EXTENSION,
            &file.data,
            config,
        )
        .await?;

    if let Err(e) = state.executor.submit(job.id().clone()) {
        // A job nobody will run must not linger as pending
        if let Err(cleanup) = state.service.delete_job(job.id()).await {
            warn!(job_id = %job.id(), error = %cleanup, "Failed to drop rejected job");
        }
        return Err(e.into());
    }

    info!(job_id = %job.id(), file = job.original_file(), bytes = file.data.len(), "Conversion queued");

    Ok((
        StatusCode::ACCEPTED,
        Json(ConvertResponse {
            job_id: job.id().clone(),
            status: job.status(),
        }),
    ))
}
