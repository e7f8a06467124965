//! Filesystem-backed job storage.

use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tokio::fs;
use tracing::{debug, warn};

use slidecast_models::JobId;

use crate::error::{StorageError, StorageResult};

/// Name of the rendered video inside a job's output directory.
pub const OUTPUT_FILE_NAME: &str = "output.mp4";

const UPLOADS_DIR: &str = "uploads";
const TEMP_DIR: &str = "temp";
const OUTPUT_DIR: &str = "output";

/// Longest file name kept by [`sanitize_filename`].
const MAX_FILENAME_LEN: usize = 200;

/// Characters outside this set are replaced in client-supplied names.
static UNSAFE_FILENAME_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// Directories belonging to one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub upload_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl JobPaths {
    /// Final video location.
    pub fn output_file(&self) -> PathBuf {
        self.output_dir.join(OUTPUT_FILE_NAME)
    }

    fn all(&self) -> [&Path; 3] {
        [&self.upload_dir, &self.temp_dir, &self.output_dir]
    }
}

/// Job directories rooted at one base path.
#[derive(Debug, Clone)]
pub struct FileStorage {
    base_path: PathBuf,
}

impl FileStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory layout for `job_id`.
    ///
    /// Fails if the ID could escape its directory (`..`, separators).
    pub fn job_paths(&self, job_id: &JobId) -> StorageResult<JobPaths> {
        let segment = job_segment(job_id)?;
        Ok(JobPaths {
            upload_dir: self.base_path.join(UPLOADS_DIR).join(segment),
            temp_dir: self.base_path.join(TEMP_DIR).join(segment),
            output_dir: self.base_path.join(OUTPUT_DIR).join(segment),
        })
    }

    /// Create all three job directories.
    pub async fn ensure_job_dirs(&self, job_id: &JobId) -> StorageResult<JobPaths> {
        let paths = self.job_paths(job_id)?;
        for dir in paths.all() {
            fs::create_dir_all(dir).await?;
        }
        debug!(job_id = %job_id, "Job directories ready");
        Ok(paths)
    }

    /// Store an uploaded document as `uploads/<id>/input.<extension>`.
    pub async fn save_upload(
        &self,
        job_id: &JobId,
        extension: &str,
        data: &[u8],
    ) -> StorageResult<PathBuf> {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() || !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(StorageError::InvalidFileName(format!(
                "unsupported extension {:?}",
                extension
            )));
        }

        let upload_dir = self.job_paths(job_id)?.upload_dir;
        fs::create_dir_all(&upload_dir).await?;

        let dest = upload_dir.join(format!("input.{}", extension.to_ascii_lowercase()));
        fs::write(&dest, data).await?;
        debug!(job_id = %job_id, path = %dest.display(), bytes = data.len(), "Upload stored");
        Ok(dest)
    }

    /// Path of the rendered video, failing with `NotFound` if it does not exist.
    pub async fn output_file(&self, job_id: &JobId) -> StorageResult<PathBuf> {
        let path = self.job_paths(job_id)?.output_file();
        if fs::try_exists(&path).await? {
            Ok(path)
        } else {
            Err(StorageError::not_found(path))
        }
    }

    /// Remove the job's scratch directory, keeping upload and output.
    pub async fn cleanup_temp(&self, job_id: &JobId) -> StorageResult<()> {
        let temp_dir = self.job_paths(job_id)?.temp_dir;
        remove_dir_if_present(&temp_dir).await
    }

    /// Remove every directory belonging to the job. Missing directories are fine.
    pub async fn cleanup_job(&self, job_id: &JobId) -> StorageResult<()> {
        let paths = self.job_paths(job_id)?;
        for dir in paths.all() {
            remove_dir_if_present(dir).await?;
        }
        debug!(job_id = %job_id, "Job files removed");
        Ok(())
    }
}

async fn remove_dir_if_present(dir: &Path) -> StorageResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to remove directory");
            Err(e.into())
        }
    }
}

fn job_segment(job_id: &JobId) -> StorageResult<&str> {
    let id = job_id.as_str();
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if !id.contains(['/', '\\']) => Ok(id),
        _ => Err(StorageError::InvalidFileName(format!("invalid job id {:?}", id))),
    }
}

/// Make sure `base_path` exists and is a directory, creating it if missing.
pub async fn validate_base_path(base_path: &Path) -> StorageResult<()> {
    if base_path.as_os_str().is_empty() {
        return Err(StorageError::invalid_base_path("storage path is empty"));
    }

    match fs::metadata(base_path).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(StorageError::invalid_base_path(format!(
            "{} is not a directory",
            base_path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            fs::create_dir_all(base_path).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Reduce a client-supplied file name to a safe display name.
///
/// Directory parts are dropped, unsafe characters collapse to `_`, and
/// leading dots are stripped. Never returns an empty string.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let cleaned = cleaned.trim_start_matches('.');

    let mut result: String = cleaned.chars().take(MAX_FILENAME_LEN).collect();
    if result.is_empty() || result.chars().all(|c| c == '_') {
        result = "upload".to_string();
    }
    result
}
