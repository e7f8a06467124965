//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use slidecast_models::EncodingConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum conversions running at once
    pub max_concurrent_jobs: usize,
    /// Maximum submissions waiting for a free slot
    pub max_queued_jobs: usize,
    /// Deadline for each external tool call; `None` disables it
    pub stage_timeout: Option<Duration>,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Root of the uploads/temp/output tree
    pub storage_path: PathBuf,
    /// LibreOffice binary
    pub soffice_bin: String,
    /// Poppler rasterizer binary
    pub pdftoppm_bin: String,
    /// FFmpeg binary
    pub ffmpeg_bin: String,
    /// FFprobe binary, used to verify encoder output
    pub ffprobe_bin: String,
    /// Encoder output settings
    pub encoding: EncodingConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_queued_jobs: 64,
            stage_timeout: Some(Duration::from_secs(900)), // 15 minutes
            shutdown_timeout: Duration::from_secs(30),
            storage_path: PathBuf::from("./storage"),
            soffice_bin: "soffice".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
            ffmpeg_bin: "ffmpeg".to_string(),
            ffprobe_bin: "ffprobe".to_string(),
            encoding: EncodingConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let stage_timeout_secs: u64 = env_parse("WORKER_STAGE_TIMEOUT_SECS").unwrap_or(900);
        let mut encoding = EncodingConfig::default();
        if let Ok(preset) = std::env::var("ENCODER_PRESET") {
            encoding = encoding.with_preset(preset);
        }
        if let Some(crf) = env_parse("ENCODER_CRF") {
            encoding = encoding.with_crf(crf);
        }

        Self {
            max_concurrent_jobs: env_parse("WORKER_MAX_JOBS")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            max_queued_jobs: env_parse("WORKER_MAX_QUEUED")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_queued_jobs),
            stage_timeout: (stage_timeout_secs > 0).then(|| Duration::from_secs(stage_timeout_secs)),
            shutdown_timeout: Duration::from_secs(
                env_parse("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(30),
            ),
            storage_path: std::env::var("STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_path),
            soffice_bin: std::env::var("SOFFICE_BIN").unwrap_or(defaults.soffice_bin),
            pdftoppm_bin: std::env::var("PDFTOPPM_BIN").unwrap_or(defaults.pdftoppm_bin),
            ffmpeg_bin: std::env::var("FFMPEG_BIN").unwrap_or(defaults.ffmpeg_bin),
            ffprobe_bin: std::env::var("FFPROBE_BIN").unwrap_or(defaults.ffprobe_bin),
            encoding,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.max_queued_jobs, 64);
        assert_eq!(config.stage_timeout, Some(Duration::from_secs(900)));
        assert_eq!(config.ffprobe_bin, "ffprobe");
        assert_eq!(config.encoding.preset, "medium");
    }
}
