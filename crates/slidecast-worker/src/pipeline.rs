//! Three-stage deck to video conversion.
//!
//! The pipeline is a function of (source, scratch dir, output path, config):
//! it never reads or writes job records. The orchestrator observes progress
//! through the checkpoint callback passed to [`ConversionPipeline::run`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error};

use slidecast_media::{
    Collaborator, DocumentRenderer, FfmpegEncoder, InvocationOptions, LibreOfficeRenderer,
    MediaError, PageRasterizer, PopplerRasterizer, VideoEncoder,
};
use slidecast_models::{ConversionConfig, JobId};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Deck to PDF
    Render,
    /// PDF to page images
    Rasterize,
    /// Page images to video
    Encode,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Render => "render",
            PipelineStage::Rasterize => "rasterize",
            PipelineStage::Encode => "encode",
        }
    }

    /// Progress reported once this stage has finished.
    pub fn progress_after(&self) -> u8 {
        match self {
            PipelineStage::Render => 40,
            PipelineStage::Rasterize => 70,
            PipelineStage::Encode => 90,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Readiness of one external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolReadiness {
    pub name: String,
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Everything one run needs besides the collaborators.
#[derive(Debug, Clone)]
pub struct PipelineRequest<'a> {
    pub job_id: &'a JobId,
    pub source: &'a Path,
    pub scratch_dir: &'a Path,
    pub output: &'a Path,
    pub config: &'a ConversionConfig,
}

/// Renderer, rasterizer and encoder wired in sequence.
#[derive(Clone)]
pub struct ConversionPipeline {
    renderer: Arc<dyn DocumentRenderer>,
    rasterizer: Arc<dyn PageRasterizer>,
    encoder: Arc<dyn VideoEncoder>,
    stage_timeout: Option<Duration>,
}

impl fmt::Debug for ConversionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionPipeline")
            .field("renderer", &self.renderer.name())
            .field("rasterizer", &self.rasterizer.name())
            .field("encoder", &self.encoder.name())
            .field("stage_timeout", &self.stage_timeout)
            .finish()
    }
}

impl ConversionPipeline {
    pub fn new(
        renderer: Arc<dyn DocumentRenderer>,
        rasterizer: Arc<dyn PageRasterizer>,
        encoder: Arc<dyn VideoEncoder>,
    ) -> Self {
        Self {
            renderer,
            rasterizer,
            encoder,
            stage_timeout: None,
        }
    }

    /// LibreOffice, Poppler and FFmpeg as configured.
    pub fn from_config(config: &WorkerConfig) -> Self {
        Self::new(
            Arc::new(LibreOfficeRenderer::new(&config.soffice_bin)),
            Arc::new(PopplerRasterizer::new(&config.pdftoppm_bin)),
            Arc::new(FfmpegEncoder::new(&config.ffmpeg_bin, config.encoding.clone())),
        )
        .with_stage_timeout(config.stage_timeout)
    }

    /// Deadline applied to each external call.
    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// Probe every collaborator, in pipeline order.
    pub async fn probe_readiness(&self) -> Vec<ToolReadiness> {
        let results = [
            (self.renderer.name(), self.renderer.probe_readiness().await),
            (self.rasterizer.name(), self.rasterizer.probe_readiness().await),
            (self.encoder.name(), self.encoder.probe_readiness().await),
        ];

        results
            .into_iter()
            .map(|(name, result)| {
                if let Err(e) = &result {
                    debug!(tool = name, error = %e, "Tool not ready");
                }
                ToolReadiness {
                    name: name.to_string(),
                    ready: result.is_ok(),
                    error: result.err().map(|e| e.to_string()),
                }
            })
            .collect()
    }

    /// Run all three stages, calling `on_stage` after each one succeeds.
    ///
    /// Any failure aborts the run; nothing is retried and a later run starts
    /// again from rendering.
    pub async fn run(
        &self,
        request: PipelineRequest<'_>,
        cancel: Option<tokio::sync::watch::Receiver<bool>>,
        on_stage: &(dyn Fn(PipelineStage) + Send + Sync),
    ) -> WorkerResult<PathBuf> {
        let mut opts = InvocationOptions::new();
        opts.timeout = self.stage_timeout;
        opts.cancel = cancel;

        let job_id = request.job_id;

        let document = stage(PipelineStage::Render, job_id, async {
            self.renderer
                .render(job_id, request.source, request.scratch_dir, &opts)
                .await
        })
        .await?;
        on_stage(PipelineStage::Render);

        let pages = stage(PipelineStage::Rasterize, job_id, async {
            self.rasterizer
                .rasterize(
                    job_id,
                    &document,
                    request.scratch_dir,
                    request.config.resolution(),
                    &opts,
                )
                .await
        })
        .await?;
        on_stage(PipelineStage::Rasterize);

        stage(PipelineStage::Encode, job_id, async {
            self.encoder
                .encode(job_id, &pages, request.output, request.config, &opts)
                .await
        })
        .await?;
        on_stage(PipelineStage::Encode);

        Ok(request.output.to_path_buf())
    }
}

/// Time one stage and turn its media error into a stage failure.
async fn stage<T>(
    stage: PipelineStage,
    job_id: &JobId,
    fut: impl std::future::Future<Output = Result<T, MediaError>>,
) -> WorkerResult<T> {
    let start = Instant::now();
    let result = fut.await;
    let elapsed = start.elapsed().as_secs_f64();
    metrics::record_stage_duration(stage.as_str(), result.is_ok(), elapsed);

    result.map_err(|e| {
        error!(job_id = %job_id, stage = %stage, error = %e, "Pipeline stage failed");
        WorkerError::stage_failed(stage, e.diagnostic())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use slidecast_media::{MediaResult, RenderedPage};

    use super::*;

    /// Records calls and optionally fails at one stage.
    #[derive(Default)]
    struct FakeTools {
        fail_at: Option<PipelineStage>,
        calls: Mutex<Vec<PipelineStage>>,
    }

    impl FakeTools {
        fn failing_at(stage: PipelineStage) -> Self {
            Self {
                fail_at: Some(stage),
                ..Default::default()
            }
        }

        fn call(&self, stage: PipelineStage) -> MediaResult<()> {
            self.calls.lock().unwrap().push(stage);
            if self.fail_at == Some(stage) {
                return Err(MediaError::tool_failed(
                    "fake",
                    "exited with status 1",
                    format!("{stage} broke"),
                    Some(1),
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Collaborator for FakeTools {
        fn name(&self) -> &str {
            "fake"
        }

        async fn probe_readiness(&self) -> MediaResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl DocumentRenderer for FakeTools {
        async fn render(
            &self,
            _job_id: &JobId,
            _source: &Path,
            out_dir: &Path,
            _opts: &InvocationOptions,
        ) -> MediaResult<PathBuf> {
            self.call(PipelineStage::Render)?;
            Ok(out_dir.join("input.pdf"))
        }
    }

    #[async_trait]
    impl PageRasterizer for FakeTools {
        async fn rasterize(
            &self,
            _job_id: &JobId,
            _document: &Path,
            out_dir: &Path,
            _resolution: u32,
            _opts: &InvocationOptions,
        ) -> MediaResult<Vec<RenderedPage>> {
            self.call(PipelineStage::Rasterize)?;
            Ok(vec![RenderedPage::new(1, out_dir.join("slide-1.png"))])
        }
    }

    #[async_trait]
    impl VideoEncoder for FakeTools {
        async fn encode(
            &self,
            _job_id: &JobId,
            _pages: &[RenderedPage],
            _output: &Path,
            _config: &ConversionConfig,
            _opts: &InvocationOptions,
        ) -> MediaResult<()> {
            self.call(PipelineStage::Encode)
        }
    }

    fn pipeline(tools: Arc<FakeTools>) -> ConversionPipeline {
        ConversionPipeline::new(tools.clone(), tools.clone(), tools)
    }

    async fn run(pipeline: &ConversionPipeline, seen: &Mutex<Vec<PipelineStage>>) -> WorkerResult<PathBuf> {
        let job_id = JobId::new();
        let config = ConversionConfig::default();
        let request = PipelineRequest {
            job_id: &job_id,
            source: Path::new("/uploads/input.pptx"),
            scratch_dir: Path::new("/temp"),
            output: Path::new("/output/output.mp4"),
            config: &config,
        };
        pipeline
            .run(request, None, &|stage| seen.lock().unwrap().push(stage))
            .await
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let tools = Arc::new(FakeTools::default());
        let seen = Mutex::new(Vec::new());

        let output = run(&pipeline(tools.clone()), &seen).await.unwrap();

        assert_eq!(output, PathBuf::from("/output/output.mp4"));
        let expected = vec![PipelineStage::Render, PipelineStage::Rasterize, PipelineStage::Encode];
        assert_eq!(*tools.calls.lock().unwrap(), expected);
        assert_eq!(*seen.lock().unwrap(), expected);
    }

    #[tokio::test]
    async fn test_failure_stops_pipeline() {
        let tools = Arc::new(FakeTools::failing_at(PipelineStage::Render));
        let seen = Mutex::new(Vec::new());

        let err = run(&pipeline(tools.clone()), &seen).await.unwrap_err();

        match err {
            WorkerError::StageFailed { stage, diagnostic } => {
                assert_eq!(stage, PipelineStage::Render);
                assert_eq!(diagnostic, "exited with status 1: render broke");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(*tools.calls.lock().unwrap(), vec![PipelineStage::Render]);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_encode_failure_reports_stage() {
        let tools = Arc::new(FakeTools::failing_at(PipelineStage::Encode));
        let seen = Mutex::new(Vec::new());

        let err = run(&pipeline(tools), &seen).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::StageFailed {
                stage: PipelineStage::Encode,
                ..
            }
        ));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PipelineStage::Render, PipelineStage::Rasterize]
        );
    }

    #[tokio::test]
    async fn test_probe_readiness_reports_each_tool() {
        let report = pipeline(Arc::new(FakeTools::default())).probe_readiness().await;
        assert_eq!(report.len(), 3);
        assert!(report.iter().all(|t| t.ready && t.error.is_none()));
    }

    #[tokio::test]
    async fn test_probe_readiness_missing_binaries() {
        let config = WorkerConfig {
            soffice_bin: "slidecast-missing-soffice".to_string(),
            pdftoppm_bin: "slidecast-missing-pdftoppm".to_string(),
            ffmpeg_bin: "slidecast-missing-ffmpeg".to_string(),
            ..WorkerConfig::default()
        };
        let report = ConversionPipeline::from_config(&config).probe_readiness().await;
        let names: Vec<&str> = report.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["libreoffice", "poppler", "ffmpeg"]);
        assert!(report.iter().all(|t| !t.ready && t.error.is_some()));
    }

    #[test]
    fn test_stage_progress() {
        assert_eq!(PipelineStage::Render.progress_after(), 40);
        assert_eq!(PipelineStage::Rasterize.progress_after(), 70);
        assert_eq!(PipelineStage::Encode.progress_after(), 90);
    }
}
