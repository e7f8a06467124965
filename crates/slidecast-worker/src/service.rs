//! Job orchestration.
//!
//! [`JobService`] owns the job state machine:
//! - `Pending -> Processing` when a worker claims the job
//! - `Processing -> Completed` when the pipeline produced a video
//! - `Processing -> Failed` when any stage failed
//!
//! Every write goes through the store. Between steps the service re-fetches
//! the record instead of holding on to a stale copy.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::Instrument;

use slidecast_models::{ConversionConfig, Job, JobId, JobStatus};
use slidecast_store::{JobRepository, StoreError};
use slidecast_storage::FileStorage;

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{ConversionPipeline, PipelineRequest, PipelineStage, ToolReadiness};

/// Progress once the job is claimed and its directories exist.
pub const PROGRESS_STARTED: u8 = 10;

/// Drives jobs from intake to a terminal state.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobRepository>,
    storage: FileStorage,
    pipeline: ConversionPipeline,
}

impl std::fmt::Debug for JobService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobService")
            .field("storage", &self.storage)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobRepository>,
        storage: FileStorage,
        pipeline: ConversionPipeline,
    ) -> Self {
        Self {
            store,
            storage,
            pipeline,
        }
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    /// Register a new pending job with a fresh ID.
    pub fn create_job(
        &self,
        original_file: impl Into<String>,
        source_path: impl Into<PathBuf>,
        config: ConversionConfig,
    ) -> WorkerResult<Job> {
        self.create_job_with_id(JobId::new(), original_file, source_path, config)
    }

    /// Store an uploaded deck and register a pending job for it.
    ///
    /// If the job cannot be registered, the stored upload is removed again.
    pub async fn intake_upload(
        &self,
        original_file: impl Into<String>,
        extension: &str,
        data: &[u8],
        config: ConversionConfig,
    ) -> WorkerResult<Job> {
        self.intake_upload_with_id(JobId::new(), original_file, extension, data, config)
            .await
    }

    async fn intake_upload_with_id(
        &self,
        id: JobId,
        original_file: impl Into<String>,
        extension: &str,
        data: &[u8],
        config: ConversionConfig,
    ) -> WorkerResult<Job> {
        let source = self.storage.save_upload(&id, extension, data).await?;
        match self.create_job_with_id(id.clone(), original_file, source, config) {
            Ok(job) => Ok(job),
            Err(err) => {
                if let Err(cleanup) = self.storage.cleanup_job(&id).await {
                    tracing::warn!(job_id = %id, error = %cleanup, "Failed to remove orphaned upload");
                }
                Err(err)
            }
        }
    }

    /// Register a new pending job under an ID the caller already used,
    /// e.g. to store the upload.
    pub fn create_job_with_id(
        &self,
        id: JobId,
        original_file: impl Into<String>,
        source_path: impl Into<PathBuf>,
        config: ConversionConfig,
    ) -> WorkerResult<Job> {
        let job = Job::with_id(id, original_file, source_path, config);
        self.store.create(job.clone())?;
        metrics::record_job_created();
        tracing::info!(
            job_id = %job.id(),
            file = job.original_file(),
            fps = config.fps(),
            resolution = config.resolution(),
            duration = config.duration(),
            transition = config.transition_duration(),
            "Job created"
        );
        Ok(job)
    }

    pub fn get_job(&self, id: &JobId) -> WorkerResult<Job> {
        Ok(self.store.find_by_id(id)?)
    }

    /// All jobs, newest first.
    pub fn get_all_jobs(&self) -> WorkerResult<Vec<Job>> {
        let mut jobs = self.store.list()?;
        jobs.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(jobs)
    }

    /// Remove a job record and its files.
    ///
    /// Jobs still processing are refused; their worker would otherwise
    /// write into a record that no longer exists.
    pub async fn delete_job(&self, id: &JobId) -> WorkerResult<()> {
        self.store
            .delete_unless_processing(id)
            .map_err(|e| match e {
                StoreError::Busy(id) => WorkerError::JobBusy(id),
                other => other.into(),
            })?;
        self.storage.cleanup_job(id).await?;
        tracing::info!(job_id = %id, "Job deleted");
        Ok(())
    }

    /// Probe the external tools the pipeline depends on.
    pub async fn probe_readiness(&self) -> Vec<ToolReadiness> {
        self.pipeline.probe_readiness().await
    }

    /// Run a pending job to completion.
    pub async fn process_job(&self, id: &JobId) -> WorkerResult<Job> {
        self.process_job_with_cancel(id, None).await
    }

    /// Run a pending job, aborting tool calls when `cancel` flips to `true`.
    ///
    /// Lookup and claim errors are returned without touching the record.
    /// Once claimed, every failure is persisted as `Failed` and also returned.
    pub async fn process_job_with_cancel(
        &self,
        id: &JobId,
        cancel: Option<watch::Receiver<bool>>,
    ) -> WorkerResult<Job> {
        let logger = JobLogger::new(id);
        let span = logger.span();
        self.process_claimed(id, cancel, &logger)
            .instrument(span)
            .await
    }

    async fn process_claimed(
        &self,
        id: &JobId,
        cancel: Option<watch::Receiver<bool>>,
        logger: &JobLogger,
    ) -> WorkerResult<Job> {
        let job = self.store.claim(id)?;
        let started = Instant::now();
        logger.claimed(job.original_file());

        match self.run_pipeline(&job, cancel, logger).await {
            Ok(output) => {
                let mut job = self.store.find_by_id(id)?;
                job.complete(output)
                    .map_err(|e| StoreError::from_model(id.as_str(), e))?;
                self.store.update(job.clone())?;

                let elapsed = started.elapsed().as_secs_f64();
                metrics::record_job_completed(elapsed);
                logger.finished(job.status(), elapsed);
                self.cleanup_scratch(id, logger).await;
                Ok(job)
            }
            Err(err) => {
                logger.failed(&err);
                let stage = match &err {
                    WorkerError::StageFailed { stage, .. } => stage.as_str(),
                    _ => "setup",
                };
                metrics::record_job_failed(stage);

                let mut job = self.store.find_by_id(id)?;
                job.fail(err.to_string())
                    .map_err(|e| StoreError::from_model(id.as_str(), e))?;
                self.store.update(job)?;

                logger.finished(JobStatus::Failed, started.elapsed().as_secs_f64());
                self.cleanup_scratch(id, logger).await;
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        job: &Job,
        cancel: Option<watch::Receiver<bool>>,
        logger: &JobLogger,
    ) -> WorkerResult<PathBuf> {
        let id = job.id();
        let paths = self.storage.ensure_job_dirs(id).await?;
        self.set_progress(id, PROGRESS_STARTED, "claimed", logger)?;

        let output = paths.output_file();
        let request = PipelineRequest {
            job_id: id,
            source: job.source_path(),
            scratch_dir: &paths.temp_dir,
            output: &output,
            config: job.config(),
        };

        let on_stage = |stage: PipelineStage| {
            if let Err(e) = self.set_progress(id, stage.progress_after(), stage.as_str(), logger) {
                logger.non_fatal("Failed to record progress", &e);
            }
        };

        self.pipeline.run(request, cancel, &on_stage).await
    }

    /// Persist a progress checkpoint on a fresh copy of the record.
    fn set_progress(
        &self,
        id: &JobId,
        progress: u8,
        message: &str,
        logger: &JobLogger,
    ) -> WorkerResult<()> {
        let mut job = self.store.find_by_id(id)?;
        job.update_progress(i32::from(progress));
        self.store.update(job)?;
        logger.checkpoint(progress, message);
        Ok(())
    }

    async fn cleanup_scratch(&self, id: &JobId, logger: &JobLogger) {
        if let Err(e) = self.storage.cleanup_temp(id).await {
            logger.non_fatal("Failed to remove scratch directory", &e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use slidecast_media::{
        Collaborator, DocumentRenderer, InvocationOptions, MediaError, MediaResult,
        PageRasterizer, RenderedPage, VideoEncoder,
    };
    use slidecast_store::InMemoryJobStore;
    use tempfile::TempDir;

    use super::*;

    /// Writes placeholder files instead of running real tools.
    #[derive(Default)]
    struct FakeTools {
        fail_render: AtomicBool,
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
            source: &Path,
            out_dir: &Path,
            opts: &InvocationOptions,
        ) -> MediaResult<PathBuf> {
            if opts.is_cancelled() {
                return Err(MediaError::Cancelled);
            }
            if self.fail_render.load(Ordering::SeqCst) {
                return Err(MediaError::tool_failed(
                    "soffice",
                    "exited with status 1",
                    "Error: source file could not be loaded",
                    Some(1),
                ));
            }
            let pdf = out_dir.join(source.file_stem().unwrap()).with_extension("pdf");
            tokio::fs::write(&pdf, b"%PDF").await?;
            Ok(pdf)
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
            let mut pages = Vec::new();
            for i in 1..=3 {
                let path = out_dir.join(format!("slide-{i}.png"));
                tokio::fs::write(&path, b"png").await?;
                pages.push(RenderedPage::new(i, path));
            }
            Ok(pages)
        }
    }

    #[async_trait]
    impl VideoEncoder for FakeTools {
        async fn encode(
            &self,
            _job_id: &JobId,
            _pages: &[RenderedPage],
            output: &Path,
            _config: &ConversionConfig,
            _opts: &InvocationOptions,
        ) -> MediaResult<()> {
            tokio::fs::write(output, b"mp4").await?;
            Ok(())
        }
    }

    struct Harness {
        service: JobService,
        store: Arc<InMemoryJobStore>,
        tools: Arc<FakeTools>,
        _dir: TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryJobStore::new());
        let tools = Arc::new(FakeTools::default());
        let pipeline = ConversionPipeline::new(tools.clone(), tools.clone(), tools.clone());
        let service = JobService::new(store.clone(), FileStorage::new(dir.path()), pipeline);
        Harness {
            service,
            store,
            tools,
            _dir: dir,
        }
    }

    fn create(h: &Harness) -> Job {
        h.service
            .create_job("deck.pptx", "/uploads/input.pptx", ConversionConfig::default())
            .unwrap()
    }

    #[tokio::test]
    async fn test_process_job_completes() {
        let h = harness();
        let job = create(&h);

        let done = h.service.process_job(job.id()).await.unwrap();

        assert_eq!(done.status(), JobStatus::Completed);
        assert_eq!(done.progress(), 100);
        assert!(done.output_file().unwrap().exists());
        assert!(done.completed_at().unwrap() >= done.created_at());
        assert_eq!(h.store.find_by_id(job.id()).unwrap(), done);

        let paths = h.service.storage().job_paths(job.id()).unwrap();
        assert!(!paths.temp_dir.exists());
    }

    #[tokio::test]
    async fn test_render_failure_marks_job_failed() {
        let h = harness();
        h.tools.fail_render.store(true, Ordering::SeqCst);
        let job = create(&h);

        let err = h.service.process_job(job.id()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::StageFailed {
                stage: PipelineStage::Render,
                ..
            }
        ));

        let stored = h.service.get_job(job.id()).unwrap();
        assert_eq!(stored.status(), JobStatus::Failed);
        assert!(stored.error().unwrap().contains("source file could not be loaded"));
        assert!(stored.output_file().is_none());
        assert_eq!(stored.progress(), PROGRESS_STARTED);
    }

    #[tokio::test]
    async fn test_process_missing_job() {
        let h = harness();
        let err = h.service.process_job(&JobId::new()).await.unwrap_err();
        assert!(err.is_not_found());
        assert!(h.store.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_job_is_not_reprocessed() {
        let h = harness();
        let job = create(&h);
        let done = h.service.process_job(job.id()).await.unwrap();

        let err = h.service.process_job(job.id()).await.unwrap_err();
        assert!(matches!(
            err,
            WorkerError::Store(StoreError::InvalidTransition {
                from: JobStatus::Completed,
                ..
            })
        ));
        assert_eq!(h.service.get_job(job.id()).unwrap(), done);
    }

    #[tokio::test]
    async fn test_cancelled_job_fails() {
        let h = harness();
        let job = create(&h);
        let (_tx, rx) = watch::channel(true);

        let err = h
            .service
            .process_job_with_cancel(job.id(), Some(rx))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::StageFailed { .. }));

        let stored = h.service.get_job(job.id()).unwrap();
        assert_eq!(stored.status(), JobStatus::Failed);
        assert_eq!(stored.error(), Some("render stage failed: Operation cancelled"));
    }

    #[tokio::test]
    async fn test_list_newest_first_and_delete() {
        let h = harness();
        let first = create(&h);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = create(&h);

        let ids: Vec<JobId> = h
            .service
            .get_all_jobs()
            .unwrap()
            .iter()
            .map(|j| j.id().clone())
            .collect();
        assert_eq!(ids, vec![second.id().clone(), first.id().clone()]);

        h.service.process_job(first.id()).await.unwrap();
        h.service.delete_job(first.id()).await.unwrap();
        assert!(h.service.get_job(first.id()).unwrap_err().is_not_found());
        let paths = h.service.storage().job_paths(first.id()).unwrap();
        assert!(!paths.output_dir.exists());
    }

    #[tokio::test]
    async fn test_intake_stores_upload_and_registers_job() {
        let h = harness();
        let job = h
            .service
            .intake_upload("deck.pptx", "pptx", b"PK\x03\x04", ConversionConfig::default())
            .await
            .unwrap();

        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.source_path().ends_with("input.pptx"));
        assert_eq!(tokio::fs::read(job.source_path()).await.unwrap(), b"PK\x03\x04");
    }

    #[tokio::test]
    async fn test_intake_removes_upload_when_job_is_rejected() {
        let h = harness();
        let existing = h
            .service
            .create_job("other.pptx", "/elsewhere/input.pptx", ConversionConfig::default())
            .unwrap();

        let err = h
            .service
            .intake_upload_with_id(
                existing.id().clone(),
                "deck.pptx",
                "pptx",
                b"PK\x03\x04",
                ConversionConfig::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Store(StoreError::AlreadyExists(_))));

        let paths = h.service.storage().job_paths(existing.id()).unwrap();
        assert!(!paths.upload_dir.exists());
        assert_eq!(h.service.get_job(existing.id()).unwrap().original_file(), "other.pptx");
    }

    #[tokio::test]
    async fn test_delete_refuses_processing_job() {
        let h = harness();
        let job = create(&h);
        h.store.claim(job.id()).unwrap();

        let err = h.service.delete_job(job.id()).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobBusy(_)));
        assert!(h.service.get_job(job.id()).is_ok());
    }

    #[tokio::test]
    async fn test_delete_racing_processing_leaves_no_orphans() {
        // Delete polled first: the record is gone before the claim.
        let h = harness();
        let job = create(&h);
        let (deleted, processed) =
            tokio::join!(h.service.delete_job(job.id()), h.service.process_job(job.id()));
        deleted.unwrap();
        assert!(processed.unwrap_err().is_not_found());
        let paths = h.service.storage().job_paths(job.id()).unwrap();
        assert!(!paths.output_dir.exists());

        // Processing polled first: the claim wins and the delete is refused.
        let h = harness();
        let job = create(&h);
        let (processed, deleted) =
            tokio::join!(h.service.process_job(job.id()), h.service.delete_job(job.id()));
        assert!(matches!(deleted.unwrap_err(), WorkerError::JobBusy(_)));
        assert_eq!(processed.unwrap().status(), JobStatus::Completed);
        assert_eq!(
            h.service.get_job(job.id()).unwrap().status(),
            JobStatus::Completed
        );
    }
}
