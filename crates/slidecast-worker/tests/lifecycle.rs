//! Full job lifecycle against fake tools: create, submit, poll.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use slidecast_media::{
    Collaborator, DocumentRenderer, InvocationOptions, MediaError, MediaResult, PageRasterizer,
    RenderedPage, VideoEncoder,
};
use slidecast_models::{ConversionConfig, Job, JobId, JobStatus};
use slidecast_storage::FileStorage;
use slidecast_store::{InMemoryJobStore, JobRepository};
use slidecast_worker::{ConversionPipeline, JobExecutor, JobService, WorkerConfig};

/// Decks named `broken*` fail to render; everything else converts.
struct FakeTools;

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
        _opts: &InvocationOptions,
    ) -> MediaResult<PathBuf> {
        let data = tokio::fs::read(source).await?;
        if data.starts_with(b"broken") {
            return Err(MediaError::tool_failed(
                "soffice",
                "exited with status 1",
                "Error: source file could not be loaded",
                Some(1),
            ));
        }
        let pdf = out_dir.join("input.pdf");
        tokio::fs::write(&pdf, b"%PDF-1.7").await?;
        Ok(pdf)
    }
}

#[async_trait]
impl PageRasterizer for FakeTools {
    async fn rasterize(
        &self,
        _job_id: &JobId,
        document: &Path,
        out_dir: &Path,
        _resolution: u32,
        _opts: &InvocationOptions,
    ) -> MediaResult<Vec<RenderedPage>> {
        assert!(document.exists());
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
        pages: &[RenderedPage],
        output: &Path,
        config: &ConversionConfig,
        _opts: &InvocationOptions,
    ) -> MediaResult<()> {
        let seconds = config.expected_video_duration(pages.len());
        tokio::fs::write(output, format!("{seconds}")).await?;
        Ok(())
    }
}

struct Setup {
    service: Arc<JobService>,
    executor: JobExecutor,
    _dir: TempDir,
}

fn setup() -> Setup {
    let dir = tempfile::tempdir().unwrap();
    let tools = Arc::new(FakeTools);
    let pipeline = ConversionPipeline::new(tools.clone(), tools.clone(), tools);
    let store: Arc<dyn JobRepository> = Arc::new(InMemoryJobStore::new());
    let service = Arc::new(JobService::new(
        store,
        FileStorage::new(dir.path()),
        pipeline,
    ));
    let executor = JobExecutor::new(Arc::clone(&service), &WorkerConfig::default());
    Setup {
        service,
        executor,
        _dir: dir,
    }
}

async fn upload(setup: &Setup, contents: &[u8], config: ConversionConfig) -> Job {
    let id = JobId::new();
    let source = setup
        .service
        .storage()
        .save_upload(&id, "pptx", contents)
        .await
        .unwrap();
    setup
        .service
        .create_job_with_id(id, "deck.pptx", source, config)
        .unwrap()
}

/// Poll until terminal, checking the observed statuses only move forward.
async fn poll_until_terminal(service: &JobService, id: &JobId) -> Job {
    let mut last = JobStatus::Pending;
    for _ in 0..500 {
        let job = service.get_job(id).unwrap();
        assert!(
            job.status() == last || last.can_transition_to(job.status()),
            "status went from {} to {}",
            last,
            job.status()
        );
        last = job.status();
        assert_eq!(job.completed_at().is_some(), job.is_terminal());
        if job.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {id} never finished");
}

#[tokio::test]
async fn test_job_completes_end_to_end() {
    let setup = setup();
    let config = ConversionConfig::new(24, 1080, 5, 1.0).unwrap();
    let job = upload(&setup, b"PK\x03\x04deck", config).await;
    assert_eq!(job.status(), JobStatus::Pending);

    setup.executor.submit(job.id().clone()).unwrap();
    let done = poll_until_terminal(&setup.service, job.id()).await;

    assert_eq!(done.status(), JobStatus::Completed);
    assert_eq!(done.progress(), 100);
    assert!(done.error().is_none());
    assert!(done.completed_at().unwrap() >= done.created_at());

    let output = done.output_file().unwrap();
    assert_eq!(
        setup.service.storage().output_file(job.id()).await.unwrap(),
        output
    );
    assert_eq!(std::fs::read_to_string(output).unwrap(), "13");
}

#[tokio::test]
async fn test_render_failure_is_persisted() {
    let setup = setup();
    let job = upload(&setup, b"broken deck", ConversionConfig::default()).await;

    setup.executor.submit(job.id().clone()).unwrap();
    let failed = poll_until_terminal(&setup.service, job.id()).await;

    assert_eq!(failed.status(), JobStatus::Failed);
    let error = failed.error().unwrap();
    assert!(error.starts_with("render stage failed"));
    assert!(error.contains("source file could not be loaded"));
    assert!(failed.output_file().is_none());
    assert!(setup.service.storage().output_file(job.id()).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_jobs_reach_their_own_outcome() {
    let setup = setup();
    let good = upload(&setup, b"PK\x03\x04good", ConversionConfig::default()).await;
    let bad = upload(&setup, b"broken", ConversionConfig::default()).await;
    let cut = upload(
        &setup,
        b"PK\x03\x04cuts",
        ConversionConfig::new(30, 720, 5, 0.0).unwrap(),
    )
    .await;

    for job in [&good, &bad, &cut] {
        setup.executor.submit(job.id().clone()).unwrap();
    }

    let good = poll_until_terminal(&setup.service, good.id()).await;
    let bad = poll_until_terminal(&setup.service, bad.id()).await;
    let cut = poll_until_terminal(&setup.service, cut.id()).await;

    assert_eq!(good.status(), JobStatus::Completed);
    assert_eq!(bad.status(), JobStatus::Failed);
    assert_eq!(cut.status(), JobStatus::Completed);
    assert_eq!(
        std::fs::read_to_string(cut.output_file().unwrap()).unwrap(),
        "15"
    );
    assert_ne!(good.output_file(), cut.output_file());

    assert_eq!(setup.service.get_all_jobs().unwrap().len(), 3);
    assert!(setup.executor.shutdown_and_wait(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_unknown_job_is_rejected_without_side_effects() {
    let setup = setup();
    let err = setup.service.process_job(&JobId::new()).await.unwrap_err();
    assert!(err.is_not_found());
    assert!(setup.service.get_all_jobs().unwrap().is_empty());
}
