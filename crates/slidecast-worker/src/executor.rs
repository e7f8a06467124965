//! Job executor.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use slidecast_models::JobId;

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;
use crate::service::JobService;

type CancelMap = Arc<Mutex<HashMap<JobId, watch::Sender<bool>>>>;

/// Bounded pool that runs [`JobService::process_job_with_cancel`] off the
/// caller's task.
///
/// At most `max_concurrent_jobs` conversions run at once and at most
/// `max_queued_jobs` submissions wait for a slot. Anything beyond that is
/// rejected with [`WorkerError::QueueFull`].
pub struct JobExecutor {
    sender: mpsc::Sender<JobId>,
    max_concurrent_jobs: usize,
    max_queued_jobs: usize,
    /// Submitted jobs that do not hold a slot yet
    queued: Arc<AtomicUsize>,
    job_semaphore: Arc<Semaphore>,
    cancels: CancelMap,
    shutdown: watch::Sender<bool>,
    dispatcher: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl JobExecutor {
    /// Create the executor and start its dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(service: Arc<JobService>, config: &WorkerConfig) -> Self {
        let max_concurrent_jobs = config.max_concurrent_jobs.max(1);
        let max_queued_jobs = config.max_queued_jobs.max(1);

        let (sender, receiver) = mpsc::channel(max_queued_jobs);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let job_semaphore = Arc::new(Semaphore::new(max_concurrent_jobs));
        let cancels: CancelMap = Arc::default();
        let queued = Arc::new(AtomicUsize::new(0));

        info!(
            "Starting job executor with {} max concurrent jobs, {} queue slots",
            max_concurrent_jobs, max_queued_jobs
        );

        let dispatcher = tokio::spawn(Self::dispatch(
            service,
            receiver,
            Arc::clone(&job_semaphore),
            Arc::clone(&queued),
            Arc::clone(&cancels),
            shutdown_rx,
        ));

        Self {
            sender,
            max_concurrent_jobs,
            max_queued_jobs,
            queued,
            job_semaphore,
            cancels,
            shutdown,
            dispatcher: tokio::sync::Mutex::new(Some(dispatcher)),
        }
    }

    /// Queue a job for processing without waiting for it.
    pub fn submit(&self, job_id: JobId) -> WorkerResult<()> {
        if *self.shutdown.borrow() {
            return Err(WorkerError::ShuttingDown);
        }

        if self.queued.fetch_add(1, Ordering::SeqCst) >= self.max_queued_jobs {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(self.reject(&job_id));
        }

        let (cancel_tx, _) = watch::channel(false);
        lock(&self.cancels).insert(job_id.clone(), cancel_tx);

        match self.sender.try_send(job_id) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(job_id)) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                lock(&self.cancels).remove(&job_id);
                Err(self.reject(&job_id))
            }
            Err(mpsc::error::TrySendError::Closed(job_id)) => {
                self.queued.fetch_sub(1, Ordering::SeqCst);
                lock(&self.cancels).remove(&job_id);
                Err(WorkerError::ShuttingDown)
            }
        }
    }

    fn reject(&self, job_id: &JobId) -> WorkerError {
        metrics::record_job_rejected();
        warn!(job_id = %job_id, "Job queue full, rejecting submission");
        WorkerError::QueueFull(self.max_queued_jobs)
    }

    /// Ask a queued or running job to stop.
    ///
    /// Returns `false` if the executor does not know the job (never
    /// submitted, or already finished).
    pub fn cancel(&self, job_id: &JobId) -> bool {
        match lock(&self.cancels).get(job_id) {
            Some(tx) => {
                info!(job_id = %job_id, "Cancelling job");
                tx.send_replace(true);
                true
            }
            None => false,
        }
    }

    /// Number of jobs currently converting.
    pub fn running_jobs(&self) -> usize {
        self.max_concurrent_jobs - self.job_semaphore.available_permits()
    }

    /// Number of submissions waiting for a slot.
    pub fn queued_jobs(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Signal shutdown. Queued jobs that have not started stay pending.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Signal shutdown and wait up to `timeout` for running jobs.
    ///
    /// Returns `true` if every running job finished in time.
    pub async fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        if let Some(handle) = self.dispatcher.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Job dispatcher panicked: {}", e);
            }
        }

        info!("Waiting for in-flight jobs to complete...");
        let finished = tokio::time::timeout(timeout, self.wait_for_jobs()).await.is_ok();
        if finished {
            info!("Job executor stopped");
        } else {
            warn!(
                "{} jobs still running after {:?}, giving up",
                self.running_jobs(),
                timeout
            );
        }
        finished
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        loop {
            if self.job_semaphore.available_permits() == self.max_concurrent_jobs {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn dispatch(
        service: Arc<JobService>,
        mut receiver: mpsc::Receiver<JobId>,
        job_semaphore: Arc<Semaphore>,
        queued: Arc<AtomicUsize>,
        cancels: CancelMap,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        loop {
            let job_id = tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping dispatcher");
                        break;
                    }
                    continue;
                }
                next = receiver.recv() => match next {
                    Some(job_id) => job_id,
                    None => break,
                },
            };

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!(job_id = %job_id, "Shutdown while waiting for a slot, job left pending");
                    lock(&cancels).remove(&job_id);
                    break;
                }
                permit = Arc::clone(&job_semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            queued.fetch_sub(1, Ordering::SeqCst);

            let cancel_rx = lock(&cancels).get(&job_id).map(|tx| tx.subscribe());
            let service = Arc::clone(&service);
            let cancels = Arc::clone(&cancels);

            debug!(job_id = %job_id, "Dispatching job");
            tokio::spawn(async move {
                let _permit = permit;
                match service.process_job_with_cancel(&job_id, cancel_rx).await {
                    Ok(_) => info!(job_id = %job_id, "Job completed successfully"),
                    Err(e) => error!(job_id = %job_id, "Job failed: {}", e),
                }
                lock(&cancels).remove(&job_id);
            });
        }

        receiver.close();
        let mut abandoned = 0usize;
        while let Ok(job_id) = receiver.try_recv() {
            lock(&cancels).remove(&job_id);
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!("{} queued jobs were not started before shutdown", abandoned);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
