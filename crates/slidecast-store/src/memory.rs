//! In-memory job repository.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use slidecast_models::{Job, JobId, JobStatus};

use crate::error::{StoreError, StoreResult};

/// Keyed storage for job records.
///
/// Every read hands back an owned copy. The only way to change a stored
/// record is to pass a value back through [`JobRepository::update`] (or
/// [`JobRepository::claim`]), so a caller can never mutate stored state
/// behind the store's back.
pub trait JobRepository: Send + Sync {
    /// Insert a new job. Fails with `AlreadyExists` if the ID is taken.
    fn create(&self, job: Job) -> StoreResult<()>;

    /// Fetch a copy of a job.
    fn find_by_id(&self, id: &JobId) -> StoreResult<Job>;

    /// Replace an existing job. Fails with `NotFound` if absent.
    fn update(&self, job: Job) -> StoreResult<()>;

    /// Remove a job. Fails with `NotFound` if absent.
    fn delete(&self, id: &JobId) -> StoreResult<()>;

    /// Remove a job unless it is processing, returning the removed record.
    ///
    /// The status check and the removal happen under one write lock, so a
    /// concurrent [`JobRepository::claim`] either wins (and this fails with
    /// `Busy`) or finds the job gone.
    fn delete_unless_processing(&self, id: &JobId) -> StoreResult<Job>;

    /// Unordered snapshot of all jobs.
    fn list(&self) -> StoreResult<Vec<Job>>;

    /// Atomically move a pending job to processing and return the new copy.
    ///
    /// Of any number of concurrent callers for the same ID, exactly one
    /// succeeds; the rest get `InvalidTransition`.
    fn claim(&self, id: &JobId) -> StoreResult<Job>;
}

/// `RwLock`-guarded map: reads run in parallel, each write is exclusive.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored jobs.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // A panic while holding the lock cannot leave a half-written record
    // (inserts are single HashMap operations), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, Job>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Job>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl JobRepository for InMemoryJobStore {
    fn create(&self, job: Job) -> StoreResult<()> {
        let mut jobs = self.write();
        if jobs.contains_key(job.id()) {
            return Err(StoreError::already_exists(job.id().as_str()));
        }
        debug!(job_id = %job.id(), "Storing new job");
        jobs.insert(job.id().clone(), job);
        Ok(())
    }

    fn find_by_id(&self, id: &JobId) -> StoreResult<Job> {
        self.read()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    fn update(&self, job: Job) -> StoreResult<()> {
        let mut jobs = self.write();
        match jobs.get_mut(job.id()) {
            Some(slot) => {
                *slot = job;
                Ok(())
            }
            None => Err(StoreError::not_found(job.id().as_str())),
        }
    }

    fn delete(&self, id: &JobId) -> StoreResult<()> {
        self.write()
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found(id.as_str()))
    }

    fn delete_unless_processing(&self, id: &JobId) -> StoreResult<Job> {
        let mut jobs = self.write();
        match jobs.get(id).map(Job::status) {
            None => Err(StoreError::not_found(id.as_str())),
            Some(JobStatus::Processing) => Err(StoreError::busy(id.as_str())),
            Some(_) => jobs
                .remove(id)
                .ok_or_else(|| StoreError::not_found(id.as_str())),
        }
    }

    fn list(&self) -> StoreResult<Vec<Job>> {
        Ok(self.read().values().cloned().collect())
    }

    fn claim(&self, id: &JobId) -> StoreResult<Job> {
        let mut jobs = self.write();
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(id.as_str()))?;
        job.start()
            .map_err(|e| StoreError::from_model(id.as_str(), e))?;
        Ok(job.clone())
    }
}
