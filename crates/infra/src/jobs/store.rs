//! Job storage.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;

use propdesk_core::TenantId;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction. The in-process store is the only backend today;
/// a durable queue would implement the same trait.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Drop a completed or cancelled job, keeping only its count for `stats`.
    fn finish(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Cancel a job that is waiting to run. Returns `false` when the job is
    /// already claimed; its handler sees the outcome on its own.
    fn cancel(&self, tenant_id: TenantId, job_id: JobId) -> Result<bool, JobStoreError>;

    /// Claim the oldest ready job (pending, or failed with its backoff
    /// elapsed) and mark it running.
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job out of the queue into the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending with a fresh attempt budget.
    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError>;

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

fn poisoned<T>(_: PoisonError<T>) -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
    pub cancelled: usize,
}

/// Per-tenant counts of jobs the store no longer holds.
#[derive(Debug, Clone, Copy, Default)]
struct Finished {
    completed: usize,
    cancelled: usize,
}

/// In-process job store.
///
/// Finished jobs are dropped (their payload can hold a whole file); only
/// pending, running and dead-lettered jobs are kept.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    finished: RwLock<HashMap<TenantId, Finished>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(&job.id) {
            Some(existing) if existing.tenant_id != job.tenant_id => Err(JobStoreError::TenantIsolation),
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(JobStoreError::NotFound(job.id)),
        }
    }

    fn finish(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get(&job.id) {
            Some(existing) if existing.tenant_id != job.tenant_id => return Err(JobStoreError::TenantIsolation),
            Some(_) => {}
            None => return Err(JobStoreError::NotFound(job.id)),
        }

        let mut finished = self.finished.write().map_err(poisoned)?;
        let counts = finished.entry(job.tenant_id).or_default();
        match job.status {
            JobStatus::Completed => counts.completed += 1,
            JobStatus::Cancelled => counts.cancelled += 1,
            ref other => {
                return Err(JobStoreError::Storage(format!("job {} is not finished: {other:?}", job.id)));
            }
        }
        jobs.remove(&job.id);
        Ok(())
    }

    fn cancel(&self, tenant_id: TenantId, job_id: JobId) -> Result<bool, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let job = jobs.get(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }
        if !matches!(job.status, JobStatus::Pending | JobStatus::Failed { .. }) {
            return Ok(false);
        }

        let mut finished = self.finished.write().map_err(poisoned)?;
        finished.entry(tenant_id).or_default().cancelled += 1;
        jobs.remove(&job_id);
        Ok(true)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;

        let next = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. })
                    && j.is_ready()
                    && tenant_id.is_none_or(|t| j.tenant_id == t)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| {
                j.tenant_id == tenant_id
                    && status
                        .as_ref()
                        .is_none_or(|s| std::mem::discriminant(&j.status) == std::mem::discriminant(s))
            })
            .cloned()
            .collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dead_letters.read().map_err(poisoned)?;
        let mut result: Vec<_> = dls
            .values()
            .filter(|e| e.job.tenant_id == tenant_id)
            .cloned()
            .collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        match dls.get(&job_id) {
            None => return Err(JobStoreError::NotFound(job_id)),
            Some(entry) if entry.job.tenant_id != tenant_id => {
                return Err(JobStoreError::TenantIsolation);
            }
            Some(_) => {}
        }
        let Some(entry) = dls.remove(&job_id) else {
            return Err(JobStoreError::NotFound(job_id));
        };

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
        let mut dls = self.dead_letters.write().map_err(poisoned)?;

        let entry = dls.get(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        if entry.job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }

        dls.remove(&job_id);
        Ok(())
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let dls = self.dead_letters.read().map_err(poisoned)?;

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats.dead_lettered += dls.values().filter(|e| e.job.tenant_id == tenant_id).count();
        if let Some(done) = self.finished.read().map_err(poisoned)?.get(&tenant_id) {
            stats.completed += done.completed;
            stats.cancelled += done.cancelled;
        }

        Ok(stats)
    }
}

impl<S: JobStore + ?Sized> JobStore for Arc<S> {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn finish(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).finish(job)
    }

    fn cancel(&self, tenant_id: TenantId, job_id: JobId) -> Result<bool, JobStoreError> {
        (**self).cancel(tenant_id, job_id)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id)
    }

    fn list_by_status(
        &self,
        tenant_id: TenantId,
        status: Option<JobStatus>,
        limit: usize,
    ) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_status(tenant_id, status, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(
        &self,
        tenant_id: TenantId,
        limit: usize,
    ) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(tenant_id, limit)
    }

    fn retry_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(tenant_id, job_id)
    }

    fn delete_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(tenant_id, job_id)
    }

    fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        (**self).stats(tenant_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;

    fn job(tenant: TenantId) -> Job {
        Job::new(tenant, JobKind::new("test"), serde_json::json!({}))
    }

    #[test]
    fn enqueue_and_claim() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job_id = store.enqueue(job(tenant)).unwrap();

        let claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert!(matches!(claimed.status, JobStatus::Running));
        assert_eq!(claimed.attempt, 1);

        assert!(store.claim_next(Some(tenant)).unwrap().is_none());
    }

    #[test]
    fn claims_oldest_first() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let mut first = job(tenant);
        let mut second = job(tenant);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        first.payload = serde_json::json!({"n": 1});
        store.enqueue(second).unwrap();
        store.enqueue(first.clone()).unwrap();

        assert_eq!(store.claim_next(None).unwrap().unwrap().id, first.id);
    }

    #[test]
    fn delayed_jobs_are_not_claimed_early() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        store
            .enqueue(job(tenant).delayed(std::time::Duration::from_secs(60)))
            .unwrap();
        assert!(store.claim_next(None).unwrap().is_none());
    }

    #[test]
    fn tenant_isolation() {
        let store = InMemoryJobStore::new();
        let tenant1 = TenantId::new();
        let tenant2 = TenantId::new();

        let job_id = store.enqueue(job(tenant1)).unwrap();

        assert!(matches!(store.get(tenant2, job_id), Err(JobStoreError::TenantIsolation)));
        assert!(store.claim_next(Some(tenant2)).unwrap().is_none());
    }

    #[test]
    fn dead_letter_flow() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job = job(tenant);
        let job_id = job.id;
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        claimed.mark_failed("test error".to_string(), Utc::now());
        store.dead_letter(claimed, "max retries exceeded".to_string()).unwrap();

        assert!(store.get(tenant, job_id).unwrap().is_none());
        let dls = store.list_dead_letters(tenant, 10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, job_id);
        assert_eq!(store.stats(tenant).unwrap().dead_lettered, 1);

        assert!(matches!(
            store.retry_dead_letter(TenantId::new(), job_id),
            Err(JobStoreError::TenantIsolation)
        ));

        let retried = store.retry_dead_letter(tenant, job_id).unwrap();
        assert!(matches!(retried.status, JobStatus::Pending));
        assert_eq!(retried.attempt, 0);
        assert!(store.list_dead_letters(tenant, 10).unwrap().is_empty());
        assert!(store.get(tenant, job_id).unwrap().is_some());
    }

    #[test]
    fn finished_jobs_are_dropped_but_counted() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let mut job = job(tenant);
        job.payload = serde_json::json!({"content_base64": "JVBERi0xLjc="});
        let job_id = store.enqueue(job).unwrap();

        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(matches!(store.finish(&claimed), Err(JobStoreError::Storage(_))));

        claimed.mark_completed(Utc::now());
        store.finish(&claimed).unwrap();

        assert!(store.get(tenant, job_id).unwrap().is_none());
        assert!(store.list_by_status(tenant, None, usize::MAX).unwrap().is_empty());
        assert_eq!(store.stats(tenant).unwrap().completed, 1);
        assert!(matches!(store.finish(&claimed), Err(JobStoreError::NotFound(_))));
    }

    #[test]
    fn cancel_removes_waiting_jobs_only() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let first = job(tenant);
        let mut second = job(tenant);
        second.created_at = first.created_at + chrono::Duration::seconds(1);
        let running = store.enqueue(first).unwrap();
        let waiting = store.enqueue(second).unwrap();
        assert_eq!(store.claim_next(Some(tenant)).unwrap().unwrap().id, running);

        assert!(matches!(store.cancel(TenantId::new(), waiting), Err(JobStoreError::TenantIsolation)));
        assert!(store.cancel(tenant, waiting).unwrap());
        assert!(!store.cancel(tenant, running).unwrap());
        assert!(matches!(store.cancel(tenant, waiting), Err(JobStoreError::NotFound(_))));

        let stats = store.stats(tenant).unwrap();
        assert_eq!(stats.cancelled, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.pending, 0);
    }

    #[test]
    fn stats_tracking() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        for _ in 0..5 {
            store.enqueue(job(tenant)).unwrap();
        }
        assert_eq!(store.stats(tenant).unwrap().pending, 5);

        store.claim_next(Some(tenant)).unwrap();
        store.claim_next(Some(tenant)).unwrap();

        let stats = store.stats(tenant).unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 2);
        assert_eq!(store.stats(TenantId::new()).unwrap(), JobStats::default());
    }
}
