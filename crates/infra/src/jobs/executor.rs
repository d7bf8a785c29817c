//! Job executor with retry, backoff and dead-letter handling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Handles jobs of one kind (or kind pattern).
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> JobResult;

    /// Called once a job has been moved to the dead-letter queue.
    async fn on_dead_letter(&self, _job: &Job, _error: &str) {}
}

/// Adapter for plain synchronous closures.
struct FnHandler<F>(F);

#[async_trait]
impl<F> JobHandler for FnHandler<F>
where
    F: Fn(&Job) -> JobResult + Send + Sync,
{
    async fn handle(&self, job: &Job) -> JobResult {
        (self.0)(job)
    }
}

#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    pub poll_interval: Duration,
    pub max_concurrent: usize,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_concurrent: 4,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent = max.max(1);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub jobs_cancelled: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

type SharedStats = Arc<Mutex<ExecutorStats>>;

fn lock(stats: &SharedStats) -> MutexGuard<'_, ExecutorStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle to a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: watch::Sender<bool>,
    join: JoinHandle<()>,
    stats: SharedStats,
    started: Instant,
}

impl JobExecutorHandle {
    /// Stop claiming jobs and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.join.await {
            error!(error = %err, "job executor task failed");
        }
    }

    pub fn stats(&self) -> ExecutorStats {
        let mut stats = lock(&self.stats).clone();
        stats.uptime_secs = self.started.elapsed().as_secs();
        stats
    }
}

/// Outcome of running one claimed job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Completed,
    WillRetry(String),
    DeadLettered(String),
    Cancelled(String),
}

/// Background job executor.
///
/// Polls the store for ready jobs and runs them on the tokio runtime with
/// bounded concurrency.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for an exact kind, a `prefix.*` pattern or `*`.
    pub fn register_handler(&mut self, kind_pattern: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind_pattern.into(), handler);
    }

    /// Register a synchronous closure as a handler.
    pub fn register_fn<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.register_handler(kind_pattern, Arc::new(FnHandler(handler)));
    }

    fn get_handler(&self, kind: &JobKind) -> Option<Arc<dyn JobHandler>> {
        let name = kind.as_str();
        if let Some(h) = self.handlers.get(name) {
            return Some(h.clone());
        }

        // Longest matching `prefix.*` wins.
        let category = self
            .handlers
            .iter()
            .filter_map(|(pattern, h)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = name.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), h))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, h)| h.clone());
        if category.is_some() {
            return category;
        }

        self.handlers.get("*").cloned()
    }

    /// Run the polling loop on the current tokio runtime.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send + Sync,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats: SharedStats = Arc::new(Mutex::new(ExecutorStats::default()));
        let executor = Arc::new(self);
        let join = tokio::spawn(executor_loop(executor, config, shutdown_rx, stats.clone()));

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join,
            stats,
            started: Instant::now(),
        }
    }

    /// Execute a job already claimed from the store.
    pub async fn execute_one(&self, job: &mut Job) -> Execution {
        let started = Utc::now();
        let Some(handler) = self.get_handler(&job.kind) else {
            let error = format!("no handler for job kind: {}", job.kind);
            warn!(job_id = %job.id, kind = %job.kind, "no handler for job");
            job.mark_aborted(error.clone(), started);
            self.dead_letter(job, &error);
            return Execution::DeadLettered(error);
        };

        let result = handler.handle(job).await;
        match result {
            JobResult::Success => {
                job.mark_completed(started);
                self.finish(job);
                debug!(job_id = %job.id, "job completed");
                return Execution::Completed;
            }
            JobResult::Cancelled(reason) => {
                job.mark_cancelled(reason.clone(), started);
                self.finish(job);
                info!(job_id = %job.id, tenant_id = %job.tenant_id, reason = %reason, "job cancelled");
                return Execution::Cancelled(reason);
            }
            JobResult::Failure(error) => job.mark_failed(error, started),
            JobResult::Abort(error) => job.mark_aborted(error, started),
            JobResult::RetryNow => {
                job.mark_failed("retry requested".to_string(), started);
                if job.status.is_retriable() {
                    job.scheduled_at = None;
                }
            }
            JobResult::RetryAfter(delay) => {
                job.mark_failed("retry after delay".to_string(), started);
                if job.status.is_retriable() {
                    job.scheduled_at =
                        Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                }
            }
        }

        match job.status.clone() {
            JobStatus::DeadLettered { error, attempts } => {
                warn!(job_id = %job.id, tenant_id = %job.tenant_id, attempts, error = %error, "job dead-lettered");
                self.dead_letter(job, &error);
                handler.on_dead_letter(job, &error).await;
                Execution::DeadLettered(error)
            }
            JobStatus::Failed { error, attempt } => {
                debug!(job_id = %job.id, attempt, error = %error, "job failed; retry scheduled");
                self.persist(job);
                Execution::WillRetry(error)
            }
            other => {
                warn!(job_id = %job.id, status = ?other, "unexpected job status after failure");
                self.persist(job);
                Execution::WillRetry(String::new())
            }
        }
    }

    fn persist(&self, job: &Job) {
        if let Err(err) = self.store.update(job) {
            error!(job_id = %job.id, error = %err, "failed to persist job");
        }
    }

    fn finish(&self, job: &Job) {
        if let Err(err) = self.store.finish(job) {
            error!(job_id = %job.id, error = %err, "failed to finish job");
        }
    }

    fn dead_letter(&self, job: &Job, error: &str) {
        if let Err(err) = self.store.dead_letter(job.clone(), error.to_string()) {
            error!(job_id = %job.id, error = %err, "failed to dead-letter job");
        }
    }
}

async fn executor_loop<S: JobStore + 'static>(
    executor: Arc<JobExecutor<S>>,
    config: JobExecutorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
    stats: SharedStats,
) {
    info!(executor = %config.name, max_concurrent = config.max_concurrent, "job executor started");
    let max_concurrent = config.max_concurrent.max(1);
    let permits = Arc::new(Semaphore::new(max_concurrent));

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        let permit = tokio::select! {
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
            _ = shutdown_rx.changed() => break,
        };

        match executor.store.claim_next(None) {
            Ok(Some(mut job)) => {
                debug!(executor = %config.name, job_id = %job.id, kind = %job.kind, attempt = job.attempt, "claimed job");
                lock(&stats).current_running += 1;

                let executor = executor.clone();
                let stats = stats.clone();
                tokio::spawn(async move {
                    let outcome = executor.execute_one(&mut job).await;
                    let mut s = lock(&stats);
                    s.current_running = s.current_running.saturating_sub(1);
                    s.jobs_processed += 1;
                    match outcome {
                        Execution::Completed => s.jobs_succeeded += 1,
                        Execution::WillRetry(_) => s.jobs_failed += 1,
                        Execution::DeadLettered(_) => {
                            s.jobs_failed += 1;
                            s.jobs_dead_lettered += 1;
                        }
                        Execution::Cancelled(_) => s.jobs_cancelled += 1,
                    }
                    drop(permit);
                });
            }
            Ok(None) => {
                drop(permit);
                idle(&mut shutdown_rx, config.poll_interval).await;
            }
            Err(e) => {
                drop(permit);
                error!(executor = %config.name, error = %e, "failed to claim job");
                idle(&mut shutdown_rx, config.poll_interval).await;
            }
        }
    }

    // Wait for in-flight jobs.
    let _ = permits.acquire_many(max_concurrent as u32).await;
    info!(executor = %config.name, "job executor stopped");
}

async fn idle(shutdown_rx: &mut watch::Receiver<bool>, interval: Duration) {
    tokio::select! {
        _ = tokio::time::sleep(interval) => {}
        _ = shutdown_rx.changed() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;
    use propdesk_core::TenantId;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn enqueue(store: &Arc<InMemoryJobStore>, kind: &str, policy: RetryPolicy) -> TenantId {
        let tenant = TenantId::new();
        let job = Job::new(tenant, JobKind::new(kind), serde_json::json!({})).with_retry_policy(policy);
        store.enqueue(job).unwrap();
        tenant
    }

    #[tokio::test]
    async fn execute_successful_job() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Success);

        let tenant = enqueue(&store, "test", RetryPolicy::default());
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();

        assert_eq!(executor.execute_one(&mut claimed).await, Execution::Completed);
        assert!(matches!(claimed.status, JobStatus::Completed));
        assert!(store.get(tenant, claimed.id).unwrap().is_none());
        assert_eq!(store.stats(tenant).unwrap().completed, 1);
    }

    #[tokio::test]
    async fn cancelled_job_is_dropped_without_dead_letter() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Cancelled("document deleted".to_string()));

        let tenant = enqueue(&store, "test", RetryPolicy::fixed(3, Duration::ZERO));
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();

        assert_eq!(
            executor.execute_one(&mut claimed).await,
            Execution::Cancelled("document deleted".to_string())
        );
        assert_eq!(claimed.status, JobStatus::Cancelled);
        assert!(store.list_dead_letters(tenant, 10).unwrap().is_empty());
        assert!(store.claim_next(Some(tenant)).unwrap().is_none());
        let stats = store.stats(tenant).unwrap();
        assert_eq!((stats.cancelled, stats.dead_lettered), (1, 0));
    }

    #[tokio::test]
    async fn retry_now_is_claimable_immediately() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::RetryNow);

        let tenant = enqueue(&store, "test", RetryPolicy::fixed(2, Duration::from_secs(60)));
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(matches!(executor.execute_one(&mut claimed).await, Execution::WillRetry(_)));
        assert_eq!(claimed.scheduled_at, None);

        // Still counts against the policy.
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert_eq!(claimed.attempt, 2);
        assert!(matches!(executor.execute_one(&mut claimed).await, Execution::DeadLettered(_)));
    }

    #[tokio::test]
    async fn retry_after_overrides_the_policy_delay() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::RetryAfter(Duration::from_secs(60)));

        let tenant = enqueue(&store, "test", RetryPolicy::fixed(3, Duration::ZERO));
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(matches!(executor.execute_one(&mut claimed).await, Execution::WillRetry(_)));

        let stored = store.get(tenant, claimed.id).unwrap().unwrap();
        assert!(stored.scheduled_at.is_some_and(|at| at > Utc::now() + chrono::Duration::seconds(30)));
        assert!(store.claim_next(Some(tenant)).unwrap().is_none());
        assert_eq!(store.stats(tenant).unwrap().failed, 1);
    }

    #[derive(Default)]
    struct Recorder {
        dead: AtomicU32,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        async fn handle(&self, _job: &Job) -> JobResult {
            JobResult::Failure("bucket unavailable".to_string())
        }

        async fn on_dead_letter(&self, _job: &Job, error: &str) {
            assert_eq!(error, "bucket unavailable");
            self.dead.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn failing_job_retries_then_dead_letters() {
        let store = InMemoryJobStore::arc();
        let recorder = Arc::new(Recorder::default());
        let mut executor = JobExecutor::new(store.clone());
        executor.register_handler("test", recorder.clone());

        let tenant = enqueue(&store, "test", RetryPolicy::fixed(3, Duration::ZERO));

        for _ in 0..2 {
            let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
            let outcome = executor.execute_one(&mut claimed).await;
            assert!(matches!(outcome, Execution::WillRetry(_)));
        }
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert_eq!(claimed.attempt, 3);
        let outcome = executor.execute_one(&mut claimed).await;
        assert_eq!(outcome, Execution::DeadLettered("bucket unavailable".to_string()));

        assert_eq!(recorder.dead.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_dead_letters(tenant, 10).unwrap().len(), 1);
        assert!(store.claim_next(Some(tenant)).unwrap().is_none());
    }

    #[tokio::test]
    async fn abort_dead_letters_on_first_attempt() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Abort("bad payload".to_string()));

        let tenant = enqueue(&store, "test", RetryPolicy::fixed(3, Duration::ZERO));
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        let outcome = executor.execute_one(&mut claimed).await;

        assert_eq!(outcome, Execution::DeadLettered("bad payload".to_string()));
        assert_eq!(store.list_dead_letters(tenant, 10).unwrap()[0].job.attempt, 1);
    }

    #[tokio::test]
    async fn handler_routing_prefers_exact_then_category_then_wildcard() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("*", |_job| JobResult::Abort("wildcard".to_string()));
        executor.register_fn("documents.*", |_job| JobResult::Abort("category".to_string()));
        executor.register_fn("documents.upload", |_job| JobResult::Success);

        for (kind, expected) in [
            ("documents.upload", Execution::Completed),
            ("documents.thumbnail", Execution::DeadLettered("category".into())),
            ("documentsx.upload", Execution::DeadLettered("wildcard".into())),
        ] {
            let tenant = enqueue(&store, kind, RetryPolicy::no_retry());
            let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
            assert_eq!(executor.execute_one(&mut claimed).await, expected, "{kind}");
        }
    }

    #[tokio::test]
    async fn unknown_kind_is_dead_lettered() {
        let store = InMemoryJobStore::arc();
        let executor = JobExecutor::new(store.clone());
        let tenant = enqueue(&store, "nobody.home", RetryPolicy::default());
        let mut claimed = store.claim_next(Some(tenant)).unwrap().unwrap();
        assert!(matches!(executor.execute_one(&mut claimed).await, Execution::DeadLettered(_)));
    }

    #[tokio::test]
    async fn spawned_executor_drains_the_queue() {
        let store = InMemoryJobStore::arc();
        let mut executor = JobExecutor::new(store.clone());
        executor.register_fn("test", |_job| JobResult::Success);

        let tenant = TenantId::new();
        for _ in 0..10 {
            store
                .enqueue(Job::new(tenant, JobKind::new("test"), serde_json::json!({})))
                .unwrap();
        }

        let handle = executor.spawn(
            JobExecutorConfig::default()
                .with_max_concurrent(3)
                .with_poll_interval(Duration::from_millis(5)),
        );

        for _ in 0..200 {
            if handle.stats().jobs_succeeded == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(handle.stats().jobs_succeeded, 10);
        assert_eq!(store.stats(tenant).unwrap().completed, 10);
        handle.shutdown().await;
    }
}
