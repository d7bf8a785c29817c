//! Background jobs with retry, backoff and dead-letter handling.
//!
//! - `Job`: tenant-scoped unit of work with a JSON payload
//! - `JobStore`: queue + dead-letter queue (in-process today)
//! - `JobExecutor`: routes jobs to async handlers by kind and applies the
//!   retry policy

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{Execution, ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobHandler};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobKind, JobResult, JobStatus,
    RetryPolicy,
};
