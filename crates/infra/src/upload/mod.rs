//! Asynchronous document upload pipeline.
//!
//! The API records a `Pending` document and enqueues a `documents.upload`
//! job carrying the file content; `DocumentUploadWorker` moves the bytes to
//! the bucket and completes the document.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use propdesk_core::{EntityId, TenantId};

use crate::jobs::{DeadLetterEntry, Job, JobId, JobKind, JobStore, JobStoreError, RetryPolicy};

pub mod worker;

pub use worker::DocumentUploadWorker;

pub const UPLOAD_JOB_KIND: &str = "documents.upload";

/// Realtime topics published by the pipeline.
pub const TOPIC_UPLOADED: &str = "document.uploaded";
pub const TOPIC_FAILED: &str = "document.failed";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadJobPayload {
    pub document_id: EntityId,
    pub content_base64: String,
}

impl UploadJobPayload {
    pub fn new(document_id: EntityId, content: &[u8]) -> Self {
        Self {
            document_id,
            content_base64: STANDARD.encode(content),
        }
    }

    pub fn decode_content(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(self.content_base64.as_bytes())
    }
}

/// Retry behaviour of upload jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSettings {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl UploadSettings {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_attempts, self.retry_delay)
    }
}

/// Decode base64 file content sent by clients.
pub fn decode_base64(content: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(content.trim().as_bytes())
}

/// Enqueue the upload of `content` for an already-recorded document.
pub fn enqueue_upload<S: JobStore + ?Sized>(
    store: &S,
    tenant_id: TenantId,
    document_id: EntityId,
    content: &[u8],
    settings: UploadSettings,
) -> Result<JobId, JobStoreError> {
    let payload = UploadJobPayload::new(document_id, content);
    let payload = serde_json::to_value(&payload)
        .map_err(|e| JobStoreError::Storage(format!("failed to encode upload payload: {e}")))?;
    let job = Job::new(tenant_id, JobKind::new(UPLOAD_JOB_KIND), payload)
        .with_retry_policy(settings.retry_policy());
    store.enqueue(job)
}

/// The dead-lettered upload job of `document_id`, if any.
pub fn find_dead_upload<S: JobStore + ?Sized>(
    store: &S,
    tenant_id: TenantId,
    document_id: EntityId,
) -> Result<Option<DeadLetterEntry>, JobStoreError> {
    let entries = store.list_dead_letters(tenant_id, usize::MAX)?;
    Ok(entries.into_iter().rev().find(|entry| {
        entry.job.kind.as_str() == UPLOAD_JOB_KIND
            && payload_document_id(&entry.job) == Some(document_id)
    }))
}

/// Upload jobs of `document_id` still in the queue (waiting or running).
pub fn find_queued_uploads<S: JobStore + ?Sized>(
    store: &S,
    tenant_id: TenantId,
    document_id: EntityId,
) -> Result<Vec<Job>, JobStoreError> {
    let jobs = store.list_by_status(tenant_id, None, usize::MAX)?;
    Ok(jobs
        .into_iter()
        .filter(|job| {
            job.kind.as_str() == UPLOAD_JOB_KIND
                && !job.status.is_terminal()
                && payload_document_id(job) == Some(document_id)
        })
        .collect())
}

fn payload_document_id(job: &Job) -> Option<EntityId> {
    job.payload
        .get("document_id")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}
