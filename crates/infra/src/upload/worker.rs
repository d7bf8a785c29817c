//! Job handler that moves document content into the bucket.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, instrument, warn};

use propdesk_documents::Document;

use super::{TOPIC_FAILED, TOPIC_UPLOADED, UploadJobPayload};
use crate::cache::{CacheEntity, CacheService, document_list_scopes};
use crate::jobs::{Job, JobHandler, JobResult};
use crate::realtime::RealtimeHub;
use crate::repo::{DocumentRepository, RepoError};
use crate::storage::{ObjectStorage, StorageError};

/// Handler for `documents.upload` jobs.
///
/// Transient faults (bucket, database) return `Failure` so the job's retry
/// policy applies; malformed payloads abort. A document deleted before or
/// during the upload cancels the job, and any object already written for it
/// is removed. A redelivered job for an already uploaded document is a no-op.
pub struct DocumentUploadWorker {
    documents: Arc<dyn DocumentRepository>,
    storage: Arc<dyn ObjectStorage>,
    cache: CacheService,
    realtime: RealtimeHub,
}

impl DocumentUploadWorker {
    pub fn new(
        documents: Arc<dyn DocumentRepository>,
        storage: Arc<dyn ObjectStorage>,
        cache: CacheService,
        realtime: RealtimeHub,
    ) -> Self {
        Self {
            documents,
            storage,
            cache,
            realtime,
        }
    }

    async fn invalidate(&self, doc: &Document) {
        let keys = self.cache.keys().invalidation_set(
            CacheEntity::Document,
            doc.tenant_id,
            doc.id,
            &document_list_scopes(doc.document_type_id, doc.property_id),
        );
        self.cache.invalidate(&keys).await;
    }

    fn publish(&self, topic: &str, doc: &Document) {
        self.realtime.publish(
            doc.tenant_id,
            topic,
            serde_json::json!({
                "document_id": doc.id,
                "document_type_id": doc.document_type_id,
                "status": doc.status.as_str(),
                "attempts": doc.attempts,
                "storage_key": doc.storage_key,
                "failure_reason": doc.failure_reason,
            }),
        );
    }

    async fn upload(&self, job: &Job) -> JobResult {
        let payload: UploadJobPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(e) => return JobResult::Abort(format!("malformed upload payload: {e}")),
        };
        let content = match payload.decode_content() {
            Ok(bytes) => bytes,
            Err(e) => return JobResult::Abort(format!("upload content is not valid base64: {e}")),
        };

        let mut doc = match self.documents.get(job.tenant_id, payload.document_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return JobResult::Cancelled(format!("document {} was deleted", payload.document_id)),
            Err(e) => return JobResult::Failure(format!("failed to load document: {e}")),
        };

        if doc.is_uploaded() {
            info!(document_id = %doc.id, "document already uploaded; skipping");
            return JobResult::Success;
        }
        if content.len() as u64 != doc.size_bytes {
            return JobResult::Abort(format!(
                "content is {} bytes but document declares {}",
                content.len(),
                doc.size_bytes
            ));
        }

        let key = doc.target_storage_key();
        match self.storage.put(&key, content, &doc.content_type).await {
            Ok(()) => {}
            Err(e @ StorageError::InvalidKey(_)) => return JobResult::Abort(e.to_string()),
            Err(e) => return JobResult::Failure(format!("bucket write failed: {e}")),
        }

        if let Err(e) = doc.mark_uploaded(key.clone(), job.attempt, Utc::now()) {
            return JobResult::Abort(e.to_string());
        }
        // The object is already in place; a retry rewrites it idempotently.
        match self.documents.update(&doc).await {
            Ok(()) => {}
            Err(RepoError::NotFound) => {
                if let Err(e) = self.storage.delete(&key).await {
                    warn!(document_id = %doc.id, key = %key, error = %e, "failed to remove object of deleted document");
                }
                return JobResult::Cancelled(format!("document {} was deleted during upload", doc.id));
            }
            Err(e) => return JobResult::Failure(format!("failed to record upload: {e}")),
        }

        self.invalidate(&doc).await;
        self.publish(TOPIC_UPLOADED, &doc);
        info!(tenant_id = %doc.tenant_id, document_id = %doc.id, attempt = job.attempt, "document uploaded");
        JobResult::Success
    }
}

#[async_trait]
impl JobHandler for DocumentUploadWorker {
    #[instrument(skip(self, job), fields(job_id = %job.id, tenant_id = %job.tenant_id, attempt = job.attempt))]
    async fn handle(&self, job: &Job) -> JobResult {
        let result = self.upload(job).await;
        if let JobResult::Failure(error) | JobResult::Abort(error) = &result {
            warn!(error = %error, "document upload attempt failed");
        }
        result
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, tenant_id = %job.tenant_id))]
    async fn on_dead_letter(&self, job: &Job, error: &str) {
        let payload: UploadJobPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "dead-lettered upload has malformed payload");
                return;
            }
        };
        let mut doc = match self.documents.get(job.tenant_id, payload.document_id).await {
            Ok(Some(doc)) => doc,
            Ok(None) => return,
            Err(e) => {
                warn!(document_id = %payload.document_id, error = %e, "failed to load document for dead letter");
                return;
            }
        };
        if doc.is_uploaded() {
            return;
        }
        if let Err(e) = doc.mark_failed(error, job.attempt, Utc::now()) {
            warn!(document_id = %doc.id, error = %e, "cannot mark document failed");
            return;
        }
        if let Err(e) = self.documents.update(&doc).await {
            warn!(document_id = %doc.id, error = %e, "failed to persist failed document");
            return;
        }
        self.invalidate(&doc).await;
        self.publish(TOPIC_FAILED, &doc);
        warn!(document_id = %doc.id, attempts = job.attempt, error = %error, "document upload failed permanently");
    }
}
