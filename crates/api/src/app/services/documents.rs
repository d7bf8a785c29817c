use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use propdesk_core::{EntityId, TenantId};
use propdesk_documents::{Document, DocumentFilter, FileUpload, UploadStatus};
use propdesk_infra::cache::{CacheEntity, CacheService, document_filter_scope, document_list_scopes};
use propdesk_infra::jobs::JobStore;
use propdesk_infra::repo::DocumentRepository;
use propdesk_infra::storage::{ObjectStorage, StorageError};
use propdesk_infra::upload::{UploadSettings, decode_base64, enqueue_upload, find_dead_upload, find_queued_uploads};

use super::{DocumentTypeService, PropertyService};
use crate::app::errors::{ServiceError, ServiceResult};

/// A file submitted through `uploadDocument`.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub document_type_id: EntityId,
    pub property_id: Option<EntityId>,
    pub file_name: String,
    pub content_type: String,
    pub content_base64: String,
}

#[derive(Clone)]
pub struct DocumentService {
    repo: Arc<dyn DocumentRepository>,
    types: DocumentTypeService,
    properties: PropertyService,
    storage: Arc<dyn ObjectStorage>,
    jobs: Arc<dyn JobStore>,
    cache: CacheService,
    settings: UploadSettings,
}

impl DocumentService {
    pub fn new(
        repo: Arc<dyn DocumentRepository>,
        types: DocumentTypeService,
        properties: PropertyService,
        storage: Arc<dyn ObjectStorage>,
        jobs: Arc<dyn JobStore>,
        cache: CacheService,
        settings: UploadSettings,
    ) -> Self {
        Self {
            repo,
            types,
            properties,
            storage,
            jobs,
            cache,
            settings,
        }
    }

    pub async fn get(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<Option<Document>> {
        let key = self.cache.keys().entity(CacheEntity::Document, tenant_id, id);
        let doc = self
            .cache
            .get_or_load(&key, CacheEntity::Document.default_ttl(), || self.repo.get(tenant_id, id))
            .await?;
        Ok(doc)
    }

    /// Documents matching `filter`, newest first. Each filter combination
    /// is cached under its own list scope.
    pub async fn list(&self, tenant_id: TenantId, filter: DocumentFilter) -> ServiceResult<Vec<Document>> {
        let scope = document_filter_scope(&filter);
        let key = self
            .cache
            .keys()
            .list(CacheEntity::Document, tenant_id, scope.as_deref());
        let docs = self
            .cache
            .get_or_load(&key, CacheEntity::Document.default_ttl(), || async {
                self.repo.list(tenant_id, filter).await.map(Some)
            })
            .await?;
        Ok(docs.unwrap_or_default())
    }

    /// Public or internal URL of an uploaded document's object.
    pub fn url(&self, doc: &Document) -> Option<String> {
        let key = doc.storage_key.as_deref()?;
        match self.storage.url(key) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(document_id = %doc.id, error = %e, "cannot build document url");
                None
            }
        }
    }

    /// Record a `Pending` document and enqueue its upload job.
    #[instrument(skip(self, req), fields(tenant_id = %tenant_id, document_type_id = %req.document_type_id))]
    pub async fn upload(&self, tenant_id: TenantId, req: UploadRequest) -> ServiceResult<Document> {
        let content = decode_base64(&req.content_base64)
            .map_err(|e| ServiceError::validation(format!("content is not valid base64: {e}")))?;
        let file = FileUpload::new(&req.file_name, &req.content_type, content.len() as u64)?;

        let doc_type = self
            .types
            .get(tenant_id, req.document_type_id)
            .await?
            .ok_or(ServiceError::NotFound("document type"))?;
        if let Some(property_id) = req.property_id {
            self.properties
                .get(tenant_id, property_id)
                .await?
                .ok_or(ServiceError::NotFound("property"))?;
        }
        file.check_against(&doc_type)?;

        let mut doc = Document::pending(tenant_id, doc_type.id, req.property_id, &file, Utc::now());
        self.repo.insert(&doc).await?;
        self.invalidate(&doc).await;

        match enqueue_upload(self.jobs.as_ref(), tenant_id, doc.id, &content, self.settings) {
            Ok(job_id) => {
                info!(document_id = %doc.id, job_id = %job_id, size_bytes = doc.size_bytes, "document upload enqueued");
                Ok(doc)
            }
            Err(e) => {
                warn!(document_id = %doc.id, error = %e, "failed to enqueue upload");
                doc.mark_failed(format!("enqueue failed: {e}"), 0, Utc::now())?;
                self.repo.update(&doc).await?;
                self.invalidate(&doc).await;
                Err(e.into())
            }
        }
    }

    /// Re-run the dead-lettered upload of a `Failed` document.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %id))]
    pub async fn retry_upload(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<Document> {
        let mut doc = self
            .repo
            .get(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("document"))?;
        if doc.status != UploadStatus::Failed {
            return Err(ServiceError::conflict(format!(
                "only failed uploads can be retried; document is {}",
                doc.status
            )));
        }
        let dead = find_dead_upload(self.jobs.as_ref(), tenant_id, id)?
            .ok_or_else(|| ServiceError::conflict("no dead-lettered upload job for this document"))?;

        // Pending before the job is released, so the worker never sees a
        // failed document.
        doc.requeue(Utc::now())?;
        self.repo.update(&doc).await?;
        self.invalidate(&doc).await;

        let job = self.jobs.retry_dead_letter(tenant_id, dead.job.id)?;
        info!(job_id = %job.id, "document upload requeued");
        Ok(doc)
    }

    /// Delete a document, its stored object and its upload jobs.
    ///
    /// A queued upload is cancelled; one already running notices the missing
    /// row when it records the upload and removes the object it wrote.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_id = %id))]
    pub async fn delete(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<()> {
        let doc = self
            .repo
            .get(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("document"))?;

        for job in find_queued_uploads(self.jobs.as_ref(), tenant_id, id)? {
            if self.jobs.cancel(tenant_id, job.id)? {
                info!(job_id = %job.id, "upload job cancelled");
            } else {
                info!(job_id = %job.id, "upload job already running; worker will discard it");
            }
        }

        if let Some(key) = &doc.storage_key {
            match self.storage.delete(key).await {
                Ok(_) | Err(StorageError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(dead) = find_dead_upload(self.jobs.as_ref(), tenant_id, id)? {
            self.jobs.delete_dead_letter(tenant_id, dead.job.id)?;
        }

        if !self.repo.delete(tenant_id, id).await? {
            return Err(ServiceError::NotFound("document"));
        }
        self.invalidate(&doc).await;
        info!("document deleted");
        Ok(())
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use base64::Engine;
    use propdesk_documents::NewDocumentType;
    use propdesk_infra::jobs::JobExecutor;
    use propdesk_infra::realtime::RealtimeHub;
    use propdesk_infra::storage::{InMemoryObjectStorage, StorageResult, StoredObject};
    use propdesk_infra::upload::{DocumentUploadWorker, UPLOAD_JOB_KIND};
    use propdesk_properties::NewProperty;

    use crate::app::services::{AppServices, Stores};

    fn services() -> AppServices {
        AppServices::new(Stores::in_memory(), true, UploadSettings::default())
    }

    /// Bucket that fails the first `failures` writes.
    struct FlakyBucket {
        inner: InMemoryObjectStorage,
        failures: AtomicU32,
    }

    #[async_trait]
    impl ObjectStorage for FlakyBucket {
        async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> StorageResult<()> {
            if self
                .failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StorageError::Io(std::io::Error::other("bucket unavailable")));
            }
            self.inner.put(key, bytes, content_type).await
        }
        async fn get(&self, key: &str) -> StorageResult<StoredObject> {
            self.inner.get(key).await
        }
        async fn delete(&self, key: &str) -> StorageResult<bool> {
            self.inner.delete(key).await
        }
        fn url(&self, key: &str) -> StorageResult<String> {
            self.inner.url(key)
        }
    }

    /// Services whose bucket fails `failures` times, with no retry delay.
    fn services_with_flaky_bucket(failures: u32) -> AppServices {
        let mut stores = Stores::in_memory();
        stores.storage = Arc::new(FlakyBucket {
            inner: InMemoryObjectStorage::default(),
            failures: AtomicU32::new(failures),
        });
        let settings = UploadSettings {
            retry_delay: Duration::ZERO,
            ..UploadSettings::default()
        };
        AppServices::new(stores, true, settings)
    }

    fn b64(bytes: &[u8]) -> String {
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    async fn lease_type(svc: &AppServices, tenant: TenantId) -> EntityId {
        let new = NewDocumentType::new("Lease", None, vec!["application/pdf".into()], Some(64)).unwrap();
        svc.document_types.create(tenant, new).await.unwrap().id
    }

    fn request(document_type_id: EntityId, content: &[u8]) -> UploadRequest {
        UploadRequest {
            document_type_id,
            property_id: None,
            file_name: "lease.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            content_base64: b64(content),
        }
    }

    /// Run queued jobs to completion with the real worker.
    async fn drain(svc: &AppServices) {
        let stores = &svc.stores;
        let mut executor = JobExecutor::new(stores.jobs.clone());
        executor.register_handler(
            UPLOAD_JOB_KIND,
            Arc::new(DocumentUploadWorker::new(
                stores.documents.clone(),
                stores.storage.clone(),
                stores.cache.clone(),
                RealtimeHub::default(),
            )),
        );
        while let Some(mut job) = stores.jobs.claim_next(None).unwrap() {
            executor.execute_one(&mut job).await;
        }
    }

    #[tokio::test]
    async fn upload_is_pending_until_the_worker_runs() {
        let svc = services();
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;

        let doc = svc.documents.upload(tenant, request(type_id, b"%PDF-1.7")).await.unwrap();
        assert_eq!(doc.status, UploadStatus::Pending);
        assert_eq!(svc.documents.list(tenant, DocumentFilter::default()).await.unwrap().len(), 1);

        drain(&svc).await;

        let done = svc.documents.get(tenant, doc.id).await.unwrap().unwrap();
        assert_eq!(done.status, UploadStatus::Uploaded);
        assert!(svc.documents.url(&done).is_some());

        let listed = svc.documents.list(tenant, DocumentFilter::default()).await.unwrap();
        assert_eq!(listed[0].status, UploadStatus::Uploaded);
    }

    #[tokio::test]
    async fn upload_rejects_files_the_type_does_not_accept() {
        let svc = services();
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;

        let mut wrong_type = request(type_id, b"hello");
        wrong_type.content_type = "text/plain".to_string();
        assert_eq!(svc.documents.upload(tenant, wrong_type).await.unwrap_err().code(), "VALIDATION");

        let too_big = request(type_id, &[0u8; 65]);
        assert_eq!(svc.documents.upload(tenant, too_big).await.unwrap_err().code(), "VALIDATION");

        let mut bad_b64 = request(type_id, b"x");
        bad_b64.content_base64 = "***".to_string();
        assert_eq!(svc.documents.upload(tenant, bad_b64).await.unwrap_err().code(), "VALIDATION");

        assert!(svc.stores.jobs.claim_next(None).unwrap().is_none());
    }

    #[tokio::test]
    async fn upload_requires_type_and_property_of_the_same_tenant() {
        let svc = services();
        let (tenant, other) = (TenantId::new(), TenantId::new());
        let type_id = lease_type(&svc, tenant).await;
        let foreign_property = svc
            .properties
            .create(other, NewProperty::new("Elsewhere", None, None).unwrap())
            .await
            .unwrap();

        assert_eq!(
            svc.documents.upload(other, request(type_id, b"x")).await.unwrap_err(),
            ServiceError::NotFound("document type")
        );

        let mut req = request(type_id, b"x");
        req.property_id = Some(foreign_property.id);
        assert_eq!(
            svc.documents.upload(tenant, req).await.unwrap_err(),
            ServiceError::NotFound("property")
        );
    }

    #[tokio::test]
    async fn filtered_lists_are_invalidated_by_uploads() {
        let svc = services();
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;
        let property = svc
            .properties
            .create(tenant, NewProperty::new("Elm Court", None, None).unwrap())
            .await
            .unwrap();
        let by_property = DocumentFilter {
            property_id: Some(property.id),
            ..DocumentFilter::default()
        };
        let by_both = DocumentFilter {
            document_type_id: Some(type_id),
            property_id: Some(property.id),
        };

        assert!(svc.documents.list(tenant, by_property).await.unwrap().is_empty());
        assert!(svc.documents.list(tenant, by_both).await.unwrap().is_empty());

        let mut req = request(type_id, b"x");
        req.property_id = Some(property.id);
        svc.documents.upload(tenant, req).await.unwrap();

        assert_eq!(svc.documents.list(tenant, by_property).await.unwrap().len(), 1);
        assert_eq!(svc.documents.list(tenant, by_both).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn retry_requires_a_failed_document() {
        let svc = services();
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;
        let doc = svc.documents.upload(tenant, request(type_id, b"x")).await.unwrap();

        assert_eq!(
            svc.documents.retry_upload(tenant, doc.id).await.unwrap_err().code(),
            "CONFLICT"
        );
    }

    #[tokio::test]
    async fn delete_removes_the_stored_object() {
        let svc = services();
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;
        let doc = svc.documents.upload(tenant, request(type_id, b"%PDF")).await.unwrap();
        drain(&svc).await;

        let uploaded = svc.documents.get(tenant, doc.id).await.unwrap().unwrap();
        let key = uploaded.storage_key.clone().unwrap();
        assert!(svc.stores.storage.get(&key).await.is_ok());

        svc.documents.delete(tenant, doc.id).await.unwrap();
        assert!(svc.documents.get(tenant, doc.id).await.unwrap().is_none());
        assert!(matches!(
            svc.stores.storage.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn retry_after_dead_letter_uploads_on_a_fresh_budget() {
        let svc = services_with_flaky_bucket(3);
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;
        let doc = svc.documents.upload(tenant, request(type_id, b"%PDF-1.7")).await.unwrap();

        drain(&svc).await;
        let failed = svc.documents.get(tenant, doc.id).await.unwrap().unwrap();
        assert_eq!(failed.status, UploadStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert_eq!(svc.stores.jobs.list_dead_letters(tenant, 10).unwrap().len(), 1);

        let requeued = svc.documents.retry_upload(tenant, doc.id).await.unwrap();
        assert_eq!(requeued.status, UploadStatus::Pending);
        assert!(svc.stores.jobs.list_dead_letters(tenant, 10).unwrap().is_empty());
        let queued = find_queued_uploads(svc.stores.jobs.as_ref(), tenant, doc.id).unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].attempt, 0);

        drain(&svc).await;
        let done = svc.documents.get(tenant, doc.id).await.unwrap().unwrap();
        assert_eq!(done.status, UploadStatus::Uploaded);
        assert_eq!(done.attempts, 1);
        assert!(done.failure_reason.is_none());
        let object = svc.stores.storage.get(done.storage_key.as_deref().unwrap()).await.unwrap();
        assert_eq!(object.bytes, b"%PDF-1.7");
    }

    #[tokio::test]
    async fn deleting_a_pending_document_cancels_its_upload() {
        let svc = services();
        let tenant = TenantId::new();
        let type_id = lease_type(&svc, tenant).await;
        let doc = svc.documents.upload(tenant, request(type_id, b"%PDF")).await.unwrap();

        svc.documents.delete(tenant, doc.id).await.unwrap();

        assert!(svc.stores.jobs.claim_next(None).unwrap().is_none());
        assert!(svc.stores.jobs.list_dead_letters(tenant, 10).unwrap().is_empty());
        let stats = svc.stores.jobs.stats(tenant).unwrap();
        assert_eq!((stats.pending, stats.cancelled, stats.dead_lettered), (0, 1, 0));
        let key = doc.target_storage_key();
        assert!(matches!(
            svc.stores.storage.get(&key).await,
            Err(StorageError::NotFound(_))
        ));
    }
}
