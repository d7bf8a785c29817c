use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use propdesk_core::{EntityId, TenantId};
use propdesk_documents::{DocumentType, DocumentTypePatch, NewDocumentType};
use propdesk_infra::cache::{CacheEntity, CacheService};
use propdesk_infra::repo::{DocumentRepository, DocumentTypeRepository};

use crate::app::errors::{ServiceError, ServiceResult};

#[derive(Clone)]
pub struct DocumentTypeService {
    repo: Arc<dyn DocumentTypeRepository>,
    documents: Arc<dyn DocumentRepository>,
    cache: CacheService,
}

impl DocumentTypeService {
    pub fn new(
        repo: Arc<dyn DocumentTypeRepository>,
        documents: Arc<dyn DocumentRepository>,
        cache: CacheService,
    ) -> Self {
        Self { repo, documents, cache }
    }

    pub async fn get(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<Option<DocumentType>> {
        let key = self.cache.keys().entity(CacheEntity::DocumentType, tenant_id, id);
        let doc_type = self
            .cache
            .get_or_load(&key, CacheEntity::DocumentType.default_ttl(), || {
                self.repo.get(tenant_id, id)
            })
            .await?;
        Ok(doc_type)
    }

    pub async fn list(&self, tenant_id: TenantId) -> ServiceResult<Vec<DocumentType>> {
        let key = self.cache.keys().list(CacheEntity::DocumentType, tenant_id, None);
        let types = self
            .cache
            .get_or_load(&key, CacheEntity::DocumentType.default_ttl(), || async {
                self.repo.list(tenant_id).await.map(Some)
            })
            .await?;
        Ok(types.unwrap_or_default())
    }

    #[instrument(skip(self, new), fields(tenant_id = %tenant_id, name = %new.name))]
    pub async fn create(&self, tenant_id: TenantId, new: NewDocumentType) -> ServiceResult<DocumentType> {
        self.ensure_name_free(tenant_id, &new.name, None).await?;

        let doc_type = new.into_document_type(tenant_id, Utc::now());
        self.repo.insert(&doc_type).await?;
        self.invalidate(tenant_id, doc_type.id).await;
        info!(document_type_id = %doc_type.id, "document type created");
        Ok(doc_type)
    }

    #[instrument(skip(self, patch), fields(tenant_id = %tenant_id, document_type_id = %id))]
    pub async fn update(
        &self,
        tenant_id: TenantId,
        id: EntityId,
        patch: DocumentTypePatch,
    ) -> ServiceResult<DocumentType> {
        let mut doc_type = self
            .repo
            .get(tenant_id, id)
            .await?
            .ok_or(ServiceError::NotFound("document type"))?;
        if !doc_type.apply_update(patch, Utc::now())? {
            return Ok(doc_type);
        }

        self.ensure_name_free(tenant_id, &doc_type.name, Some(id)).await?;
        self.repo.update(&doc_type).await?;
        self.invalidate(tenant_id, id).await;
        Ok(doc_type)
    }

    /// Delete a document type no document references.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, document_type_id = %id))]
    pub async fn delete(&self, tenant_id: TenantId, id: EntityId) -> ServiceResult<()> {
        let referencing = self.documents.count_by_type(tenant_id, id).await?;
        if referencing > 0 {
            return Err(ServiceError::conflict(format!(
                "document type is referenced by {referencing} document(s)"
            )));
        }
        if !self.repo.delete(tenant_id, id).await? {
            return Err(ServiceError::NotFound("document type"));
        }
        self.invalidate(tenant_id, id).await;
        info!("document type deleted");
        Ok(())
    }

    async fn ensure_name_free(&self, tenant_id: TenantId, name: &str, own_id: Option<EntityId>) -> ServiceResult<()> {
        match self.repo.find_by_name(tenant_id, name).await? {
            Some(existing) if Some(existing.id) != own_id => Err(ServiceError::conflict(format!(
                "a document type named '{}' already exists",
                existing.name
            ))),
            _ => Ok(()),
        }
    }

    async fn invalidate(&self, tenant_id: TenantId, id: EntityId) {
        let keys = self
            .cache
            .keys()
            .invalidation_set(CacheEntity::DocumentType, tenant_id, id, &[]);
        self.cache.invalidate(&keys).await;
    }
}
