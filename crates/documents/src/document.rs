use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{DomainError, DomainResult, Entity, EntityId, TenantId, TenantScoped};

use crate::upload::{FileUpload, storage_key};

/// Where a document is in the asynchronous upload pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// Accepted by the API; the bytes are queued for the bucket.
    Pending,
    /// Stored in the bucket and recorded in the database.
    Uploaded,
    /// The upload job exhausted its retries.
    Failed,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Pending => "pending",
            UploadStatus::Uploaded => "uploaded",
            UploadStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "pending" => Ok(UploadStatus::Pending),
            "uploaded" => Ok(UploadStatus::Uploaded),
            "failed" => Ok(UploadStatus::Failed),
            other => Err(DomainError::validation(format!("unknown upload status '{other}'"))),
        }
    }

    /// Legal transitions: `Pending → Uploaded | Failed`, `Failed → Pending`.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        matches!(
            (self, next),
            (UploadStatus::Pending, UploadStatus::Uploaded)
                | (UploadStatus::Pending, UploadStatus::Failed)
                | (UploadStatus::Failed, UploadStatus::Pending)
        )
    }
}

impl core::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An uploaded (or uploading) tenant document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub document_type_id: EntityId,
    pub property_id: Option<EntityId>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    /// Bucket object key; set once the upload succeeded.
    pub storage_key: Option<String>,
    pub status: UploadStatus,
    pub failure_reason: Option<String>,
    /// Upload attempts made by the worker so far.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl Document {
    /// A freshly accepted upload, waiting for the worker.
    pub fn pending(
        tenant_id: TenantId,
        document_type_id: EntityId,
        property_id: Option<EntityId>,
        upload: &FileUpload,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntityId::new(),
            tenant_id,
            document_type_id,
            property_id,
            file_name: upload.file_name.clone(),
            content_type: upload.content_type.clone(),
            size_bytes: upload.size_bytes,
            storage_key: None,
            status: UploadStatus::Pending,
            failure_reason: None,
            attempts: 0,
            created_at: now,
            updated_at: now,
            uploaded_at: None,
        }
    }

    /// Object key this document is (or will be) stored under.
    pub fn target_storage_key(&self) -> String {
        storage_key(self.tenant_id, self.id, &self.file_name)
    }

    fn transition(&mut self, next: UploadStatus, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invariant(format!(
                "document {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_uploaded(&mut self, key: String, attempts: u32, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(UploadStatus::Uploaded, now)?;
        self.storage_key = Some(key);
        self.failure_reason = None;
        self.attempts = attempts;
        self.uploaded_at = Some(now);
        Ok(())
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>, attempts: u32, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(UploadStatus::Failed, now)?;
        self.failure_reason = Some(reason.into());
        self.attempts = attempts;
        Ok(())
    }

    /// Put a failed document back in the queue.
    pub fn requeue(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        self.transition(UploadStatus::Pending, now)?;
        self.failure_reason = None;
        Ok(())
    }

    pub fn is_uploaded(&self) -> bool {
        self.status == UploadStatus::Uploaded
    }
}

impl Entity for Document {
    type Id = EntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantScoped for Document {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Optional narrowing for document listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DocumentFilter {
    pub document_type_id: Option<EntityId>,
    pub property_id: Option<EntityId>,
}

impl DocumentFilter {
    pub fn matches(&self, doc: &Document) -> bool {
        self.document_type_id.is_none_or(|t| t == doc.document_type_id)
            && self.property_id.is_none_or(|p| doc.property_id == Some(p))
    }

    pub fn is_empty(&self) -> bool {
        self.document_type_id.is_none() && self.property_id.is_none()
    }
}
