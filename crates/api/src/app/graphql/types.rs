//! GraphQL object and input types, mapped from the domain entities.

use async_graphql::{Enum, InputObject, MaybeUndefined, SimpleObject};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use propdesk_documents::{Document, DocumentType, DocumentTypePatch, UploadStatus};
use propdesk_infra::cache::CacheStats;
use propdesk_infra::jobs::JobStats;
use propdesk_properties::{Property, PropertyPatch, Tenant, TenantPatch};

use crate::app::services::TenantUpdate;

/// GraphQL representation of UploadStatus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
#[graphql(name = "UploadStatus")]
pub enum GqlUploadStatus {
    Pending,
    Uploaded,
    Failed,
}

impl From<UploadStatus> for GqlUploadStatus {
    fn from(status: UploadStatus) -> Self {
        match status {
            UploadStatus::Pending => GqlUploadStatus::Pending,
            UploadStatus::Uploaded => GqlUploadStatus::Uploaded,
            UploadStatus::Failed => GqlUploadStatus::Failed,
        }
    }
}

impl From<GqlUploadStatus> for UploadStatus {
    fn from(status: GqlUploadStatus) -> Self {
        match status {
            GqlUploadStatus::Pending => UploadStatus::Pending,
            GqlUploadStatus::Uploaded => UploadStatus::Uploaded,
            GqlUploadStatus::Failed => UploadStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Tenant")]
pub struct GqlTenant {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Tenant> for GqlTenant {
    fn from(t: Tenant) -> Self {
        Self {
            id: t.id.into(),
            name: t.name,
            slug: t.slug,
            active: t.active,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Property")]
pub struct GqlProperty {
    pub id: Uuid,
    pub name: String,
    pub address: Option<String>,
    pub unit_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Property> for GqlProperty {
    fn from(p: Property) -> Self {
        Self {
            id: p.id.into(),
            name: p.name,
            address: p.address,
            unit_count: p.unit_count,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "DocumentType")]
pub struct GqlDocumentType {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Empty means any content type is accepted.
    pub allowed_content_types: Vec<String>,
    pub max_size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DocumentType> for GqlDocumentType {
    fn from(t: DocumentType) -> Self {
        Self {
            id: t.id.into(),
            name: t.name,
            description: t.description,
            allowed_content_types: t.allowed_content_types,
            max_size_bytes: t.max_size_bytes,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Document")]
pub struct GqlDocument {
    pub id: Uuid,
    pub document_type_id: Uuid,
    pub property_id: Option<Uuid>,
    pub file_name: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub status: GqlUploadStatus,
    pub storage_key: Option<String>,
    /// Set once the document is uploaded.
    pub url: Option<String>,
    pub failure_reason: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl GqlDocument {
    pub fn new(d: Document, url: Option<String>) -> Self {
        Self {
            id: d.id.into(),
            document_type_id: d.document_type_id.into(),
            property_id: d.property_id.map(Into::into),
            file_name: d.file_name,
            content_type: d.content_type,
            size_bytes: d.size_bytes,
            status: d.status.into(),
            storage_key: d.storage_key,
            url,
            failure_reason: d.failure_reason,
            attempts: d.attempts,
            created_at: d.created_at,
            updated_at: d.updated_at,
            uploaded_at: d.uploaded_at,
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "Me")]
pub struct GqlMe {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "CacheStats")]
pub struct GqlCacheStats {
    pub enabled: bool,
    pub hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub errors: u64,
    pub invalidations: u64,
}

impl GqlCacheStats {
    pub fn new(enabled: bool, s: CacheStats) -> Self {
        Self {
            enabled,
            hits: s.hits,
            misses: s.misses,
            loads: s.loads,
            errors: s.errors,
            invalidations: s.invalidations,
        }
    }
}

/// Job counts of the caller's tenant.
#[derive(Debug, Clone, SimpleObject)]
#[graphql(name = "JobStats")]
pub struct GqlJobStats {
    pub pending: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub dead_lettered: u64,
    pub cancelled: u64,
}

impl From<JobStats> for GqlJobStats {
    fn from(s: JobStats) -> Self {
        Self {
            pending: s.pending as u64,
            running: s.running as u64,
            completed: s.completed as u64,
            failed: s.failed as u64,
            dead_lettered: s.dead_lettered as u64,
            cancelled: s.cancelled as u64,
        }
    }
}

/// Absent leaves a field unchanged; explicit `null` clears it.
fn tri_state<T>(value: MaybeUndefined<T>) -> Option<Option<T>> {
    match value {
        MaybeUndefined::Undefined => None,
        MaybeUndefined::Null => Some(None),
        MaybeUndefined::Value(v) => Some(Some(v)),
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct UpdateTenantInput {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub active: Option<bool>,
}

impl From<UpdateTenantInput> for TenantUpdate {
    fn from(input: UpdateTenantInput) -> Self {
        Self {
            patch: TenantPatch {
                name: input.name,
                slug: input.slug,
            },
            active: input.active,
        }
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct CreatePropertyInput {
    pub name: String,
    pub address: Option<String>,
    pub unit_count: Option<u32>,
}

#[derive(Debug, Clone, InputObject)]
pub struct UpdatePropertyInput {
    pub name: Option<String>,
    pub address: MaybeUndefined<String>,
    pub unit_count: Option<u32>,
}

impl From<UpdatePropertyInput> for PropertyPatch {
    fn from(input: UpdatePropertyInput) -> Self {
        Self {
            name: input.name,
            address: tri_state(input.address),
            unit_count: input.unit_count,
        }
    }
}

#[derive(Debug, Clone, InputObject)]
pub struct CreateDocumentTypeInput {
    pub name: String,
    pub description: Option<String>,
    pub allowed_content_types: Option<Vec<String>>,
    pub max_size_bytes: Option<u64>,
}

#[derive(Debug, Clone, InputObject)]
pub struct UpdateDocumentTypeInput {
    pub name: Option<String>,
    pub description: MaybeUndefined<String>,
    pub allowed_content_types: Option<Vec<String>>,
    pub max_size_bytes: Option<u64>,
}

impl From<UpdateDocumentTypeInput> for DocumentTypePatch {
    fn from(input: UpdateDocumentTypeInput) -> Self {
        Self {
            name: input.name,
            description: tri_state(input.description),
            allowed_content_types: input.allowed_content_types,
            max_size_bytes: input.max_size_bytes,
        }
    }
}

/// File content travels base64-encoded inside the mutation.
#[derive(Debug, Clone, InputObject)]
pub struct UploadDocumentInput {
    pub document_type_id: Uuid,
    pub property_id: Option<Uuid>,
    pub file_name: String,
    pub content_type: String,
    pub content_base64: String,
}
