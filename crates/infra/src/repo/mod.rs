//! Tenant-isolated repositories over the relational store.
//!
//! Every operation on tenant-owned data takes the `TenantId` explicitly and
//! implementations must include it in every lookup. In-memory
//! implementations back dev/test; Postgres implementations back production.

use async_trait::async_trait;
use thiserror::Error;

use propdesk_core::{EntityId, TenantId};
use propdesk_documents::{Document, DocumentFilter, DocumentType};
use propdesk_properties::{Property, Tenant};

pub mod in_memory;
pub mod postgres;

pub use in_memory::{
    InMemoryDocumentRepository, InMemoryDocumentTypeRepository, InMemoryPropertyRepository,
    InMemoryTenantRepository,
};
pub use postgres::{
    PostgresDocumentRepository, PostgresDocumentTypeRepository, PostgresPropertyRepository,
    PostgresTenantRepository,
};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("tenant isolation violation")]
    TenantIsolation,

    #[error("database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn insert(&self, tenant: &Tenant) -> RepoResult<()>;
    async fn get(&self, id: TenantId) -> RepoResult<Option<Tenant>>;
    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Tenant>>;
    async fn update(&self, tenant: &Tenant) -> RepoResult<()>;
    async fn list(&self) -> RepoResult<Vec<Tenant>>;
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn insert(&self, property: &Property) -> RepoResult<()>;
    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<Property>>;
    async fn update(&self, property: &Property) -> RepoResult<()>;
    /// Returns whether a row was deleted.
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool>;
    /// All properties of a tenant, oldest first.
    async fn list(&self, tenant_id: TenantId) -> RepoResult<Vec<Property>>;
}

#[async_trait]
pub trait DocumentTypeRepository: Send + Sync {
    /// Fails with `Conflict` when the tenant already has a type with that name.
    async fn insert(&self, doc_type: &DocumentType) -> RepoResult<()>;
    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<DocumentType>>;
    /// Case-insensitive lookup by name.
    async fn find_by_name(&self, tenant_id: TenantId, name: &str) -> RepoResult<Option<DocumentType>>;
    async fn update(&self, doc_type: &DocumentType) -> RepoResult<()>;
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool>;
    /// All document types of a tenant, ordered by name.
    async fn list(&self, tenant_id: TenantId) -> RepoResult<Vec<DocumentType>>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn insert(&self, document: &Document) -> RepoResult<()>;
    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<Document>>;
    async fn update(&self, document: &Document) -> RepoResult<()>;
    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool>;
    /// Documents matching `filter`, newest first.
    async fn list(&self, tenant_id: TenantId, filter: DocumentFilter) -> RepoResult<Vec<Document>>;
    /// Number of documents referencing a document type.
    async fn count_by_type(&self, tenant_id: TenantId, document_type_id: EntityId) -> RepoResult<u64>;
    /// Number of documents attached to a property.
    async fn count_by_property(&self, tenant_id: TenantId, property_id: EntityId) -> RepoResult<u64>;
}
