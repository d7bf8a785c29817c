//! In-memory repositories for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use propdesk_core::{EntityId, TenantId, TenantScoped};
use propdesk_documents::{Document, DocumentFilter, DocumentType};
use propdesk_properties::{Property, Tenant};

use super::{
    DocumentRepository, DocumentTypeRepository, PropertyRepository, RepoError, RepoResult,
    TenantRepository,
};

/// Tenant-isolated table keyed by `(tenant, id)`.
#[derive(Debug)]
struct TenantTable<V> {
    rows: RwLock<HashMap<(TenantId, EntityId), V>>,
}

impl<V> Default for TenantTable<V> {
    fn default() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }
}

impl<V> TenantTable<V>
where
    V: TenantScoped<Id = EntityId> + Clone,
{
    fn insert(&self, row: &V) -> RepoResult<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let key = (row.tenant_id(), *row.id());
        if rows.contains_key(&key) {
            return Err(RepoError::Conflict(format!("duplicate id {}", row.id())));
        }
        rows.insert(key, row.clone());
        Ok(())
    }

    fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<V>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.get(&(tenant_id, id)).cloned())
    }

    fn update(&self, row: &V) -> RepoResult<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        let key = (row.tenant_id(), *row.id());
        if let Some(existing) = rows.get_mut(&key) {
            *existing = row.clone();
            return Ok(());
        }
        if rows.keys().any(|(_, id)| id == row.id()) {
            return Err(RepoError::TenantIsolation);
        }
        Err(RepoError::NotFound)
    }

    fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        Ok(rows.remove(&(tenant_id, id)).is_some())
    }

    fn filter(&self, tenant_id: TenantId, pred: impl Fn(&V) -> bool) -> RepoResult<Vec<V>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows
            .iter()
            .filter_map(|((t, _), v)| (*t == tenant_id && pred(v)).then(|| v.clone()))
            .collect())
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> RepoError {
    RepoError::Database("in-memory table lock poisoned".to_string())
}

#[derive(Debug, Default)]
pub struct InMemoryTenantRepository {
    rows: RwLock<HashMap<TenantId, Tenant>>,
}

impl InMemoryTenantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantRepository for InMemoryTenantRepository {
    async fn insert(&self, tenant: &Tenant) -> RepoResult<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        if rows.contains_key(&tenant.id) {
            return Err(RepoError::Conflict(format!("tenant {} already exists", tenant.id)));
        }
        if rows.values().any(|t| t.slug == tenant.slug) {
            return Err(RepoError::Conflict(format!("slug '{}' is taken", tenant.slug)));
        }
        rows.insert(tenant.id, tenant.clone());
        Ok(())
    }

    async fn get(&self, id: TenantId) -> RepoResult<Option<Tenant>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.get(&id).cloned())
    }

    async fn get_by_slug(&self, slug: &str) -> RepoResult<Option<Tenant>> {
        let rows = self.rows.read().map_err(poisoned)?;
        Ok(rows.values().find(|t| t.slug == slug).cloned())
    }

    async fn update(&self, tenant: &Tenant) -> RepoResult<()> {
        let mut rows = self.rows.write().map_err(poisoned)?;
        if rows.values().any(|t| t.slug == tenant.slug && t.id != tenant.id) {
            return Err(RepoError::Conflict(format!("slug '{}' is taken", tenant.slug)));
        }
        match rows.get_mut(&tenant.id) {
            Some(existing) => {
                *existing = tenant.clone();
                Ok(())
            }
            None => Err(RepoError::NotFound),
        }
    }

    async fn list(&self) -> RepoResult<Vec<Tenant>> {
        let rows = self.rows.read().map_err(poisoned)?;
        let mut out: Vec<Tenant> = rows.values().cloned().collect();
        out.sort_by_key(|t| t.created_at);
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPropertyRepository {
    table: TenantTable<Property>,
}

impl InMemoryPropertyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PropertyRepository for InMemoryPropertyRepository {
    async fn insert(&self, property: &Property) -> RepoResult<()> {
        self.table.insert(property)
    }

    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<Property>> {
        self.table.get(tenant_id, id)
    }

    async fn update(&self, property: &Property) -> RepoResult<()> {
        self.table.update(property)
    }

    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        self.table.delete(tenant_id, id)
    }

    async fn list(&self, tenant_id: TenantId) -> RepoResult<Vec<Property>> {
        let mut out = self.table.filter(tenant_id, |_| true)?;
        out.sort_by_key(|p| (p.created_at, p.id));
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentTypeRepository {
    table: TenantTable<DocumentType>,
}

impl InMemoryDocumentTypeRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentTypeRepository for InMemoryDocumentTypeRepository {
    async fn insert(&self, doc_type: &DocumentType) -> RepoResult<()> {
        // Uniqueness check and insert are not atomic here; dev/test only.
        if !self
            .table
            .filter(doc_type.tenant_id, |t| t.same_name(&doc_type.name))?
            .is_empty()
        {
            return Err(RepoError::Conflict(format!(
                "document type '{}' already exists",
                doc_type.name
            )));
        }
        self.table.insert(doc_type)
    }

    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<DocumentType>> {
        self.table.get(tenant_id, id)
    }

    async fn find_by_name(&self, tenant_id: TenantId, name: &str) -> RepoResult<Option<DocumentType>> {
        Ok(self
            .table
            .filter(tenant_id, |t| t.same_name(name))?
            .into_iter()
            .next())
    }

    async fn update(&self, doc_type: &DocumentType) -> RepoResult<()> {
        let clash = self
            .table
            .filter(doc_type.tenant_id, |t| t.id != doc_type.id && t.same_name(&doc_type.name))?;
        if !clash.is_empty() {
            return Err(RepoError::Conflict(format!(
                "document type '{}' already exists",
                doc_type.name
            )));
        }
        self.table.update(doc_type)
    }

    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        self.table.delete(tenant_id, id)
    }

    async fn list(&self, tenant_id: TenantId) -> RepoResult<Vec<DocumentType>> {
        let mut out = self.table.filter(tenant_id, |_| true)?;
        out.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(out)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDocumentRepository {
    table: TenantTable<Document>,
}

impl InMemoryDocumentRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentRepository for InMemoryDocumentRepository {
    async fn insert(&self, document: &Document) -> RepoResult<()> {
        self.table.insert(document)
    }

    async fn get(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<Option<Document>> {
        self.table.get(tenant_id, id)
    }

    async fn update(&self, document: &Document) -> RepoResult<()> {
        self.table.update(document)
    }

    async fn delete(&self, tenant_id: TenantId, id: EntityId) -> RepoResult<bool> {
        self.table.delete(tenant_id, id)
    }

    async fn list(&self, tenant_id: TenantId, filter: DocumentFilter) -> RepoResult<Vec<Document>> {
        let mut out = self.table.filter(tenant_id, |d| filter.matches(d))?;
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(out)
    }

    async fn count_by_type(&self, tenant_id: TenantId, document_type_id: EntityId) -> RepoResult<u64> {
        let n = self
            .table
            .filter(tenant_id, |d| d.document_type_id == document_type_id)?
            .len();
        Ok(n as u64)
    }

    async fn count_by_property(&self, tenant_id: TenantId, property_id: EntityId) -> RepoResult<u64> {
        let n = self
            .table
            .filter(tenant_id, |d| d.property_id == Some(property_id))?
            .len();
        Ok(n as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use propdesk_documents::{FileUpload, NewDocumentType};
    use propdesk_properties::NewProperty;

    fn property(tenant: TenantId) -> Property {
        NewProperty::new("Oak Court", None, Some(4))
            .unwrap()
            .into_property(tenant, Utc::now())
    }

    fn doc_type(tenant: TenantId, name: &str) -> DocumentType {
        NewDocumentType::new(name, None, vec![], None)
            .unwrap()
            .into_document_type(tenant, Utc::now())
    }

    #[tokio::test]
    async fn properties_are_tenant_isolated() {
        let repo = InMemoryPropertyRepository::new();
        let t1 = TenantId::new();
        let t2 = TenantId::new();
        let p = property(t1);
        repo.insert(&p).await.unwrap();

        assert_eq!(repo.get(t1, p.id).await.unwrap(), Some(p.clone()));
        assert_eq!(repo.get(t2, p.id).await.unwrap(), None);
        assert!(repo.list(t2).await.unwrap().is_empty());
        assert!(!repo.delete(t2, p.id).await.unwrap());

        let mut forged = p.clone();
        forged.tenant_id = t2;
        assert_eq!(repo.update(&forged).await, Err(RepoError::TenantIsolation));
    }

    #[tokio::test]
    async fn update_replaces_the_owning_tenants_row() {
        let repo = InMemoryPropertyRepository::new();
        let t1 = TenantId::new();
        let mut p = property(t1);
        repo.insert(&p).await.unwrap();

        p.unit_count = 42;
        repo.update(&p).await.unwrap();
        assert_eq!(repo.get(t1, p.id).await.unwrap().map(|r| r.unit_count), Some(42));

        let missing = property(t1);
        assert_eq!(repo.update(&missing).await, Err(RepoError::NotFound));
    }

    #[tokio::test]
    async fn document_type_names_are_unique_per_tenant() {
        let repo = InMemoryDocumentTypeRepository::new();
        let t1 = TenantId::new();
        repo.insert(&doc_type(t1, "Lease")).await.unwrap();

        let err = repo.insert(&doc_type(t1, "LEASE")).await.unwrap_err();
        assert!(matches!(err, RepoError::Conflict(_)));

        // Another tenant may reuse the name.
        repo.insert(&doc_type(TenantId::new(), "Lease")).await.unwrap();

        let found = repo.find_by_name(t1, " lease").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn renaming_onto_an_existing_type_conflicts() {
        let repo = InMemoryDocumentTypeRepository::new();
        let t = TenantId::new();
        repo.insert(&doc_type(t, "Lease")).await.unwrap();
        let mut other = doc_type(t, "Inspection");
        repo.insert(&other).await.unwrap();

        other.name = "lease".to_string();
        assert!(matches!(repo.update(&other).await, Err(RepoError::Conflict(_))));
    }

    #[tokio::test]
    async fn document_listing_filters_and_counts() {
        let repo = InMemoryDocumentRepository::new();
        let t = TenantId::new();
        let lease = doc_type(t, "Lease");
        let property_id = EntityId::new();
        let upload = FileUpload::new("a.pdf", "application/pdf", 10).unwrap();

        let d1 = Document::pending(t, lease.id, Some(property_id), &upload, Utc::now());
        let d2 = Document::pending(t, lease.id, None, &upload, Utc::now());
        let d3 = Document::pending(t, EntityId::new(), None, &upload, Utc::now());
        for d in [&d1, &d2, &d3] {
            repo.insert(d).await.unwrap();
        }

        assert_eq!(repo.list(t, DocumentFilter::default()).await.unwrap().len(), 3);
        let by_type = DocumentFilter { document_type_id: Some(lease.id), ..Default::default() };
        assert_eq!(repo.list(t, by_type).await.unwrap().len(), 2);
        assert_eq!(repo.count_by_type(t, lease.id).await.unwrap(), 2);
        assert_eq!(repo.count_by_property(t, property_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn tenant_slugs_are_unique() {
        let repo = InMemoryTenantRepository::new();
        let a = propdesk_properties::NewTenant::new(TenantId::new(), "A", "acme")
            .unwrap()
            .into_tenant(Utc::now());
        let b = propdesk_properties::NewTenant::new(TenantId::new(), "B", "acme")
            .unwrap()
            .into_tenant(Utc::now());
        repo.insert(&a).await.unwrap();
        assert!(matches!(repo.insert(&b).await, Err(RepoError::Conflict(_))));
        assert_eq!(repo.get_by_slug("acme").await.unwrap(), Some(a));
    }
}
