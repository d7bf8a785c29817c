use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{DomainError, DomainResult, Entity, TenantId, required_text};

const MAX_NAME_LEN: usize = 200;

/// A tenant (the organization that owns properties and documents).
///
/// Tenants are the isolation boundary, so the record is keyed by its own
/// `TenantId` rather than scoped to another tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for provisioning a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTenant {
    pub id: TenantId,
    pub name: String,
    pub slug: String,
}

/// Partial update; `None` keeps the existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
}

impl NewTenant {
    pub fn new(id: TenantId, name: &str, slug: &str) -> DomainResult<Self> {
        Ok(Self {
            id,
            name: required_text("name", name, MAX_NAME_LEN)?,
            slug: validate_slug(slug)?,
        })
    }

    /// Default record for a tenant first seen in a valid token.
    pub fn provisioned(id: TenantId) -> Self {
        let short = id.to_string().replace('-', "");
        Self {
            id,
            name: format!("Tenant {}", &short[..8]),
            slug: format!("tenant-{short}"),
        }
    }

    pub fn into_tenant(self, now: DateTime<Utc>) -> Tenant {
        Tenant {
            id: self.id,
            name: self.name,
            slug: self.slug,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Tenant {
    /// Apply a validated patch. Returns whether anything changed.
    pub fn apply_patch(&mut self, patch: TenantPatch, now: DateTime<Utc>) -> DomainResult<bool> {
        let name = match patch.name {
            Some(n) => required_text("name", &n, MAX_NAME_LEN)?,
            None => self.name.clone(),
        };
        let slug = match patch.slug {
            Some(s) => validate_slug(&s)?,
            None => self.slug.clone(),
        };

        let changed = name != self.name || slug != self.slug;
        if changed {
            self.name = name;
            self.slug = slug;
            self.updated_at = now;
        }
        Ok(changed)
    }

    pub fn deactivate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::conflict("tenant is already inactive"));
        }
        self.active = false;
        self.updated_at = now;
        Ok(())
    }

    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<()> {
        if self.active {
            return Err(DomainError::conflict("tenant is already active"));
        }
        self.active = true;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Tenant {
    type Id = TenantId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Slugs are lowercase `[a-z0-9-]`, 3..=63 chars, no leading/trailing dash.
pub fn validate_slug(slug: &str) -> DomainResult<String> {
    let slug = slug.trim();
    let len = slug.len();
    if !(3..=63).contains(&len) {
        return Err(DomainError::validation("slug must be 3 to 63 characters"));
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(DomainError::validation(
            "slug may only contain lowercase letters, digits and '-'",
        ));
    }
    if slug.starts_with('-') || slug.ends_with('-') {
        return Err(DomainError::validation("slug cannot start or end with '-'"));
    }
    Ok(slug.to_string())
}
