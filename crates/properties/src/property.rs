use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use propdesk_core::{
    DomainError, DomainResult, Entity, EntityId, TenantId, TenantScoped, optional_text,
    required_text,
};

const MAX_NAME_LEN: usize = 200;
const MAX_ADDRESS_LEN: usize = 500;
/// Upper bound on units per property.
pub const MAX_UNITS: u32 = 10_000;

/// A managed property (building, complex, single-family home).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    pub address: Option<String>,
    pub unit_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated input for creating a property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProperty {
    pub name: String,
    pub address: Option<String>,
    pub unit_count: u32,
}

/// Partial update. `address: Some(None)` clears the address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyPatch {
    pub name: Option<String>,
    pub address: Option<Option<String>>,
    pub unit_count: Option<u32>,
}

impl NewProperty {
    pub fn new(name: &str, address: Option<&str>, unit_count: Option<u32>) -> DomainResult<Self> {
        let unit_count = unit_count.unwrap_or(1);
        ensure_unit_count(unit_count)?;
        Ok(Self {
            name: required_text("name", name, MAX_NAME_LEN)?,
            address: optional_text("address", address, MAX_ADDRESS_LEN)?,
            unit_count,
        })
    }

    pub fn into_property(self, tenant_id: TenantId, now: DateTime<Utc>) -> Property {
        Property {
            id: EntityId::new(),
            tenant_id,
            name: self.name,
            address: self.address,
            unit_count: self.unit_count,
            created_at: now,
            updated_at: now,
        }
    }
}

impl Property {
    /// Apply a patch, keeping unspecified fields. Returns whether anything changed.
    pub fn apply_update(&mut self, patch: PropertyPatch, now: DateTime<Utc>) -> DomainResult<bool> {
        let name = match patch.name {
            Some(n) => required_text("name", &n, MAX_NAME_LEN)?,
            None => self.name.clone(),
        };
        let address = match patch.address {
            Some(a) => optional_text("address", a.as_deref(), MAX_ADDRESS_LEN)?,
            None => self.address.clone(),
        };
        let unit_count = patch.unit_count.unwrap_or(self.unit_count);
        ensure_unit_count(unit_count)?;

        let changed =
            name != self.name || address != self.address || unit_count != self.unit_count;
        if changed {
            self.name = name;
            self.address = address;
            self.unit_count = unit_count;
            self.updated_at = now;
        }
        Ok(changed)
    }
}

fn ensure_unit_count(units: u32) -> DomainResult<()> {
    if units > MAX_UNITS {
        return Err(DomainError::validation(format!(
            "unit_count must be at most {MAX_UNITS}"
        )));
    }
    Ok(())
}

impl Entity for Property {
    type Id = EntityId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl TenantScoped for Property {
    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}
