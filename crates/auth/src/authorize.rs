use std::collections::HashSet;

use thiserror::Error;

use propdesk_core::{TenantId, UserId};

use crate::{Permission, TenantMembership};

/// A fully resolved principal for authorization decisions.
///
/// Construction is decoupled from storage and transport: the API derives the
/// membership from verified claims and the role policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Build a principal whose membership is derived from `roles` via the
    /// built-in policy.
    pub fn from_roles(user_id: UserId, tenant_id: TenantId, roles: Vec<crate::Role>) -> Self {
        let permissions = crate::permissions_for_roles(&roles);
        Self {
            user_id,
            active_tenant_id: tenant_id,
            membership: TenantMembership {
                tenant_id,
                roles,
                permissions,
            },
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Operation-side authorization contract.
///
/// Implemented by operations that require permissions; the API layer checks
/// them before touching any service.
pub trait RequiresPermissions {
    fn required_permissions(&self) -> &[Permission];
}

/// Authorize a principal within its active tenant context.
///
/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if principal.active_tenant_id != principal.membership.tenant_id {
        return Err(AuthzError::TenantMismatch);
    }

    let perms: HashSet<&str> = principal
        .membership
        .permissions
        .iter()
        .map(|p| p.as_str())
        .collect();

    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Authorize every permission an operation declares.
pub fn authorize_all<R: RequiresPermissions + ?Sized>(
    principal: &Principal,
    operation: &R,
) -> Result<(), AuthzError> {
    for perm in operation.required_permissions() {
        authorize(principal, perm)?;
    }
    Ok(())
}
