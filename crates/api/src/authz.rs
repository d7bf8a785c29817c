//! API-side authorization guard for GraphQL operations.
//!
//! Enforced at the resolver boundary (before any service call), keeping
//! services and infra auth-agnostic.

use propdesk_auth::{AuthzError, Permission, RequiresPermissions, authorize_all};

use crate::context::{PrincipalContext, TenantContext};

/// The permissions one GraphQL operation needs.
pub struct Operation {
    pub name: &'static str,
    pub required: Vec<Permission>,
}

impl Operation {
    pub fn new(name: &'static str, permission: Permission) -> Self {
        Self {
            name,
            required: vec![permission],
        }
    }
}

impl RequiresPermissions for Operation {
    fn required_permissions(&self) -> &[Permission] {
        &self.required
    }
}

/// Check authorization for an operation in the current request context.
pub fn authorize_operation(
    tenant: &TenantContext,
    principal: &PrincipalContext,
    operation: &Operation,
) -> Result<(), AuthzError> {
    let resolved = principal.principal(tenant);
    authorize_all(&resolved, operation).inspect_err(|e| {
        tracing::debug!(
            tenant_id = %tenant.tenant_id(),
            user_id = %principal.user_id(),
            operation = operation.name,
            error = %e,
            "operation denied"
        );
    })
}
