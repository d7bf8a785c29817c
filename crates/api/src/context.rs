use propdesk_auth::{Principal, Role};
use propdesk_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// This is immutable and must be present for all tenant-scoped routes. The
/// auth middleware only inserts it after the tenant record was found active.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Principal context for a request (authenticated user + roles).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    user_id: UserId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(user_id: UserId, roles: Vec<Role>) -> Self {
        Self { user_id, roles }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    /// Resolve the principal acting within `tenant`.
    pub fn principal(&self, tenant: &TenantContext) -> Principal {
        Principal::from_roles(self.user_id, tenant.tenant_id(), self.roles.clone())
    }
}
