//! Entity traits: identity + tenant ownership.

use crate::id::TenantId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity owned by exactly one tenant.
///
/// Repositories filter every query by this value and cache keys embed it, so
/// a record can never be served across the tenant boundary.
pub trait TenantScoped: Entity {
    fn tenant_id(&self) -> TenantId;
}
