//! `propdesk-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model and the entity traits the cache and
//! repositories key off.

pub mod entity;
pub mod error;
pub mod id;

pub use entity::{Entity, TenantScoped};
pub use error::{DomainError, DomainResult, optional_text, required_text};
pub use id::{EntityId, TenantId, UserId};
