use async_graphql::ErrorExtensions;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use propdesk_auth::AuthzError;
use propdesk_core::DomainError;
use propdesk_infra::jobs::JobStoreError;
use propdesk_infra::repo::RepoError;
use propdesk_infra::storage::StorageError;

/// Error returned by the application services.
///
/// Each variant maps to one stable client-facing code, carried in
/// `extensions.code` of GraphQL errors.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("internal error")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => ServiceError::Validation(msg),
            DomainError::InvariantViolation(msg) | DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::NotFound => ServiceError::NotFound("record"),
            DomainError::Unauthorized => ServiceError::Forbidden("unauthorized".to_string()),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ServiceError::NotFound("record"),
            RepoError::Conflict(msg) => ServiceError::Conflict(msg),
            RepoError::TenantIsolation => ServiceError::Forbidden("tenant isolation violation".to_string()),
            RepoError::Database(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<AuthzError> for ServiceError {
    fn from(err: AuthzError) -> Self {
        ServiceError::Forbidden(err.to_string())
    }
}

impl From<JobStoreError> for ServiceError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::NotFound(_) => ServiceError::NotFound("job"),
            JobStoreError::TenantIsolation => ServiceError::Forbidden(err.to_string()),
            JobStoreError::AlreadyExists(_) => ServiceError::Conflict(err.to_string()),
            JobStoreError::Storage(msg) => ServiceError::Internal(msg),
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidKey(msg) => ServiceError::Validation(format!("invalid object key: {msg}")),
            StorageError::NotFound(_) => ServiceError::NotFound("object"),
            StorageError::Io(e) => ServiceError::Internal(e.to_string()),
        }
    }
}

impl ErrorExtensions for ServiceError {
    fn extend(&self) -> async_graphql::Error {
        if let ServiceError::Internal(detail) = self {
            tracing::error!(error = %detail, "internal service error");
        }
        async_graphql::Error::new(self.to_string()).extend_with(|_, ext| ext.set("code", self.code()))
    }
}

/// Plain JSON error body for the non-GraphQL routes.
pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_errors_map_to_stable_codes() {
        assert_eq!(ServiceError::from(DomainError::validation("bad")).code(), "VALIDATION");
        assert_eq!(ServiceError::from(RepoError::Conflict("dup".into())).code(), "CONFLICT");
        assert_eq!(ServiceError::from(RepoError::Database("down".into())).code(), "INTERNAL");
        assert_eq!(
            ServiceError::from(AuthzError::Forbidden("documents.upload".into())).code(),
            "FORBIDDEN"
        );
        assert_eq!(
            ServiceError::from(StorageError::InvalidKey("../x".into())).code(),
            "VALIDATION"
        );
    }

    #[test]
    fn internal_details_stay_out_of_the_message() {
        let err = ServiceError::internal("connection refused at 10.0.0.3");
        assert_eq!(err.to_string(), "internal error");

        let gql = err.extend();
        assert_eq!(gql.message, "internal error");
        let code = gql.extensions.as_ref().and_then(|e| e.get("code")).cloned();
        assert_eq!(code, Some(async_graphql::Value::from("INTERNAL")));
    }
}
