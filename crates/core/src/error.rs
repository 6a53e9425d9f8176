//! Domain error model.

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// Domain-level error.
///
/// Business failures (validation, caps, conflicts) are kept apart from store
/// failures so the boundary can recognise them by kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// One or more fields failed validation.
    #[error("data validation error")]
    Fields(Vec<FieldError>),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested entity was not found (domain-level).
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness rule was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A cardinality cap was exceeded.
    #[error("{0}")]
    LimitExceeded(String),

    /// Credentials did not match.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// The entity is not in a state that allows the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The persistence port failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn limit(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound(entity)
    }

    /// True for both domain-level and store-level not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DomainError::NotFound(_) | DomainError::Store(StoreError::NotFound(_))
        )
    }
}

/// Collects field errors and turns them into a single [`DomainError`].
#[derive(Debug, Default)]
pub struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, ok: bool, field: &str, error: &str) {
        if !ok {
            self.0.push(FieldError::new(field, error));
        }
    }

    pub fn require(&mut self, value: &str, field: &str) {
        self.check(!value.trim().is_empty(), field, "is required");
    }

    pub fn into_result(self) -> DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Fields(self.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_errors_collect_every_failure() {
        let mut errs = FieldErrors::new();
        errs.require("", "name");
        errs.require("  ", "street");
        errs.check(true, "phone", "invalid");

        match errs.into_result() {
            Err(DomainError::Fields(fields)) => {
                let names: Vec<_> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["name", "street"]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn store_not_found_counts_as_not_found() {
        let err = DomainError::from(StoreError::NotFound("unit"));
        assert!(err.is_not_found());
        assert!(DomainError::not_found("block").is_not_found());
        assert!(!DomainError::conflict("phone").is_not_found());
    }
}
