//! Errors surfaced by the store and the services.

use thiserror::Error;

use coa_core::{DomainError, EntityKind};

/// Persistence-level failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Uniqueness constraint hit on insert (the final arbiter for identifier clashes).
    #[error("{kind} '{identifier}' already stored")]
    Duplicate { kind: EntityKind, identifier: String },

    /// A row, or a row it must point to, is absent.
    #[error("{kind} '{identifier}' not stored")]
    Missing { kind: EntityKind, identifier: String },

    /// Conditional delete refused: something still points at the ledger.
    #[error("ledger '{identifier}' is referenced by {reason}")]
    Referenced { identifier: String, reason: String },

    #[error("store lock poisoned")]
    Poisoned,
}

/// Error returned by the chart-of-accounts services.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Semantic rejection of the command.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The store itself failed.
    #[error("store failure: {0}")]
    Store(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Coarse error classification for callers that only need to branch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    Validation,
    ReferenceExists,
    InvalidTransition,
    Store,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Domain(DomainError::NotFound { .. }) => ErrorKind::NotFound,
            ServiceError::Domain(DomainError::AlreadyExists { .. }) => ErrorKind::AlreadyExists,
            ServiceError::Domain(DomainError::Validation(_)) => ErrorKind::Validation,
            ServiceError::Domain(DomainError::ReferenceExists { .. }) => ErrorKind::ReferenceExists,
            ServiceError::Domain(DomainError::InvalidTransition { .. }) => ErrorKind::InvalidTransition,
            ServiceError::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Duplicate { kind, identifier } => {
                DomainError::already_exists(kind, identifier).into()
            }
            StoreError::Missing { kind, identifier } => DomainError::not_found(kind, identifier).into(),
            StoreError::Referenced { identifier, reason } => {
                DomainError::reference_exists(identifier, reason).into()
            }
            StoreError::Poisoned => ServiceError::Store(value.to_string()),
        }
    }
}
