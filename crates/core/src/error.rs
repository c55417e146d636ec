//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Which kind of chart entity an error or event refers to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Ledger,
    Account,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Ledger => "ledger",
            EntityKind::Account => "account",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Every variant is
/// a semantic rejection of the command that produced it; none of them is retried.
/// Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The referenced ledger/account does not exist.
    #[error("{kind} '{identifier}' not found")]
    NotFound { kind: EntityKind, identifier: String },

    /// Identifier collision on create.
    #[error("{kind} '{identifier}' already exists")]
    AlreadyExists { kind: EntityKind, identifier: String },

    /// A request failed structural validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Delete blocked by something still pointing at the entity.
    #[error("ledger '{identifier}' is still referenced: {reason}")]
    ReferenceExists { identifier: String, reason: String },

    /// Account lifecycle command not legal from the current state.
    #[error("account '{identifier}' cannot {command} while {from}")]
    InvalidTransition {
        identifier: String,
        from: String,
        command: String,
    },
}

impl DomainError {
    pub fn not_found(kind: EntityKind, identifier: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn already_exists(kind: EntityKind, identifier: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            identifier: identifier.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn reference_exists(identifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ReferenceExists {
            identifier: identifier.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_transition(
        identifier: impl Into<String>,
        from: impl core::fmt::Display,
        command: impl core::fmt::Display,
    ) -> Self {
        Self::InvalidTransition {
            identifier: identifier.into(),
            from: from.to_string(),
            command: command.to_string(),
        }
    }
}
