//! Error types for the store.

use thiserror::Error;
use wallet_sync_protocol::EntityKind;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// An insert hit an existing row.
    #[error("{kind} entity {id:?} already exists")]
    Duplicate {
        /// Kind of the entity.
        kind: EntityKind,
        /// Entity ID.
        id: String,
    },

    /// An account with this login already exists.
    #[error("account {login:?} already exists")]
    AccountExists {
        /// The login.
        login: String,
    },

    /// Secret hashing failed.
    #[error("credential error: {0}")]
    Credentials(String),

    /// The storage backend failed.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Creates a duplicate entity error.
    pub fn duplicate(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::Duplicate { kind, id: id.into() }
    }

    /// Creates a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Returns true if the error was caused by the data the client sent
    /// rather than by the backend.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::Duplicate { .. } | StoreError::AccountExists { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::duplicate(EntityKind::Account, "a1");
        assert_eq!(err.to_string(), "accounts entity \"a1\" already exists");
        assert!(err.is_conflict());
        assert!(!StoreError::backend("disk on fire").is_conflict());
    }
}
