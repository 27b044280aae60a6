//! Error types for the sync server.

use std::time::Duration;
use thiserror::Error;
use wallet_store::StoreError;
use wallet_sync_protocol::{FrameError, ProtocolError};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can end a sync session or the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The byte stream is not a valid frame sequence.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),

    /// A frame did not hold the message the phase expects.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The store failed or rejected a write.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An entity operation ran before authentication.
    #[error("session is not authenticated")]
    NotAuthenticated,

    /// The session transaction was already committed or rolled back.
    #[error("session transaction already finished")]
    TransactionFinished,

    /// The peer sent nothing within the idle timeout.
    #[error("idle for more than {0:?}")]
    IdleTimeout(Duration),

    /// The peer closed the connection before the session finished.
    #[error("peer disconnected")]
    Disconnected,

    /// The server is shutting down.
    #[error("server shutting down")]
    ShuttingDown,

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns true if the client caused the error.
    pub fn is_client_error(&self) -> bool {
        match self {
            ServerError::Frame(_)
            | ServerError::Protocol(_)
            | ServerError::NotAuthenticated
            | ServerError::IdleTimeout(_)
            | ServerError::Disconnected => true,
            ServerError::Store(e) => e.is_conflict(),
            _ => false,
        }
    }

    /// Returns true if the server or its store caused the error.
    pub fn is_server_error(&self) -> bool {
        match self {
            ServerError::Store(e) => !e.is_conflict(),
            ServerError::TransactionFinished | ServerError::Io(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_sync_protocol::EntityKind;

    #[test]
    fn error_classification() {
        assert!(ServerError::Frame(FrameError::PrefixTooLong).is_client_error());
        assert!(ServerError::Store(StoreError::duplicate(EntityKind::Account, "a1")).is_client_error());
        assert!(ServerError::Store(StoreError::backend("down")).is_server_error());
        assert!(!ServerError::Disconnected.is_server_error());
        assert!(!ServerError::ShuttingDown.is_client_error());
    }

    #[test]
    fn error_display() {
        let err = ServerError::IdleTimeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "idle for more than 30s");
    }
}
