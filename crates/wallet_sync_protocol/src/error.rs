//! Error types for the protocol crate.

use crate::frame::FrameError;
use crate::phase::Phase;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or validating messages.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// Failed to serialize a message.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// The payload does not decode as the message the phase expects.
    #[error("cannot decode {expected}: {message}")]
    DecodingFailed {
        /// Name of the expected message.
        expected: &'static str,
        /// Description of the decoding error.
        message: String,
    },

    /// A message arrived in a phase that accepts none.
    #[error("no message is expected in phase {0}")]
    UnexpectedMessage(Phase),

    /// An entity failed validation.
    #[error("invalid entity {id:?}: {reason}")]
    InvalidEntity {
        /// Entity ID as sent by the peer.
        id: String,
        /// Why the entity was rejected.
        reason: String,
    },

    /// Framing error.
    #[error("framing error: {0}")]
    Frame(#[from] FrameError),
}

impl ProtocolError {
    /// Creates an encoding failed error.
    pub fn encoding_failed(message: impl Into<String>) -> Self {
        Self::EncodingFailed {
            message: message.into(),
        }
    }

    /// Creates a decoding failed error.
    pub fn decoding_failed(expected: &'static str, message: impl Into<String>) -> Self {
        Self::DecodingFailed {
            expected,
            message: message.into(),
        }
    }

    /// Creates an invalid entity error.
    pub fn invalid_entity(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntity {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
