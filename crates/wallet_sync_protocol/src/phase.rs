//! Session phases and the phase → expected message table.

use crate::entity::EntityKind;
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{AuthRequest, EntityRequest, EntityResponse, Message};
use std::fmt;

/// Phase of a sync session.
///
/// ```text
/// NotIdentified -> Waiting(Account) -> Sent(Account)
///               -> Waiting(Category) -> Sent(Category)
///               -> Waiting(Operation) -> Sent(Operation) -> Finished
/// any phase -> Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Waiting for the auth request.
    NotIdentified,
    /// Authenticated; waiting for the client's delta request of a kind.
    Waiting(EntityKind),
    /// Server delta of a kind sent; waiting for the client's delta.
    Sent(EntityKind),
    /// All kinds exchanged. Terminal.
    Finished,
    /// The session failed. Absorbing.
    Error,
}

/// The message a phase expects next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// An [`AuthRequest`].
    Auth,
    /// An [`EntityRequest`] for the kind.
    DeltaRequest(EntityKind),
    /// A client [`EntityResponse`] for the kind.
    Delta(EntityKind),
}

impl Expected {
    /// Returns the wire name of the expected message.
    pub fn message_name(self) -> &'static str {
        match self {
            Expected::Auth => AuthRequest::NAME,
            Expected::DeltaRequest(_) => EntityRequest::NAME,
            Expected::Delta(_) => EntityResponse::NAME,
        }
    }
}

impl Phase {
    /// The single lookup from phase to expected message. `None` means the
    /// phase accepts no input.
    pub fn expects(self) -> Option<Expected> {
        match self {
            Phase::NotIdentified => Some(Expected::Auth),
            Phase::Waiting(kind) => Some(Expected::DeltaRequest(kind)),
            Phase::Sent(kind) => Some(Expected::Delta(kind)),
            Phase::Finished | Phase::Error => None,
        }
    }

    /// Returns the phase after a successful step, or `self` for the terminal
    /// phases.
    pub fn advance(self) -> Phase {
        match self {
            Phase::NotIdentified => Phase::Waiting(EntityKind::Account),
            Phase::Waiting(kind) => Phase::Sent(kind),
            Phase::Sent(kind) => kind.next().map_or(Phase::Finished, Phase::Waiting),
            Phase::Finished => Phase::Finished,
            Phase::Error => Phase::Error,
        }
    }

    /// Returns true for `Finished` and `Error`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Finished | Phase::Error)
    }

    /// Returns true once authentication has succeeded.
    pub fn is_authenticated(self) -> bool {
        matches!(self, Phase::Waiting(_) | Phase::Sent(_) | Phase::Finished)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::NotIdentified => f.write_str("NOT_IDENTIFIED"),
            Phase::Waiting(kind) => write!(f, "WAITING_{}", kind.descriptor().phase_label),
            Phase::Sent(kind) => write!(f, "SENT_{}", kind.descriptor().phase_label),
            Phase::Finished => f.write_str("FINISHED"),
            Phase::Error => f.write_str("ERROR"),
        }
    }
}

/// A client message decoded according to the phase it arrived in.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// Credentials.
    Auth(AuthRequest),
    /// Request for the server delta of a kind.
    DeltaRequest {
        /// Kind being synced.
        kind: EntityKind,
        /// The request.
        request: EntityRequest,
    },
    /// The client delta of a kind.
    Delta {
        /// Kind being synced.
        kind: EntityKind,
        /// The batch.
        batch: EntityResponse,
    },
}

/// Decodes a frame payload as the message `phase` expects.
///
/// # Errors
///
/// Returns [`ProtocolError::UnexpectedMessage`] for a terminal phase and
/// [`ProtocolError::DecodingFailed`] if the payload is not the expected
/// message.
pub fn decode_client_message(phase: Phase, payload: &[u8]) -> ProtocolResult<ClientMessage> {
    match phase.expects() {
        Some(Expected::Auth) => AuthRequest::decode(payload).map(ClientMessage::Auth),
        Some(Expected::DeltaRequest(kind)) => {
            EntityRequest::decode(payload).map(|request| ClientMessage::DeltaRequest { kind, request })
        }
        Some(Expected::Delta(kind)) => {
            EntityResponse::decode(payload).map(|batch| ClientMessage::Delta { kind, batch })
        }
        None => Err(ProtocolError::UnexpectedMessage(phase)),
    }
}
