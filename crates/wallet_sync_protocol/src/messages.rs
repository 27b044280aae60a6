//! Protocol messages.
//!
//! Each message is a CBOR map. No message carries its own type: the session
//! phase decides which one to decode, so every struct rejects unknown fields
//! and requires its fields to be present. A payload sent in the wrong phase
//! therefore fails to decode instead of being silently misread.

use crate::entity::{Entity, Timestamp};
use crate::error::{ProtocolError, ProtocolResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A message that can be encoded to and decoded from a frame payload.
pub trait Message: Serialize + DeserializeOwned {
    /// Message name used in errors and logs.
    const NAME: &'static str;

    /// Encodes the message to CBOR.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EncodingFailed`] if serialization fails.
    fn encode(&self) -> ProtocolResult<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::ser::into_writer(self, &mut buf)
            .map_err(|e| ProtocolError::encoding_failed(e.to_string()))?;
        Ok(buf)
    }

    /// Decodes the message from a complete frame payload.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DecodingFailed`] if the payload is not a
    /// valid encoding of this message or has trailing bytes.
    fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let mut reader = bytes;
        let message = ciborium::de::from_reader(&mut reader)
            .map_err(|e| ProtocolError::decoding_failed(Self::NAME, e.to_string()))?;
        if !reader.is_empty() {
            return Err(ProtocolError::decoding_failed(
                Self::NAME,
                format!("{} trailing bytes", reader.len()),
            ));
        }
        Ok(message)
    }
}

/// What the client wants to do with its credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthOperation {
    /// Create a new account.
    Register,
    /// Log into an existing account.
    Merge,
}

/// First message of every session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthRequest {
    /// Register or merge.
    pub operation: AuthOperation,
    /// Account login.
    pub login: String,
    /// Plain-text secret.
    pub secret: String,
}

impl AuthRequest {
    /// Creates a register request.
    pub fn register(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            operation: AuthOperation::Register,
            login: login.into(),
            secret: secret.into(),
        }
    }

    /// Creates a merge request.
    pub fn merge(login: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            operation: AuthOperation::Merge,
            login: login.into(),
            secret: secret.into(),
        }
    }
}

// The secret stays out of logs.
impl std::fmt::Display for AuthRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?} as {:?}", self.operation, self.login)
    }
}

impl Message for AuthRequest {
    const NAME: &'static str = "AuthRequest";
}

/// Outcome of authentication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthStatus {
    /// Authenticated; the session proceeds.
    Ok,
    /// Register failed because the login is taken.
    AccountExists,
    /// Merge failed: unknown login or wrong secret.
    AuthWrong,
    /// The server could not process the request.
    UnknownError,
}

impl AuthStatus {
    /// Returns true for [`AuthStatus::Ok`].
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == AuthStatus::Ok
    }
}

/// Response to [`AuthRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AuthResponse {
    /// Outcome.
    pub status: AuthStatus,
}

impl AuthResponse {
    /// Creates a response with the given status.
    pub fn new(status: AuthStatus) -> Self {
        Self { status }
    }
}

impl Message for AuthResponse {
    const NAME: &'static str = "AuthResponse";
}

/// Client asks for everything of one kind changed after a timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityRequest {
    /// Server timestamp from the client's previous successful sync.
    pub last_known_server_timestamp: Timestamp,
}

impl EntityRequest {
    /// Creates a request for changes after `since`.
    pub fn since(since: Timestamp) -> Self {
        Self {
            last_known_server_timestamp: since,
        }
    }
}

impl Message for EntityRequest {
    const NAME: &'static str = "EntityRequest";
}

/// A delta batch of one kind. Sent by the server in answer to an
/// [`EntityRequest`] and by the client with its own changes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityResponse {
    /// Entities new to the receiver.
    pub added: Vec<Entity>,
    /// Entities the receiver may already have.
    pub modified: Vec<Entity>,
}

impl EntityResponse {
    /// Returns true if the batch carries no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty()
    }

    /// Returns the number of entities in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len()
    }
}

impl Message for EntityResponse {
    const NAME: &'static str = "EntityResponse";
}

/// Server acknowledges an applied client batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EntityAck {
    /// Timestamp the client should send on its next sync.
    pub new_server_timestamp: Timestamp,
}

impl Message for EntityAck {
    const NAME: &'static str = "EntityAck";
}

/// Any message the server sends.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Authentication outcome.
    Auth(AuthResponse),
    /// Server-side delta of one kind.
    Delta(EntityResponse),
    /// Acknowledgment of a client delta.
    Ack(EntityAck),
}

impl ServerMessage {
    /// Returns the name of the wrapped message.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::Auth(_) => AuthResponse::NAME,
            ServerMessage::Delta(_) => EntityResponse::NAME,
            ServerMessage::Ack(_) => EntityAck::NAME,
        }
    }

    /// Encodes the wrapped message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::EncodingFailed`] if serialization fails.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            ServerMessage::Auth(m) => m.encode(),
            ServerMessage::Delta(m) => m.encode(),
            ServerMessage::Ack(m) => m.encode(),
        }
    }
}

impl From<AuthResponse> for ServerMessage {
    fn from(m: AuthResponse) -> Self {
        ServerMessage::Auth(m)
    }
}

impl From<EntityResponse> for ServerMessage {
    fn from(m: EntityResponse) -> Self {
        ServerMessage::Delta(m)
    }
}

impl From<EntityAck> for ServerMessage {
    fn from(m: EntityAck) -> Self {
        ServerMessage::Ack(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CategoryFields, CategoryType, EntityPayload, OperationFields};

    #[test]
    fn auth_request_wire_names() {
        let bytes = AuthRequest::register("alice", "secret").encode().unwrap();
        let value: ciborium::value::Value = ciborium::de::from_reader(&bytes[..]).unwrap();
        let map = value.as_map().unwrap();
        let keys: Vec<&str> = map.iter().filter_map(|(k, _)| k.as_text()).collect();
        assert_eq!(keys, vec!["operation", "login", "secret"]);
        assert_eq!(map[0].1.as_text(), Some("REGISTER"));
    }

    #[test]
    fn auth_request_display_hides_secret() {
        let shown = AuthRequest::merge("alice", "hunter2").to_string();
        assert!(shown.contains("alice"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn entity_response_with_mixed_kinds_decodes() {
        let batch = EntityResponse {
            added: vec![Entity {
                id: "c1".into(),
                deleted: false,
                last_modified: Timestamp::ZERO,
                payload: EntityPayload::Category(CategoryFields {
                    name: "Food".into(),
                    category_type: CategoryType::Expense,
                    preferred_account_id: Some("a1".into()),
                }),
            }],
            modified: vec![Entity {
                id: "o1".into(),
                deleted: true,
                last_modified: Timestamp::from_millis(40),
                payload: EntityPayload::Operation(OperationFields {
                    description: None,
                    amount: "-12.50".into(),
                    time: 1_700_000_000_000,
                    category_id: "c1".into(),
                    orderer_id: Some("a1".into()),
                    beneficiary_id: None,
                    converting_rate: Some(1.25),
                }),
            }],
        };
        let decoded = EntityResponse::decode(&batch.encode().unwrap()).unwrap();
        assert_eq!(decoded, batch);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn entity_without_last_modified_decodes() {
        let batch = EntityResponse {
            added: vec![Entity {
                id: "c2".into(),
                deleted: false,
                last_modified: Timestamp::from_millis(7),
                payload: EntityPayload::Category(CategoryFields {
                    name: "Rent".into(),
                    category_type: CategoryType::Expense,
                    preferred_account_id: None,
                }),
            }],
            modified: vec![],
        };
        let mut value = ciborium::value::Value::serialized(&batch).unwrap();
        let added = value
            .as_map_mut()
            .unwrap()
            .iter_mut()
            .find(|(k, _)| k.as_text() == Some("added"))
            .map(|(_, v)| v)
            .unwrap();
        added.as_array_mut().unwrap()[0]
            .as_map_mut()
            .unwrap()
            .retain(|(k, _)| k.as_text() != Some("lastModified"));
        let mut bytes = Vec::new();
        ciborium::ser::into_writer(&value, &mut bytes).unwrap();

        let decoded = EntityResponse::decode(&bytes).unwrap();
        assert_eq!(decoded.added[0].last_modified, Timestamp::ZERO);
        assert_eq!(decoded.added[0].payload, batch.added[0].payload);
    }

    #[test]
    fn wrong_message_type_is_rejected() {
        let bytes = EntityRequest::since(Timestamp::ZERO).encode().unwrap();
        let err = AuthRequest::decode(&bytes).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::DecodingFailed {
                expected: "AuthRequest",
                ..
            }
        ));
        assert!(EntityResponse::decode(&bytes).is_err());

        let bytes = AuthRequest::register("a", "b").encode().unwrap();
        assert!(EntityRequest::decode(&bytes).is_err());
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = EntityAck {
            new_server_timestamp: Timestamp::from_millis(5),
        }
        .encode()
        .unwrap();
        bytes.push(0x00);
        assert!(EntityAck::decode(&bytes).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(AuthRequest::decode(&[0xff, 0x00, 0x13]).is_err());
        assert!(AuthRequest::decode(&[]).is_err());
    }

    #[test]
    fn server_message_names() {
        let msg: ServerMessage = AuthResponse::new(AuthStatus::AuthWrong).into();
        assert_eq!(msg.name(), "AuthResponse");
        let decoded = AuthResponse::decode(&msg.encode().unwrap()).unwrap();
        assert_eq!(decoded.status, AuthStatus::AuthWrong);
    }
}
