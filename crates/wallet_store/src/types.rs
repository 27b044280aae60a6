//! Stored record types.

use crate::credentials::HashedSecret;
use std::fmt;
use wallet_sync_protocol::{Entity, EntityKind, EntityPayload, Timestamp};

/// Server-assigned account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(u64);

impl AccountId {
    /// Creates an account ID from its raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    /// Account ID.
    pub id: AccountId,
    /// Unique login.
    pub login: String,
    /// Salted hash of the secret.
    pub secret: HashedSecret,
}

/// A stored entity: the wire entity plus its owner.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncEntity {
    /// Owning account, always taken from the session.
    pub owner: AccountId,
    /// Entity ID, unique per owner and kind.
    pub id: String,
    /// Server timestamp of the last write.
    pub last_modified: Timestamp,
    /// Tombstone flag.
    pub deleted: bool,
    /// Kind-specific fields.
    pub payload: EntityPayload,
}

impl SyncEntity {
    /// Takes ownership of a wire entity for `owner`, stamped with `stamp`.
    /// Whatever timestamp the client sent is discarded.
    pub fn from_wire(owner: AccountId, entity: Entity, stamp: Timestamp) -> Self {
        Self {
            owner,
            id: entity.id,
            last_modified: stamp,
            deleted: entity.deleted,
            payload: entity.payload,
        }
    }

    /// Converts to the wire form, dropping the owner.
    pub fn to_wire(&self) -> Entity {
        Entity {
            id: self.id.clone(),
            deleted: self.deleted,
            last_modified: self.last_modified,
            payload: self.payload.clone(),
        }
    }

    /// Returns the kind of this entity.
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }
}
