//! Store traits.
//!
//! A sync session only ever talks to a [`StoreTransaction`]: all reads and
//! writes of one session go through the same transaction, which is either
//! committed once or rolled back.

use crate::credentials::HashedSecret;
use crate::error::StoreResult;
use crate::types::{AccountId, AccountRecord, SyncEntity};
use wallet_sync_protocol::{EntityKind, Timestamp};

/// A store that can open transactions.
pub trait Store: Send + Sync + 'static {
    /// The transaction type.
    type Transaction: StoreTransaction;

    /// Opens a transaction. Its timestamp is fixed at this point.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot open a transaction.
    fn begin(&self) -> StoreResult<Self::Transaction>;
}

/// Account lookup and creation.
pub trait CredentialStore {
    /// Looks up an account by login.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn find_account(&mut self, login: &str) -> StoreResult<Option<AccountRecord>>;

    /// Creates an account and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AccountExists`](crate::StoreError::AccountExists)
    /// if the login is taken, or a backend error.
    fn create_account(&mut self, login: &str, secret: HashedSecret) -> StoreResult<AccountId>;
}

/// Entity queries and writes.
pub trait EntityStore {
    /// Returns the transaction timestamp. Every row written by the
    /// transaction carries it.
    fn now(&self) -> Timestamp;

    /// Returns the entities of `kind` owned by `owner` with
    /// `last_modified > since`, ordered by `(last_modified, id)`. The
    /// transaction's own writes are included.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn query(
        &mut self,
        kind: EntityKind,
        owner: AccountId,
        since: Timestamp,
    ) -> StoreResult<Vec<SyncEntity>>;

    /// Returns one entity, including the transaction's own writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn find(
        &mut self,
        kind: EntityKind,
        owner: AccountId,
        id: &str,
    ) -> StoreResult<Option<SyncEntity>>;

    /// Inserts a new entity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Duplicate`](crate::StoreError::Duplicate) if a
    /// row with the same owner, kind and ID exists, or a backend error.
    fn insert(&mut self, entity: SyncEntity) -> StoreResult<()>;

    /// Inserts or replaces an entity.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn upsert(&mut self, entity: SyncEntity) -> StoreResult<()>;
}

/// A store transaction.
pub trait StoreTransaction: CredentialStore + EntityStore + Send {
    /// Makes every write of the transaction visible atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the writes conflict with data committed
    /// meanwhile, or if the backend fails. Nothing is applied in that case.
    fn commit(self) -> StoreResult<()>;

    /// Discards every write of the transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    fn rollback(self) -> StoreResult<()>;
}
