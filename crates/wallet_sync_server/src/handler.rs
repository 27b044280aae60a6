//! Entity sync handler.
//!
//! One algorithm serves all three kinds; the kind only selects the
//! descriptor and the rows queried.
//!
//! - Outbound: every row of the kind owned by the session account with
//!   `last_modified` strictly after the client's last known server
//!   timestamp, sent as `modified` with its tombstone flag.
//! - Inbound: `added` rows are inserted and must be new; `modified` rows
//!   replace whatever is stored (last writer wins). All rows are stamped
//!   with the transaction timestamp, which is acknowledged back.
//!
//! An `added` row equal to the stored one (same tombstone flag and fields)
//! is skipped. A client that missed the final ack of a committed session
//! resends its additions, and those must not fail every later sync.

use crate::error::ServerResult;
use std::collections::HashSet;
use tracing::debug;
use wallet_store::{AccountId, EntityStore, StoreError, SyncEntity};
use wallet_sync_protocol::{
    EntityAck, EntityKind, EntityResponse, KindDescriptor, Timestamp,
};

/// Delta handler for one entity kind.
#[derive(Debug, Clone, Copy)]
pub struct EntitySyncHandler {
    descriptor: &'static KindDescriptor,
}

impl EntitySyncHandler {
    /// Creates the handler for `kind`.
    pub fn new(kind: EntityKind) -> Self {
        Self {
            descriptor: kind.descriptor(),
        }
    }

    /// Returns the kind handled.
    pub fn kind(&self) -> EntityKind {
        self.descriptor.kind
    }

    /// Builds the server delta for a client that last synced at `since`.
    ///
    /// # Errors
    ///
    /// Returns the store error if the query fails.
    pub fn produce_delta<T>(
        &self,
        txn: &mut T,
        owner: AccountId,
        since: Timestamp,
    ) -> ServerResult<EntityResponse>
    where
        T: EntityStore + ?Sized,
    {
        let rows = txn.query(self.kind(), owner, since)?;
        debug!(
            collection = self.descriptor.collection,
            account = %owner,
            %since,
            count = rows.len(),
            "produced delta"
        );
        Ok(EntityResponse {
            added: Vec::new(),
            modified: rows.iter().map(SyncEntity::to_wire).collect(),
        })
    }

    /// Applies a client delta and returns the acknowledgment.
    ///
    /// Every entity is validated before anything is written.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for an invalid entity or one of another
    /// kind, and a store error for a failed write or a duplicate `added` ID:
    /// one repeated within the batch, or one already stored with different
    /// contents.
    /// Writes made before the failure stay in the transaction, which the
    /// caller must roll back.
    pub fn apply_delta<T>(
        &self,
        txn: &mut T,
        owner: AccountId,
        batch: EntityResponse,
    ) -> ServerResult<EntityAck>
    where
        T: EntityStore + ?Sized,
    {
        for entity in batch.added.iter().chain(&batch.modified) {
            entity.validate(self.kind())?;
        }
        {
            let mut seen = HashSet::with_capacity(batch.added.len());
            if let Some(repeated) = batch.added.iter().find(|e| !seen.insert(e.id.as_str())) {
                return Err(StoreError::duplicate(self.kind(), repeated.id.clone()).into());
            }
        }

        let stamp = txn.now();
        let (added, modified) = (batch.added.len(), batch.modified.len());
        let mut replayed = 0usize;

        for entity in batch.added {
            if let Some(stored) = txn.find(self.kind(), owner, &entity.id)? {
                if stored.deleted == entity.deleted && stored.payload == entity.payload {
                    replayed += 1;
                    continue;
                }
            }
            txn.insert(SyncEntity::from_wire(owner, entity, stamp))?;
        }
        for entity in batch.modified {
            txn.upsert(SyncEntity::from_wire(owner, entity, stamp))?;
        }

        debug!(
            collection = self.descriptor.collection,
            account = %owner,
            added,
            replayed,
            modified,
            %stamp,
            "applied delta"
        );
        Ok(EntityAck {
            new_server_timestamp: stamp,
        })
    }
}
