//! Entity fixtures and store helpers.

use std::sync::Arc;
use wallet_store::{AccountId, ManualClock, MemoryStore, SyncEntity};
use wallet_sync_protocol::{
    AccountFields, CategoryFields, CategoryType, Entity, EntityPayload, OperationFields, Timestamp,
};

/// A memory store together with the clock driving its timestamps.
pub struct TestStore {
    /// The store.
    pub store: Arc<MemoryStore>,
    /// The clock; set it to control the next transaction timestamp.
    pub clock: Arc<ManualClock>,
}

impl TestStore {
    /// Creates an empty store whose clock reads `millis`.
    pub fn at(millis: u64) -> Self {
        let clock = Arc::new(ManualClock::new(millis));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        Self { store, clock }
    }

    /// Stores a committed row for `owner` with the given timestamp.
    pub fn seed(&self, owner: AccountId, entity: Entity, millis: u64) {
        self.store.seed(SyncEntity::from_wire(
            owner,
            entity,
            Timestamp::from_millis(millis),
        ));
    }
}

impl std::ops::Deref for TestStore {
    type Target = MemoryStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Builds a live account entity.
pub fn account_entity(id: &str, name: &str, amount: &str, currency: &str) -> Entity {
    Entity {
        id: id.into(),
        deleted: false,
        last_modified: Timestamp::ZERO,
        payload: EntityPayload::Account(AccountFields {
            name: name.into(),
            description: None,
            currency: currency.into(),
            amount: amount.into(),
            color: None,
        }),
    }
}

/// Builds a live category entity.
pub fn category_entity(id: &str, name: &str, category_type: CategoryType) -> Entity {
    Entity {
        id: id.into(),
        deleted: false,
        last_modified: Timestamp::ZERO,
        payload: EntityPayload::Category(CategoryFields {
            name: name.into(),
            category_type,
            preferred_account_id: None,
        }),
    }
}

/// Builds a live operation entity moving `amount` out of `orderer`.
pub fn operation_entity(id: &str, category_id: &str, orderer: &str, amount: &str) -> Entity {
    Entity {
        id: id.into(),
        deleted: false,
        last_modified: Timestamp::ZERO,
        payload: EntityPayload::Operation(OperationFields {
            description: None,
            amount: amount.into(),
            time: 1_700_000_000_000,
            category_id: category_id.into(),
            orderer_id: Some(orderer.into()),
            beneficiary_id: None,
            converting_rate: None,
        }),
    }
}

/// Returns `entity` marked as deleted.
pub fn tombstone(mut entity: Entity) -> Entity {
    entity.deleted = true;
    entity
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_sync_protocol::EntityKind;

    #[test]
    fn fixtures_are_valid() {
        account_entity("a1", "Cash", "100.00", "USD")
            .validate(EntityKind::Account)
            .unwrap();
        category_entity("c1", "Food", CategoryType::Expense)
            .validate(EntityKind::Category)
            .unwrap();
        operation_entity("o1", "c1", "a1", "-5.25")
            .validate(EntityKind::Operation)
            .unwrap();
    }

    #[test]
    fn seeded_rows_keep_timestamp() {
        let store = TestStore::at(500);
        let owner = AccountId::new(1);
        store.seed(owner, tombstone(account_entity("a1", "Cash", "0", "USD")), 40);

        let row = store.entity(owner, EntityKind::Account, "a1").unwrap();
        assert!(row.deleted);
        assert_eq!(row.last_modified, Timestamp::from_millis(40));
    }
}
