//! In-memory transactional store.

use crate::clock::{Clock, MonotonicClock, SystemClock};
use crate::credentials::HashedSecret;
use crate::error::{StoreError, StoreResult};
use crate::traits::{CredentialStore, EntityStore, Store, StoreTransaction};
use crate::types::{AccountId, AccountRecord, SyncEntity};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wallet_sync_protocol::{EntityKind, Timestamp};

/// Row key: owner, kind, entity ID.
type EntityKey = (AccountId, EntityKind, String);

fn key_of(entity: &SyncEntity) -> EntityKey {
    (entity.owner, entity.kind(), entity.id.clone())
}

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<String, AccountRecord>,
    entities: BTreeMap<EntityKey, SyncEntity>,
}

#[derive(Debug)]
struct Shared {
    tables: RwLock<Tables>,
    clock: MonotonicClock<Arc<dyn Clock>>,
    next_account_id: AtomicU64,
}

/// An in-memory [`Store`].
///
/// Committed data lives behind one lock shared by all clones. Transactions
/// buffer their writes privately and apply them under the write lock at
/// commit, after checking them all, so a failed commit applies nothing.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

impl MemoryStore {
    /// Creates an empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store that takes transaction timestamps from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            shared: Arc::new(Shared {
                tables: RwLock::new(Tables::default()),
                clock: MonotonicClock::new(clock),
                next_account_id: AtomicU64::new(1),
            }),
        }
    }

    /// Writes a committed row directly, keeping its timestamp. For fixtures.
    pub fn seed(&self, entity: SyncEntity) {
        self.shared
            .tables
            .write()
            .entities
            .insert(key_of(&entity), entity);
    }

    /// Returns a committed account by login.
    pub fn account(&self, login: &str) -> Option<AccountRecord> {
        self.shared.tables.read().accounts.get(login).cloned()
    }

    /// Returns every committed entity of `kind` owned by `owner`, ordered
    /// by ID.
    pub fn entities(&self, owner: AccountId, kind: EntityKind) -> Vec<SyncEntity> {
        self.shared
            .tables
            .read()
            .entities
            .values()
            .filter(|e| e.owner == owner && e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Returns a committed entity.
    pub fn entity(&self, owner: AccountId, kind: EntityKind, id: &str) -> Option<SyncEntity> {
        self.shared
            .tables
            .read()
            .entities
            .get(&(owner, kind, id.to_string()))
            .cloned()
    }

    /// Returns the number of committed entities of all owners and kinds.
    pub fn entity_count(&self) -> usize {
        self.shared.tables.read().entities.len()
    }

    /// Returns the number of committed accounts.
    pub fn account_count(&self) -> usize {
        self.shared.tables.read().accounts.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    type Transaction = MemoryTransaction;

    fn begin(&self) -> StoreResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.shared),
            timestamp: self.shared.clock.tick(),
            accounts: Vec::new(),
            writes: BTreeMap::new(),
        })
    }
}

/// A pending write in a transaction.
#[derive(Debug, Clone)]
enum PendingWrite {
    /// Must not exist at commit.
    Insert(SyncEntity),
    /// Replaces whatever exists at commit.
    Upsert(SyncEntity),
}

impl PendingWrite {
    fn entity(&self) -> &SyncEntity {
        match self {
            PendingWrite::Insert(e) | PendingWrite::Upsert(e) => e,
        }
    }
}

/// A [`MemoryStore`] transaction. Dropping it discards its writes.
#[derive(Debug)]
pub struct MemoryTransaction {
    shared: Arc<Shared>,
    timestamp: Timestamp,
    accounts: Vec<AccountRecord>,
    writes: BTreeMap<EntityKey, PendingWrite>,
}

impl MemoryTransaction {
    /// Returns the number of buffered entity writes.
    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    fn stamped(&self, mut entity: SyncEntity) -> SyncEntity {
        entity.last_modified = self.timestamp;
        entity
    }
}

impl CredentialStore for MemoryTransaction {
    fn find_account(&mut self, login: &str) -> StoreResult<Option<AccountRecord>> {
        if let Some(pending) = self.accounts.iter().find(|a| a.login == login) {
            return Ok(Some(pending.clone()));
        }
        Ok(self.shared.tables.read().accounts.get(login).cloned())
    }

    fn create_account(&mut self, login: &str, secret: HashedSecret) -> StoreResult<AccountId> {
        if self.find_account(login)?.is_some() {
            return Err(StoreError::AccountExists {
                login: login.to_string(),
            });
        }

        let id = AccountId::new(self.shared.next_account_id.fetch_add(1, Ordering::Relaxed));
        self.accounts.push(AccountRecord {
            id,
            login: login.to_string(),
            secret,
        });
        Ok(id)
    }
}

impl EntityStore for MemoryTransaction {
    fn now(&self) -> Timestamp {
        self.timestamp
    }

    fn query(
        &mut self,
        kind: EntityKind,
        owner: AccountId,
        since: Timestamp,
    ) -> StoreResult<Vec<SyncEntity>> {
        let mut rows: BTreeMap<String, SyncEntity> = BTreeMap::new();

        for entity in self.shared.tables.read().entities.values() {
            if entity.owner == owner && entity.kind() == kind {
                rows.insert(entity.id.clone(), entity.clone());
            }
        }
        // Own writes shadow committed rows.
        for ((write_owner, write_kind, id), write) in &self.writes {
            if *write_owner == owner && *write_kind == kind {
                rows.insert(id.clone(), write.entity().clone());
            }
        }

        let mut result: Vec<SyncEntity> = rows
            .into_values()
            .filter(|e| e.last_modified > since)
            .collect();
        result.sort_by(|a, b| {
            a.last_modified
                .cmp(&b.last_modified)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(result)
    }

    fn find(
        &mut self,
        kind: EntityKind,
        owner: AccountId,
        id: &str,
    ) -> StoreResult<Option<SyncEntity>> {
        let key = (owner, kind, id.to_string());
        if let Some(write) = self.writes.get(&key) {
            return Ok(Some(write.entity().clone()));
        }
        Ok(self.shared.tables.read().entities.get(&key).cloned())
    }

    fn insert(&mut self, entity: SyncEntity) -> StoreResult<()> {
        let key = key_of(&entity);
        if self.writes.contains_key(&key) || self.shared.tables.read().entities.contains_key(&key) {
            return Err(StoreError::duplicate(key.1, key.2));
        }
        let entity = self.stamped(entity);
        self.writes.insert(key, PendingWrite::Insert(entity));
        Ok(())
    }

    fn upsert(&mut self, entity: SyncEntity) -> StoreResult<()> {
        let key = key_of(&entity);
        let entity = self.stamped(entity);
        let write = match self.writes.get(&key) {
            // Still a fresh row as far as commit is concerned.
            Some(PendingWrite::Insert(_)) => PendingWrite::Insert(entity),
            _ => PendingWrite::Upsert(entity),
        };
        self.writes.insert(key, write);
        Ok(())
    }
}

impl StoreTransaction for MemoryTransaction {
    fn commit(self) -> StoreResult<()> {
        let mut tables = self.shared.tables.write();

        for account in &self.accounts {
            if tables.accounts.contains_key(&account.login) {
                return Err(StoreError::AccountExists {
                    login: account.login.clone(),
                });
            }
        }
        for (key, write) in &self.writes {
            if let PendingWrite::Insert(_) = write {
                if tables.entities.contains_key(key) {
                    return Err(StoreError::duplicate(key.1, key.2.clone()));
                }
            }
        }

        for account in self.accounts {
            tables.accounts.insert(account.login.clone(), account);
        }
        for (key, write) in self.writes {
            let mut entity = match write {
                PendingWrite::Insert(e) | PendingWrite::Upsert(e) => e,
            };
            // A transaction that began earlier may commit later.
            if let Some(existing) = tables.entities.get(&key) {
                entity.last_modified = entity.last_modified.max(existing.last_modified);
            }
            tables.entities.insert(key, entity);
        }

        tracing::trace!(timestamp = %self.timestamp, "memory transaction committed");
        Ok(())
    }

    fn rollback(self) -> StoreResult<()> {
        tracing::trace!(
            timestamp = %self.timestamp,
            discarded = self.writes.len(),
            "memory transaction rolled back"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::credentials::hash_secret;
    use proptest::prelude::*;
    use std::collections::BTreeSet;
    use wallet_sync_protocol::{AccountFields, EntityPayload};

    const OWNER: AccountId = AccountId::new(1);

    fn account(id: &str, ts: u64) -> SyncEntity {
        SyncEntity {
            owner: OWNER,
            id: id.into(),
            last_modified: Timestamp::from_millis(ts),
            deleted: false,
            payload: EntityPayload::Account(AccountFields {
                name: format!("account {id}"),
                description: None,
                currency: "USD".into(),
                amount: "0".into(),
                color: None,
            }),
        }
    }

    fn store_at(millis: u64) -> (MemoryStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(millis));
        (MemoryStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn writes_invisible_until_commit() {
        let (store, _) = store_at(100);
        let mut txn = store.begin().unwrap();
        txn.insert(account("a1", 0)).unwrap();

        assert_eq!(store.entity_count(), 0);
        assert_eq!(txn.query(EntityKind::Account, OWNER, Timestamp::ZERO).unwrap().len(), 1);

        txn.commit().unwrap();
        let stored = store.entity(OWNER, EntityKind::Account, "a1").unwrap();
        assert_eq!(stored.last_modified, Timestamp::from_millis(100));
    }

    #[test]
    fn rollback_and_drop_discard() {
        let (store, _) = store_at(100);

        let mut txn = store.begin().unwrap();
        txn.insert(account("a1", 0)).unwrap();
        txn.rollback().unwrap();

        let mut txn = store.begin().unwrap();
        txn.insert(account("a2", 0)).unwrap();
        drop(txn);

        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn query_is_strict_and_ordered() {
        let (store, _) = store_at(100);
        store.seed(account("b", 20));
        store.seed(account("c", 30));
        store.seed(account("a", 10));
        store.seed(account("z", 20));

        let mut txn = store.begin().unwrap();
        let ids = |rows: Vec<SyncEntity>| rows.into_iter().map(|e| e.id).collect::<Vec<_>>();

        assert_eq!(
            ids(txn.query(EntityKind::Account, OWNER, Timestamp::from_millis(15)).unwrap()),
            vec!["b", "z", "c"]
        );
        assert!(txn
            .query(EntityKind::Account, OWNER, Timestamp::from_millis(30))
            .unwrap()
            .is_empty());
        assert!(txn
            .query(EntityKind::Category, OWNER, Timestamp::ZERO)
            .unwrap()
            .is_empty());
        assert!(txn
            .query(EntityKind::Account, AccountId::new(2), Timestamp::ZERO)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn insert_duplicate_rejected() {
        let (store, _) = store_at(100);
        store.seed(account("a1", 10));

        let mut txn = store.begin().unwrap();
        assert!(matches!(
            txn.insert(account("a1", 0)),
            Err(StoreError::Duplicate { .. })
        ));

        txn.insert(account("a2", 0)).unwrap();
        assert!(txn.insert(account("a2", 0)).is_err());
    }

    #[test]
    fn upsert_replaces_and_never_duplicates() {
        let (store, clock) = store_at(100);
        store.seed(account("a1", 10));

        for _ in 0..2 {
            let mut txn = store.begin().unwrap();
            let mut row = account("a1", 0);
            row.deleted = true;
            txn.upsert(row).unwrap();
            txn.commit().unwrap();
            clock.advance(5);
        }

        assert_eq!(store.entity_count(), 1);
        let stored = store.entity(OWNER, EntityKind::Account, "a1").unwrap();
        assert!(stored.deleted);
        assert_eq!(stored.last_modified, Timestamp::from_millis(105));
    }

    #[test]
    fn commit_rechecks_inserts() {
        let (store, _) = store_at(100);
        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();

        first.insert(account("a1", 0)).unwrap();
        second.insert(account("a1", 0)).unwrap();
        second.insert(account("a2", 0)).unwrap();

        first.commit().unwrap();
        assert!(second.commit().is_err());

        assert_eq!(store.entity_count(), 1);
        assert!(store.entity(OWNER, EntityKind::Account, "a2").is_none());
    }

    #[test]
    fn late_commit_keeps_timestamp_monotonic() {
        let (store, clock) = store_at(100);
        let mut early = store.begin().unwrap();
        clock.set(200);
        let mut late = store.begin().unwrap();

        late.upsert(account("a1", 0)).unwrap();
        late.commit().unwrap();
        early.upsert(account("a1", 0)).unwrap();
        early.commit().unwrap();

        let stored = store.entity(OWNER, EntityKind::Account, "a1").unwrap();
        assert_eq!(stored.last_modified, Timestamp::from_millis(200));
    }

    #[test]
    fn accounts_are_transactional() {
        let (store, _) = store_at(100);

        let mut txn = store.begin().unwrap();
        let id = txn.create_account("alice", hash_secret("s").unwrap()).unwrap();
        assert_eq!(txn.find_account("alice").unwrap().unwrap().id, id);
        assert!(matches!(
            txn.create_account("alice", hash_secret("s").unwrap()),
            Err(StoreError::AccountExists { .. })
        ));
        assert!(store.account("alice").is_none());
        txn.commit().unwrap();
        assert_eq!(store.account_count(), 1);

        let mut racing = store.begin().unwrap();
        assert!(racing.find_account("alice").unwrap().is_some());
    }

    #[test]
    fn concurrent_registration_of_same_login() {
        let (store, _) = store_at(100);
        let mut a = store.begin().unwrap();
        let mut b = store.begin().unwrap();
        a.create_account("bob", hash_secret("1").unwrap()).unwrap();
        b.create_account("bob", hash_secret("2").unwrap()).unwrap();

        a.commit().unwrap();
        assert!(matches!(b.commit(), Err(StoreError::AccountExists { .. })));
        assert_eq!(store.account_count(), 1);
    }

    #[test]
    fn transaction_timestamps_increase() {
        let (store, _) = store_at(100);
        let t1 = store.begin().unwrap().now();
        let t2 = store.begin().unwrap().now();
        assert!(t2 > t1);
    }

    #[test]
    fn find_sees_own_writes_first() {
        let (store, _) = store_at(100);
        store.seed(account("a1", 10));
        let mut txn = store.begin().unwrap();

        let committed = txn.find(EntityKind::Account, OWNER, "a1").unwrap().unwrap();
        assert_eq!(committed.last_modified, Timestamp::from_millis(10));

        let mut row = account("a1", 0);
        row.deleted = true;
        txn.upsert(row).unwrap();
        assert!(txn.find(EntityKind::Account, OWNER, "a1").unwrap().unwrap().deleted);

        assert!(txn.find(EntityKind::Category, OWNER, "a1").unwrap().is_none());
        assert!(txn.find(EntityKind::Account, AccountId::new(2), "a1").unwrap().is_none());
    }

    proptest! {
        #[test]
        fn upserts_keep_one_row_per_id(ids in prop::collection::vec("[a-d]{1,2}", 0..24)) {
            let (store, _) = store_at(100);
            let mut txn = store.begin().unwrap();
            for id in &ids {
                txn.upsert(account(id, 0)).unwrap();
            }
            txn.commit().unwrap();

            let distinct: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
            prop_assert_eq!(store.entity_count(), distinct.len());

            let mut txn = store.begin().unwrap();
            let rows = txn.query(EntityKind::Account, OWNER, Timestamp::ZERO).unwrap();
            let queried: Vec<&str> = rows.iter().map(|e| e.id.as_str()).collect();
            prop_assert_eq!(queried, distinct.into_iter().collect::<Vec<_>>());
        }
    }
}
