//! Store wrapper that injects failures.
//!
//! [`FaultyStore`] forwards to an inner [`Store`] and fails selected calls
//! with [`StoreError::Backend`], so tests can check that a failure anywhere
//! in a session leaves nothing behind.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use wallet_store::{
    AccountId, AccountRecord, CredentialStore, EntityStore, HashedSecret, Store, StoreError,
    StoreResult, StoreTransaction, SyncEntity,
};
use wallet_sync_protocol::{EntityKind, Timestamp};

/// Which calls fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Fail `begin`.
    pub fail_begin: bool,
    /// Fail account lookups.
    pub fail_find_account: bool,
    /// Fail the n-th entity write (1-based, counted across inserts and
    /// upserts of one transaction).
    pub fail_write: Option<u64>,
    /// Fail queries and single-row lookups.
    pub fail_query: bool,
    /// Fail commit.
    pub fail_commit: bool,
}

#[derive(Debug, Default)]
struct Counters {
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

/// A [`Store`] that fails according to a [`FaultPlan`].
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    plan: Mutex<FaultPlan>,
    counters: Arc<Counters>,
}

impl<S: Store> FaultyStore<S> {
    /// Wraps `inner` with no faults planned.
    pub fn new(inner: S) -> Self {
        Self::with_plan(inner, FaultPlan::default())
    }

    /// Wraps `inner` with `plan`.
    pub fn with_plan(inner: S, plan: FaultPlan) -> Self {
        Self {
            inner,
            plan: Mutex::new(plan),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Replaces the plan. Transactions already open keep the old one.
    pub fn set_plan(&self, plan: FaultPlan) {
        *self.plan.lock() = plan;
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Transactions opened.
    pub fn begun(&self) -> u64 {
        self.counters.begun.load(Ordering::SeqCst)
    }

    /// Transactions committed.
    pub fn committed(&self) -> u64 {
        self.counters.committed.load(Ordering::SeqCst)
    }

    /// Transactions explicitly rolled back or dropped while open.
    pub fn rolled_back(&self) -> u64 {
        self.counters.rolled_back.load(Ordering::SeqCst)
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::backend(format!("injected {what} failure"))
}

impl<S: Store> Store for FaultyStore<S> {
    type Transaction = FaultyTransaction<S::Transaction>;

    fn begin(&self) -> StoreResult<Self::Transaction> {
        let plan = *self.plan.lock();
        if plan.fail_begin {
            return Err(injected("begin"));
        }
        let inner = self.inner.begin()?;
        self.counters.begun.fetch_add(1, Ordering::SeqCst);
        Ok(FaultyTransaction {
            inner: Some(inner),
            plan,
            writes: 0,
            counters: Arc::clone(&self.counters),
        })
    }
}

/// Transaction of a [`FaultyStore`].
#[derive(Debug)]
pub struct FaultyTransaction<T> {
    inner: Option<T>,
    plan: FaultPlan,
    writes: u64,
    counters: Arc<Counters>,
}

impl<T: StoreTransaction> FaultyTransaction<T> {
    fn inner(&mut self) -> StoreResult<&mut T> {
        self.inner
            .as_mut()
            .ok_or_else(|| StoreError::backend("transaction already finished"))
    }

    fn count_write(&mut self) -> StoreResult<()> {
        self.writes += 1;
        if self.plan.fail_write == Some(self.writes) {
            return Err(injected("write"));
        }
        Ok(())
    }
}

impl<T: StoreTransaction> CredentialStore for FaultyTransaction<T> {
    fn find_account(&mut self, login: &str) -> StoreResult<Option<AccountRecord>> {
        if self.plan.fail_find_account {
            return Err(injected("account lookup"));
        }
        self.inner()?.find_account(login)
    }

    fn create_account(&mut self, login: &str, secret: HashedSecret) -> StoreResult<AccountId> {
        self.inner()?.create_account(login, secret)
    }
}

impl<T: StoreTransaction> EntityStore for FaultyTransaction<T> {
    fn now(&self) -> Timestamp {
        self.inner.as_ref().map_or(Timestamp::ZERO, |t| t.now())
    }

    fn query(
        &mut self,
        kind: EntityKind,
        owner: AccountId,
        since: Timestamp,
    ) -> StoreResult<Vec<SyncEntity>> {
        if self.plan.fail_query {
            return Err(injected("query"));
        }
        self.inner()?.query(kind, owner, since)
    }

    fn find(
        &mut self,
        kind: EntityKind,
        owner: AccountId,
        id: &str,
    ) -> StoreResult<Option<SyncEntity>> {
        if self.plan.fail_query {
            return Err(injected("lookup"));
        }
        self.inner()?.find(kind, owner, id)
    }

    fn insert(&mut self, entity: SyncEntity) -> StoreResult<()> {
        self.count_write()?;
        self.inner()?.insert(entity)
    }

    fn upsert(&mut self, entity: SyncEntity) -> StoreResult<()> {
        self.count_write()?;
        self.inner()?.upsert(entity)
    }
}

impl<T: StoreTransaction> StoreTransaction for FaultyTransaction<T> {
    fn commit(mut self) -> StoreResult<()> {
        if self.plan.fail_commit {
            // Drop counts the discarded transaction.
            return Err(injected("commit"));
        }
        let inner = self
            .inner
            .take()
            .ok_or_else(|| StoreError::backend("transaction already finished"))?;
        if let Err(e) = inner.commit() {
            self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
            return Err(e);
        }
        self.counters.committed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        match self.inner.take() {
            Some(inner) => {
                self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
                inner.rollback()
            }
            None => Ok(()),
        }
    }
}

impl<T> Drop for FaultyTransaction<T> {
    fn drop(&mut self) {
        if self.inner.take().is_some() {
            self.counters.rolled_back.fetch_add(1, Ordering::SeqCst);
        }
    }
}
