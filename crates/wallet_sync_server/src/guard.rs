//! Per-session transaction guard.

use crate::error::{ServerError, ServerResult};
use std::sync::Arc;
use tracing::{debug, warn};
use wallet_store::{Store, StoreTransaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GuardState {
    /// No store access yet.
    Idle,
    /// A transaction is open.
    Open,
    /// Committed. Terminal.
    Committed,
    /// Rolled back, or closed without ever opening. Terminal.
    RolledBack,
}

/// Owns the single store transaction of a session.
///
/// The transaction is opened on first use, committed at most once and rolled
/// back otherwise. Dropping the guard while the transaction is open rolls it
/// back, so every exit path of a session task releases it.
pub struct TransactionGuard<S: Store> {
    store: Arc<S>,
    txn: Option<S::Transaction>,
    state: GuardState,
}

impl<S: Store> TransactionGuard<S> {
    /// Creates a guard; no transaction is opened yet.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            txn: None,
            state: GuardState::Idle,
        }
    }

    /// Returns the open transaction, opening it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::TransactionFinished`] after commit or rollback,
    /// or the store error if the transaction cannot be opened.
    pub fn transaction(&mut self) -> ServerResult<&mut S::Transaction> {
        match self.state {
            GuardState::Committed | GuardState::RolledBack => {
                return Err(ServerError::TransactionFinished)
            }
            GuardState::Idle => {
                self.txn = Some(self.store.begin()?);
                self.state = GuardState::Open;
            }
            GuardState::Open => {}
        }
        self.txn.as_mut().ok_or(ServerError::TransactionFinished)
    }

    /// Commits the transaction. A session that never touched the store
    /// commits nothing.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::TransactionFinished`] if already finished, or
    /// the store error. A failed commit leaves the guard rolled back.
    pub fn commit(&mut self) -> ServerResult<()> {
        match self.state {
            GuardState::Committed | GuardState::RolledBack => Err(ServerError::TransactionFinished),
            GuardState::Idle => {
                self.state = GuardState::Committed;
                Ok(())
            }
            GuardState::Open => {
                let txn = self.txn.take().ok_or(ServerError::TransactionFinished)?;
                match txn.commit() {
                    Ok(()) => {
                        self.state = GuardState::Committed;
                        Ok(())
                    }
                    Err(e) => {
                        self.state = GuardState::RolledBack;
                        Err(e.into())
                    }
                }
            }
        }
    }

    /// Rolls back the transaction if one is open and closes the guard.
    /// Returns true if an open transaction was discarded. Calling it again,
    /// or after commit, does nothing.
    pub fn rollback(&mut self) -> bool {
        match self.state {
            GuardState::Committed | GuardState::RolledBack => false,
            GuardState::Idle => {
                self.state = GuardState::RolledBack;
                false
            }
            GuardState::Open => {
                self.state = GuardState::RolledBack;
                if let Some(txn) = self.txn.take() {
                    if let Err(e) = txn.rollback() {
                        warn!(error = %e, "rollback failed");
                    }
                }
                true
            }
        }
    }

    /// Returns true while a transaction is open.
    pub fn is_open(&self) -> bool {
        self.state == GuardState::Open
    }

    /// Returns true once committed.
    pub fn is_committed(&self) -> bool {
        self.state == GuardState::Committed
    }

    /// Returns true once committed or rolled back.
    pub fn is_finished(&self) -> bool {
        matches!(self.state, GuardState::Committed | GuardState::RolledBack)
    }
}

impl<S: Store> Drop for TransactionGuard<S> {
    fn drop(&mut self) {
        if self.rollback() {
            debug!("open transaction rolled back on drop");
        }
    }
}

impl<S: Store> std::fmt::Debug for TransactionGuard<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionGuard")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wallet_store::{AccountId, EntityStore, MemoryStore, SyncEntity};
    use wallet_sync_protocol::{AccountFields, EntityKind, EntityPayload, Timestamp};

    fn entity(id: &str) -> SyncEntity {
        SyncEntity {
            owner: AccountId::new(1),
            id: id.into(),
            last_modified: Timestamp::ZERO,
            deleted: false,
            payload: EntityPayload::Account(AccountFields {
                name: "Cash".into(),
                description: None,
                currency: "USD".into(),
                amount: "1".into(),
                color: None,
            }),
        }
    }

    #[test]
    fn opens_lazily() {
        let store = Arc::new(MemoryStore::new());
        let mut guard = TransactionGuard::new(Arc::clone(&store));
        assert!(!guard.is_open());

        guard.transaction().unwrap();
        assert!(guard.is_open());
    }

    #[test]
    fn commit_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let mut guard = TransactionGuard::new(Arc::clone(&store));
        guard.transaction().unwrap().insert(entity("a1")).unwrap();

        guard.commit().unwrap();
        assert!(guard.is_committed());
        assert_eq!(store.entity_count(), 1);

        assert!(matches!(guard.commit(), Err(ServerError::TransactionFinished)));
        assert!(!guard.rollback());
        assert!(guard.transaction().is_err());
    }

    #[test]
    fn rollback_discards_and_closes() {
        let store = Arc::new(MemoryStore::new());
        let mut guard = TransactionGuard::new(Arc::clone(&store));
        guard.transaction().unwrap().insert(entity("a1")).unwrap();

        assert!(guard.rollback());
        assert!(!guard.rollback());
        assert!(guard.transaction().is_err());
        assert!(guard.commit().is_err());
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn drop_rolls_back() {
        let store = Arc::new(MemoryStore::new());
        {
            let mut guard = TransactionGuard::new(Arc::clone(&store));
            guard.transaction().unwrap().insert(entity("a1")).unwrap();
        }
        assert_eq!(store.entity_count(), 0);
        assert!(store.entities(AccountId::new(1), EntityKind::Account).is_empty());
    }

    #[test]
    fn idle_guard_rollback_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let mut guard = TransactionGuard::new(store);
        assert!(!guard.rollback());
        assert!(guard.is_finished());
    }
}
