//! # Wallet Store
//!
//! Storage collaborators for the wallet sync server.
//!
//! This crate provides:
//! - The store traits a sync session works against ([`Store`],
//!   [`StoreTransaction`], [`CredentialStore`], [`EntityStore`])
//! - [`MemoryStore`], an in-memory transactional implementation
//! - Salted one-way hashing of account secrets
//!
//! # Transactions
//!
//! A session opens one transaction and keeps it for its whole lifetime.
//! Writes stay private to the transaction until [`StoreTransaction::commit`];
//! dropping or rolling back discards them. Every row written by a
//! transaction is stamped with the transaction timestamp ([`EntityStore::now`]).
//!
//! ```
//! use wallet_store::{CredentialStore, MemoryStore, Store, StoreTransaction, hash_secret};
//!
//! let store = MemoryStore::new();
//! let mut txn = store.begin().unwrap();
//! let id = txn.create_account("alice", hash_secret("secret").unwrap()).unwrap();
//! txn.commit().unwrap();
//!
//! assert_eq!(store.account("alice").unwrap().id, id);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod clock;
mod credentials;
mod error;
mod memory;
mod traits;
mod types;

pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use credentials::{hash_secret, verify_secret, HashedSecret, SALT_LEN};
pub use error::{StoreError, StoreResult};
pub use memory::{MemoryStore, MemoryTransaction};
pub use traits::{CredentialStore, EntityStore, Store, StoreTransaction};
pub use types::{AccountId, AccountRecord, SyncEntity};
