//! # Wallet Sync Server
//!
//! TCP synchronization server for the wallet application.
//!
//! This crate provides:
//! - The per-connection session state machine
//! - Authentication (REGISTER / MERGE) against the credential store
//! - The entity delta handler shared by accounts, categories and operations
//! - One store transaction per session, committed only when the exchange
//!   completes
//! - A tokio TCP server with a connection limit, idle timeout and graceful
//!   shutdown
//!
//! # Protocol
//!
//! Each connection runs one exchange:
//! 1. Client authenticates (register or merge)
//! 2. For accounts, categories and operations in turn, the client asks for
//!    the server delta since its last known server timestamp, then sends its
//!    own delta and receives the new server timestamp
//! 3. The server commits and closes
//!
//! Any failure rolls the whole exchange back.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod guard;
mod handler;
mod server;
mod session;
mod stats;

pub use auth::{authenticate, is_blank, AuthOutcome};
pub use config::{ServerConfig, DEFAULT_PORT};
pub use error::{ServerError, ServerResult};
pub use guard::TransactionGuard;
pub use handler::EntitySyncHandler;
pub use server::{ShutdownHandle, SyncServer};
pub use session::{Session, Step};
pub use stats::{ServerStats, StatsSnapshot};
