//! # Wallet Testkit
//!
//! Test utilities for the wallet sync server.
//!
//! This crate provides:
//! - Entity fixtures and stores with a controllable clock
//! - Property-based test generators using proptest
//! - A store wrapper that injects failures on demand
//! - An async protocol client for end-to-end tests
//! - Fuzz harnesses for the frame decoder and message decoding
//!
//! ## Usage
//!
//! ```rust,ignore
//! use wallet_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn registers() {
//!     let mut client = TestClient::connect(addr).await.unwrap();
//!     let status = client.auth(AuthRequest::register("alice", "secret")).await.unwrap();
//!     assert_eq!(status, AuthStatus::Ok);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod faulty;
pub mod fixtures;
pub mod fuzz;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::*;
    pub use crate::faulty::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use client::*;
pub use faulty::*;
pub use fixtures::*;
pub use fuzz::*;
pub use generators::*;
