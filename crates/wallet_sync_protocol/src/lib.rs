//! # Wallet Sync Protocol
//!
//! Wire types and framing for the wallet synchronization protocol.
//!
//! This crate provides:
//! - The synchronized entity model (`Entity`, `EntityKind`, payloads)
//! - Protocol messages (auth, entity delta request/response, ack)
//! - The session phase table mapping each phase to the message it expects
//! - A length-prefixed frame codec (`varint(len) || payload`)
//!
//! This is a pure protocol crate with no I/O operations.
//!
//! ## Exchange
//!
//! ```text
//! client                                   server
//!   | -- AuthRequest ----------------------> |
//!   | <------------------- AuthResponse ---- |
//!   | -- EntityRequest (accounts) ---------> |   repeated for
//!   | <--------- EntityResponse (server) --- |   accounts, categories
//!   | -- EntityResponse (client) ----------> |   and operations
//!   | <------------------------ EntityAck -- |
//! ```
//!
//! Messages carry no type tag: the receiver knows what to decode from the
//! session phase (see [`Phase::expects`]).

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod entity;
mod error;
mod frame;
mod messages;
mod phase;

pub use entity::{
    AccountFields, CategoryFields, CategoryType, Entity, EntityKind, EntityPayload,
    KindDescriptor, OperationFields, Timestamp,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    decode_varint, encode_frame, encode_frame_into, encode_varint, FrameDecoder, FrameError,
    DEFAULT_MAX_FRAME_LEN, MAX_VARINT_LEN,
};
pub use messages::{
    AuthOperation, AuthRequest, AuthResponse, AuthStatus, EntityAck, EntityRequest,
    EntityResponse, Message, ServerMessage,
};
pub use phase::{decode_client_message, ClientMessage, Expected, Phase};
