//! Session state machine.
//!
//! A [`Session`] consumes complete frame payloads one at a time and returns
//! a [`Step`] telling the connection loop what to send and whether to keep
//! the connection. It performs no I/O, so the whole protocol can be driven
//! synchronously in tests.

use crate::auth::{self, AuthOutcome};
use crate::error::{ServerError, ServerResult};
use crate::guard::TransactionGuard;
use crate::handler::EntitySyncHandler;
use std::sync::Arc;
use tracing::{debug, info, warn};
use wallet_store::{AccountId, Store};
use wallet_sync_protocol::{
    decode_client_message, AuthRequest, AuthResponse, AuthStatus, ClientMessage, EntityKind,
    EntityRequest, EntityResponse, Phase, ServerMessage,
};

/// What the connection loop does after a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Send the message and keep reading.
    Reply(ServerMessage),
    /// Send the message, then close.
    ReplyAndClose(ServerMessage),
    /// Close without sending anything.
    Close,
}

/// One client's sync session.
pub struct Session<S: Store> {
    phase: Phase,
    account: Option<AccountId>,
    guard: TransactionGuard<S>,
}

impl<S: Store> Session<S> {
    /// Creates a session in `NOT_IDENTIFIED`.
    pub fn new(store: Arc<S>) -> Self {
        Self {
            phase: Phase::NotIdentified,
            account: None,
            guard: TransactionGuard::new(store),
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the authenticated account, if any.
    pub fn account(&self) -> Option<AccountId> {
        self.account
    }

    /// Returns true once the session committed.
    pub fn is_committed(&self) -> bool {
        self.guard.is_committed()
    }

    /// Returns true while the store transaction is open.
    pub fn transaction_open(&self) -> bool {
        self.guard.is_open()
    }

    /// Processes one frame payload.
    pub fn handle_frame(&mut self, payload: &[u8]) -> Step {
        if self.phase.is_terminal() {
            debug!(phase = %self.phase, "input after session end");
            if self.phase != Phase::Finished {
                self.fail();
            }
            return Step::Close;
        }

        let message = match decode_client_message(self.phase, payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(phase = %self.phase, error = %e, "undecodable message");
                let in_auth = self.phase == Phase::NotIdentified;
                self.fail();
                return if in_auth {
                    Step::ReplyAndClose(AuthResponse::new(AuthStatus::UnknownError).into())
                } else {
                    Step::Close
                };
            }
        };

        match message {
            ClientMessage::Auth(request) => self.on_auth(&request),
            ClientMessage::DeltaRequest { kind, request } => self.on_delta_request(kind, request),
            ClientMessage::Delta { kind, batch } => self.on_delta(kind, batch),
        }
    }

    /// Ends the session without committing. Safe to call in any phase and
    /// more than once.
    pub fn abort(&mut self, reason: &ServerError) {
        if self.guard.is_committed() {
            return;
        }
        if self.phase != Phase::Error {
            info!(phase = %self.phase, account = ?self.account, %reason, "session aborted");
        }
        self.fail();
    }

    fn fail(&mut self) {
        self.phase = Phase::Error;
        if self.guard.rollback() {
            debug!(account = ?self.account, "session transaction rolled back");
        }
    }

    fn on_auth(&mut self, request: &AuthRequest) -> Step {
        debug!(request = %request, "auth request");

        let status = if auth::is_blank(request) {
            AuthStatus::AuthWrong
        } else {
            match self.authenticate(request) {
                Ok(AuthOutcome::Authenticated(id)) => {
                    info!(login = %request.login, account = %id, "session authenticated");
                    self.account = Some(id);
                    self.phase = self.phase.advance();
                    return Step::Reply(AuthResponse::new(AuthStatus::Ok).into());
                }
                Ok(AuthOutcome::Rejected(status)) => status,
                Err(e) => {
                    tracing::error!(login = %request.login, error = %e, "authentication failed");
                    AuthStatus::UnknownError
                }
            }
        };

        self.fail();
        Step::ReplyAndClose(AuthResponse::new(status).into())
    }

    fn authenticate(&mut self, request: &AuthRequest) -> ServerResult<AuthOutcome> {
        let txn = self.guard.transaction()?;
        Ok(auth::authenticate(txn, request)?)
    }

    fn on_delta_request(&mut self, kind: EntityKind, request: EntityRequest) -> Step {
        let handler = EntitySyncHandler::new(kind);
        let result = self.owner().and_then(|owner| {
            let txn = self.guard.transaction()?;
            handler.produce_delta(txn, owner, request.last_known_server_timestamp)
        });

        match result {
            Ok(delta) => {
                self.phase = self.phase.advance();
                Step::Reply(delta.into())
            }
            Err(e) => self.entity_failure(kind, &e),
        }
    }

    fn on_delta(&mut self, kind: EntityKind, batch: EntityResponse) -> Step {
        let handler = EntitySyncHandler::new(kind);
        let result = self.owner().and_then(|owner| {
            let txn = self.guard.transaction()?;
            handler.apply_delta(txn, owner, batch)
        });

        let ack = match result {
            Ok(ack) => ack,
            Err(e) => return self.entity_failure(kind, &e),
        };

        self.phase = self.phase.advance();
        if self.phase != Phase::Finished {
            return Step::Reply(ack.into());
        }

        // Commit strictly before the final ack leaves.
        match self.guard.commit() {
            Ok(()) => {
                info!(account = ?self.account, timestamp = %ack.new_server_timestamp, "session committed");
                Step::ReplyAndClose(ack.into())
            }
            Err(e) => {
                tracing::error!(account = ?self.account, error = %e, "commit failed");
                self.fail();
                Step::Close
            }
        }
    }

    fn owner(&self) -> ServerResult<AccountId> {
        self.account.ok_or(ServerError::NotAuthenticated)
    }

    fn entity_failure(&mut self, kind: EntityKind, error: &ServerError) -> Step {
        if error.is_server_error() {
            tracing::error!(%kind, account = ?self.account, %error, "entity sync failed");
        } else {
            warn!(%kind, account = ?self.account, %error, "entity sync rejected");
        }
        self.fail();
        Step::Close
    }
}

impl<S: Store> std::fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("phase", &self.phase)
            .field("account", &self.account)
            .field("guard", &self.guard)
            .finish()
    }
}
