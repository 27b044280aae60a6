//! Authentication handler.
//!
//! Resolves REGISTER and MERGE requests against the credential store.
//! Secrets are stored as salted HMAC-SHA256 digests (see
//! [`wallet_store::hash_secret`]).

use tracing::{debug, info};
use wallet_store::{hash_secret, verify_secret, AccountId, CredentialStore, StoreResult};
use wallet_sync_protocol::{AuthOperation, AuthRequest, AuthStatus};

/// Result of an authentication attempt that reached the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The session is now bound to this account.
    Authenticated(AccountId),
    /// The request was refused with this status.
    Rejected(AuthStatus),
}

/// Returns true if the request lacks a login or a secret. Such requests are
/// refused with `AUTH_WRONG` before the store is touched.
pub fn is_blank(request: &AuthRequest) -> bool {
    request.login.is_empty() || request.secret.is_empty()
}

/// Authenticates `request` inside the session transaction.
///
/// # Errors
///
/// Returns the store error if lookup, hashing or creation fails. The caller
/// answers those with `UNKNOWN_ERROR`.
pub fn authenticate<T>(txn: &mut T, request: &AuthRequest) -> StoreResult<AuthOutcome>
where
    T: CredentialStore + ?Sized,
{
    let existing = txn.find_account(&request.login)?;

    match request.operation {
        AuthOperation::Register => {
            if existing.is_some() {
                debug!(login = %request.login, "register refused, login taken");
                return Ok(AuthOutcome::Rejected(AuthStatus::AccountExists));
            }
            let id = txn.create_account(&request.login, hash_secret(&request.secret)?)?;
            info!(login = %request.login, account = %id, "account registered");
            Ok(AuthOutcome::Authenticated(id))
        }
        AuthOperation::Merge => match existing {
            Some(account) if verify_secret(&account.secret, &request.secret) => {
                Ok(AuthOutcome::Authenticated(account.id))
            }
            _ => {
                debug!(login = %request.login, "merge refused");
                Ok(AuthOutcome::Rejected(AuthStatus::AuthWrong))
            }
        },
    }
}
