//! One-way hashing of account secrets.
//!
//! Each account gets a random salt; the stored digest is
//! `HMAC-SHA256(key = salt, message = secret)`. Verification recomputes the
//! MAC and compares it in constant time.

use crate::error::{StoreError, StoreResult};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of the per-account salt in bytes.
pub const SALT_LEN: usize = 16;

/// A salted secret digest.
#[derive(Clone, PartialEq, Eq)]
pub struct HashedSecret {
    salt: [u8; SALT_LEN],
    digest: [u8; 32],
}

impl HashedSecret {
    /// Returns the salt.
    pub fn salt(&self) -> &[u8; SALT_LEN] {
        &self.salt
    }

    /// Returns the digest.
    pub fn digest(&self) -> &[u8; 32] {
        &self.digest
    }
}

impl fmt::Debug for HashedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashedSecret").finish_non_exhaustive()
    }
}

fn keyed(salt: &[u8; SALT_LEN]) -> StoreResult<HmacSha256> {
    HmacSha256::new_from_slice(salt).map_err(|e| StoreError::Credentials(e.to_string()))
}

/// Hashes `secret` with a fresh random salt.
///
/// # Errors
///
/// Returns [`StoreError::Credentials`] if the MAC cannot be keyed.
pub fn hash_secret(secret: &str) -> StoreResult<HashedSecret> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);

    let mut mac = keyed(&salt)?;
    mac.update(secret.as_bytes());
    Ok(HashedSecret {
        salt,
        digest: mac.finalize().into_bytes().into(),
    })
}

/// Checks `secret` against a stored hash.
pub fn verify_secret(hashed: &HashedSecret, secret: &str) -> bool {
    let Ok(mut mac) = keyed(&hashed.salt) else {
        return false;
    };
    mac.update(secret.as_bytes());
    mac.verify_slice(&hashed.digest).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_matching_secret() {
        let hashed = hash_secret("correct horse").unwrap();
        assert!(verify_secret(&hashed, "correct horse"));
        assert!(!verify_secret(&hashed, "correct horsE"));
        assert!(!verify_secret(&hashed, ""));
    }

    #[test]
    fn same_secret_different_salt() {
        let a = hash_secret("secret").unwrap();
        let b = hash_secret("secret").unwrap();
        assert_ne!(a.salt(), b.salt());
        assert_ne!(a.digest(), b.digest());
        assert!(verify_secret(&a, "secret"));
        assert!(verify_secret(&b, "secret"));
    }

    #[test]
    fn debug_hides_material() {
        let hashed = hash_secret("secret").unwrap();
        assert_eq!(format!("{hashed:?}"), "HashedSecret { .. }");
    }
}
