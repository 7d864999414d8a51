//! Credential minting and digests
//!
//! A credential is 16 bytes from the OS CSPRNG rendered as 32 lowercase hex
//! characters. The hex string is the secret handed to the operator; the
//! store only ever sees [`digest`] of it.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::StoreResult;
use crate::store::PermissionStore;

/// Number of random bytes in a credential
pub const CREDENTIAL_BYTES: usize = 16;

/// SHA-256 of `bytes`, lowercase hex
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A plaintext credential
///
/// `Debug` is redacted; use `Display` or [`Credential::as_str`] to print it
/// once to the operator.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    /// Draws a fresh credential from the OS random source
    pub fn generate() -> Self {
        let bytes: [u8; CREDENTIAL_BYTES] = rand::random();
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest persisted in the credential table
    pub fn digest(&self) -> String {
        digest(self.0.as_bytes())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints a credential and stores its digest
///
/// Protection is lifted only around the insert and re-applied even when the
/// insert fails. The first error wins.
pub fn provision<S: PermissionStore + ?Sized>(store: &mut S) -> StoreResult<Credential> {
    let credential = Credential::generate();
    store.unprotect()?;
    let inserted = store.insert_credential(&credential.digest());
    let reprotected = store.protect();
    inserted?;
    reprotected?;

    #[cfg(feature = "tracing")]
    tracing::info!("Provisioned new access key");

    Ok(credential)
}

/// Removes a stored digest, lifting protection around the delete
///
/// Returns `false` when the digest was not stored.
pub fn revoke<S: PermissionStore + ?Sized>(store: &mut S, digest: &str) -> StoreResult<bool> {
    store.unprotect()?;
    let removed = store.remove_credential(digest);
    let reprotected = store.protect();
    let removed = removed?;
    reprotected?;

    #[cfg(feature = "tracing")]
    if removed {
        tracing::info!("Revoked access key {}", digest);
    }

    Ok(removed)
}
