//! Permission store interface and the shared handle sessions use to reach it
//!
//! A [`PermissionStore`] is a synchronous, single-connection store. The server
//! owns exactly one, wrapped in a [`SharedStore`]; every access goes through
//! [`SharedStore::with`], which runs a closure on the blocking pool while
//! holding the store lock. The lock is therefore never held across a network
//! read or write.

use std::sync::{Arc, Mutex};

use crate::error::{StoreError, StoreResult};
use crate::value::{Map, Row, Value};

/// A relational store with a guarded credential table
///
/// Implementations keep credential digests in `REMOTE_ACCESS_KEYS` and guard
/// that table with the protection triggers. Methods take `&mut self`: callers
/// serialize access through [`SharedStore`].
pub trait PermissionStore: Send + 'static {
    /// Creates the credential table if it does not exist
    fn ensure_schema(&mut self) -> StoreResult<()>;

    /// Installs the protection triggers (idempotent)
    fn protect(&mut self) -> StoreResult<()>;

    /// Removes the protection triggers (idempotent)
    fn unprotect(&mut self) -> StoreResult<()>;

    /// Returns `true` when all protection triggers are installed
    fn is_protected(&mut self) -> StoreResult<bool>;

    /// Executes one statement and returns all of its rows
    ///
    /// Any transaction left open by a failed statement is rolled back before
    /// returning; a successful statement is committed.
    fn execute(
        &mut self,
        statement: &str,
        positional_args: &[Value],
        keyword_args: &Map,
    ) -> StoreResult<Vec<Row>>;

    /// Returns `true` if the digest is a stored credential
    fn credential_exists(&mut self, digest: &str) -> StoreResult<bool>;

    /// Number of stored credentials
    fn credential_count(&mut self) -> StoreResult<u64>;

    /// All stored digests, in insertion order
    fn list_credentials(&mut self) -> StoreResult<Vec<String>>;

    /// Inserts a digest; fails with `IntegrityError` while protected
    fn insert_credential(&mut self, digest: &str) -> StoreResult<()>;

    /// Removes a digest; returns `false` when it was not stored
    fn remove_credential(&mut self, digest: &str) -> StoreResult<bool>;
}

/// Result of a credential lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// The digest is stored
    Matched,
    /// No credentials exist, so any credential is admitted
    Bootstrap,
    /// Credentials exist and none matches
    Rejected,
}

impl AuthOutcome {
    pub fn is_admitted(&self) -> bool {
        !matches!(self, AuthOutcome::Rejected)
    }
}

/// Looks up a digest and the credential count in one pass
///
/// Call from inside a single [`SharedStore::with`] closure so both reads see
/// the same state.
pub fn authenticate<S: PermissionStore + ?Sized>(
    store: &mut S,
    digest: Option<&str>,
) -> StoreResult<AuthOutcome> {
    if let Some(digest) = digest {
        if store.credential_exists(digest)? {
            return Ok(AuthOutcome::Matched);
        }
    }
    if store.credential_count()? == 0 {
        Ok(AuthOutcome::Bootstrap)
    } else {
        Ok(AuthOutcome::Rejected)
    }
}

/// Cloneable handle to the single permission store
pub struct SharedStore<S> {
    inner: Arc<Mutex<S>>,
}

impl<S> Clone for SharedStore<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PermissionStore> SharedStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            inner: Arc::new(Mutex::new(store)),
        }
    }

    /// Runs `f` with exclusive access to the store on the blocking pool
    ///
    /// # Errors
    /// Returns whatever `f` returns, or a `DatabaseError` if the lock is
    /// poisoned or the blocking task panicked.
    pub async fn with<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut S) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = inner
                .lock()
                .map_err(|_| StoreError::internal("store lock poisoned"))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::internal(format!("store task failed: {e}")))?
    }

    /// Runs `f` on the calling thread while holding the lock
    ///
    /// For setup and administrative paths that run outside a session.
    pub fn with_blocking<T>(&self, f: impl FnOnce(&mut S) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| StoreError::internal("store lock poisoned"))?;
        f(&mut guard)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory store for unit tests in this crate

    use super::*;
    use crate::error::ErrorKind;

    #[derive(Default)]
    pub struct MemoryStore {
        pub protected: bool,
        pub digests: Vec<String>,
        pub executed: Vec<String>,
        pub rows: Vec<Row>,
        pub fail_with: Option<StoreError>,
    }

    impl PermissionStore for MemoryStore {
        fn ensure_schema(&mut self) -> StoreResult<()> {
            Ok(())
        }

        fn protect(&mut self) -> StoreResult<()> {
            self.protected = true;
            Ok(())
        }

        fn unprotect(&mut self) -> StoreResult<()> {
            self.protected = false;
            Ok(())
        }

        fn is_protected(&mut self) -> StoreResult<bool> {
            Ok(self.protected)
        }

        fn execute(
            &mut self,
            statement: &str,
            _positional_args: &[Value],
            _keyword_args: &Map,
        ) -> StoreResult<Vec<Row>> {
            self.executed.push(statement.to_string());
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(self.rows.clone()),
            }
        }

        fn credential_exists(&mut self, digest: &str) -> StoreResult<bool> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(self.digests.iter().any(|d| d == digest))
        }

        fn credential_count(&mut self) -> StoreResult<u64> {
            Ok(self.digests.len() as u64)
        }

        fn list_credentials(&mut self) -> StoreResult<Vec<String>> {
            Ok(self.digests.clone())
        }

        fn insert_credential(&mut self, digest: &str) -> StoreResult<()> {
            if self.protected {
                return Err(StoreError::new(
                    ErrorKind::IntegrityError,
                    "trying to insert access keys(s)!",
                ));
            }
            self.digests.push(digest.to_string());
            Ok(())
        }

        fn remove_credential(&mut self, digest: &str) -> StoreResult<bool> {
            if self.protected {
                return Err(StoreError::new(
                    ErrorKind::IntegrityError,
                    "trying to delete acccess keys(s)!",
                ));
            }
            let before = self.digests.len();
            self.digests.retain(|d| d != digest);
            Ok(self.digests.len() != before)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;

    #[test]
    fn test_authenticate_outcomes() {
        let mut store = MemoryStore::default();
        assert_eq!(authenticate(&mut store, Some("a")).unwrap(), AuthOutcome::Bootstrap);
        assert_eq!(authenticate(&mut store, None).unwrap(), AuthOutcome::Bootstrap);

        store.digests.push("a".to_string());
        assert_eq!(authenticate(&mut store, Some("a")).unwrap(), AuthOutcome::Matched);
        assert_eq!(authenticate(&mut store, Some("b")).unwrap(), AuthOutcome::Rejected);
        assert_eq!(authenticate(&mut store, None).unwrap(), AuthOutcome::Rejected);
        assert!(!AuthOutcome::Rejected.is_admitted());
    }

    #[tokio::test]
    async fn test_shared_store_serializes_access() {
        let shared = SharedStore::new(MemoryStore::default());
        let mut handles = Vec::new();
        for i in 0..16 {
            let shared = shared.clone();
            handles.push(tokio::spawn(async move {
                shared
                    .with(move |store| store.execute(&format!("stmt {i}"), &[], &Map::new()))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        let executed = shared.with_blocking(|store| Ok(store.executed.len())).unwrap();
        assert_eq!(executed, 16);
    }

    #[tokio::test]
    async fn test_poisoned_lock_is_database_error() {
        let shared = SharedStore::new(MemoryStore::default());
        let poisoner = shared.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err = shared.with(|store| store.credential_count()).await.unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::DatabaseError);
    }
}
