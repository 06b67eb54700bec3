//! In-memory blob store for testing.

use crate::backend::{validate_key, BlobStore};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory blob store.
///
/// Suitable for unit tests, integration tests and sessions that do not
/// need the cache to survive a restart. Can be switched into a failing
/// mode to exercise cache-unavailable paths.
///
/// # Example
///
/// ```rust
/// use pawsync_storage::{BlobStore, InMemoryBlobStore};
///
/// let store = InMemoryBlobStore::new();
/// store.put("k", b"v").unwrap();
/// assert!(store.remove("k").unwrap());
/// assert!(store.get("k").unwrap().is_none());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
    closed: AtomicBool,
}

impl InMemoryBlobStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }

    /// Makes every later call fail with [`StorageError::Closed`] (or succeed again).
    pub fn set_closed(&self, closed: bool) {
        self.closed.store(closed, Ordering::SeqCst);
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl BlobStore for InMemoryBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        self.check_open()?;
        validate_key(key)?;
        Ok(self.blobs.read().get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        self.check_open()?;
        validate_key(key)?;
        self.blobs.write().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        self.check_open()?;
        validate_key(key)?;
        Ok(self.blobs.write().remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        self.check_open()?;
        Ok(self.blobs.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_put_replaces() {
        let store = InMemoryBlobStore::new();
        store.put("snap", b"one").unwrap();
        store.put("snap", b"two").unwrap();
        assert_eq!(store.get("snap").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_missing_key() {
        let store = InMemoryBlobStore::new();
        assert!(store.get("nothing").unwrap().is_none());
        assert!(!store.remove("nothing").unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn memory_keys_sorted() {
        let store = InMemoryBlobStore::new();
        store.put("b", b"").unwrap();
        store.put("a", b"").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn memory_closed_fails() {
        let store = InMemoryBlobStore::new();
        store.set_closed(true);
        assert!(matches!(store.get("a"), Err(StorageError::Closed)));
        store.set_closed(false);
        assert!(store.get("a").is_ok());
    }

    #[test]
    fn memory_rejects_bad_key() {
        let store = InMemoryBlobStore::new();
        assert!(matches!(
            store.put("../x", b""),
            Err(StorageError::InvalidKey(_))
        ));
    }
}
