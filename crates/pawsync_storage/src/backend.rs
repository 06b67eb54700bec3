//! Blob store trait definition.

use crate::error::{StorageError, StorageResult};

/// Longest key a store accepts.
pub const MAX_KEY_LEN: usize = 128;

/// A key/value store of opaque blobs.
///
/// # Invariants
///
/// - `put` replaces any previous blob for the key as one unit
/// - `get` returns exactly the bytes of the last successful `put`
/// - `remove` of a missing key is not an error
/// - Keys are validated with [`validate_key`]
///
/// # Implementors
///
/// - [`super::InMemoryBlobStore`] - For testing
/// - [`super::FileBlobStore`] - For persistent storage
pub trait BlobStore: Send + Sync {
    /// Reads the blob stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `data` under `key`, replacing any previous blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the write fails. A failed
    /// write leaves the previous blob in place.
    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the blob under `key`. Returns true if one existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or an I/O error occurs.
    fn remove(&self, key: &str) -> StorageResult<bool>;

    /// Lists stored keys in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn keys(&self) -> StorageResult<Vec<String>>;
}

/// Checks that a key is non-empty, short, and made of `[A-Za-z0-9._-]`
/// without a leading dot.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let valid = !key.is_empty()
        && key.len() <= MAX_KEY_LEN
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
