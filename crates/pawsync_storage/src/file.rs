//! Directory-backed blob store for persistent caches.

use crate::backend::{validate_key, BlobStore};
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const BLOB_EXT: &str = "blob";
const TMP_EXT: &str = "tmp";

/// A blob store keeping one file per key inside a directory.
///
/// Data survives process restarts.
///
/// # Durability
///
/// A `put` writes the blob to `<key>.tmp`, calls `File::sync_all()`, and
/// renames it over `<key>.blob`. Readers therefore see the old blob or the
/// new one in full.
///
/// # Thread Safety
///
/// Writers are serialized by an internal lock. Reads take no lock.
///
/// # Example
///
/// ```no_run
/// use pawsync_storage::{BlobStore, FileBlobStore};
/// use std::path::Path;
///
/// let store = FileBlobStore::open_with_create_dirs(Path::new("cache")).unwrap();
/// store.put("home_snapshot.latest", b"persistent data").unwrap();
/// ```
#[derive(Debug)]
pub struct FileBlobStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
    read_only: bool,
}

impl FileBlobStore {
    /// Opens an existing directory as a blob store.
    ///
    /// Leftover temporary files from interrupted writes are removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or cannot be read.
    pub fn open(dir: &Path) -> StorageResult<Self> {
        let store = Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            read_only: false,
        };
        store.clean_temp_files()?;
        Ok(store)
    }

    /// Opens an existing directory without modifying it.
    ///
    /// Temporary files are left in place, and `put` and `remove` fail with
    /// [`StorageError::ReadOnly`]. Suitable for inspecting a cache another
    /// process may be writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory does not exist or cannot be read.
    pub fn open_read_only(dir: &Path) -> StorageResult<Self> {
        fs::read_dir(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            write_lock: Mutex::new(()),
            read_only: true,
        })
    }

    /// Opens a blob store, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or read.
    pub fn open_with_create_dirs(dir: &Path) -> StorageResult<Self> {
        fs::create_dir_all(dir)?;
        Self::open(dir)
    }

    /// Returns the backing directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{BLOB_EXT}"))
    }

    fn temp_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{TMP_EXT}"))
    }

    fn check_writable(&self) -> StorageResult<()> {
        if self.read_only {
            Err(StorageError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn clean_temp_files(&self) -> StorageResult<()> {
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some(TMP_EXT) {
                debug!(path = %path.display(), "removing interrupted blob write");
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

impl BlobStore for FileBlobStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_key(key)?;
        match fs::read(self.blob_path(key)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, key: &str, data: &[u8]) -> StorageResult<()> {
        validate_key(key)?;
        self.check_writable()?;
        let _guard = self.write_lock.lock();
        let temp = self.temp_path(key);
        {
            let mut file = File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.blob_path(key))?;
        debug!(key, bytes = data.len(), "blob written");
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        self.check_writable()?;
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.blob_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn file_put_and_get() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        store.put("home_snapshot.latest", b"abc").unwrap();
        assert_eq!(
            store.get("home_snapshot.latest").unwrap(),
            Some(b"abc".to_vec())
        );
    }

    #[test]
    fn file_persistence() {
        let dir = tempdir().unwrap();
        {
            let store = FileBlobStore::open(dir.path()).unwrap();
            store.put("pending_writes", b"queued").unwrap();
        }
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert_eq!(store.get("pending_writes").unwrap(), Some(b"queued".to_vec()));
    }

    #[test]
    fn file_missing_key() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert!(store.get("absent").unwrap().is_none());
        assert!(!store.remove("absent").unwrap());
    }

    #[test]
    fn file_remove_and_keys() {
        let dir = tempdir().unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        store.put("b", b"2").unwrap();
        store.put("a", b"1").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["a".to_string(), "b".to_string()]);
        assert!(store.remove("a").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["b".to_string()]);
    }

    #[test]
    fn file_open_cleans_temp_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("snap.tmp"), b"half").unwrap();
        let store = FileBlobStore::open(dir.path()).unwrap();
        assert!(!dir.path().join("snap.tmp").exists());
        assert!(store.keys().unwrap().is_empty());
    }

    #[test]
    fn read_only_open_leaves_the_directory_alone() {
        let dir = tempdir().unwrap();
        FileBlobStore::open(dir.path()).unwrap().put("snap", b"full").unwrap();
        fs::write(dir.path().join("snap.tmp"), b"half").unwrap();

        let store = FileBlobStore::open_read_only(dir.path()).unwrap();
        assert!(dir.path().join("snap.tmp").exists());
        assert_eq!(store.get("snap").unwrap(), Some(b"full".to_vec()));
        assert_eq!(store.keys().unwrap(), vec!["snap".to_string()]);
        assert!(matches!(store.put("snap", b"new"), Err(StorageError::ReadOnly)));
        assert!(matches!(store.remove("snap"), Err(StorageError::ReadOnly)));
        assert!(FileBlobStore::open_read_only(&dir.path().join("nope")).is_err());
    }

    #[test]
    fn file_create_with_dirs() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store = FileBlobStore::open_with_create_dirs(&nested).unwrap();
        assert_eq!(store.path(), nested.as_path());
        store.put("k", b"v").unwrap();
    }

    #[test]
    fn file_open_missing_dir_fails() {
        let dir = tempdir().unwrap();
        assert!(FileBlobStore::open(&dir.path().join("nope")).is_err());
    }
}
