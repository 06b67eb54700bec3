//! # Pawsync Storage
//!
//! Key/value blob stores for the Pawsync client cache.
//!
//! Stores are **opaque byte stores**: they keep whole blobs under short
//! string keys and never interpret what they hold. Snapshot encoding lives
//! in the engine.
//!
//! ## Design Principles
//!
//! - A `put` replaces the previous blob for the key atomically
//! - Readers see either the old blob or the new one, never a mix
//! - Stores must be `Send + Sync`
//!
//! ## Available Stores
//!
//! - [`InMemoryBlobStore`] - For testing and ephemeral sessions
//! - [`FileBlobStore`] - One file per key in a directory
//!
//! ## Example
//!
//! ```rust
//! use pawsync_storage::{BlobStore, InMemoryBlobStore};
//!
//! let store = InMemoryBlobStore::new();
//! store.put("home_snapshot.latest", b"hello").unwrap();
//! assert_eq!(store.get("home_snapshot.latest").unwrap().as_deref(), Some(&b"hello"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_key, BlobStore, MAX_KEY_LEN};
pub use error::{StorageError, StorageResult};
pub use file::FileBlobStore;
pub use memory::InMemoryBlobStore;
