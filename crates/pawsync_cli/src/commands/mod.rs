//! CLI command implementations.

pub mod inspect;
pub mod roster;
pub mod threads;

use clap::ValueEnum;
use mockable::{Clock, DefaultClock};
use pawsync_engine::{EngineConfig, EngineError, Environment, SnapshotStore, ViewDay};
use pawsync_storage::{FileBlobStore, StorageError};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// The directory holds no cached snapshot.
    #[error("no cached snapshot found at {0}")]
    NoCache(String),

    /// The cache directory could not be read.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The cached blobs could not be decoded.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// JSON output failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

/// Opens the cache directory read-only with the default keys.
///
/// Nothing in the directory is touched, including temporary files left by
/// an app that may still be writing.
pub fn open_cache(path: &Path) -> Result<SnapshotStore, CliError> {
    snapshot_store(FileBlobStore::open_read_only(path)?)
}

fn snapshot_store(blobs: FileBlobStore) -> Result<SnapshotStore, CliError> {
    let config = EngineConfig::new(Environment::Prod);
    Ok(SnapshotStore::new(
        Arc::new(blobs),
        Arc::new(DefaultClock),
        &config,
    ))
}

/// Today on this machine, in its time zone.
pub fn today() -> ViewDay {
    ViewDay::local(DefaultClock.local())
}

/// Prints `report` as JSON or with the command's text printer.
pub fn emit<T: Serialize>(
    report: &T,
    format: OutputFormat,
    print_text: fn(&T),
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print_text(report),
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use pawsync_engine::PendingWrite;
    use pawsync_model::HomeSnapshot;
    use tempfile::TempDir;

    /// Writes `snapshot` and `pending` into a fresh cache directory.
    pub fn cache_with(snapshot: &HomeSnapshot, pending: &[PendingWrite]) -> TempDir {
        let dir = TempDir::new().unwrap();
        let store = snapshot_store(FileBlobStore::open(dir.path()).unwrap()).unwrap();
        store.save(snapshot).unwrap();
        store.save_pending(pending).unwrap();
        dir
    }
}
