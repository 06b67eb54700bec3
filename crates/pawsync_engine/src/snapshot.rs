//! Snapshot cache over a blob store.
//!
//! The last-known-good [`HomeSnapshot`] is stored as a single CBOR blob and
//! overwritten wholesale after every successful sync. Pending buffered
//! writes are stored alongside under their own key.

use crate::buffer::PendingWrite;
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use mockable::Clock;
use pawsync_model::HomeSnapshot;
use pawsync_storage::BlobStore;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Version written into every blob envelope.
pub const FORMAT_VERSION: u16 = 1;

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    format_version: u16,
    saved_at: DateTime<Utc>,
    payload: T,
}

/// A snapshot read back from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSnapshot {
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// The snapshot.
    pub snapshot: HomeSnapshot,
}

/// Reads and writes the cached snapshot and pending writes.
#[derive(Clone)]
pub struct SnapshotStore {
    blobs: Arc<dyn BlobStore>,
    clock: Arc<dyn Clock>,
    snapshot_key: String,
    pending_key: String,
}

impl SnapshotStore {
    /// Creates a store using the keys from `config`.
    pub fn new(blobs: Arc<dyn BlobStore>, clock: Arc<dyn Clock>, config: &EngineConfig) -> Self {
        Self {
            blobs,
            clock,
            snapshot_key: config.snapshot_key.clone(),
            pending_key: config.pending_key.clone(),
        }
    }

    /// Replaces the cached snapshot.
    pub fn save(&self, snapshot: &HomeSnapshot) -> EngineResult<()> {
        self.write(&self.snapshot_key, snapshot)?;
        debug!(entities = snapshot.entity_count(), "snapshot cached");
        Ok(())
    }

    /// Loads the cached snapshot, if any.
    pub fn load(&self) -> EngineResult<Option<CachedSnapshot>> {
        Ok(self
            .read::<HomeSnapshot>(&self.snapshot_key)?
            .map(|(saved_at, snapshot)| CachedSnapshot { saved_at, snapshot }))
    }

    /// Replaces the persisted pending writes. An empty list removes the blob.
    pub fn save_pending(&self, pending: &[PendingWrite]) -> EngineResult<()> {
        if pending.is_empty() {
            self.blobs.remove(&self.pending_key)?;
            return Ok(());
        }
        self.write(&self.pending_key, &pending)
    }

    /// Loads persisted pending writes.
    pub fn load_pending(&self) -> EngineResult<Vec<PendingWrite>> {
        Ok(self
            .read::<Vec<PendingWrite>>(&self.pending_key)?
            .map(|(_, pending)| pending)
            .unwrap_or_default())
    }

    fn write<T: Serialize>(&self, key: &str, payload: &T) -> EngineResult<()> {
        let envelope = Envelope {
            format_version: FORMAT_VERSION,
            saved_at: self.clock.utc(),
            payload,
        };
        let mut bytes = Vec::new();
        ciborium::into_writer(&envelope, &mut bytes)
            .map_err(|e| EngineError::Codec(format!("failed to encode {key}: {e}")))?;
        self.blobs.put(key, &bytes)?;
        Ok(())
    }

    fn read<T: DeserializeOwned>(&self, key: &str) -> EngineResult<Option<(DateTime<Utc>, T)>> {
        let Some(bytes) = self.blobs.get(key)? else {
            return Ok(None);
        };
        let envelope: Envelope<T> = ciborium::from_reader(bytes.as_slice())
            .map_err(|e| EngineError::Codec(format!("failed to decode {key}: {e}")))?;
        if envelope.format_version != FORMAT_VERSION {
            return Err(EngineError::Codec(format!(
                "unsupported format version {} for {key}",
                envelope.format_version
            )));
        }
        Ok(Some((envelope.saved_at, envelope.payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, NaiveDate, TimeZone};
    use pawsync_model::{
        Booking, BookingStatus, Category, ClientRef, PostDraft, PostKind, ProviderDraft,
    };
    use pawsync_storage::InMemoryBlobStore;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn local(&self) -> DateTime<Local> {
            self.0.with_timezone(&Local)
        }

        fn utc(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn store() -> (SnapshotStore, Arc<InMemoryBlobStore>) {
        let blobs = Arc::new(InMemoryBlobStore::new());
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap(),
        ));
        (
            SnapshotStore::new(blobs.clone(), clock, &EngineConfig::default()),
            blobs,
        )
    }

    fn snapshot() -> HomeSnapshot {
        HomeSnapshot {
            owner_bookings: vec![Booking {
                id: "b1".into(),
                owner_user_id: "user_2".into(),
                provider_id: "p1".into(),
                pet_name: "Biscuit".into(),
                date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                time_slot: "09:00".into(),
                note: String::new(),
                status: BookingStatus::Requested,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn load_without_cache() {
        let (store, _) = store();
        assert!(store.load().unwrap().is_none());
        assert!(store.load_pending().unwrap().is_empty());
    }

    #[test]
    fn save_then_load() {
        let (store, blobs) = store();
        store.save(&snapshot()).unwrap();
        let cached = store.load().unwrap().unwrap();
        assert_eq!(cached.snapshot, snapshot());
        assert_eq!(cached.saved_at.to_rfc3339(), "2026-03-01T08:00:00+00:00");
        assert_eq!(blobs.keys().unwrap(), vec!["home_snapshot.latest".to_string()]);
    }

    #[test]
    fn save_overwrites_wholesale() {
        let (store, _) = store();
        store.save(&snapshot()).unwrap();
        store.save(&HomeSnapshot::default()).unwrap();
        assert_eq!(store.load().unwrap().unwrap().snapshot, HomeSnapshot::default());
    }

    #[test]
    fn corrupt_blob_is_codec_error() {
        let (store, blobs) = store();
        blobs.put("home_snapshot.latest", b"\xff\x00garbage").unwrap();
        assert!(matches!(store.load(), Err(EngineError::Codec(_))));
    }

    #[test]
    fn pending_writes_persist() {
        let (store, blobs) = store();
        let pending = vec![
            PendingWrite::Provider(ProviderDraft {
                user_id: "user_1".into(),
                name: "Sunny Walks".into(),
                category: Category::DogWalking,
                suburb: "Newtown".into(),
                description: String::new(),
                price_from: 30,
                client_ref: ClientRef::new(),
            }),
            PendingWrite::Post {
                draft: PostDraft {
                    user_id: "user_2".into(),
                    kind: PostKind::LostFound,
                    title: "Lost beagle".into(),
                    body: "Near the park".into(),
                    suburb: "Newtown".into(),
                    group_id: None,
                    pet_name: Some("Milo".into()),
                    photo_url: None,
                    client_ref: ClientRef::new(),
                },
                recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 7, 0, 0).unwrap(),
            },
        ];
        store.save_pending(&pending).unwrap();
        assert_eq!(store.load_pending().unwrap(), pending);

        store.save_pending(&[]).unwrap();
        assert!(blobs.get("pending_writes").unwrap().is_none());
    }
}
