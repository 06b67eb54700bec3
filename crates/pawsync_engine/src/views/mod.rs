//! Derived views.
//!
//! Pure functions of `(entities, day, viewer)`. Views are recomputed when
//! the entities, the viewer or the day change, and are never persisted.

mod listings;
mod roster;
mod threads;

pub use listings::{favorites, my_listings};
pub use roster::{pet_roster, roster_candidates, rotation_key, PetRosterItem, ALL_SCOPE};
pub use threads::{message_threads, thread_id, MessageThread, ThreadSource};

use crate::config::EngineConfig;
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Utc};
use pawsync_model::{HomeSnapshot, Provider};
use serde::Serialize;

/// The calendar day views are computed for, and the UTC offset that maps
/// timestamps onto calendar days. Both come from the same clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewDay {
    /// The current day.
    pub date: NaiveDate,
    /// Offset of the viewer's time zone.
    pub offset: FixedOffset,
}

impl ViewDay {
    /// The day of a local clock reading.
    pub fn local(now: DateTime<Local>) -> Self {
        Self {
            date: now.date_naive(),
            offset: *now.offset(),
        }
    }

    /// `date` in UTC.
    pub fn utc(date: NaiveDate) -> Self {
        Self {
            date,
            offset: Utc.fix(),
        }
    }

    /// Calendar day of `instant` in this zone.
    pub fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }
}

/// All composite views for one state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DerivedViews {
    /// Message threads of the viewer.
    pub threads: Vec<MessageThread>,
    /// Today's pet roster for the selected scope.
    pub roster: Vec<PetRosterItem>,
    /// The viewer's own listings.
    pub listings: Vec<Provider>,
    /// Providers the viewer booked.
    pub favorites: Vec<Provider>,
}

impl DerivedViews {
    /// Computes every view. Viewer-specific views are empty without a viewer.
    pub fn build(
        snapshot: &HomeSnapshot,
        viewer: Option<&str>,
        scope: Option<&str>,
        day: ViewDay,
        config: &EngineConfig,
    ) -> Self {
        let roster = pet_roster(
            &roster_candidates(&snapshot.posts, day.offset),
            scope,
            day.date,
            config.roster_window_days,
            config.roster_display_count,
        );
        match viewer {
            Some(viewer) => Self {
                threads: message_threads(snapshot, viewer),
                roster,
                listings: my_listings(&snapshot.providers, viewer),
                favorites: favorites(snapshot, viewer),
            },
            None => Self {
                roster,
                ..Self::default()
            },
        }
    }
}
