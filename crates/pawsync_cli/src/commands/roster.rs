//! Roster command implementation.

use super::{open_cache, CliError};
use chrono::NaiveDate;
use pawsync_engine::views::{pet_roster, roster_candidates, PetRosterItem};
use pawsync_engine::{EngineConfig, Environment, ViewDay};
use serde::Serialize;
use std::path::Path;
use tracing::debug;

/// Roster computed from a cached snapshot.
#[derive(Debug, Serialize)]
pub struct RosterReport {
    /// Suburb the roster is scoped to.
    pub scope: Option<String>,
    /// Rotation day.
    pub day: NaiveDate,
    /// Selected pets in display order.
    pub pets: Vec<PetRosterItem>,
}

/// Runs the roster command. Post dates are read in `day`'s time zone.
pub fn run(path: &Path, scope: Option<&str>, day: ViewDay) -> Result<RosterReport, CliError> {
    let cached = open_cache(path)?
        .load()?
        .ok_or_else(|| CliError::NoCache(path.display().to_string()))?;
    let config = EngineConfig::new(Environment::Prod);
    let candidates = roster_candidates(&cached.snapshot.posts, day.offset);
    debug!(candidates = candidates.len(), day = %day.date, "computing roster");
    let pets = pet_roster(
        &candidates,
        scope,
        day.date,
        config.roster_window_days,
        config.roster_display_count,
    );
    Ok(RosterReport {
        scope: scope.map(str::to_string),
        day: day.date,
        pets,
    })
}

/// Prints the report as text.
pub fn print_text(report: &RosterReport) {
    let scope = report.scope.as_deref().unwrap_or("all suburbs");
    println!("Pet roster for {scope} on {}", report.day);
    if report.pets.is_empty() {
        println!("  (no recent pets)");
    }
    for (i, pet) in report.pets.iter().enumerate() {
        println!("  {:>2}. {} ({}, added {})", i + 1, pet.pet_name, pet.suburb, pet.added_on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::cache_with;
    use pawsync_model::HomeSnapshot;
    use pawsync_testkit::{at, date, pet_post};

    fn snapshot() -> HomeSnapshot {
        HomeSnapshot {
            posts: vec![
                pet_post("post_1", "Biscuit", "Newtown", at(2026, 2, 27, 9, 0)),
                pet_post("post_2", "Mochi", "Newtown", at(2026, 2, 26, 9, 0)),
                pet_post("post_3", "Pepper", "Glebe", at(2026, 2, 25, 9, 0)),
                pet_post("post_4", "Rex", "Newtown", at(2026, 1, 2, 9, 0)),
            ],
            ..HomeSnapshot::default()
        }
    }

    #[test]
    fn roster_is_scoped_and_windowed() {
        let dir = cache_with(&snapshot(), &[]);
        let report = run(dir.path(), Some("newtown"), ViewDay::utc(date(2026, 2, 28))).unwrap();
        let mut names: Vec<&str> = report.pets.iter().map(|p| p.pet_name.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["Biscuit", "Mochi"]);
    }

    #[test]
    fn same_day_gives_same_order() {
        let dir = cache_with(&snapshot(), &[]);
        let day = ViewDay::utc(date(2026, 2, 28));
        let first = run(dir.path(), None, day).unwrap();
        let second = run(dir.path(), None, day).unwrap();
        assert_eq!(first.pets, second.pets);
        assert_eq!(first.pets.len(), 3);
    }
}
