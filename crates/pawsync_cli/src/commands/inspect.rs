//! Inspect command implementation.

use super::{open_cache, CliError};
use chrono::{DateTime, Utc};
use pawsync_model::{ClientRef, HomeSnapshot};
use serde::Serialize;
use std::path::Path;

/// Cache inspection result.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    /// Cache directory.
    pub path: String,
    /// When the snapshot was written.
    pub saved_at: DateTime<Utc>,
    /// Entity counts per collection.
    pub counts: CollectionCounts,
    /// Writes still waiting for the server.
    pub pending: Vec<PendingSummary>,
}

/// Entity counts of one snapshot.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct CollectionCounts {
    /// Listings, including the viewer's cancelled ones.
    pub providers: usize,
    /// Groups.
    pub groups: usize,
    /// Posts.
    pub posts: usize,
    /// Events.
    pub events: usize,
    /// Bookings from both sides.
    pub bookings: usize,
    /// Quote requests.
    pub quotes: usize,
    /// Direct messages.
    pub messages: usize,
    /// Notifications.
    pub notifications: usize,
    /// Client-only entities not yet confirmed.
    pub local: usize,
}

impl CollectionCounts {
    fn of(snapshot: &HomeSnapshot) -> Self {
        let local = snapshot
            .providers
            .iter()
            .filter(|p| is_local(&p.id, p.client_ref))
            .count()
            + snapshot.groups.iter().filter(|g| is_local(&g.id, g.client_ref)).count()
            + snapshot.posts.iter().filter(|p| is_local(&p.id, p.client_ref)).count()
            + snapshot.events.iter().filter(|e| is_local(&e.id, e.client_ref)).count();
        Self {
            providers: snapshot.providers.len(),
            groups: snapshot.groups.len(),
            posts: snapshot.posts.len(),
            events: snapshot.events.len(),
            bookings: snapshot.owner_bookings.len() + snapshot.provider_bookings.len(),
            quotes: snapshot.quotes.len(),
            messages: snapshot.messages.len(),
            notifications: snapshot.notifications.len(),
            local,
        }
    }
}

fn is_local(id: &str, client_ref: Option<ClientRef>) -> bool {
    client_ref.is_some_and(|r| r.local_id() == id)
}

/// One buffered write.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct PendingSummary {
    /// Entity kind.
    pub kind: String,
    /// Idempotency key.
    pub client_ref: String,
}

/// Runs the inspect command.
pub fn run(path: &Path) -> Result<InspectReport, CliError> {
    let store = open_cache(path)?;
    let cached = store
        .load()?
        .ok_or_else(|| CliError::NoCache(path.display().to_string()))?;
    let pending = store
        .load_pending()?
        .iter()
        .map(|write| PendingSummary {
            kind: write.kind().to_string(),
            client_ref: write.client_ref().to_string(),
        })
        .collect();

    Ok(InspectReport {
        path: path.display().to_string(),
        saved_at: cached.saved_at,
        counts: CollectionCounts::of(&cached.snapshot),
        pending,
    })
}

/// Prints the report as text.
pub fn print_text(report: &InspectReport) {
    let c = &report.counts;
    println!("Pawsync Cache Inspection");
    println!("========================");
    println!();
    println!("Path:     {}", report.path);
    println!("Saved at: {}", report.saved_at.to_rfc3339());
    println!();
    println!("Snapshot:");
    println!("  Providers:     {}", c.providers);
    println!("  Groups:        {}", c.groups);
    println!("  Posts:         {}", c.posts);
    println!("  Events:        {}", c.events);
    println!("  Bookings:      {}", c.bookings);
    println!("  Quotes:        {}", c.quotes);
    println!("  Messages:      {}", c.messages);
    println!("  Notifications: {}", c.notifications);
    println!("  Local only:    {}", c.local);
    println!();
    if report.pending.is_empty() {
        println!("No pending writes.");
        return;
    }
    println!("Pending writes:");
    for write in &report.pending {
        println!("  [{}] {}", write.kind, write.client_ref);
    }
}
