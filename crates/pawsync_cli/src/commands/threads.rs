//! Threads command implementation.

use super::{open_cache, CliError};
use pawsync_engine::views::{message_threads, MessageThread};
use serde::Serialize;
use std::path::Path;

/// Threads of one user from a cached snapshot.
#[derive(Debug, Serialize)]
pub struct ThreadsReport {
    /// Viewing user.
    pub user_id: String,
    /// Threads, most unread first.
    pub threads: Vec<MessageThread>,
}

/// Runs the threads command.
pub fn run(path: &Path, user_id: &str) -> Result<ThreadsReport, CliError> {
    let cached = open_cache(path)?
        .load()?
        .ok_or_else(|| CliError::NoCache(path.display().to_string()))?;
    Ok(ThreadsReport {
        user_id: user_id.to_string(),
        threads: message_threads(&cached.snapshot, user_id),
    })
}

/// Prints the report as text.
pub fn print_text(report: &ThreadsReport) {
    println!("Threads for {}", report.user_id);
    if report.threads.is_empty() {
        println!("  (none)");
    }
    for thread in &report.threads {
        let unread = match thread.unread_count {
            0 => String::new(),
            n => format!(" [{n} unread]"),
        };
        println!("  {}{unread}", thread.title);
        println!("    {}", thread.last_message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::test_support::cache_with;
    use pawsync_model::HomeSnapshot;
    use pawsync_testkit::{at, message, GROOMER, OWNER, WALKER};

    #[test]
    fn one_thread_per_counterparty() {
        let snapshot = HomeSnapshot {
            messages: vec![
                message("m1", WALKER, OWNER, "Walk at 9?", at(2026, 2, 27, 8, 0)),
                message("m2", OWNER, WALKER, "Perfect", at(2026, 2, 27, 8, 5)),
                message("m3", GROOMER, OWNER, "Bath booked", at(2026, 2, 26, 12, 0)),
            ],
            ..HomeSnapshot::default()
        };
        let dir = cache_with(&snapshot, &[]);

        let report = run(dir.path(), OWNER).unwrap();
        let mut counterparties: Vec<&str> = report
            .threads
            .iter()
            .map(|t| t.counterparty_user_id.as_str())
            .collect();
        counterparties.sort_unstable();
        assert_eq!(counterparties, vec![GROOMER, WALKER]);

        let walker = report
            .threads
            .iter()
            .find(|t| t.counterparty_user_id == WALKER)
            .unwrap();
        assert_eq!(walker.last_message, "Perfect");
        assert_eq!(walker.unread_count, 1);
    }
}
