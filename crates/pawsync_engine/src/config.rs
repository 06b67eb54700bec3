//! Configuration for the engine.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Deployment tier the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Environment {
    /// Local development backend.
    #[default]
    Dev,
    /// Pre-release backend.
    Staging,
    /// Production backend.
    Prod,
}

impl Environment {
    /// Short name of the tier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

/// Configuration passed to every engine component at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Backend tier.
    pub environment: Environment,
    /// Serve persisted data only and keep every write local.
    pub use_mock_data: bool,
    /// Tiers whose failed writes fall back to local entities.
    pub low_trust: Vec<Environment>,
    /// Lifetime of a slot hold.
    pub hold_ttl: Duration,
    /// Quiet period before a search-driven sync runs.
    pub search_debounce: Duration,
    /// Days of posts considered for the pet roster.
    pub roster_window_days: u32,
    /// Roster entries shown.
    pub roster_display_count: usize,
    /// Days of calendar fetched from today.
    pub calendar_horizon_days: u32,
    /// Blob key of the cached snapshot.
    pub snapshot_key: String,
    /// Blob key of persisted pending writes.
    pub pending_key: String,
}

impl EngineConfig {
    /// Creates a configuration for the given tier with default tuning.
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            use_mock_data: false,
            low_trust: vec![Environment::Dev],
            hold_ttl: Duration::from_secs(15 * 60),
            search_debounce: Duration::from_millis(300),
            roster_window_days: 7,
            roster_display_count: 8,
            calendar_horizon_days: 30,
            snapshot_key: "home_snapshot.latest".to_string(),
            pending_key: "pending_writes".to_string(),
        }
    }

    /// Enables or disables mock-data mode.
    pub fn with_mock_data(mut self, enabled: bool) -> Self {
        self.use_mock_data = enabled;
        self
    }

    /// Sets the low-trust tiers.
    pub fn with_low_trust(mut self, tiers: impl Into<Vec<Environment>>) -> Self {
        self.low_trust = tiers.into();
        self
    }

    /// Sets the hold lifetime.
    pub fn with_hold_ttl(mut self, ttl: Duration) -> Self {
        self.hold_ttl = ttl;
        self
    }

    /// Sets the search debounce.
    pub fn with_search_debounce(mut self, debounce: Duration) -> Self {
        self.search_debounce = debounce;
        self
    }

    /// Sets the roster window and display count.
    pub fn with_roster(mut self, window_days: u32, display_count: usize) -> Self {
        self.roster_window_days = window_days;
        self.roster_display_count = display_count;
        self
    }

    /// Sets the calendar horizon.
    pub fn with_calendar_horizon_days(mut self, days: u32) -> Self {
        self.calendar_horizon_days = days;
        self
    }

    /// Sets the blob keys used for the snapshot and pending writes.
    pub fn with_keys(
        mut self,
        snapshot_key: impl Into<String>,
        pending_key: impl Into<String>,
    ) -> Self {
        self.snapshot_key = snapshot_key.into();
        self.pending_key = pending_key.into();
        self
    }

    /// Returns true if the current tier is designated low-trust.
    pub fn is_low_trust(&self) -> bool {
        self.low_trust.contains(&self.environment)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new(Environment::Dev)
    }
}
