use std::time::Duration;

use serde::Deserialize;

fn default_stale_after_secs() -> u64 {
    30
}

fn default_time_query_timeout_ms() -> u64 {
    150
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Cached entries older than this are served, then refreshed in the
    /// background.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
    /// Deadline for the authoritative playback-position query before the
    /// local position is used instead.
    #[serde(default = "default_time_query_timeout_ms")]
    pub time_query_timeout_ms: u64,
}

impl SyncConfig {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn time_query_timeout(&self) -> Duration {
        Duration::from_millis(self.time_query_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            time_query_timeout_ms: default_time_query_timeout_ms(),
        }
    }
}
