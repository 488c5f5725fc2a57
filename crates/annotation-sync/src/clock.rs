use std::time::Duration;

use crate::persistence::BoxFuture;

/// Source of the playback position.
pub trait PlaybackClock: Send + Sync {
    /// Position as reported by the player itself. May answer late or not at
    /// all.
    fn query_position(&self) -> BoxFuture<'_, Option<f64>>;

    /// Locally tracked position. Always available, lower fidelity.
    fn local_position(&self) -> f64;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
#[serde(rename_all = "camelCase")]
pub enum TimeSource {
    Authoritative,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[cfg_attr(feature = "specta", derive(specta::Type))]
pub struct TimeReading {
    pub seconds: f64,
    pub source: TimeSource,
}

/// Race the authoritative query against `deadline`, falling back to the
/// local position when it loses or answers with nothing usable.
pub async fn read_position(clock: &dyn PlaybackClock, deadline: Duration) -> TimeReading {
    match tokio::time::timeout(deadline, clock.query_position()).await {
        Ok(Some(seconds)) if seconds.is_finite() => TimeReading {
            seconds,
            source: TimeSource::Authoritative,
        },
        Ok(_) => {
            tracing::debug!("time_query_unavailable");
            fallback(clock)
        }
        Err(_) => {
            tracing::debug!(deadline_ms = deadline.as_millis() as u64, "time_query_timed_out");
            fallback(clock)
        }
    }
}

fn fallback(clock: &dyn PlaybackClock) -> TimeReading {
    TimeReading {
        seconds: clock.local_position(),
        source: TimeSource::Fallback,
    }
}
