//! Heartbeat and lifecycle records as written by the external probe and
//! hook dispatcher, plus the shared directory that holds them.

mod heartbeat;
mod lifecycle;
mod store;

pub use heartbeat::Heartbeat;
pub use lifecycle::{LifecycleRecord, LifecycleState, StampedLifecycle, Subtask};
pub use store::{SessionDir, SessionLock};

use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer};

/// Outcome of reading one record from the shared directory.
///
/// Callers never see a half-parsed record: anything that fails validation
/// is reported as `Malformed` with a reason for the logs.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordRead<T> {
    Present(T),
    Malformed(String),
    Absent,
}

impl<T> RecordRead<T> {
    pub fn present(self) -> Option<T> {
        match self {
            RecordRead::Present(value) => Some(value),
            RecordRead::Malformed(_) | RecordRead::Absent => None,
        }
    }
}

static RE_SESSION_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,127}$").unwrap());

/// Session ids become file names, so only a conservative alphabet is accepted.
pub fn is_valid_session_id(id: &str) -> bool {
    RE_SESSION_ID.is_match(id) && !id.contains("..")
}

/// Current wall-clock time as fractional seconds since the epoch
pub fn now_epoch() -> f64 {
    epoch_seconds(Utc::now())
}

pub fn system_time_epoch(time: SystemTime) -> f64 {
    epoch_seconds(DateTime::<Utc>::from(time))
}

fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_micros() as f64 / 1_000_000.0
}

/// Age of a timestamp, clamped to zero when the writer's clock runs ahead.
pub fn age_since(now: f64, then: f64) -> Duration {
    let delta = now - then;
    if delta.is_finite() && delta > 0.0 {
        Duration::from_secs_f64(delta)
    } else {
        Duration::ZERO
    }
}

/// Treat an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_alphabet() {
        assert!(is_valid_session_id("4f0c2a1e-9b7d-4c11-a3b2-0e5d6f7a8b9c"));
        assert!(is_valid_session_id("session_01.alt"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id(".hidden"));
        assert!(!is_valid_session_id("../escape"));
        assert!(!is_valid_session_id("a/b"));
        assert!(!is_valid_session_id("a..b"));
    }

    #[test]
    fn test_age_clamps_future_timestamps() {
        assert_eq!(age_since(100.0, 150.0), Duration::ZERO);
        assert_eq!(age_since(100.0, 90.0), Duration::from_secs(10));
        assert_eq!(age_since(100.0, f64::NAN), Duration::ZERO);
    }
}
