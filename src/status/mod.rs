mod inference;

pub use inference::{Signals, StatusInferenceEngine};

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

/// Resolved status of an agent session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Agent is blocked on the user (permission prompt, question)
    NeedsAttention,
    /// Agent is producing output, running tools or compacting
    Working,
    /// Agent finished its turn and is waiting at the prompt
    Ready,
    /// Originating process is gone
    Disconnected,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::NeedsAttention => "needs attention",
            SessionStatus::Working => "working",
            SessionStatus::Ready => "ready",
            SessionStatus::Disconnected => "disconnected",
        }
    }
}

/// Staleness thresholds used by inference and by the registry.
///
/// Values are seconds in the config file. The defaults were tuned against
/// one agent's hook timing and are not hard invariants.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Heartbeat younger than this counts as activity when no lifecycle state is known
    #[serde(deserialize_with = "secs")]
    pub work_grace: Duration,
    /// A dead process only overrides the status once the heartbeat is this old
    #[serde(deserialize_with = "secs")]
    pub liveness_grace: Duration,
    /// Heartbeat must postdate the lifecycle write by this much to prove streaming
    #[serde(deserialize_with = "secs")]
    pub stream_proof: Duration,
    /// Heartbeat silence that ends a proven stream
    #[serde(deserialize_with = "secs")]
    pub stream_stop: Duration,
    /// Dual staleness that ends a silent thinking phase
    #[serde(deserialize_with = "secs")]
    pub think_stale: Duration,
    /// Heartbeat age after which the registry starts checking liveness
    #[serde(deserialize_with = "secs")]
    pub liveness_check: Duration,
    /// Dead sessions older than this are purged
    #[serde(deserialize_with = "secs")]
    pub cleanup: Duration,
    /// Allowed drift between two observations of a process start time
    #[serde(deserialize_with = "secs")]
    pub start_time_epsilon: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            work_grace: Duration::from_secs(3),
            liveness_grace: Duration::from_secs(5),
            stream_proof: Duration::from_secs(2),
            stream_stop: Duration::from_secs(6),
            think_stale: Duration::from_secs(12),
            liveness_check: Duration::from_secs(5),
            cleanup: Duration::from_secs(300),
            start_time_epsilon: Duration::from_secs(1),
        }
    }
}

fn secs<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(value).map_err(serde::de::Error::custom)
}
