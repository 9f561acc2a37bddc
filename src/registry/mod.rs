//! Session registry: scans the shared directory, resolves every session's
//! status and publishes an ordered, deduplicated list to consumers.

mod loader;
mod view;
mod worker;

pub use loader::{run_cycle, CycleOutcome, RegistryState};
pub use view::{format_age, SessionView};
pub use worker::Registry;

use std::time::Duration;

use crate::status::Thresholds;

/// Scheduling knobs for the refresh worker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegistrySettings {
    pub thresholds: Thresholds,
    /// Fast tier: plain rescans
    pub refresh_interval: Duration,
    /// Slow tier: rescans that also recheck process liveness
    pub liveness_interval: Duration,
    /// Quiet period after a filesystem event before rescanning
    pub watch_debounce: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            thresholds: Thresholds::default(),
            refresh_interval: Duration::from_secs(2),
            liveness_interval: Duration::from_secs(7),
            watch_debounce: Duration::from_millis(150),
        }
    }
}
