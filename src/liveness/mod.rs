//! Is the agent process behind a session still running?

mod checker;
mod ps;

pub use checker::{LivenessChecker, StartTimeCache};
pub use ps::PsProcessTable;

use std::future::Future;

use crate::error::Result;

/// What the process table reports about one pid
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessInfo {
    pub ppid: u32,
    /// Seconds since the epoch
    pub started_at: f64,
}

/// Read access to the OS process table.
///
/// Queries are expensive; the registry rate-limits them.
pub trait ProcessTable: Send + Sync + 'static {
    /// `Ok(None)` when no process has this pid.
    fn process(&self, pid: u32) -> impl Future<Output = Result<Option<ProcessInfo>>> + Send;

    /// Command names of the processes attached to a terminal.
    fn terminal_commands(&self, tty: &str) -> impl Future<Output = Result<Vec<String>>> + Send;
}
