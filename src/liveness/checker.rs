use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use super::ProcessTable;

/// Start times observed per pid, used to detect pid reuse between checks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StartTimeCache {
    entries: HashMap<u32, f64>,
}

impl StartTimeCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries for pids nobody references any more.
    pub fn retain_pids(&mut self, mut keep: impl FnMut(u32) -> bool) {
        self.entries.retain(|pid, _| keep(*pid));
    }
}

/// Decides whether a session's originating process still runs
#[derive(Debug, Clone)]
pub struct LivenessChecker<P> {
    table: P,
    /// Executable name searched for on the terminal when no pid is known
    agent_name: String,
    epsilon: Duration,
}

impl<P: ProcessTable> LivenessChecker<P> {
    pub fn new(table: P, agent_name: impl Into<String>, epsilon: Duration) -> Self {
        Self {
            table,
            agent_name: agent_name.into(),
            epsilon,
        }
    }

    pub fn table(&self) -> &P {
        &self.table
    }

    /// Query the process table. Errors and timeouts count as alive.
    pub async fn is_alive(
        &self,
        pid: Option<u32>,
        tty: Option<&str>,
        cache: &mut StartTimeCache,
    ) -> bool {
        match (pid, tty) {
            (Some(pid), _) => self.pid_alive(pid, cache).await,
            (None, Some(tty)) => self.terminal_alive(tty).await,
            (None, None) => true,
        }
    }

    async fn pid_alive(&self, pid: u32, cache: &mut StartTimeCache) -> bool {
        let info = match self.table.process(pid).await {
            Ok(Some(info)) => info,
            Ok(None) => {
                debug!(pid, "process not found");
                cache.entries.remove(&pid);
                return false;
            }
            Err(e) => {
                debug!(pid, error = %e, "process query failed, assuming alive");
                return true;
            }
        };

        // Reparented to init: the terminal that spawned it has exited.
        if info.ppid == 1 {
            debug!(pid, "process orphaned");
            cache.entries.remove(&pid);
            return false;
        }

        match cache.entries.get(&pid) {
            Some(&known) if (known - info.started_at).abs() > self.epsilon.as_secs_f64() => {
                debug!(
                    pid,
                    known_start = known,
                    current_start = info.started_at,
                    "start time mismatch, pid reused"
                );
                cache.entries.remove(&pid);
                false
            }
            Some(_) => true,
            None => {
                cache.entries.insert(pid, info.started_at);
                true
            }
        }
    }

    async fn terminal_alive(&self, tty: &str) -> bool {
        match self.table.terminal_commands(tty).await {
            Ok(commands) => commands
                .iter()
                .any(|command| command.contains(self.agent_name.as_str())),
            Err(e) => {
                debug!(tty, error = %e, "terminal query failed, assuming alive");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::fake::FakeProcessTable;

    fn checker() -> LivenessChecker<FakeProcessTable> {
        LivenessChecker::new(FakeProcessTable::default(), "claude", Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_running_process_is_alive_and_cached() {
        let checker = checker();
        checker.table().spawn(100, 50, 1000.0);
        let mut cache = StartTimeCache::default();

        assert!(checker.is_alive(Some(100), None, &mut cache).await);
        assert_eq!(cache.len(), 1);
        assert!(checker.is_alive(Some(100), None, &mut cache).await);
    }

    #[tokio::test]
    async fn test_missing_process_is_dead() {
        let checker = checker();
        let mut cache = StartTimeCache::default();
        assert!(!checker.is_alive(Some(100), Some("/dev/pts/1"), &mut cache).await);
    }

    #[tokio::test]
    async fn test_reused_pid_is_dead() {
        let checker = checker();
        checker.table().spawn(100, 50, 1000.0);
        let mut cache = StartTimeCache::default();
        assert!(checker.is_alive(Some(100), None, &mut cache).await);

        checker.table().spawn(100, 77, 1500.0);
        assert!(!checker.is_alive(Some(100), None, &mut cache).await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_start_time_jitter_within_epsilon() {
        let checker = checker();
        checker.table().spawn(100, 50, 1000.0);
        let mut cache = StartTimeCache::default();
        assert!(checker.is_alive(Some(100), None, &mut cache).await);

        checker.table().spawn(100, 50, 1000.8);
        assert!(checker.is_alive(Some(100), None, &mut cache).await);
    }

    #[tokio::test]
    async fn test_orphaned_process_is_dead() {
        let checker = checker();
        checker.table().spawn(100, 1, 1000.0);
        let mut cache = StartTimeCache::default();
        assert!(!checker.is_alive(Some(100), None, &mut cache).await);
    }

    #[tokio::test]
    async fn test_query_failure_fails_open() {
        let checker = checker();
        checker.table().hang(true);
        let mut cache = StartTimeCache::default();
        assert!(checker.is_alive(Some(100), None, &mut cache).await);
        assert!(checker.is_alive(None, Some("/dev/pts/1"), &mut cache).await);
    }

    #[tokio::test]
    async fn test_terminal_fallback_matches_agent_name() {
        let checker = checker();
        let mut cache = StartTimeCache::default();
        checker.table().attach("/dev/pts/1", "zsh");
        assert!(!checker.is_alive(None, Some("/dev/pts/1"), &mut cache).await);

        checker.table().attach("/dev/pts/1", "claude-code");
        assert!(checker.is_alive(None, Some("/dev/pts/1"), &mut cache).await);
    }

    #[tokio::test]
    async fn test_no_handle_is_assumed_alive() {
        let checker = checker();
        let mut cache = StartTimeCache::default();
        assert!(checker.is_alive(None, None, &mut cache).await);
        assert_eq!(checker.table().queries(), 0);
    }
}
