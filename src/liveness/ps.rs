use std::time::Duration;

use chrono::{Local, NaiveDateTime, TimeZone};

use super::{ProcessInfo, ProcessTable};
use crate::command::run_bounded;
use crate::error::{BeaconError, Result};

/// Process table backed by the `ps` command
#[derive(Debug, Clone)]
pub struct PsProcessTable {
    /// Path to ps binary
    ps_path: String,
    timeout: Duration,
}

impl PsProcessTable {
    pub fn new(timeout: Duration) -> Self {
        Self {
            ps_path: "ps".to_string(),
            timeout,
        }
    }
}

impl Default for PsProcessTable {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl ProcessTable for PsProcessTable {
    async fn process(&self, pid: u32) -> Result<Option<ProcessInfo>> {
        let pid = pid.to_string();
        let output = run_bounded(
            &self.ps_path,
            &["-o", "ppid=,lstart=", "-p", &pid],
            self.timeout,
        )
        .await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_process_output(&stdout).ok_or_else(|| BeaconError::UnexpectedOutput {
            program: self.ps_path.clone(),
            output: stdout.trim().to_string(),
        })
    }

    async fn terminal_commands(&self, tty: &str) -> Result<Vec<String>> {
        let tty = tty.strip_prefix("/dev/").unwrap_or(tty);
        let output = run_bounded(&self.ps_path, &["-t", tty, "-o", "comm="], self.timeout).await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

/// ps exits non-zero with empty output when the pid does not exist. Any
/// row that cannot be read yields `None` rather than "not found".
fn parse_process_output(stdout: &str) -> Option<Option<ProcessInfo>> {
    match stdout.lines().map(str::trim).find(|line| !line.is_empty()) {
        None => Some(None),
        Some(line) => parse_process_line(line).map(Some),
    }
}

/// Parse `<ppid> <lstart>`, e.g. `    1 Thu Oct  8 09:05:01 2026`.
fn parse_process_line(line: &str) -> Option<ProcessInfo> {
    let mut fields = line.split_whitespace();
    let ppid = fields.next()?.parse().ok()?;
    let lstart = fields.collect::<Vec<_>>().join(" ");
    let naive = NaiveDateTime::parse_from_str(&lstart, "%a %b %e %H:%M:%S %Y").ok()?;
    let started = Local.from_local_datetime(&naive).earliest()?;
    Some(ProcessInfo {
        ppid,
        started_at: started.timestamp() as f64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::liveness::{LivenessChecker, StartTimeCache};

    #[test]
    fn test_parse_process_line() {
        let info = parse_process_line("  4242 Thu Oct  8 09:05:01 2026").unwrap();
        assert_eq!(info.ppid, 4242);

        let expected = Local
            .with_ymd_and_hms(2026, 10, 8, 9, 5, 1)
            .earliest()
            .unwrap()
            .timestamp() as f64;
        assert_eq!(info.started_at, expected);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(parse_process_line(""), None);
        assert_eq!(parse_process_line("PPID STARTED"), None);
        assert_eq!(parse_process_line("1 yesterday"), None);
    }

    #[test]
    fn test_empty_output_means_no_process() {
        assert_eq!(parse_process_output(""), Some(None));
        assert_eq!(parse_process_output("\n  \n"), Some(None));
        assert!(matches!(
            parse_process_output("   50 Thu Oct  8 09:05:01 2026\n"),
            Some(Some(ProcessInfo { ppid: 50, .. }))
        ));
        assert_eq!(parse_process_output("   50 2026-10-08T09:05:01"), None);
    }

    #[tokio::test]
    async fn test_unreadable_row_counts_as_alive() {
        // `echo` prints its arguments: a non-empty row ps would never produce
        let table = PsProcessTable {
            ps_path: "echo".to_string(),
            timeout: Duration::from_secs(2),
        };
        assert!(matches!(
            table.process(4242).await,
            Err(BeaconError::UnexpectedOutput { .. })
        ));

        let checker = LivenessChecker::new(table, "claude", Duration::from_secs(1));
        let mut cache = StartTimeCache::default();
        assert!(checker.is_alive(Some(4242), None, &mut cache).await);
    }
}
