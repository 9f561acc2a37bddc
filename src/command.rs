use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{BeaconError, Result};

/// Run an external program with a hard deadline.
///
/// The child is killed if the deadline passes, so a hung `ps` or `tmux`
/// can never stall the caller.
pub async fn run_bounded(program: &str, args: &[&str], timeout: Duration) -> Result<Output> {
    let child = Command::new(program)
        .args(args)
        // Keep `ps` dates and tool messages in a parseable form.
        .env("LC_ALL", "C")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(timeout, child).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(BeaconError::CommandSpawn {
            program: program.to_string(),
            source,
        }),
        Err(_) => Err(BeaconError::CommandTimeout {
            program: program.to_string(),
            timeout,
        }),
    }
}

/// Trimmed stdout of a successful run, `None` when the program exited non-zero.
pub async fn stdout_if_success(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Option<String>> {
    let output = run_bounded(program, args, timeout).await?;
    if !output.status.success() {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
}
