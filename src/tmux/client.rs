use std::time::Duration;

use crate::command::run_bounded;
use crate::error::{BeaconError, Result};

/// Client for interacting with tmux via CLI
#[derive(Debug, Clone)]
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    timeout: Duration,
}

impl TmuxClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            tmux_path: "tmux".to_string(),
            timeout,
        }
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.tmux_path = path.into();
        self
    }

    /// Whether a tmux server answers `list-sessions`
    pub async fn is_server_running(&self) -> bool {
        run_bounded(&self.tmux_path, &["list-sessions"], self.timeout)
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Bring the pane `target` (e.g. `%7` or `work:1.0`) to the foreground.
    ///
    /// `switch-client` only succeeds when called from inside tmux; outside it
    /// the window and pane are still selected for the next attach.
    pub async fn focus_pane(&self, target: &str) -> Result<()> {
        if let Err(e) = self.tmux(&["switch-client", "-t", target]).await {
            tracing::debug!(pane = target, error = %e, "switch-client failed");
        }
        self.tmux(&["select-window", "-t", target]).await?;
        self.tmux(&["select-pane", "-t", target]).await
    }

    /// Get the command to attach to a pane's session (for external execution)
    pub fn attach_command(&self, target: &str) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            target.to_string(),
        ]
    }

    async fn tmux(&self, args: &[&str]) -> Result<()> {
        let output = run_bounded(&self.tmux_path, args, self.timeout).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(BeaconError::Tmux {
            command: args.first().copied().unwrap_or_default().to_string(),
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}
