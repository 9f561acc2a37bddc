//! Status-line probe: turns the host's status-line JSON into a heartbeat.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::command::stdout_if_success;
use crate::error::{BeaconError, Result};
use crate::records::{is_valid_session_id, now_epoch, Heartbeat, SessionDir};

#[derive(Debug, Default, Deserialize)]
struct StatusInput {
    #[serde(default)]
    session_id: String,
    #[serde(default)]
    model: Option<ModelInfo>,
    #[serde(default)]
    workspace: Option<WorkspaceInfo>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    cost: Option<CostInfo>,
    #[serde(default)]
    context_window: Option<ContextWindowInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct ModelInfo {
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkspaceInfo {
    #[serde(default)]
    current_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CostInfo {
    #[serde(default)]
    total_cost_usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ContextWindowInfo {
    #[serde(default)]
    context_window_size: Option<u64>,
    /// 0-100
    #[serde(default)]
    used_percentage: Option<f64>,
}

/// Branch and working-tree counts for the session's repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsSummary {
    pub branch: Option<String>,
    pub staged: u32,
    pub modified: u32,
    pub untracked: u32,
}

/// Where the agent process lives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessContext {
    pub pid: Option<u32>,
    pub tty: Option<String>,
    pub tmux_target: Option<String>,
}

impl ProcessContext {
    /// The probe's parent is the agent, unless the host ran the probe
    /// through a shell. The terminal comes from `ps`.
    pub async fn detect(timeout: Duration) -> Self {
        let mut pid = std::os::unix::process::parent_id();
        if let Some(grandparent) = shell_parent(pid, timeout).await {
            pid = grandparent;
        }
        let tty = match stdout_if_success("ps", &["-o", "tty=", "-p", &pid.to_string()], timeout)
            .await
        {
            Ok(Some(tty)) => normalize_tty(&tty),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "could not resolve controlling terminal");
                None
            }
        };

        Self {
            pid: Some(pid).filter(|pid| *pid > 1),
            tty,
            tmux_target: std::env::var("TMUX_PANE")
                .ok()
                .filter(|pane| !pane.trim().is_empty()),
        }
    }
}

const SHELLS: [&str; 5] = ["sh", "bash", "zsh", "dash", "fish"];

/// Parent of `pid` when `pid` is a shell wrapper.
async fn shell_parent(pid: u32, timeout: Duration) -> Option<u32> {
    let line = stdout_if_success("ps", &["-o", "ppid=,comm=", "-p", &pid.to_string()], timeout)
        .await
        .ok()
        .flatten()?;
    parse_shell_parent(&line)
}

fn parse_shell_parent(line: &str) -> Option<u32> {
    let mut fields = line.split_whitespace();
    let ppid: u32 = fields.next()?.parse().ok()?;
    let command = fields.next()?;
    let name = command.rsplit('/').next()?.trim_start_matches('-');
    (SHELLS.contains(&name) && ppid > 1).then_some(ppid)
}

fn normalize_tty(raw: &str) -> Option<String> {
    let tty = raw.trim();
    if tty.is_empty() || tty.starts_with('?') {
        return None;
    }
    Some(tty.to_string())
}

/// Count staged, modified and untracked entries in `git status --porcelain`.
pub fn parse_porcelain(output: &str) -> (u32, u32, u32) {
    let mut counts = (0, 0, 0);
    for line in output.lines() {
        let mut chars = line.chars();
        let (Some(index), Some(tree)) = (chars.next(), chars.next()) else {
            continue;
        };
        if index == '?' && tree == '?' {
            counts.2 += 1;
            continue;
        }
        if index != ' ' {
            counts.0 += 1;
        }
        if tree != ' ' {
            counts.1 += 1;
        }
    }
    counts
}

/// `None` outside a repository or when git is unavailable.
pub async fn vcs_summary(cwd: &Path, timeout: Duration) -> Option<VcsSummary> {
    let cwd = cwd.to_str()?;
    let status = match stdout_if_success("git", &["-C", cwd, "status", "--porcelain"], timeout).await
    {
        Ok(Some(status)) => status,
        Ok(None) => return None,
        Err(e) => {
            debug!(error = %e, cwd, "git status failed");
            return None;
        }
    };

    let branch = stdout_if_success(
        "git",
        &["-C", cwd, "rev-parse", "--abbrev-ref", "HEAD"],
        timeout,
    )
    .await
    .ok()
    .flatten()
    .filter(|branch| !branch.is_empty());

    let (staged, modified, untracked) = parse_porcelain(&status);
    Some(VcsSummary {
        branch,
        staged,
        modified,
        untracked,
    })
}

/// Parsed status-line input ready to be combined with local facts
#[derive(Debug)]
pub struct StatusProbe {
    input: StatusInput,
}

impl StatusProbe {
    pub fn parse(raw: &str) -> Result<Self> {
        let input: StatusInput = serde_json::from_str(raw)?;
        if !is_valid_session_id(&input.session_id) {
            return Err(BeaconError::InvalidSessionId(input.session_id));
        }
        Ok(Self { input })
    }

    pub fn session_id(&self) -> &str {
        &self.input.session_id
    }

    pub fn cwd(&self) -> Option<&str> {
        self.input
            .workspace
            .as_ref()
            .and_then(|w| w.current_dir.as_deref())
            .or(self.input.cwd.as_deref())
            .filter(|cwd| !cwd.is_empty())
    }

    /// Build the heartbeat for this probe at time `now`.
    pub fn heartbeat(
        &self,
        vcs: Option<VcsSummary>,
        process: ProcessContext,
        now: f64,
    ) -> Heartbeat {
        let cwd = self.cwd().unwrap_or_default().to_string();
        let project_name = Path::new(&cwd)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let context = self.input.context_window.as_ref();

        Heartbeat {
            session_id: self.input.session_id.clone(),
            project_name,
            cwd,
            git_branch: vcs.as_ref().and_then(|v| v.branch.clone()),
            git_staged: vcs.as_ref().map(|v| v.staged),
            git_modified: vcs.as_ref().map(|v| v.modified),
            git_untracked: vcs.as_ref().map(|v| v.untracked),
            model: self
                .input
                .model
                .as_ref()
                .and_then(|m| m.display_name.clone())
                .unwrap_or_default(),
            context_used_pct: context
                .and_then(|c| c.used_percentage)
                .map(|pct| pct / 100.0)
                .unwrap_or_default(),
            context_window_size: context
                .and_then(|c| c.context_window_size)
                .unwrap_or_default(),
            cost_usd: self
                .input
                .cost
                .as_ref()
                .and_then(|c| c.total_cost_usd)
                .unwrap_or_default(),
            last_updated: now,
            tty: process.tty,
            pid: process.pid,
            tmux_target: process.tmux_target,
            window_title: None,
            tab_title: None,
        }
    }
}

/// One line for the host's status bar
pub fn status_line(heartbeat: &Heartbeat) -> String {
    let mut parts = Vec::new();
    if !heartbeat.model.is_empty() {
        parts.push(heartbeat.model.clone());
    }

    let mut place = heartbeat.project_name.clone();
    if let Some(branch) = &heartbeat.git_branch {
        place.push_str(&format!(" ({branch})"));
    }
    if !place.is_empty() {
        parts.push(place);
    }

    if heartbeat.context_window_size > 0 || heartbeat.context_used_pct > 0.0 {
        parts.push(format!(
            "ctx {:.0}%",
            (heartbeat.context_used_pct * 100.0).max(0.0)
        ));
    }
    parts.push(format!("${:.2}", heartbeat.cost_usd));
    parts.join(" | ")
}

/// Full `statusline` verb: parse stdin, gather local facts, write the
/// heartbeat atomically and return the line to print.
pub async fn run(dir: &SessionDir, raw: &str, timeout: Duration) -> Result<String> {
    let probe = StatusProbe::parse(raw)?;
    let vcs = match probe.cwd() {
        Some(cwd) => vcs_summary(Path::new(cwd), timeout).await,
        None => None,
    };
    let process = ProcessContext::detect(timeout).await;
    let heartbeat = probe.heartbeat(vcs, process, now_epoch());

    dir.ensure()?;
    dir.write_heartbeat(&heartbeat)?;
    debug!(session_id = probe.session_id(), "heartbeat written");
    Ok(status_line(&heartbeat))
}
