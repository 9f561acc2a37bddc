use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::records::{Heartbeat, LifecycleRecord};
use crate::status::SessionStatus;

/// Read-only projection of one session, rebuilt every refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub id: String,
    pub heartbeat: Heartbeat,
    pub lifecycle: Option<LifecycleRecord>,
    pub status: SessionStatus,
    pub process_alive: bool,
    /// Heartbeat age at the time of the cycle
    #[serde(rename = "last_seen_secs", serialize_with = "as_secs")]
    pub last_seen_age: Duration,
}

impl SessionView {
    pub fn display_name(&self) -> &str {
        self.heartbeat.display_name()
    }

    pub fn last_seen_label(&self) -> String {
        format_age(self.last_seen_age)
    }

    /// Context window usage, e.g. `42%`
    pub fn context_label(&self) -> Option<String> {
        let used = self.heartbeat.context_used_pct;
        if !used.is_finite() || (used <= 0.0 && self.heartbeat.context_window_size == 0) {
            return None;
        }
        Some(format!("{:.0}%", used * 100.0))
    }

    pub fn cost_label(&self) -> String {
        format!("${:.2}", self.heartbeat.cost_usd.max(0.0))
    }

    /// Branch plus working tree counts, e.g. `main +2 ~1 ?3`
    pub fn vcs_label(&self) -> Option<String> {
        let branch = self.heartbeat.git_branch.as_deref()?;
        let mut label = branch.to_string();
        for (marker, count) in [
            ('+', self.heartbeat.git_staged),
            ('~', self.heartbeat.git_modified),
            ('?', self.heartbeat.git_untracked),
        ] {
            if let Some(count) = count.filter(|c| *c > 0) {
                label.push_str(&format!(" {marker}{count}"));
            }
        }
        Some(label)
    }

    pub fn context(&self) -> Option<&str> {
        self.lifecycle.as_ref()?.context.as_deref()
    }

    pub fn last_message(&self) -> Option<&str> {
        self.lifecycle.as_ref()?.last_message.as_deref()
    }
}

/// Relative age such as `just now`, `42s ago` or `3h ago`
pub fn format_age(age: Duration) -> String {
    let secs = age.as_secs();
    match secs {
        0..=4 => "just now".to_string(),
        5..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

fn as_secs<S: Serializer>(age: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(age.as_secs_f64())
}
