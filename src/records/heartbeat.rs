use serde::{Deserialize, Serialize};

use super::{is_valid_session_id, null_as_default, RecordRead};

/// Periodic snapshot written by the status-line probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Heartbeat {
    #[serde(default, alias = "id", deserialize_with = "null_as_default")]
    pub session_id: String,
    /// Name derived from the working directory
    #[serde(default, alias = "display_name", deserialize_with = "null_as_default")]
    pub project_name: String,
    #[serde(default, alias = "working_directory", deserialize_with = "null_as_default")]
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_staged: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_modified: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_untracked: Option<u32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub model: String,
    /// Fraction of the context window in use, may exceed 1.0
    #[serde(default, deserialize_with = "null_as_default")]
    pub context_used_pct: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub context_window_size: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cost_usd: f64,
    /// Seconds since the epoch
    pub last_updated: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_title: Option<String>,
}

impl Heartbeat {
    /// Parse a heartbeat file. `file_id` is the id taken from the file name,
    /// which wins over the embedded `session_id`.
    pub fn parse(raw: &str, file_id: &str) -> RecordRead<Heartbeat> {
        let mut heartbeat: Heartbeat = match serde_json::from_str(raw) {
            Ok(heartbeat) => heartbeat,
            Err(e) => return RecordRead::Malformed(e.to_string()),
        };

        if !heartbeat.last_updated.is_finite() || heartbeat.last_updated <= 0.0 {
            return RecordRead::Malformed(format!(
                "last_updated is not a timestamp: {}",
                heartbeat.last_updated
            ));
        }

        if heartbeat.session_id != file_id {
            if !heartbeat.session_id.is_empty() {
                tracing::debug!(
                    file_id,
                    embedded = %heartbeat.session_id,
                    "heartbeat session id differs from file name"
                );
            }
            heartbeat.session_id = file_id.to_string();
        }

        if !is_valid_session_id(&heartbeat.session_id) {
            return RecordRead::Malformed(format!("invalid session id {file_id:?}"));
        }

        heartbeat.tty = heartbeat.tty.filter(|tty| !tty.trim().is_empty());
        heartbeat.tmux_target = heartbeat.tmux_target.filter(|t| !t.trim().is_empty());
        heartbeat.pid = heartbeat.pid.filter(|pid| *pid > 0);

        RecordRead::Present(heartbeat)
    }

    /// Name to show for the session
    pub fn display_name(&self) -> &str {
        if !self.project_name.is_empty() {
            return &self.project_name;
        }
        if let Some(name) = self.cwd.rsplit('/').find(|part| !part.is_empty()) {
            return name;
        }
        &self.session_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_legacy_keys() {
        let raw = r#"{
            "session_id": "abc",
            "project_name": "beacon",
            "git_branch": "main",
            "model": "Opus",
            "context_used_pct": 0.42,
            "context_window_size": 200000,
            "cost_usd": 1.25,
            "last_updated": 1760000000.5,
            "tty": "/dev/ttys004"
        }"#;

        let heartbeat = Heartbeat::parse(raw, "abc").present().unwrap();
        assert_eq!(heartbeat.project_name, "beacon");
        assert_eq!(heartbeat.git_branch.as_deref(), Some("main"));
        assert_eq!(heartbeat.git_staged, None);
        assert_eq!(heartbeat.context_window_size, 200_000);
        assert_eq!(heartbeat.tty.as_deref(), Some("/dev/ttys004"));
        assert_eq!(heartbeat.pid, None);
    }

    #[test]
    fn test_parse_tolerates_nulls_and_extra_fields() {
        let raw = r#"{"session_id":"abc","project_name":null,"model":null,
            "cost_usd":null,"last_updated":1760000000,"pid":4242,"extra":{"x":1}}"#;
        let heartbeat = Heartbeat::parse(raw, "abc").present().unwrap();
        assert_eq!(heartbeat.project_name, "");
        assert_eq!(heartbeat.cost_usd, 0.0);
        assert_eq!(heartbeat.pid, Some(4242));
    }

    #[test]
    fn test_missing_timestamp_is_malformed() {
        let read = Heartbeat::parse(r#"{"session_id":"abc"}"#, "abc");
        assert!(matches!(read, RecordRead::Malformed(_)));

        let read = Heartbeat::parse(r#"{"session_id":"abc","last_updated":0}"#, "abc");
        assert!(matches!(read, RecordRead::Malformed(_)));
    }

    #[test]
    fn test_truncated_file_is_malformed() {
        let read = Heartbeat::parse(r#"{"session_id":"abc","last_upd"#, "abc");
        assert!(matches!(read, RecordRead::Malformed(_)));
    }

    #[test]
    fn test_file_id_wins() {
        let raw = r#"{"session_id":"other","last_updated":1760000000}"#;
        let heartbeat = Heartbeat::parse(raw, "abc").present().unwrap();
        assert_eq!(heartbeat.session_id, "abc");
    }

    #[test]
    fn test_blank_handles_are_dropped() {
        let raw = r#"{"session_id":"abc","last_updated":1760000000,"tty":"  ","pid":0}"#;
        let heartbeat = Heartbeat::parse(raw, "abc").present().unwrap();
        assert_eq!(heartbeat.tty, None);
        assert_eq!(heartbeat.pid, None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let mut heartbeat = Heartbeat {
            session_id: "abc".to_string(),
            cwd: "/home/elle/code/beacon/".to_string(),
            ..Heartbeat::default()
        };
        assert_eq!(heartbeat.display_name(), "beacon");

        heartbeat.cwd.clear();
        assert_eq!(heartbeat.display_name(), "abc");

        heartbeat.project_name = "named".to_string();
        assert_eq!(heartbeat.display_name(), "named");
    }
}
