use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::RecordRead;

/// Last discrete lifecycle state reported by the hook dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Working,
    Idle,
    WaitingPermission,
    WaitingInput,
    Compacting,
}

impl LifecycleState {
    /// Parse a state keyword. Unknown keywords yield `None`, never an error.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        let normalized = keyword.trim().to_ascii_lowercase().replace('-', "_");
        match normalized.as_str() {
            "working" => Some(LifecycleState::Working),
            "idle" => Some(LifecycleState::Idle),
            "waiting_permission" => Some(LifecycleState::WaitingPermission),
            "waiting_input" => Some(LifecycleState::WaitingInput),
            "compacting" => Some(LifecycleState::Compacting),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Working => "working",
            LifecycleState::Idle => "idle",
            LifecycleState::WaitingPermission => "waiting_permission",
            LifecycleState::WaitingInput => "waiting_input",
            LifecycleState::Compacting => "compacting",
        }
    }
}

/// A concurrently running sub-agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtask {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Contents of a session's lifecycle file
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LifecycleRecord {
    pub state: Option<LifecycleState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(rename = "agents")]
    pub subtasks: Vec<Subtask>,
    /// When the last permission prompt was raised, in seconds since the epoch
    #[serde(
        rename = "permission_prompted_at",
        skip_serializing_if = "Option::is_none"
    )]
    pub prompted_at: Option<f64>,
}

/// A lifecycle record together with the time its file was last written
#[derive(Debug, Clone, PartialEq)]
pub struct StampedLifecycle {
    pub record: LifecycleRecord,
    /// Seconds since the epoch
    pub written_at: f64,
}

impl LifecycleRecord {
    pub fn with_state(state: LifecycleState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    /// Parse a lifecycle file: a JSON object first, then a bare keyword.
    pub fn parse(raw: &str) -> RecordRead<LifecycleRecord> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return RecordRead::Malformed("empty lifecycle file".to_string());
        }

        let keyword = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(map)) => return RecordRead::Present(Self::from_object(&map)),
            Ok(Value::String(keyword)) => keyword,
            _ => trimmed.to_string(),
        };

        match LifecycleState::from_keyword(&keyword) {
            Some(state) => RecordRead::Present(Self::with_state(state)),
            None => RecordRead::Malformed(format!(
                "unrecognised lifecycle content ({} bytes)",
                trimmed.len()
            )),
        }
    }

    fn from_object(map: &Map<String, Value>) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| map.get(*key))
                .filter_map(Value::as_str)
                .map(str::trim)
                .find(|value| !value.is_empty())
                .map(str::to_string)
        };

        let subtasks = map
            .get("agents")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| {
                        let id = entry.get("id")?.as_str()?.trim();
                        if id.is_empty() {
                            return None;
                        }
                        let kind = ["type", "kind"]
                            .iter()
                            .find_map(|key| entry.get(*key).and_then(Value::as_str))
                            .unwrap_or_default();
                        Some(Subtask {
                            id: id.to_string(),
                            kind: kind.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            state: map
                .get("state")
                .and_then(Value::as_str)
                .and_then(LifecycleState::from_keyword),
            context: text(&["context"]),
            last_message: text(&["last_message", "lastMessage"]),
            subtasks,
            prompted_at: map.get("permission_prompted_at").and_then(Value::as_f64),
        }
    }

    /// Fold this (newer) record over `previous`: blank text fields keep the
    /// previous value, state and subtasks always come from the newer record.
    pub fn merged_with(mut self, previous: &LifecycleRecord) -> LifecycleRecord {
        if is_blank(&self.context) {
            self.context = previous.context.clone().filter(|c| !c.trim().is_empty());
        }
        if is_blank(&self.last_message) {
            self.last_message = previous
                .last_message
                .clone()
                .filter(|m| !m.trim().is_empty());
        }
        self
    }

    /// Transition to `state`. Going idle drops every subtask in case a stop
    /// event was missed.
    pub fn set_state(&mut self, state: LifecycleState) {
        self.state = Some(state);
        if state == LifecycleState::Idle {
            self.subtasks.clear();
        }
    }

    pub fn start_subtask(&mut self, id: &str, kind: &str) {
        self.subtasks.retain(|subtask| subtask.id != id);
        self.subtasks.push(Subtask {
            id: id.to_string(),
            kind: kind.to_string(),
        });
    }

    pub fn stop_subtask(&mut self, id: &str) {
        self.subtasks.retain(|subtask| subtask.id != id);
    }

    pub fn has_active_subtasks(&self) -> bool {
        !self.subtasks.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}
