use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;

const CONTEXT_MAX_CHARS: usize = 80;

/// Tool input keys that best describe what a tool is doing, most specific first
const ARGUMENT_KEYS: [&str; 6] = [
    "command",
    "file_path",
    "pattern",
    "url",
    "description",
    "prompt",
];

/// JSON payload the host passes to a hook on stdin
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookPayload {
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_input: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub notification_type: Option<String>,
    #[serde(default, alias = "subagent_id")]
    pub agent_id: Option<String>,
    #[serde(default, alias = "subagent_type")]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub last_assistant_message: Option<String>,
}

impl HookPayload {
    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Short description of the current tool call, e.g. `Bash: cargo test`
    pub fn tool_context(&self) -> Option<String> {
        let tool = self.tool_name.as_deref()?.trim();
        if tool.is_empty() {
            return None;
        }

        let argument = self.tool_input.as_ref().and_then(|input| {
            ARGUMENT_KEYS
                .iter()
                .filter_map(|key| input.get(*key).and_then(Value::as_str))
                .map(|value| value.lines().next().unwrap_or_default().trim())
                .find(|value| !value.is_empty())
        });

        let context = match argument {
            Some(argument) => format!("{tool}: {argument}"),
            None => tool.to_string(),
        };
        Some(truncate(&context, CONTEXT_MAX_CHARS))
    }

    /// Whether a notification is about a permission prompt
    pub fn is_permission_notification(&self) -> bool {
        if let Some(kind) = self.notification_type.as_deref() {
            return kind.eq_ignore_ascii_case("permission_prompt");
        }
        self.message
            .as_deref()
            .is_some_and(|message| message.to_ascii_lowercase().contains("permission"))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars - 1).collect();
    truncated.push('…');
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(raw: &str) -> HookPayload {
        HookPayload::parse(raw).unwrap()
    }

    #[test]
    fn test_tool_context_prefers_command() {
        let p = payload(
            r#"{"session_id":"a","tool_name":"Bash",
                "tool_input":{"description":"run tests","command":"cargo test\n--all"}}"#,
        );
        assert_eq!(p.tool_context().as_deref(), Some("Bash: cargo test"));
    }

    #[test]
    fn test_tool_context_without_argument() {
        let p = payload(r#"{"session_id":"a","tool_name":"TodoWrite","tool_input":{"todos":[]}}"#);
        assert_eq!(p.tool_context().as_deref(), Some("TodoWrite"));
        assert_eq!(payload(r#"{"session_id":"a"}"#).tool_context(), None);
    }

    #[test]
    fn test_tool_context_truncated() {
        let long = "x".repeat(200);
        let raw = format!(
            r#"{{"session_id":"a","tool_name":"Read","tool_input":{{"file_path":"{long}"}}}}"#
        );
        let context = payload(&raw).tool_context().unwrap();
        assert_eq!(context.chars().count(), CONTEXT_MAX_CHARS);
        assert!(context.ends_with('…'));
    }

    #[test]
    fn test_permission_notification_detection() {
        assert!(payload(r#"{"notification_type":"permission_prompt"}"#)
            .is_permission_notification());
        assert!(!payload(r#"{"notification_type":"idle_prompt","message":"permission"}"#)
            .is_permission_notification());
        assert!(payload(r#"{"message":"Claude needs your permission to use Bash"}"#)
            .is_permission_notification());
        assert!(!payload(r#"{"message":"Claude is waiting for your input"}"#)
            .is_permission_notification());
    }

    #[test]
    fn test_subagent_aliases() {
        let p = payload(r#"{"session_id":"a","subagent_id":"s1","subagent_type":"explore"}"#);
        assert_eq!(p.agent_id.as_deref(), Some("s1"));
        assert_eq!(p.agent_type.as_deref(), Some("explore"));
    }
}
