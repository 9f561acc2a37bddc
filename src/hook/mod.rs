//! Lifecycle dispatcher invoked by the agent's hook mechanism.
//!
//! Each invocation turns one named event plus its JSON payload into a new
//! lifecycle record for the session, merged over the previous one.

mod dispatch;
mod payload;

pub use dispatch::{transition, Dispatcher, LATE_NOTIFICATION_WINDOW};
pub use payload::HookPayload;

/// Hook events understood by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    SessionStart,
    PromptSubmit,
    PreToolUse,
    PostToolUse,
    PermissionRequest,
    Notification,
    PreCompact,
    Stop,
    SubagentStart,
    SubagentStop,
}

impl HookEvent {
    /// Accepts both kebab-case (`pre-tool-use`) and the host's CamelCase
    /// (`PreToolUse`) names.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "sessionstart" => Some(HookEvent::SessionStart),
            "promptsubmit" | "userpromptsubmit" => Some(HookEvent::PromptSubmit),
            "pretooluse" => Some(HookEvent::PreToolUse),
            "posttooluse" => Some(HookEvent::PostToolUse),
            "permissionrequest" => Some(HookEvent::PermissionRequest),
            "notification" => Some(HookEvent::Notification),
            "precompact" => Some(HookEvent::PreCompact),
            "stop" => Some(HookEvent::Stop),
            "subagentstart" => Some(HookEvent::SubagentStart),
            "subagentstop" => Some(HookEvent::SubagentStop),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        assert_eq!(HookEvent::from_name("pre-tool-use"), Some(HookEvent::PreToolUse));
        assert_eq!(HookEvent::from_name("PreToolUse"), Some(HookEvent::PreToolUse));
        assert_eq!(
            HookEvent::from_name("UserPromptSubmit"),
            Some(HookEvent::PromptSubmit)
        );
        assert_eq!(
            HookEvent::from_name("subagent_stop"),
            Some(HookEvent::SubagentStop)
        );
        assert_eq!(HookEvent::from_name("SessionEnd"), None);
    }
}
