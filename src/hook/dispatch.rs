use std::time::Duration;

use tracing::debug;

use super::{HookEvent, HookPayload};
use crate::error::Result;
use crate::records::{
    age_since, now_epoch, LifecycleRecord, LifecycleState, SessionDir, StampedLifecycle,
};

/// How long a hook waits for another hook of the same session
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(2);

/// A permission notification is dropped as stale when the session moved on
/// from a prompt raised less than this long ago.
pub const LATE_NOTIFICATION_WINDOW: Duration = Duration::from_secs(10);

/// Applies hook events to a session's lifecycle file
#[derive(Debug, Clone)]
pub struct Dispatcher {
    dir: SessionDir,
    lock_timeout: Duration,
}

impl Dispatcher {
    pub fn new(dir: SessionDir) -> Self {
        Self {
            dir,
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Apply one event under the session lock. Returns the record written,
    /// or `None` when the event was suppressed.
    pub fn dispatch(
        &self,
        event: HookEvent,
        payload: &HookPayload,
    ) -> Result<Option<LifecycleRecord>> {
        let id = payload.session_id.as_str();
        self.dir.ensure()?;
        let _lock = self.dir.lock_session(id, self.lock_timeout)?;

        let previous = self.dir.read_lifecycle_blocking(id).present();
        let Some(next) = transition(event, payload, previous.as_ref(), now_epoch()) else {
            debug!(session_id = id, ?event, "hook event suppressed");
            return Ok(None);
        };

        self.dir.write_lifecycle(id, &next)?;
        debug!(session_id = id, ?event, state = ?next.state, "lifecycle updated");
        Ok(Some(next))
    }
}

/// Compute the record an event produces on top of `previous`. `now` is in
/// seconds since the epoch.
pub fn transition(
    event: HookEvent,
    payload: &HookPayload,
    previous: Option<&StampedLifecycle>,
    now: f64,
) -> Option<LifecycleRecord> {
    let base = previous.map(|p| p.record.clone()).unwrap_or_default();
    let mut next = LifecycleRecord {
        state: base.state,
        context: None,
        last_message: None,
        subtasks: base.subtasks.clone(),
        prompted_at: base.prompted_at,
    };

    match event {
        HookEvent::SessionStart => {
            return Some(LifecycleRecord::with_state(LifecycleState::Idle));
        }
        HookEvent::PromptSubmit | HookEvent::PostToolUse => {
            next.set_state(LifecycleState::Working);
        }
        HookEvent::PreToolUse => {
            next.set_state(LifecycleState::Working);
            next.context = payload.tool_context();
        }
        HookEvent::PermissionRequest => {
            next.set_state(LifecycleState::WaitingPermission);
            next.context = payload.tool_context();
            next.prompted_at = Some(now);
        }
        HookEvent::Notification => {
            if payload.is_permission_notification() {
                if arrived_late(previous, now) {
                    return None;
                }
                next.set_state(LifecycleState::WaitingPermission);
                next.prompted_at = Some(now);
            } else {
                next.set_state(LifecycleState::WaitingInput);
            }
            next.last_message = payload.message.clone();
        }
        HookEvent::PreCompact => next.set_state(LifecycleState::Compacting),
        HookEvent::Stop => {
            next.set_state(LifecycleState::Idle);
            next.last_message = payload.last_assistant_message.clone();
        }
        HookEvent::SubagentStart => {
            if let Some(id) = payload.agent_id.as_deref().filter(|id| !id.is_empty()) {
                next.start_subtask(id, payload.agent_type.as_deref().unwrap_or_default());
            }
            next.set_state(LifecycleState::Working);
        }
        HookEvent::SubagentStop => {
            if let Some(id) = payload.agent_id.as_deref() {
                next.stop_subtask(id);
            }
        }
    }

    Some(next.merged_with(&base))
}

/// A permission notification is stale when it echoes a prompt that was
/// raised recently and has since been answered. With no recent prompt on
/// record it is genuine, whatever the current state.
fn arrived_late(previous: Option<&StampedLifecycle>, now: f64) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    let Some(prompted_at) = previous.record.prompted_at else {
        return false;
    };
    let moved_on = matches!(
        previous.record.state,
        Some(LifecycleState::Working | LifecycleState::Idle | LifecycleState::Compacting)
    );
    moved_on && age_since(now, prompted_at) < LATE_NOTIFICATION_WINDOW
}
