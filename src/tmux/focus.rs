use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::TmuxClient;
use crate::registry::SessionView;

/// Fire-and-forget focus of a session's pane.
///
/// Returns `None` when the session has no multiplexer target. The spawned
/// task logs and swallows every failure.
pub fn focus_session(client: &TmuxClient, view: &SessionView) -> Option<JoinHandle<()>> {
    let Some(target) = view.heartbeat.tmux_target.clone() else {
        debug!(session_id = %view.id, "no tmux target to focus");
        return None;
    };

    let client = client.clone();
    let session = view.id.clone();
    Some(tokio::spawn(async move {
        match client.focus_pane(&target).await {
            Ok(()) => debug!(session_id = %session, pane = %target, "focused pane"),
            Err(e) => warn!(session_id = %session, pane = %target, error = %e, "focus failed"),
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::Heartbeat;
    use crate::status::SessionStatus;
    use std::time::Duration;

    fn view(target: Option<&str>) -> SessionView {
        SessionView {
            id: "s1".into(),
            heartbeat: Heartbeat {
                session_id: "s1".into(),
                tmux_target: target.map(str::to_string),
                last_updated: 1.0,
                ..Heartbeat::default()
            },
            lifecycle: None,
            status: SessionStatus::Ready,
            process_alive: true,
            last_seen_age: Duration::from_secs(3),
        }
    }

    #[tokio::test]
    async fn test_without_target() {
        assert!(focus_session(&TmuxClient::default(), &view(None)).is_none());
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let client = TmuxClient::default().with_binary("agent-beacon-no-such-tmux");
        let handle = focus_session(&client, &view(Some("%4"))).unwrap();
        assert!(handle.await.is_ok());
    }
}
