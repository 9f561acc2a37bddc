use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::SessionView;
use crate::error::Result;
use crate::liveness::{LivenessChecker, ProcessTable, StartTimeCache};
use crate::records::{age_since, Heartbeat, RecordRead, SessionDir};
use crate::status::{Signals, StatusInferenceEngine, Thresholds};

/// Caches carried from one refresh cycle to the next.
///
/// A cycle takes a snapshot by value and hands back the updated copy; only
/// the copy of a published cycle is kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryState {
    /// Last liveness verdict per session, reused until the next recheck
    pub liveness: HashMap<String, bool>,
    pub start_times: StartTimeCache,
}

/// Result of one refresh cycle
#[derive(Debug)]
pub struct CycleOutcome {
    /// Surviving sessions, most recently updated first
    pub sessions: Vec<SessionView>,
    /// Sessions whose files should be deleted
    pub doomed: Vec<String>,
    pub state: RegistryState,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Identity {
    Pid(u32),
    Tty(String),
}

/// Scan the directory once and resolve every session.
///
/// Only a failure to list the directory is an error; anything wrong with a
/// single session drops that session from this cycle.
pub async fn run_cycle<P: ProcessTable>(
    dir: &SessionDir,
    checker: &LivenessChecker<P>,
    thresholds: &Thresholds,
    mut state: RegistryState,
    now: f64,
    recheck_liveness: bool,
) -> Result<CycleOutcome> {
    let ids = dir.list_session_ids().await?;
    let mut views = Vec::with_capacity(ids.len());
    let mut doomed = Vec::new();

    for id in &ids {
        let heartbeat = match dir.read_heartbeat(id).await {
            RecordRead::Present(heartbeat) => heartbeat,
            RecordRead::Malformed(reason) => {
                debug!(session_id = %id, reason = %reason, "skipping unreadable heartbeat");
                continue;
            }
            RecordRead::Absent => continue,
        };

        let heartbeat_age = age_since(now, heartbeat.last_updated);
        let process_alive = if heartbeat_age <= thresholds.liveness_check {
            // A fresh heartbeat is proof enough.
            state.liveness.remove(id);
            true
        } else {
            resolve_liveness(id, &heartbeat, checker, &mut state, recheck_liveness).await
        };

        let lifecycle = match dir.read_lifecycle(id).await {
            RecordRead::Present(stamped) => Some(stamped),
            RecordRead::Malformed(reason) => {
                debug!(session_id = %id, reason = %reason, "ignoring unreadable lifecycle file");
                None
            }
            RecordRead::Absent => None,
        };

        let signals = Signals {
            state: lifecycle.as_ref().and_then(|l| l.record.state),
            lifecycle_age: lifecycle.as_ref().map(|l| age_since(now, l.written_at)),
            heartbeat_age,
            process_alive,
            has_active_subtasks: lifecycle
                .as_ref()
                .is_some_and(|l| l.record.has_active_subtasks()),
        };
        let status = StatusInferenceEngine::infer(&signals, thresholds);

        if !process_alive && heartbeat_age > thresholds.cleanup {
            debug!(session_id = %id, age_secs = heartbeat_age.as_secs(), "session dead past cleanup window");
            doomed.push(id.clone());
            continue;
        }

        views.push(SessionView {
            id: id.clone(),
            heartbeat,
            lifecycle: lifecycle.map(|l| l.record),
            status,
            process_alive,
            last_seen_age: heartbeat_age,
        });
    }

    views.sort_by(by_recency);
    let (sessions, duplicates) = dedup(views);
    doomed.extend(duplicates);

    let visible: HashSet<&str> = sessions.iter().map(|view| view.id.as_str()).collect();
    state.liveness.retain(|id, _| visible.contains(id.as_str()));
    let pids: HashSet<u32> = sessions.iter().filter_map(|v| v.heartbeat.pid).collect();
    state.start_times.retain_pids(|pid| pids.contains(&pid));

    Ok(CycleOutcome {
        sessions,
        doomed,
        state,
    })
}

async fn resolve_liveness<P: ProcessTable>(
    id: &str,
    heartbeat: &Heartbeat,
    checker: &LivenessChecker<P>,
    state: &mut RegistryState,
    recheck: bool,
) -> bool {
    if let Some(&alive) = state.liveness.get(id) {
        if !recheck {
            return alive;
        }
    }

    let alive = checker
        .is_alive(
            heartbeat.pid,
            heartbeat.tty.as_deref(),
            &mut state.start_times,
        )
        .await;
    state.liveness.insert(id.to_string(), alive);
    alive
}

fn by_recency(a: &SessionView, b: &SessionView) -> Ordering {
    b.heartbeat
        .last_updated
        .total_cmp(&a.heartbeat.last_updated)
        .then_with(|| a.id.cmp(&b.id))
}

/// Keep the newest session per process (or terminal, lacking a pid).
/// Expects `views` sorted newest first.
fn dedup(views: Vec<SessionView>) -> (Vec<SessionView>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(views.len());
    let mut dropped = Vec::new();

    for view in views {
        let identity = match (view.heartbeat.pid, view.heartbeat.tty.as_deref()) {
            (Some(pid), _) => Some(Identity::Pid(pid)),
            (None, Some(tty)) => Some(Identity::Tty(tty.to_string())),
            (None, None) => None,
        };

        let first_sighting = identity.map_or(true, |identity| seen.insert(identity));
        if !first_sighting {
            debug!(session_id = %view.id, "superseded by a newer session on the same process");
            dropped.push(view.id);
        } else {
            kept.push(view);
        }
    }

    (kept, dropped)
}
