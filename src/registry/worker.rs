use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::loader::{run_cycle, CycleOutcome, RegistryState};
use super::{RegistrySettings, SessionView};
use crate::error::Result;
use crate::liveness::{LivenessChecker, ProcessTable, PsProcessTable};
use crate::records::{now_epoch, SessionDir};

/// Live view over the session directory.
///
/// Cheap to clone; every clone shares the same published list. The worker
/// runs one refresh at a time. Every cycle is tagged with a sequence number
/// so that a slow, older cycle can never overwrite the result of a newer one.
pub struct Registry<P: ProcessTable = PsProcessTable> {
    shared: Arc<Shared<P>>,
}

struct Shared<P> {
    dir: SessionDir,
    settings: RegistrySettings,
    checker: LivenessChecker<P>,
    published: watch::Sender<Arc<Vec<SessionView>>>,
    requests: Arc<RefreshRequests>,
    /// Sequence number of the most recently started cycle
    started: AtomicU64,
    state: Mutex<RegistryState>,
}

/// Single-slot refresh request, coalesced across triggers
#[derive(Debug, Default)]
struct RefreshRequests {
    /// `Some(recheck_liveness)` while a refresh is pending
    pending: Mutex<Option<bool>>,
    notify: Notify,
}

impl RefreshRequests {
    fn mark(&self, recheck_liveness: bool) {
        let mut pending = lock(&self.pending);
        *pending = Some(pending.unwrap_or(false) || recheck_liveness);
    }

    fn request(&self, recheck_liveness: bool) {
        self.mark(recheck_liveness);
        self.notify.notify_one();
    }

    fn take(&self) -> Option<bool> {
        lock(&self.pending).take()
    }
}

impl<P: ProcessTable> Clone for Registry<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: ProcessTable> Registry<P> {
    pub fn new(dir: SessionDir, settings: RegistrySettings, checker: LivenessChecker<P>) -> Self {
        let (published, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            shared: Arc::new(Shared {
                dir,
                settings,
                checker,
                published,
                requests: Arc::new(RefreshRequests::default()),
                started: AtomicU64::new(0),
                state: Mutex::new(RegistryState::default()),
            }),
        }
    }

    pub fn dir(&self) -> &SessionDir {
        &self.shared.dir
    }

    /// Latest published sessions, most recently updated first
    pub fn sessions(&self) -> Arc<Vec<SessionView>> {
        Arc::clone(&self.shared.published.borrow())
    }

    /// Receiver that wakes whenever the published list changes
    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<SessionView>>> {
        self.shared.published.subscribe()
    }

    /// Call `callback` with the current list and again after every change.
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(Arc<Vec<SessionView>>) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            loop {
                let sessions = Arc::clone(&rx.borrow_and_update());
                callback(sessions);
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    /// Ask the worker for a refresh. Requests made before the worker gets
    /// to them collapse into one.
    pub fn refresh_now(&self, recheck_liveness: bool) {
        self.shared.requests.request(recheck_liveness);
    }

    /// Run one cycle inline. Returns `false` if a newer cycle started in the
    /// meantime and this one was discarded.
    pub async fn refresh_once(&self, recheck_liveness: bool) -> Result<bool> {
        let seq = self.begin();
        let snapshot = lock(&self.shared.state).clone();
        let outcome = run_cycle(
            &self.shared.dir,
            &self.shared.checker,
            &self.shared.settings.thresholds,
            snapshot,
            now_epoch(),
            recheck_liveness,
        )
        .await?;

        let CycleOutcome {
            sessions,
            doomed,
            state,
        } = outcome;
        if !self.publish(seq, sessions, state) {
            debug!(seq, "discarding superseded refresh");
            if recheck_liveness {
                // Carry the liveness recheck over to the next cycle.
                self.shared.requests.request(true);
            }
            return Ok(false);
        }

        for id in &doomed {
            match self.shared.dir.remove_session(id).await {
                Ok(()) => info!(session_id = %id, "removed stale session files"),
                // Reconsidered next cycle.
                Err(e) => warn!(session_id = %id, error = %e, "failed to remove session files"),
            }
        }
        Ok(true)
    }

    /// Spawn the refresh worker: a fast rescan tick, a slower liveness tick
    /// and a filesystem watch, all feeding the same request slot.
    pub fn start(&self) -> Result<JoinHandle<()>> {
        self.shared.dir.ensure()?;
        let watcher = self.watch_directory();
        let registry = self.clone();
        Ok(tokio::spawn(async move { registry.run(watcher).await }))
    }

    async fn run(self, watcher: Option<RecommendedWatcher>) {
        // Dropping the watcher stops the notifications.
        let _watcher = watcher;
        let settings = self.shared.settings;

        let mut fast = tokio::time::interval(settings.refresh_interval);
        fast.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut slow = tokio::time::interval(settings.liveness_interval);
        slow.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(path = %self.shared.dir.root().display(), "watching session directory");

        loop {
            tokio::select! {
                biased;
                _ = slow.tick() => self.shared.requests.mark(true),
                _ = fast.tick() => self.shared.requests.mark(false),
                _ = self.shared.requests.notify.notified() => {
                    tokio::time::sleep(settings.watch_debounce).await;
                }
            }

            let Some(recheck_liveness) = self.shared.requests.take() else {
                continue;
            };
            // Requests arriving meanwhile collapse into the pending slot.
            if let Err(e) = self.refresh_once(recheck_liveness).await {
                warn!(error = %e, "session refresh failed");
            }
        }
    }

    fn watch_directory(&self) -> Option<RecommendedWatcher> {
        let requests = Arc::clone(&self.shared.requests);
        let mut watcher =
            match notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                match res {
                    Ok(event) => {
                        if event.paths.is_empty()
                            || event.paths.iter().any(|p| SessionDir::is_record_file(p))
                        {
                            requests.request(false);
                        }
                    }
                    Err(e) => {
                        debug!(error = %e, "session watcher error");
                        requests.request(false);
                    }
                }
            }) {
                Ok(watcher) => watcher,
                Err(e) => {
                    warn!(error = %e, "failed to create session watcher, polling only");
                    return None;
                }
            };

        let root = self.shared.dir.root();
        if let Err(e) = watcher.watch(root, RecursiveMode::NonRecursive) {
            warn!(path = %root.display(), error = %e, "failed to watch session directory, polling only");
            return None;
        }
        Some(watcher)
    }

    fn begin(&self) -> u64 {
        self.shared.started.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Publish a cycle's result unless a newer cycle has started.
    fn publish(&self, seq: u64, sessions: Vec<SessionView>, state: RegistryState) -> bool {
        let mut current_state = lock(&self.shared.state);
        if self.shared.started.load(Ordering::SeqCst) != seq {
            return false;
        }
        *current_state = state;

        self.shared.published.send_if_modified(|current| {
            if current.as_slice() == sessions.as_slice() {
                false
            } else {
                *current = Arc::new(sessions);
                true
            }
        });
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
