use std::time::Duration;

use crate::records::LifecycleState;

use super::{SessionStatus, Thresholds};

/// Everything the engine needs to know about one session at one instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signals {
    /// Last lifecycle state, `None` if no event was ever recorded or it was unreadable
    pub state: Option<LifecycleState>,
    /// Time since the lifecycle file was written
    pub lifecycle_age: Option<Duration>,
    /// Time since the heartbeat was written
    pub heartbeat_age: Duration,
    pub process_alive: bool,
    pub has_active_subtasks: bool,
}

/// Engine for inferring session status from lifecycle and heartbeat staleness
pub struct StatusInferenceEngine;

impl StatusInferenceEngine {
    /// Combine the signals into one status.
    ///
    /// Priority order: dead process > heartbeat-only fallback (no state) >
    /// lifecycle state, with a staleness fallback for `Working` only.
    /// Waiting states never decay.
    pub fn infer(signals: &Signals, thresholds: &Thresholds) -> SessionStatus {
        let heartbeat_age = signals.heartbeat_age;

        if !signals.process_alive && heartbeat_age > thresholds.liveness_grace {
            return SessionStatus::Disconnected;
        }

        let settled = if signals.process_alive {
            SessionStatus::Ready
        } else {
            SessionStatus::Disconnected
        };

        let Some(state) = signals.state else {
            return if heartbeat_age <= thresholds.work_grace {
                SessionStatus::Working
            } else {
                settled
            };
        };

        match state {
            LifecycleState::Compacting => SessionStatus::Working,
            LifecycleState::WaitingPermission | LifecycleState::WaitingInput => {
                SessionStatus::NeedsAttention
            }
            LifecycleState::Idle => SessionStatus::Ready,
            LifecycleState::Working => {
                let lifecycle_age = signals.lifecycle_age.unwrap_or(heartbeat_age);
                if Self::turn_looks_finished(
                    lifecycle_age,
                    heartbeat_age,
                    signals.has_active_subtasks,
                    thresholds,
                ) {
                    settled
                } else {
                    SessionStatus::Working
                }
            }
        }
    }

    /// Recover from a missing "turn complete" event.
    fn turn_looks_finished(
        lifecycle_age: Duration,
        heartbeat_age: Duration,
        has_active_subtasks: bool,
        thresholds: &Thresholds,
    ) -> bool {
        // Heartbeat written well after the event means the probe saw output.
        let streamed = lifecycle_age > heartbeat_age + thresholds.stream_proof;
        if streamed {
            return heartbeat_age > thresholds.stream_stop;
        }

        if has_active_subtasks {
            return false;
        }

        lifecycle_age > thresholds.think_stale && heartbeat_age > thresholds.think_stale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn secs(value: u64) -> Duration {
        Duration::from_secs(value)
    }

    fn infer(
        state: Option<LifecycleState>,
        lifecycle_age: u64,
        heartbeat_age: u64,
        process_alive: bool,
        has_active_subtasks: bool,
    ) -> SessionStatus {
        StatusInferenceEngine::infer(
            &Signals {
                state,
                lifecycle_age: Some(secs(lifecycle_age)),
                heartbeat_age: secs(heartbeat_age),
                process_alive,
                has_active_subtasks,
            },
            &Thresholds::default(),
        )
    }

    fn any_state() -> impl Strategy<Value = Option<LifecycleState>> {
        prop_oneof![
            Just(None),
            Just(Some(LifecycleState::Working)),
            Just(Some(LifecycleState::Idle)),
            Just(Some(LifecycleState::WaitingPermission)),
            Just(Some(LifecycleState::WaitingInput)),
            Just(Some(LifecycleState::Compacting)),
        ]
    }

    #[test]
    fn test_fast_path_boundary() {
        let working = Some(LifecycleState::Working);
        assert_eq!(infer(working, 60, 6, true, false), SessionStatus::Working);
        assert_eq!(infer(working, 60, 7, true, false), SessionStatus::Ready);
    }

    #[test]
    fn test_fast_path_ignores_subtasks() {
        let working = Some(LifecycleState::Working);
        assert_eq!(infer(working, 60, 7, true, true), SessionStatus::Ready);
    }

    #[test]
    fn test_thinking_path_boundary() {
        let working = Some(LifecycleState::Working);
        assert_eq!(infer(working, 12, 11, true, false), SessionStatus::Working);
        assert_eq!(infer(working, 13, 13, true, false), SessionStatus::Ready);
    }

    #[test]
    fn test_subtasks_suppress_thinking_path() {
        let working = Some(LifecycleState::Working);
        assert_eq!(infer(working, 120, 120, true, true), SessionStatus::Working);
    }

    #[test]
    fn test_dead_process_settles_to_disconnected() {
        let working = Some(LifecycleState::Working);
        // Inside the liveness grace the dead override does not apply yet.
        assert_eq!(infer(working, 20, 4, false, false), SessionStatus::Working);
        assert_eq!(infer(working, 20, 6, false, false), SessionStatus::Disconnected);
    }

    #[test]
    fn test_no_state_uses_heartbeat_age() {
        assert_eq!(infer(None, 0, 3, true, false), SessionStatus::Working);
        assert_eq!(infer(None, 0, 4, true, false), SessionStatus::Ready);
        assert_eq!(infer(None, 0, 4, false, false), SessionStatus::Disconnected);
    }

    #[test]
    fn test_idle_is_ready() {
        assert_eq!(
            infer(Some(LifecycleState::Idle), 1, 1, true, false),
            SessionStatus::Ready
        );
    }

    #[test]
    fn test_missing_lifecycle_age_uses_heartbeat_age() {
        let signals = Signals {
            state: Some(LifecycleState::Working),
            lifecycle_age: None,
            heartbeat_age: secs(30),
            process_alive: true,
            has_active_subtasks: false,
        };
        assert_eq!(
            StatusInferenceEngine::infer(&signals, &Thresholds::default()),
            SessionStatus::Ready
        );
    }

    #[test]
    fn test_custom_thresholds_preserve_shape() {
        let thresholds = Thresholds {
            think_stale: secs(30),
            ..Thresholds::default()
        };
        let signals = Signals {
            state: Some(LifecycleState::Working),
            lifecycle_age: Some(secs(20)),
            heartbeat_age: secs(20),
            process_alive: true,
            has_active_subtasks: false,
        };
        assert_eq!(
            StatusInferenceEngine::infer(&signals, &thresholds),
            SessionStatus::Working
        );
    }

    proptest! {
        #[test]
        fn prop_infer_is_idempotent(
            state in any_state(),
            lifecycle_age in 0u64..1000,
            heartbeat_age in 0u64..1000,
            alive in any::<bool>(),
            subtasks in any::<bool>(),
        ) {
            let first = infer(state, lifecycle_age, heartbeat_age, alive, subtasks);
            let second = infer(state, lifecycle_age, heartbeat_age, alive, subtasks);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_dead_process_overrides_everything(
            state in any_state(),
            lifecycle_age in 0u64..1000,
            heartbeat_age in 6u64..1000,
            subtasks in any::<bool>(),
        ) {
            prop_assert_eq!(
                infer(state, lifecycle_age, heartbeat_age, false, subtasks),
                SessionStatus::Disconnected
            );
        }

        #[test]
        fn prop_waiting_never_goes_silent(
            waiting in prop_oneof![
                Just(LifecycleState::WaitingPermission),
                Just(LifecycleState::WaitingInput),
            ],
            lifecycle_age in 0u64..=600,
            heartbeat_age in 0u64..=600,
            subtasks in any::<bool>(),
        ) {
            prop_assert_eq!(
                infer(Some(waiting), lifecycle_age, heartbeat_age, true, subtasks),
                SessionStatus::NeedsAttention
            );
        }

        #[test]
        fn prop_compacting_stays_working(
            lifecycle_age in 0u64..=180,
            heartbeat_age in 0u64..=180,
            subtasks in any::<bool>(),
        ) {
            prop_assert_eq!(
                infer(Some(LifecycleState::Compacting), lifecycle_age, heartbeat_age, true, subtasks),
                SessionStatus::Working
            );
        }
    }
}
