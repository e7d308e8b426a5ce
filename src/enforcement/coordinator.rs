use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::host::HostActions;
use crate::overlay::OverlayManager;

use super::evaluator::QuotaStatus;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Cooldown knobs, split out of the settings type so tests can build them
/// directly.
#[derive(Debug, Clone, Copy)]
pub struct CooldownConfig {
    /// Minimum gap between two interventions for the same package.
    pub intervention_cooldown_ms: i64,
    /// Minimum gap between two forced home navigations, global.
    pub home_action_cooldown_ms: i64,
}

/// Per-package bookkeeping, created lazily on the first intervention.
#[derive(Debug, Clone, Copy)]
struct InterventionRecord {
    last_intervention_at_ms: i64,
}

/// What the coordinator did with an exceeded-quota report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterventionOutcome {
    /// A fresh intervention fired. `home_performed` is false when the
    /// global home cooldown was still running or navigation failed.
    Intervened { home_performed: bool },
    /// The package is still inside its intervention cooldown; nothing was
    /// done.
    Swallowed,
}

struct CoordinatorState {
    records: HashMap<String, InterventionRecord>,
    last_home_action_ms: Option<i64>,
}

/// Converts "limit exceeded" reports into a bounded sequence of side
/// effects, debounced by two independent cooldowns.
///
/// There is no stored per-package state machine and no reset timer: a
/// package is "in cooldown" exactly when `now - last_intervention_at` is
/// below the configured gap, so duplicate and out-of-order events resolve
/// to plain timestamp arithmetic.
pub struct InterventionCoordinator {
    state: Mutex<CoordinatorState>,
    config: CooldownConfig,
    overlay: OverlayManager,
    actions: Arc<dyn HostActions>,
}

impl InterventionCoordinator {
    pub fn new(
        config: CooldownConfig,
        overlay: OverlayManager,
        actions: Arc<dyn HostActions>,
    ) -> Self {
        Self {
            state: Mutex::new(CoordinatorState {
                records: HashMap::new(),
                last_home_action_ms: None,
            }),
            config,
            overlay,
            actions,
        }
    }

    /// React to an exceeded-quota report for `package_id` at `now_ms`.
    ///
    /// `now_ms` comes from the host event that triggered the evaluation,
    /// which keeps the cooldown arithmetic deterministic under replay.
    pub async fn handle_exceeded(
        &self,
        package_id: &str,
        quota: QuotaStatus,
        now_ms: i64,
    ) -> InterventionOutcome {
        let home_due = {
            let mut state = self.state.lock().await;

            if let Some(record) = state.records.get(package_id) {
                if now_ms - record.last_intervention_at_ms < self.config.intervention_cooldown_ms {
                    log_info!("swallowed exceeded-event for {package_id} (cooldown running)");
                    return InterventionOutcome::Swallowed;
                }
            }

            state.records.insert(
                package_id.to_string(),
                InterventionRecord {
                    last_intervention_at_ms: now_ms,
                },
            );

            // The home cooldown is global: navigating for package A and
            // immediately again for package B is the same spam.
            let home_due = state
                .last_home_action_ms
                .map(|last| now_ms - last >= self.config.home_action_cooldown_ms)
                .unwrap_or(true);
            if home_due {
                state.last_home_action_ms = Some(now_ms);
            }
            home_due
        };

        // Home first: getting the blocked app off screen is the urgent
        // part; the overlay is informational.
        let mut home_performed = false;
        if home_due {
            match self.actions.navigate_home() {
                Ok(()) => home_performed = true,
                Err(err) => log_warn!("home navigation failed: {err:#}"),
            }
        }

        if let Err(err) = self.overlay.show(package_id, &quota).await {
            log_warn!("block overlay refused for {package_id}: {err:#}");
        }

        log_info!(
            "intervention for {package_id} at {now_ms} (home_performed={home_performed})"
        );
        InterventionOutcome::Intervened { home_performed }
    }

    /// Drop all cooldown bookkeeping. Called on monitor shutdown; a
    /// restarted monitor starts from clean cooldowns.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.records.clear();
        state.last_home_action_ms = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use std::sync::Mutex as StdMutex;
    use tokio::time::Duration;

    use crate::host::UsageQuery;
    use crate::models::UsageSnapshot;

    struct NoUsage;

    impl UsageQuery for NoUsage {
        fn today_snapshot(
            &self,
            package_id: &str,
            _start_ms: i64,
            _end_ms: i64,
        ) -> Result<UsageSnapshot> {
            Ok(UsageSnapshot::empty(package_id))
        }

        fn app_display_name(&self, _package_id: &str) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingHost {
        calls: StdMutex<Vec<String>>,
        fail_home: bool,
    }

    impl RecordingHost {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls()
                .iter()
                .filter(|call| call.starts_with(prefix))
                .count()
        }
    }

    impl HostActions for RecordingHost {
        fn navigate_home(&self) -> Result<()> {
            if self.fail_home {
                bail!("no accessibility grant");
            }
            self.calls.lock().unwrap().push("home".into());
            Ok(())
        }

        fn show_block_surface(&self, package_id: &str, _context_text: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("show:{package_id}"));
            Ok(())
        }

        fn hide_block_surface(&self) -> Result<()> {
            self.calls.lock().unwrap().push("hide".into());
            Ok(())
        }
    }

    fn quota() -> QuotaStatus {
        QuotaStatus {
            limit_minutes: 30,
            used_minutes: 31,
            session_count: 1,
        }
    }

    fn coordinator(host: Arc<RecordingHost>) -> InterventionCoordinator {
        let overlay = OverlayManager::new(
            Duration::from_millis(60_000),
            Arc::clone(&host) as Arc<dyn HostActions>,
            Arc::new(NoUsage),
        );
        InterventionCoordinator::new(
            CooldownConfig {
                intervention_cooldown_ms: 5000,
                home_action_cooldown_ms: 2000,
            },
            overlay,
            host,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_swallows_rapid_reopens() {
        let host = Arc::new(RecordingHost::default());
        let coordinator = coordinator(Arc::clone(&host));

        let outcomes = [
            coordinator.handle_exceeded("games.example", quota(), 0).await,
            coordinator
                .handle_exceeded("games.example", quota(), 1000)
                .await,
            coordinator
                .handle_exceeded("games.example", quota(), 2000)
                .await,
            coordinator
                .handle_exceeded("games.example", quota(), 6000)
                .await,
        ];

        assert_eq!(
            outcomes,
            [
                InterventionOutcome::Intervened {
                    home_performed: true
                },
                InterventionOutcome::Swallowed,
                InterventionOutcome::Swallowed,
                InterventionOutcome::Intervened {
                    home_performed: true
                },
            ]
        );
        assert_eq!(host.count("show:"), 2);
        assert_eq!(host.count("home"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn home_cooldown_is_global_across_packages() {
        let host = Arc::new(RecordingHost::default());
        let coordinator = coordinator(Arc::clone(&host));

        let first = coordinator.handle_exceeded("games.example", quota(), 0).await;
        let second = coordinator
            .handle_exceeded("video.example", quota(), 1000)
            .await;

        // The second package still gets its own overlay, but the home
        // action is debounced globally.
        assert_eq!(
            first,
            InterventionOutcome::Intervened {
                home_performed: true
            }
        );
        assert_eq!(
            second,
            InterventionOutcome::Intervened {
                home_performed: false
            }
        );
        assert_eq!(host.count("show:"), 2);
        assert_eq!(host.count("home"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn out_of_order_event_is_swallowed() {
        let host = Arc::new(RecordingHost::default());
        let coordinator = coordinator(Arc::clone(&host));

        coordinator
            .handle_exceeded("games.example", quota(), 10_000)
            .await;
        let stale = coordinator
            .handle_exceeded("games.example", quota(), 8_000)
            .await;

        assert_eq!(stale, InterventionOutcome::Swallowed);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_resets_cooldowns() {
        let host = Arc::new(RecordingHost::default());
        let coordinator = coordinator(Arc::clone(&host));

        coordinator.handle_exceeded("games.example", quota(), 0).await;
        coordinator.clear().await;

        let outcome = coordinator
            .handle_exceeded("games.example", quota(), 1000)
            .await;
        assert_eq!(
            outcome,
            InterventionOutcome::Intervened {
                home_performed: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_failure_does_not_suppress_overlay() {
        let host = Arc::new(RecordingHost {
            fail_home: true,
            ..RecordingHost::default()
        });
        let coordinator = coordinator(Arc::clone(&host));

        let outcome = coordinator.handle_exceeded("games.example", quota(), 0).await;
        assert_eq!(
            outcome,
            InterventionOutcome::Intervened {
                home_performed: false
            }
        );
        assert_eq!(host.count("show:"), 1);
    }
}
