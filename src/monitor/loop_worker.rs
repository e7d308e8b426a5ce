use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::enforcement::{InterventionCoordinator, QuotaEvaluator};
use crate::models::ForegroundEvent;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Ceiling on handling a single event; a stalled collaborator must not
/// wedge the loop.
const EVENT_TIMEOUT_SECS: u64 = 10;

/// Pure dispatch: pull foreground-change events off the channel, skip our
/// own package, evaluate, and hand exceeded results to the coordinator.
pub async fn monitor_loop(
    mut events: mpsc::Receiver<ForegroundEvent>,
    evaluator: Arc<QuotaEvaluator>,
    coordinator: Arc<InterventionCoordinator>,
    self_package_id: String,
    cancel_token: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe_event = events.recv() => {
                let Some(event) = maybe_event else {
                    log_info!("event channel closed; monitor loop exiting");
                    break;
                };

                // Never self-block.
                if event.package_id == self_package_id {
                    continue;
                }

                let fut = handle_event(&evaluator, &coordinator, &event);
                match tokio::time::timeout(Duration::from_secs(EVENT_TIMEOUT_SECS), fut).await {
                    Ok(()) => {}
                    Err(_) => log_warn!(
                        "event handling timeout (> {}s) for {}",
                        EVENT_TIMEOUT_SECS,
                        event.package_id
                    ),
                }
            }
            _ = cancel_token.cancelled() => {
                log_info!("monitor loop shutting down");
                break;
            }
        }
    }
}

async fn handle_event(
    evaluator: &QuotaEvaluator,
    coordinator: &InterventionCoordinator,
    event: &ForegroundEvent,
) {
    log_info!(
        "foreground change: {} at {}",
        event.package_id,
        event.timestamp_ms
    );

    let Some(quota) = evaluator.evaluate(&event.package_id).await else {
        return;
    };

    if !quota.exceeded() {
        return;
    }

    log_info!(
        "limit exceeded for {}: {}min used of {}min across {} sessions",
        event.package_id,
        quota.used_minutes,
        quota.limit_minutes,
        quota.session_count
    );

    coordinator
        .handle_exceeded(&event.package_id, quota, event.timestamp_ms)
        .await;
}
