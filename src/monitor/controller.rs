use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::enforcement::{InterventionCoordinator, QuotaEvaluator};
use crate::models::ForegroundEvent;
use crate::overlay::OverlayManager;

use super::loop_worker::monitor_loop;

/// Start/stop lifecycle around the monitor loop.
pub struct MonitorController {
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    evaluator: Arc<QuotaEvaluator>,
    coordinator: Arc<InterventionCoordinator>,
    overlay: OverlayManager,
    self_package_id: String,
}

impl MonitorController {
    pub fn new(
        evaluator: Arc<QuotaEvaluator>,
        coordinator: Arc<InterventionCoordinator>,
        overlay: OverlayManager,
        self_package_id: String,
    ) -> Self {
        Self {
            handle: None,
            cancel_token: None,
            evaluator,
            coordinator,
            overlay,
            self_package_id,
        }
    }

    pub fn start(&mut self, events: mpsc::Receiver<ForegroundEvent>) -> Result<()> {
        if self.handle.is_some() {
            bail!("monitor already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        let handle = tokio::spawn(monitor_loop(
            events,
            Arc::clone(&self.evaluator),
            Arc::clone(&self.coordinator),
            self.self_package_id.clone(),
            token_clone,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    /// Stop the loop and drop the transient enforcement state: cooldown
    /// records are cleared and any visible overlay comes down. Limits
    /// themselves persist in the store.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("monitor loop task failed to join")?;
        }

        self.coordinator.clear().await;
        self.overlay.hide().await;
        Ok(())
    }
}
