use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use uuid::Uuid;

use crate::enforcement::QuotaStatus;
use crate::host::{fallback_display_name, HostActions, UsageQuery};

use super::state::OverlayState;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Owns the lifetime of the single blocking overlay surface: show,
/// auto-dismiss, user dismiss, teardown.
///
/// All slot access funnels through one mutex, so the event path and the
/// timer path can never race a show against a teardown.
#[derive(Clone)]
pub struct OverlayManager {
    state: Arc<Mutex<OverlayState>>,
    dismiss_task: Arc<Mutex<Option<JoinHandle<()>>>>,
    auto_dismiss: Duration,
    actions: Arc<dyn HostActions>,
    usage: Arc<dyn UsageQuery>,
}

impl OverlayManager {
    pub fn new(
        auto_dismiss: Duration,
        actions: Arc<dyn HostActions>,
        usage: Arc<dyn UsageQuery>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(OverlayState::Hidden)),
            dismiss_task: Arc::new(Mutex::new(None)),
            auto_dismiss,
            actions,
            usage,
        }
    }

    /// Put up the blocking surface for `package_id`, replacing any overlay
    /// that is already visible (never stacking).
    ///
    /// If the host refuses the surface the slot stays `Hidden` and the
    /// error is returned; there is no automatic retry.
    pub async fn show(&self, package_id: &str, quota: &QuotaStatus) -> Result<()> {
        self.cancel_dismiss_task().await;

        let context_text = self.context_line(package_id, quota);

        let token = {
            let mut state = self.state.lock().await;

            if state.is_visible() {
                if let Err(err) = self.actions.hide_block_surface() {
                    log_warn!("failed to tear down previous overlay: {err:#}");
                }
                *state = OverlayState::Hidden;
            }

            self.actions
                .show_block_surface(package_id, &context_text)
                .context("host refused the block surface")?;

            let now_ms = Utc::now().timestamp_millis();
            let token = Uuid::new_v4();
            *state = OverlayState::Visible {
                package_id: package_id.to_string(),
                token,
                shown_at_ms: now_ms,
                deadline_ms: now_ms + self.auto_dismiss.as_millis() as i64,
            };
            token
        };

        self.spawn_dismiss_task(token).await;
        log_info!("block overlay shown for {package_id}");
        Ok(())
    }

    /// Explicit acknowledgement from the user. Navigates home before the
    /// overlay comes down, so the blocked app is no longer underneath it.
    pub async fn user_dismiss(&self) {
        self.cancel_dismiss_task().await;

        let mut state = self.state.lock().await;
        if !state.is_visible() {
            return;
        }

        if let Err(err) = self.actions.navigate_home() {
            log_warn!("home navigation on dismiss failed: {err:#}");
        }
        if let Err(err) = self.actions.hide_block_surface() {
            log_warn!("failed to hide overlay on dismiss: {err:#}");
        }
        *state = OverlayState::Hidden;
        log_info!("block overlay dismissed by user");
    }

    /// Tear the overlay down if one is up. Calling this while `Hidden` is
    /// a no-op, never an error.
    pub async fn hide(&self) {
        self.cancel_dismiss_task().await;

        let mut state = self.state.lock().await;
        if !state.is_visible() {
            return;
        }

        if let Err(err) = self.actions.hide_block_surface() {
            log_warn!("failed to hide overlay: {err:#}");
        }
        *state = OverlayState::Hidden;
    }

    /// Snapshot of the slot, mainly for tests and status reporting.
    pub async fn current_state(&self) -> OverlayState {
        self.state.lock().await.clone()
    }

    async fn spawn_dismiss_task(&self, token: Uuid) {
        let state = Arc::clone(&self.state);
        let actions = Arc::clone(&self.actions);
        let delay = self.auto_dismiss;

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let mut guard = state.lock().await;
            // A later show may have replaced this overlay; only dismiss our own.
            if guard.token() != Some(token) {
                return;
            }

            if let Err(err) = actions.hide_block_surface() {
                log_warn!("auto-dismiss failed to hide overlay: {err:#}");
            }
            *guard = OverlayState::Hidden;
            log_info!("block overlay auto-dismissed");
        });

        let mut task_guard = self.dismiss_task.lock().await;
        if let Some(previous) = task_guard.take() {
            previous.abort();
        }
        *task_guard = Some(handle);
    }

    async fn cancel_dismiss_task(&self) {
        if let Some(handle) = self.dismiss_task.lock().await.take() {
            handle.abort();
        }
    }

    fn context_line(&self, package_id: &str, quota: &QuotaStatus) -> String {
        let app_name = self
            .usage
            .app_display_name(package_id)
            .unwrap_or_else(|| fallback_display_name(package_id));
        format!(
            "You've reached your {} minute limit for {} today.",
            quota.limit_minutes, app_name
        )
    }
}
