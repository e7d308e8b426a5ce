//! Boundary to the host environment.
//!
//! The engine never talks to the operating system directly; everything it
//! needs from the outside world comes through these two traits. Failures
//! cross this boundary as `Err`, get logged, and never take the monitor
//! down.

pub mod sim;

use anyhow::Result;

use crate::models::UsageSnapshot;

/// Read-only view of the host's per-app usage accounting.
///
/// Calls are blocking; the evaluator drives them through `spawn_blocking`
/// under a timeout so a stalled host cannot wedge event processing.
pub trait UsageQuery: Send + Sync {
    /// Usage accumulated by `package_id` within `[start_ms, end_ms)`.
    fn today_snapshot(
        &self,
        package_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<UsageSnapshot>;

    /// Human-readable application name, if the host knows one.
    fn app_display_name(&self, package_id: &str) -> Option<String>;
}

/// Side effects the engine may perform on the host.
///
/// Each call must be idempotent: invoking it when the host is already in
/// the target state is a no-op, not an error.
pub trait HostActions: Send + Sync {
    /// Force the user back to the neutral/home screen.
    fn navigate_home(&self) -> Result<()>;

    /// Render the blocking surface above all other content.
    fn show_block_surface(&self, package_id: &str, context_text: &str) -> Result<()>;

    /// Remove the blocking surface.
    fn hide_block_surface(&self) -> Result<()>;
}

/// Fallback display name: the trailing dot-separated segment of the id.
pub fn fallback_display_name(package_id: &str) -> String {
    package_id
        .rsplit('.')
        .next()
        .unwrap_or(package_id)
        .to_string()
}
