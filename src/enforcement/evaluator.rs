use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveTime};
use tokio::time::{timeout, Duration};

use crate::db::Database;
use crate::host::UsageQuery;
use crate::models::UsageSnapshot;

/// How long a usage query may run before it counts as failed.
const USAGE_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of a quota lookup for one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub limit_minutes: i64,
    pub used_minutes: i64,
    pub session_count: usize,
}

impl QuotaStatus {
    pub fn exceeded(&self) -> bool {
        self.used_minutes >= self.limit_minutes
    }
}

/// Combines the quota store and the usage provider into one
/// "is this package over its limit?" decision.
///
/// Side-effect free and safe to call at arbitrary frequency; every call
/// queries fresh state for the [local midnight, now) window.
pub struct QuotaEvaluator {
    db: Database,
    usage: Arc<dyn UsageQuery>,
}

impl QuotaEvaluator {
    pub fn new(db: Database, usage: Arc<dyn UsageQuery>) -> Self {
        Self { db, usage }
    }

    /// Decide whether `package_id` is over its daily limit.
    ///
    /// Returns `None` when there is nothing to enforce: no limit
    /// configured, the package is ignored, or a collaborator failed.
    /// Lookup failures never block an app.
    pub async fn evaluate(&self, package_id: &str) -> Option<QuotaStatus> {
        let limit_minutes = match self.db.get_limit_minutes(package_id).await {
            Ok(Some(minutes)) if minutes > 0 => minutes,
            Ok(_) => return None,
            Err(err) => {
                log::warn!("limit lookup failed for {package_id}: {err:#}");
                return None;
            }
        };

        match self.db.is_ignored(package_id).await {
            Ok(false) => {}
            Ok(true) => return None,
            Err(err) => {
                log::warn!("ignore lookup failed for {package_id}: {err:#}");
                return None;
            }
        }

        let snapshot = match self.today_snapshot(package_id).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("usage query failed for {package_id}: {err:#}");
                return None;
            }
        };

        Some(QuotaStatus {
            limit_minutes,
            used_minutes: snapshot.total_foreground_ms / 60_000,
            session_count: snapshot.session_count(),
        })
    }

    /// Fresh usage for the local-midnight-to-now window.
    pub async fn today_snapshot(&self, package_id: &str) -> Result<UsageSnapshot> {
        let (start_ms, end_ms) = today_window_ms();
        let usage = Arc::clone(&self.usage);
        let package_id = package_id.to_string();

        let query =
            tokio::task::spawn_blocking(move || usage.today_snapshot(&package_id, start_ms, end_ms));

        timeout(USAGE_QUERY_TIMEOUT, query)
            .await
            .context("usage query timed out")?
            .context("usage query worker join failed")?
    }
}

/// `[local midnight, now)` as epoch milliseconds.
fn today_window_ms() -> (i64, i64) {
    let now = Local::now();
    let start_ms = now
        .date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        // Midnight skipped by a DST jump: fall back to an empty window.
        .map_or_else(|| now.timestamp_millis(), |dt| dt.timestamp_millis());
    (start_ms, now.timestamp_millis())
}
