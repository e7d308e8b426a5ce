use serde::{Deserialize, Serialize};

/// Accumulated foreground usage for one package over one day.
///
/// Always recomputed for the [local midnight, now) window; the engine never
/// caches these.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub package_id: String,
    pub total_foreground_ms: i64,
    /// Foreground-entry timestamps within the window, chronological.
    pub session_start_ms: Vec<i64>,
}

impl UsageSnapshot {
    pub fn empty(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            total_foreground_ms: 0,
            session_start_ms: Vec::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.session_start_ms.len()
    }
}
