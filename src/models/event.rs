use serde::{Deserialize, Serialize};

/// Foreground-change notification delivered by the host environment.
///
/// The host guarantees nothing about delivery rate or ordering; duplicate
/// and rapid-fire events for the same package are expected input, not an
/// error condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ForegroundEvent {
    pub package_id: String,
    /// Milliseconds since the Unix epoch, as stamped by the host.
    pub timestamp_ms: i64,
}
