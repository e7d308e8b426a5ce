use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured daily time allowance for one package.
///
/// Absence of a row means unlimited; the engine never writes these, it only
/// reads them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerLimit {
    pub package_id: String,
    pub limit_minutes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
