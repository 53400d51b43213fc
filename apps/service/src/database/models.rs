use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::MonitorSpec;

/// Monitor model - a stored monitor definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    pub id: Option<i64>,
    pub name: String,
    pub spec: MonitorSpec,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Monitor {
    /// Create a new, enabled monitor
    pub fn new(name: impl Into<String>, spec: MonitorSpec) -> Self {
        let now = Utc::now();
        Self { id: None, name: name.into(), spec, enabled: true, created_at: now, updated_at: now }
    }

    /// Convert a timestamp to Unix seconds
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp()
    }

    /// Convert Unix seconds to a timestamp, clamping out-of-range values to the epoch
    pub fn i64_to_timestamp(timestamp: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(timestamp, 0).single().unwrap_or_default()
    }
}

/// Check results are keyed by their tick in Unix milliseconds
pub(crate) fn result_key(timestamp: DateTime<Utc>) -> i64 {
    timestamp.timestamp_millis()
}

pub(crate) fn from_result_key(key: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(key).single().unwrap_or_default()
}
