use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::assertions::AssertionRule;

/// Request body attached to a monitor, sent verbatim with its declared type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestBody {
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Immutable snapshot of a monitor, everything needed to drive one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSpec {
    /// Stable identifier of the monitor
    pub id: Uuid,

    /// HTTP method, upper case
    pub method: String,

    /// Target URL (http or https)
    pub url: String,

    /// Request headers in the order they were configured
    #[serde(default)]
    pub headers: Vec<(String, String)>,

    /// Optional request body
    #[serde(default)]
    pub body: Option<RequestBody>,

    /// Hard deadline for the whole probe
    #[serde(with = "duration_ms")]
    pub timeout: Duration,

    /// How often the monitor is checked
    #[serde(with = "duration_ms")]
    pub frequency: Duration,

    /// Pass/fail rules evaluated against every successful probe
    #[serde(default)]
    pub assertions: Vec<AssertionRule>,
}

impl MonitorSpec {
    /// Create a GET monitor with a 10s timeout and no rules
    pub fn new(url: impl Into<String>, frequency: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            method: "GET".to_string(),
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: Duration::from_secs(10),
            frequency,
            assertions: Vec::new(),
        }
    }
}

/// Status of a persisted check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    /// Probe succeeded and every assertion passed
    Up,
    /// Probe succeeded but at least one assertion failed
    Down,
    /// Probe failed or the rule set was rejected
    Error,
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Up => write!(f, "up"),
            MonitorStatus::Down => write!(f, "down"),
            MonitorStatus::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for MonitorStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            "error" => Ok(MonitorStatus::Error),
            other => Err(format!("unknown monitor status: {other}")),
        }
    }
}

/// Captured response data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseData {
    pub status_code: u16,

    /// Response headers; repeated names appear once per value
    pub headers: Vec<(String, String)>,

    /// Body bytes, truncated to the probe's body limit
    pub body: Vec<u8>,
}

impl ResponseData {
    /// First value of a header, compared case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body interpreted as UTF-8 text, lossy
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Non-overlapping request phases; they add up to `total`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    #[serde(with = "duration_ns")]
    pub dns_lookup: Duration,
    #[serde(with = "duration_ns")]
    pub tcp_connection: Duration,
    #[serde(with = "duration_ns")]
    pub tls_handshake: Duration,
    #[serde(with = "duration_ns")]
    pub server_processing: Duration,
    #[serde(with = "duration_ns")]
    pub content_transfer: Duration,
    #[serde(with = "duration_ns")]
    pub total: Duration,
}

impl Timing {
    /// Sum of the individual phases
    pub fn phase_sum(&self) -> Duration {
        self.dns_lookup
            + self.tcp_connection
            + self.tls_handshake
            + self.server_processing
            + self.content_transfer
    }
}

/// Leaf certificate details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Issuer organization, empty when the certificate has none
    pub issuer: String,
    /// Subject common name, empty when the certificate has none
    pub subject: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
}

/// Negotiated TLS parameters of an HTTPS probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsInfo {
    pub version: String,
    pub cipher: String,
    pub certificate: CertificateInfo,
}

/// Outcome of one successful probe. A non-2xx response is still a
/// `ProbeResult`; only network level failures are errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub response: ResponseData,
    pub timing: Timing,
    pub tls: Option<TlsInfo>,
}

/// One unit of scheduled work: "probe this monitor now"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub monitor_id: Uuid,
    pub spec: MonitorSpec,
    /// Tick that produced the task; doubles as the result's idempotency key
    pub scheduled_at: DateTime<Utc>,
}

impl Task {
    pub fn new(spec: MonitorSpec, scheduled_at: DateTime<Utc>) -> Self {
        Self { monitor_id: spec.id, spec, scheduled_at }
    }
}

/// What the worker persists for every processed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub monitor_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub status: MonitorStatus,
    pub result: Option<ProbeResult>,
    pub verdicts: Vec<bool>,
    pub error_message: Option<String>,
}

impl CheckRecord {
    /// Record for a probe that completed; status follows the verdicts
    pub fn completed(
        monitor_id: Uuid,
        timestamp: DateTime<Utc>,
        result: ProbeResult,
        verdicts: Vec<bool>,
    ) -> Self {
        let status = if verdicts.iter().all(|passed| *passed) {
            MonitorStatus::Up
        } else {
            MonitorStatus::Down
        };

        Self { monitor_id, timestamp, status, result: Some(result), verdicts, error_message: None }
    }

    /// Record for a probe that never produced a result
    pub fn failed(monitor_id: Uuid, timestamp: DateTime<Utc>, error: String) -> Self {
        Self {
            monitor_id,
            timestamp,
            status: MonitorStatus::Error,
            result: None,
            verdicts: Vec::new(),
            error_message: Some(error),
        }
    }
}

/// Whole milliseconds on the wire
pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Nanoseconds on the wire
pub(crate) mod duration_ns {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_nanos() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_nanos(u64::deserialize(deserializer)?))
    }
}
