use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Point in the request lifecycle where a probe stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStage {
    /// The request could not be built (bad URL, method or header)
    InvalidRequest,
    DnsLookup,
    TcpConnection,
    TlsHandshake,
    ServerProcessing,
    ContentTransfer,
}

impl fmt::Display for ProbeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProbeStage::InvalidRequest => "request construction",
            ProbeStage::DnsLookup => "dns lookup",
            ProbeStage::TcpConnection => "tcp connection",
            ProbeStage::TlsHandshake => "tls handshake",
            ProbeStage::ServerProcessing => "server processing",
            ProbeStage::ContentTransfer => "content transfer",
        };
        f.write_str(name)
    }
}

/// A probe that produced no result at all
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("probe failed during {stage}: {cause}")]
pub struct ProbeError {
    pub stage: ProbeStage,
    pub cause: String,
    timed_out: bool,
}

impl ProbeError {
    pub fn new(stage: ProbeStage, cause: impl fmt::Display) -> Self {
        Self { stage, cause: cause.to_string(), timed_out: false }
    }

    pub fn timeout(stage: ProbeStage, budget: Duration) -> Self {
        Self {
            stage,
            cause: format!("timed out after {}ms", budget.as_millis()),
            timed_out: true,
        }
    }

    pub fn invalid_request(cause: impl fmt::Display) -> Self {
        Self::new(ProbeStage::InvalidRequest, cause)
    }

    /// Whether the deadline expired rather than the network failing
    pub fn is_timeout(&self) -> bool {
        self.timed_out
    }
}
