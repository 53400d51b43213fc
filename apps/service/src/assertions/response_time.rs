use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::text::{compare_numbers, is_numeric_operator};
use super::{AssertionRule, AssertionSource, Evaluator, RuleError, target};
use crate::monitoring::types::{ProbeResult, Timing};

/// Timing phase a response time rule refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingPhase {
    DnsLookup,
    TcpConnection,
    TlsHandshake,
    ServerProcessing,
    ContentTransfer,
    Total,
}

impl TimingPhase {
    pub fn of(self, timing: &Timing) -> Duration {
        match self {
            TimingPhase::DnsLookup => timing.dns_lookup,
            TimingPhase::TcpConnection => timing.tcp_connection,
            TimingPhase::TlsHandshake => timing.tls_handshake,
            TimingPhase::ServerProcessing => timing.server_processing,
            TimingPhase::ContentTransfer => timing.content_transfer,
            TimingPhase::Total => timing.total,
        }
    }
}

impl FromStr for TimingPhase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DNS_LOOKUP" => Ok(TimingPhase::DnsLookup),
            "TCP_CONNECTION" => Ok(TimingPhase::TcpConnection),
            "TLS_HANDSHAKE" => Ok(TimingPhase::TlsHandshake),
            "SERVER_PROCESSING" => Ok(TimingPhase::ServerProcessing),
            "CONTENT_TRANSFER" => Ok(TimingPhase::ContentTransfer),
            "TOTAL" => Ok(TimingPhase::Total),
            _ => Err(()),
        }
    }
}

impl fmt::Display for TimingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimingPhase::DnsLookup => "DNS_LOOKUP",
            TimingPhase::TcpConnection => "TCP_CONNECTION",
            TimingPhase::TlsHandshake => "TLS_HANDSHAKE",
            TimingPhase::ServerProcessing => "SERVER_PROCESSING",
            TimingPhase::ContentTransfer => "CONTENT_TRANSFER",
            TimingPhase::Total => "TOTAL",
        };
        f.write_str(name)
    }
}

/// Rules over one timing phase, compared in whole milliseconds
pub(crate) struct ResponseTimeEvaluator;

fn phase(rule: &AssertionRule) -> Result<TimingPhase, RuleError> {
    let property = target::required_property(rule)?;
    property
        .parse()
        .map_err(|_| RuleError::UnknownProperty(AssertionSource::ResponseTime, property.to_string()))
}

impl Evaluator for ResponseTimeEvaluator {
    fn validate(&self, rule: &AssertionRule) -> Result<(), RuleError> {
        phase(rule)?;
        if !is_numeric_operator(rule.operator) {
            return Err(target::unsupported(AssertionSource::ResponseTime, rule));
        }
        target::non_negative_integer(rule).map(drop)
    }

    fn evaluate(
        &self,
        rule: &AssertionRule,
        result: &ProbeResult,
        _now: DateTime<Utc>,
    ) -> Result<bool, RuleError> {
        let expected = target::non_negative_integer(rule)?;
        // Truncate to whole milliseconds before comparing
        let measured = phase(rule)?.of(&result.timing).as_millis() as i64;
        Ok(compare_numbers(rule.operator, measured, expected))
    }
}
