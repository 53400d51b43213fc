//! Assertion engine - typed pass/fail rules evaluated against probe results
//!
//! Every rule names a [`AssertionSource`]; the source decides which
//! operators, properties and targets are legal and how the rule is
//! evaluated. Sources form a closed set, so routing a rule to its evaluator
//! is an exhaustive `match` rather than a lookup that could miss.
//!
//! Rule sets are validated as a whole before anything is evaluated: one bad
//! rule fails the entire call instead of being skipped.

mod error;
mod headers;
mod json_body;
mod raw_body;
mod response_time;
mod status_code;
mod target;
mod text;
mod tls;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::monitoring::types::ProbeResult;

pub use error::RuleError;
pub use response_time::TimingPhase;

/// Part of a probe result a rule looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssertionSource {
    ResponseTime,
    StatusCode,
    Headers,
    RawBody,
    JsonBody,
    Tls,
}

impl AssertionSource {
    pub const ALL: [AssertionSource; 6] = [
        AssertionSource::ResponseTime,
        AssertionSource::StatusCode,
        AssertionSource::Headers,
        AssertionSource::RawBody,
        AssertionSource::JsonBody,
        AssertionSource::Tls,
    ];

    fn evaluator(self) -> &'static dyn Evaluator {
        match self {
            AssertionSource::ResponseTime => &response_time::ResponseTimeEvaluator,
            AssertionSource::StatusCode => &status_code::StatusCodeEvaluator,
            AssertionSource::Headers => &headers::HeadersEvaluator,
            AssertionSource::RawBody => &raw_body::RawBodyEvaluator,
            AssertionSource::JsonBody => &json_body::JsonBodyEvaluator,
            AssertionSource::Tls => &tls::TlsEvaluator,
        }
    }
}

impl fmt::Display for AssertionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssertionSource::ResponseTime => "RESPONSE_TIME",
            AssertionSource::StatusCode => "STATUS_CODE",
            AssertionSource::Headers => "HEADERS",
            AssertionSource::RawBody => "RAW_BODY",
            AssertionSource::JsonBody => "JSON_BODY",
            AssertionSource::Tls => "TLS",
        };
        f.write_str(name)
    }
}

/// Comparison a rule performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    Empty,
    NotEmpty,
    Contains,
    NotContains,
    Expired,
    NotExpired,
    ExpiresLessThan,
    ExpiresGreaterThan,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operator::Equal => "EQUAL",
            Operator::NotEqual => "NOT_EQUAL",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::Empty => "EMPTY",
            Operator::NotEmpty => "NOT_EMPTY",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT_CONTAINS",
            Operator::Expired => "EXPIRED",
            Operator::NotExpired => "NOT_EXPIRED",
            Operator::ExpiresLessThan => "EXPIRES_LESS_THAN",
            Operator::ExpiresGreaterThan => "EXPIRES_GREATER_THAN",
        };
        f.write_str(name)
    }
}

/// A single configurable rule
///
/// `target` is kept as raw JSON because its required shape depends on the
/// source and operator; validation checks it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssertionRule {
    pub source: AssertionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    pub operator: Operator,
    #[serde(default)]
    pub target: serde_json::Value,
}

impl AssertionRule {
    pub fn new(
        source: AssertionSource,
        property: Option<&str>,
        operator: Operator,
        target: serde_json::Value,
    ) -> Self {
        Self { source, property: property.map(str::to_string), operator, target }
    }

    /// Property with surrounding whitespace removed; `None` when blank
    pub(crate) fn property(&self) -> Option<&str> {
        self.property.as_deref().map(str::trim).filter(|p| !p.is_empty())
    }
}

/// Validation and evaluation for one source
pub(crate) trait Evaluator: Sync {
    fn validate(&self, rule: &AssertionRule) -> Result<(), RuleError>;

    fn evaluate(
        &self,
        rule: &AssertionRule,
        result: &ProbeResult,
        now: DateTime<Utc>,
    ) -> Result<bool, RuleError>;
}

/// Check that a single rule is well formed for its source
pub fn is_rule_valid(rule: &AssertionRule) -> Result<(), RuleError> {
    rule.source.evaluator().validate(rule)
}

/// Validate a whole rule set, reporting the first offending index
pub fn validate_rules(rules: &[AssertionRule]) -> Result<(), RuleError> {
    for (index, rule) in rules.iter().enumerate() {
        is_rule_valid(rule).map_err(|error| error.at(index))?;
    }
    Ok(())
}

/// Evaluate `rules` against `result`; `verdicts[i]` belongs to `rules[i]`
pub fn assert(result: &ProbeResult, rules: &[AssertionRule]) -> Result<Vec<bool>, RuleError> {
    assert_at(result, rules, Utc::now())
}

/// Same as [`assert`] with an explicit clock for certificate expiry rules
pub fn assert_at(
    result: &ProbeResult,
    rules: &[AssertionRule],
    now: DateTime<Utc>,
) -> Result<Vec<bool>, RuleError> {
    validate_rules(rules)?;

    rules
        .iter()
        .enumerate()
        .map(|(index, rule)| {
            rule.source.evaluator().evaluate(rule, result, now).map_err(|error| error.at(index))
        })
        .collect()
}

/// Caller-side aggregation: every rule passed (vacuously true when empty)
pub fn all_passed(verdicts: &[bool]) -> bool {
    verdicts.iter().all(|passed| *passed)
}
