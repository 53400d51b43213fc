use chrono::{DateTime, Utc};

use super::text::{compare_text, validate_text_rule};
use super::{AssertionRule, AssertionSource, Evaluator, RuleError, target};
use crate::monitoring::types::ProbeResult;

/// Rules over the captured (size-capped) response body read as text
pub(crate) struct RawBodyEvaluator;

impl Evaluator for RawBodyEvaluator {
    fn validate(&self, rule: &AssertionRule) -> Result<(), RuleError> {
        target::no_property(rule)?;
        validate_text_rule(AssertionSource::RawBody, rule)
    }

    fn evaluate(
        &self,
        rule: &AssertionRule,
        result: &ProbeResult,
        _now: DateTime<Utc>,
    ) -> Result<bool, RuleError> {
        compare_text(AssertionSource::RawBody, rule, &result.response.body_text())
    }
}
