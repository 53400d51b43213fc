use chrono::{DateTime, Utc};

use super::{AssertionRule, AssertionSource, Evaluator, RuleError};
use crate::monitoring::types::ProbeResult;

/// Reserved for JSON-path style body rules. The tag is accepted when
/// parsing so stored configurations round-trip, but rules using it are
/// refused until path semantics are settled.
pub(crate) struct JsonBodyEvaluator;

impl Evaluator for JsonBodyEvaluator {
    fn validate(&self, _rule: &AssertionRule) -> Result<(), RuleError> {
        Err(RuleError::NotImplemented(AssertionSource::JsonBody))
    }

    fn evaluate(
        &self,
        _rule: &AssertionRule,
        _result: &ProbeResult,
        _now: DateTime<Utc>,
    ) -> Result<bool, RuleError> {
        Err(RuleError::NotImplemented(AssertionSource::JsonBody))
    }
}
