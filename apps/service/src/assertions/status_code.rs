use chrono::{DateTime, Utc};

use super::text::{compare_numbers, is_numeric_operator};
use super::{AssertionRule, AssertionSource, Evaluator, RuleError, target};
use crate::monitoring::types::ProbeResult;

pub(crate) struct StatusCodeEvaluator;

fn status_target(rule: &AssertionRule) -> Result<i64, RuleError> {
    match target::integer(rule)? {
        code @ 100..=999 => Ok(code),
        _ => Err(RuleError::InvalidTarget {
            operator: rule.operator,
            expected: "a three digit status code",
            found: rule.target.to_string(),
        }),
    }
}

impl Evaluator for StatusCodeEvaluator {
    fn validate(&self, rule: &AssertionRule) -> Result<(), RuleError> {
        target::no_property(rule)?;
        if !is_numeric_operator(rule.operator) {
            return Err(target::unsupported(AssertionSource::StatusCode, rule));
        }
        status_target(rule).map(drop)
    }

    fn evaluate(
        &self,
        rule: &AssertionRule,
        result: &ProbeResult,
        _now: DateTime<Utc>,
    ) -> Result<bool, RuleError> {
        let expected = status_target(rule)?;
        let actual = i64::from(result.response.status_code);
        Ok(compare_numbers(rule.operator, actual, expected))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::assertions::{Operator, is_rule_valid};

    fn check(status: u16, operator: Operator, target: Value) -> bool {
        let rule = AssertionRule::new(AssertionSource::StatusCode, None, operator, target);
        is_rule_valid(&rule).unwrap();
        let mut result = ProbeResult::default();
        result.response.status_code = status;
        StatusCodeEvaluator.evaluate(&rule, &result, Utc::now()).unwrap()
    }

    #[test]
    fn test_greater_than() {
        assert!(check(201, Operator::GreaterThan, json!(200)));
        assert!(!check(200, Operator::GreaterThan, json!(200)));
    }

    #[test]
    fn test_other_operators() {
        assert!(check(200, Operator::Equal, json!(200)));
        assert!(check(503, Operator::NotEqual, json!(200)));
        assert!(check(302, Operator::LessThan, json!(400)));
        assert!(!check(404, Operator::LessThan, json!(400)));
    }

    #[test]
    fn test_validation() {
        let out_of_range = AssertionRule::new(AssertionSource::StatusCode, None, Operator::Equal, json!(42));
        assert!(is_rule_valid(&out_of_range).is_err());

        let with_property =
            AssertionRule::new(AssertionSource::StatusCode, Some("code"), Operator::Equal, json!(200));
        assert!(matches!(is_rule_valid(&with_property), Err(RuleError::UnexpectedProperty(..))));

        let empty = AssertionRule::new(AssertionSource::StatusCode, None, Operator::Empty, Value::Null);
        assert!(matches!(is_rule_valid(&empty), Err(RuleError::UnsupportedOperator(..))));

        let as_string = AssertionRule::new(AssertionSource::StatusCode, None, Operator::Equal, json!("200"));
        assert!(is_rule_valid(&as_string).is_err());
    }
}
