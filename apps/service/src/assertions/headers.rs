use chrono::{DateTime, Utc};

use super::text::{compare_text, validate_text_rule};
use super::{AssertionRule, AssertionSource, Evaluator, RuleError, target};
use crate::monitoring::types::ProbeResult;

/// Rules over a single response header. The property names the header;
/// a missing header reads as the empty string.
pub(crate) struct HeadersEvaluator;

impl Evaluator for HeadersEvaluator {
    fn validate(&self, rule: &AssertionRule) -> Result<(), RuleError> {
        target::required_property(rule)?;
        validate_text_rule(AssertionSource::Headers, rule)
    }

    fn evaluate(
        &self,
        rule: &AssertionRule,
        result: &ProbeResult,
        _now: DateTime<Utc>,
    ) -> Result<bool, RuleError> {
        let name = target::required_property(rule)?;
        let value = result.response.header(name).unwrap_or_default();
        compare_text(AssertionSource::Headers, rule, value)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::assertions::{Operator, is_rule_valid};
    use crate::monitoring::types::ResponseData;

    fn result() -> ProbeResult {
        ProbeResult {
            response: ResponseData {
                status_code: 200,
                headers: vec![
                    ("Content-Type".to_string(), "text/html; charset=utf-8".to_string()),
                    ("Content-Length".to_string(), "1024".to_string()),
                    ("X-Empty".to_string(), String::new()),
                    ("X-Version".to_string(), "v2".to_string()),
                ],
                body: Vec::new(),
            },
            ..ProbeResult::default()
        }
    }

    fn check(property: &str, operator: Operator, target: Value) -> bool {
        let rule = AssertionRule::new(AssertionSource::Headers, Some(property), operator, target);
        is_rule_valid(&rule).unwrap();
        HeadersEvaluator.evaluate(&rule, &result(), Utc::now()).unwrap()
    }

    #[test]
    fn test_equality() {
        assert!(check("x-version", Operator::Equal, json!("v2")));
        assert!(!check("x-version", Operator::Equal, json!("V2")));
        assert!(check("x-version", Operator::NotEqual, json!("v3")));
        assert!(check("x-missing", Operator::Equal, json!("")));
    }

    #[test]
    fn test_emptiness() {
        assert!(check("X-Empty", Operator::Empty, Value::Null));
        assert!(check("X-Missing", Operator::Empty, json!("")));
        assert!(check("content-type", Operator::NotEmpty, Value::Null));
        assert!(!check("x-empty", Operator::NotEmpty, Value::Null));
    }

    #[test]
    fn test_contains() {
        assert!(check("content-type", Operator::Contains, json!("text/html")));
        assert!(check("content-type", Operator::NotContains, json!("json")));
        assert!(!check("content-type", Operator::NotContains, json!("utf-8")));
    }

    #[test]
    fn test_numeric_comparisons() {
        assert!(check("content-length", Operator::GreaterThan, json!(1000)));
        assert!(!check("content-length", Operator::GreaterThan, json!(1024)));
        assert!(check("content-length", Operator::LessThan, json!(2048)));
    }

    #[test]
    fn test_numeric_comparison_on_text_fails_closed() {
        assert!(!check("x-version", Operator::GreaterThan, json!(1)));
        assert!(!check("x-version", Operator::LessThan, json!(1)));
        assert!(!check("x-missing", Operator::LessThan, json!(1)));
    }

    #[test]
    fn test_contains_requires_non_empty_target() {
        for operator in [Operator::Contains, Operator::NotContains] {
            for target in [json!(""), Value::Null] {
                let rule =
                    AssertionRule::new(AssertionSource::Headers, Some("server"), operator, target);
                assert!(matches!(is_rule_valid(&rule), Err(RuleError::InvalidTarget { .. })));
            }
        }
    }

    #[test]
    fn test_empty_requires_no_target() {
        let rule =
            AssertionRule::new(AssertionSource::Headers, Some("server"), Operator::Empty, json!("x"));
        assert!(is_rule_valid(&rule).is_err());
    }

    #[test]
    fn test_property_is_required() {
        let rule = AssertionRule::new(AssertionSource::Headers, None, Operator::NotEmpty, Value::Null);
        assert_eq!(is_rule_valid(&rule), Err(RuleError::MissingProperty(AssertionSource::Headers)));

        let blank =
            AssertionRule::new(AssertionSource::Headers, Some("  "), Operator::NotEmpty, Value::Null);
        assert!(is_rule_valid(&blank).is_err());
    }

    #[test]
    fn test_tls_operators_are_rejected() {
        let rule =
            AssertionRule::new(AssertionSource::Headers, Some("date"), Operator::Expired, Value::Null);
        assert_eq!(
            is_rule_valid(&rule),
            Err(RuleError::UnsupportedOperator(AssertionSource::Headers, Operator::Expired))
        );
    }
}
