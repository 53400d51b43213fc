//! Target shape checks shared by the evaluators.

use serde_json::Value;

use super::{AssertionRule, AssertionSource, RuleError};

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "nothing".to_string(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

fn invalid(rule: &AssertionRule, expected: &'static str) -> RuleError {
    RuleError::InvalidTarget {
        operator: rule.operator,
        expected,
        found: describe(&rule.target),
    }
}

pub(super) fn integer(rule: &AssertionRule) -> Result<i64, RuleError> {
    rule.target.as_i64().ok_or_else(|| invalid(rule, "an integer"))
}

pub(super) fn non_negative_integer(rule: &AssertionRule) -> Result<i64, RuleError> {
    match rule.target.as_i64() {
        Some(value) if value >= 0 => Ok(value),
        _ => Err(invalid(rule, "a non-negative integer")),
    }
}

pub(super) fn string(rule: &AssertionRule) -> Result<&str, RuleError> {
    rule.target.as_str().ok_or_else(|| invalid(rule, "a string"))
}

pub(super) fn non_empty_string(rule: &AssertionRule) -> Result<&str, RuleError> {
    match rule.target.as_str() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(invalid(rule, "a non-empty string")),
    }
}

/// Absent, `null` and `""` all count as "no target"
pub(super) fn none(rule: &AssertionRule) -> Result<(), RuleError> {
    match &rule.target {
        Value::Null => Ok(()),
        Value::String(s) if s.is_empty() => Ok(()),
        _ => Err(invalid(rule, "no target")),
    }
}

pub(super) fn no_property(rule: &AssertionRule) -> Result<(), RuleError> {
    match rule.property() {
        None => Ok(()),
        Some(property) => Err(RuleError::UnexpectedProperty(rule.source, property.to_string())),
    }
}

pub(super) fn required_property(rule: &AssertionRule) -> Result<&str, RuleError> {
    rule.property().ok_or(RuleError::MissingProperty(rule.source))
}

pub(super) fn unsupported(source: AssertionSource, rule: &AssertionRule) -> RuleError {
    RuleError::UnsupportedOperator(source, rule.operator)
}
