//! Comparisons over text values (header values, response bodies) and the
//! plain numeric comparisons used by timing and status rules.

use super::{AssertionRule, AssertionSource, Operator, RuleError, target};

pub(super) fn validate_text_rule(
    source: AssertionSource,
    rule: &AssertionRule,
) -> Result<(), RuleError> {
    match rule.operator {
        Operator::Equal | Operator::NotEqual => target::string(rule).map(drop),
        Operator::Empty | Operator::NotEmpty => target::none(rule),
        Operator::Contains | Operator::NotContains => target::non_empty_string(rule).map(drop),
        Operator::GreaterThan | Operator::LessThan => target::integer(rule).map(drop),
        _ => Err(target::unsupported(source, rule)),
    }
}

/// Apply a validated text rule to `value`. Numeric comparisons against text
/// that is not an integer are `false`, never an error.
pub(super) fn compare_text(
    source: AssertionSource,
    rule: &AssertionRule,
    value: &str,
) -> Result<bool, RuleError> {
    let verdict = match rule.operator {
        Operator::Equal => value == target::string(rule)?,
        Operator::NotEqual => value != target::string(rule)?,
        Operator::Empty => value.is_empty(),
        Operator::NotEmpty => !value.is_empty(),
        Operator::Contains => value.contains(target::non_empty_string(rule)?),
        Operator::NotContains => !value.contains(target::non_empty_string(rule)?),
        Operator::GreaterThan | Operator::LessThan => {
            let expected = target::integer(rule)?;
            match value.trim().parse::<i64>() {
                Ok(actual) => compare_numbers(rule.operator, actual, expected),
                Err(_) => false,
            }
        }
        _ => return Err(target::unsupported(source, rule)),
    };

    Ok(verdict)
}

pub(super) fn is_numeric_operator(operator: Operator) -> bool {
    matches!(
        operator,
        Operator::Equal | Operator::NotEqual | Operator::GreaterThan | Operator::LessThan
    )
}

pub(super) fn compare_numbers(operator: Operator, actual: i64, expected: i64) -> bool {
    match operator {
        Operator::Equal => actual == expected,
        Operator::NotEqual => actual != expected,
        Operator::GreaterThan => actual > expected,
        Operator::LessThan => actual < expected,
        _ => false,
    }
}
