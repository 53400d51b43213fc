use chrono::{DateTime, TimeDelta, Utc};

use super::{AssertionRule, AssertionSource, Evaluator, Operator, RuleError, target};
use crate::monitoring::types::ProbeResult;

/// Certificate expiry rules. Probes without TLS data (plain HTTP) never
/// satisfy any of them.
pub(crate) struct TlsEvaluator;

impl Evaluator for TlsEvaluator {
    fn validate(&self, rule: &AssertionRule) -> Result<(), RuleError> {
        target::no_property(rule)?;
        match rule.operator {
            Operator::Expired | Operator::NotExpired => target::none(rule),
            Operator::ExpiresLessThan | Operator::ExpiresGreaterThan => {
                target::non_negative_integer(rule).map(drop)
            }
            _ => Err(target::unsupported(AssertionSource::Tls, rule)),
        }
    }

    fn evaluate(
        &self,
        rule: &AssertionRule,
        result: &ProbeResult,
        now: DateTime<Utc>,
    ) -> Result<bool, RuleError> {
        let Some(tls) = &result.tls else {
            return Ok(false);
        };
        let not_after = tls.certificate.not_after;

        let verdict = match rule.operator {
            Operator::Expired => not_after <= now,
            Operator::NotExpired => not_after > now,
            Operator::ExpiresLessThan | Operator::ExpiresGreaterThan => {
                let window = TimeDelta::nanoseconds(target::non_negative_integer(rule)?);
                let remaining = not_after - now;
                if rule.operator == Operator::ExpiresLessThan {
                    remaining < window
                } else {
                    remaining > window
                }
            }
            _ => return Err(target::unsupported(AssertionSource::Tls, rule)),
        };

        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::assertions::is_rule_valid;
    use crate::monitoring::types::{CertificateInfo, TlsInfo};

    const SECOND_NS: i64 = 1_000_000_000;

    fn result_expiring_at(not_after: DateTime<Utc>) -> ProbeResult {
        ProbeResult {
            tls: Some(TlsInfo {
                version: "TLS 1.3".to_string(),
                cipher: "TLS13_AES_128_GCM_SHA256".to_string(),
                certificate: CertificateInfo {
                    issuer: "Let's Encrypt".to_string(),
                    subject: "example.com".to_string(),
                    not_before: not_after - TimeDelta::days(90),
                    not_after,
                },
            }),
            ..ProbeResult::default()
        }
    }

    fn check(result: &ProbeResult, operator: Operator, target: Value, now: DateTime<Utc>) -> bool {
        let rule = AssertionRule::new(AssertionSource::Tls, None, operator, target);
        is_rule_valid(&rule).unwrap();
        TlsEvaluator.evaluate(&rule, result, now).unwrap()
    }

    #[test]
    fn test_expires_less_than() {
        let now = Utc::now();
        let result = result_expiring_at(now + TimeDelta::minutes(1));

        assert!(check(&result, Operator::ExpiresLessThan, json!(300 * SECOND_NS), now));
        assert!(!check(&result, Operator::ExpiresLessThan, json!(30 * SECOND_NS), now));
        assert!(check(&result, Operator::ExpiresGreaterThan, json!(30 * SECOND_NS), now));
    }

    #[test]
    fn test_expired() {
        let now = Utc::now();
        let valid = result_expiring_at(now + TimeDelta::days(30));
        let expired = result_expiring_at(now - TimeDelta::seconds(1));

        assert!(check(&valid, Operator::NotExpired, Value::Null, now));
        assert!(!check(&valid, Operator::Expired, Value::Null, now));
        assert!(check(&expired, Operator::Expired, Value::Null, now));
        assert!(!check(&expired, Operator::NotExpired, Value::Null, now));
    }

    #[test]
    fn test_plain_http_never_passes() {
        let now = Utc::now();
        let plain = ProbeResult::default();

        assert!(!check(&plain, Operator::Expired, Value::Null, now));
        assert!(!check(&plain, Operator::NotExpired, Value::Null, now));
        assert!(!check(&plain, Operator::ExpiresGreaterThan, json!(0), now));
    }

    #[test]
    fn test_validation() {
        let with_target = AssertionRule::new(AssertionSource::Tls, None, Operator::Expired, json!(5));
        assert!(is_rule_valid(&with_target).is_err());

        let missing_window =
            AssertionRule::new(AssertionSource::Tls, None, Operator::ExpiresLessThan, Value::Null);
        assert!(is_rule_valid(&missing_window).is_err());

        let negative =
            AssertionRule::new(AssertionSource::Tls, None, Operator::ExpiresLessThan, json!(-1));
        assert!(is_rule_valid(&negative).is_err());

        let equal = AssertionRule::new(AssertionSource::Tls, None, Operator::Equal, json!(1));
        assert!(matches!(is_rule_valid(&equal), Err(RuleError::UnsupportedOperator(..))));
    }
}
