//! Monitor configuration checks
//!
//! Everything here runs when a monitor is created or edited, so a broken
//! monitor is rejected up front instead of producing error results forever.

use std::time::Duration;

use hyper::header::{HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::assertions::{self, RuleError};
use crate::monitoring::types::MonitorSpec;

pub const ALLOWED_METHODS: [&str; 7] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"];

pub const MIN_FREQUENCY: Duration = Duration::from_secs(1);
pub const MAX_FREQUENCY: Duration = Duration::from_secs(24 * 60 * 60);
pub const MIN_TIMEOUT: Duration = Duration::from_millis(100);
pub const MAX_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const MAX_HEADERS: usize = 50;
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("name cannot be empty")]
    EmptyName,

    #[error("name too long (max 100 characters)")]
    NameTooLong,

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("unsupported method {0}")]
    UnsupportedMethod(String),

    #[error("frequency must be between 1s and 24h, got {0:?}")]
    Frequency(Duration),

    #[error("timeout must be between 100ms and 5m, got {0:?}")]
    Timeout(Duration),

    #[error("too many headers ({0}, max 50)")]
    TooManyHeaders(usize),

    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    #[error("request body too large ({0} bytes, max 1 MiB)")]
    BodyTooLarge(usize),

    #[error("invalid assertion: {0}")]
    Assertion(#[from] RuleError),
}

/// Validate HTTP/HTTPS URL endpoint
pub fn validate_http_endpoint(target: &str) -> Result<(), ValidationError> {
    if target.trim().is_empty() {
        return Err(ValidationError::InvalidUrl("url cannot be empty".to_string()));
    }

    let url = Url::parse(target).map_err(|e| {
        if target.contains("://") {
            ValidationError::InvalidUrl(e.to_string())
        } else {
            ValidationError::InvalidUrl("url must include scheme (http:// or https://)".to_string())
        }
    })?;

    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(ValidationError::InvalidUrl(format!(
            "invalid scheme '{scheme}', must be http or https"
        )));
    }

    if url.host_str().is_none_or(str::is_empty) {
        return Err(ValidationError::InvalidUrl("url must have a valid host".to_string()));
    }

    Ok(())
}

/// Validate monitor name
pub fn validate_monitor_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }

    if trimmed.chars().count() > 100 {
        return Err(ValidationError::NameTooLong);
    }

    Ok(())
}

pub fn validate_method(method: &str) -> Result<(), ValidationError> {
    if ALLOWED_METHODS.contains(&method) {
        Ok(())
    } else {
        Err(ValidationError::UnsupportedMethod(method.to_string()))
    }
}

pub fn validate_frequency(frequency: Duration) -> Result<(), ValidationError> {
    if (MIN_FREQUENCY..=MAX_FREQUENCY).contains(&frequency) {
        Ok(())
    } else {
        Err(ValidationError::Frequency(frequency))
    }
}

pub fn validate_timeout(timeout: Duration) -> Result<(), ValidationError> {
    if (MIN_TIMEOUT..=MAX_TIMEOUT).contains(&timeout) {
        Ok(())
    } else {
        Err(ValidationError::Timeout(timeout))
    }
}

pub fn validate_headers(headers: &[(String, String)]) -> Result<(), ValidationError> {
    if headers.len() > MAX_HEADERS {
        return Err(ValidationError::TooManyHeaders(headers.len()));
    }

    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err()
        {
            return Err(ValidationError::InvalidHeader(name.clone()));
        }
    }

    Ok(())
}

/// Validate everything the scheduler and worker rely on
pub fn validate_monitor_spec(spec: &MonitorSpec) -> Result<(), ValidationError> {
    validate_http_endpoint(&spec.url)?;
    validate_method(&spec.method)?;
    validate_frequency(spec.frequency)?;
    validate_timeout(spec.timeout)?;
    validate_headers(&spec.headers)?;

    if let Some(body) = &spec.body {
        if body.data.len() > MAX_BODY_BYTES {
            return Err(ValidationError::BodyTooLarge(body.data.len()));
        }
        if HeaderValue::from_str(&body.content_type).is_err() {
            return Err(ValidationError::InvalidHeader("content-type".to_string()));
        }
    }

    assertions::validate_rules(&spec.assertions)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::assertions::{AssertionRule, AssertionSource, Operator};
    use crate::monitoring::types::RequestBody;

    fn spec() -> MonitorSpec {
        MonitorSpec::new("https://example.com/health", Duration::from_secs(60))
    }

    #[test]
    fn test_http_validation() {
        assert!(validate_http_endpoint("http://example.com").is_ok());
        assert!(validate_http_endpoint("https://example.com").is_ok());
        assert!(validate_http_endpoint("http://192.168.1.1").is_ok());
        assert!(validate_http_endpoint("http://example.com:8080/path?q=1").is_ok());

        assert!(validate_http_endpoint("").is_err());
        assert!(validate_http_endpoint("example.com").is_err());
        assert!(validate_http_endpoint("ftp://example.com").is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_monitor_name("My Monitor").is_ok());
        assert_eq!(validate_monitor_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(validate_monitor_name(&"x".repeat(101)), Err(ValidationError::NameTooLong));
    }

    #[test]
    fn test_frequency_and_timeout_bounds() {
        assert!(validate_frequency(Duration::from_secs(1)).is_ok());
        assert!(validate_frequency(Duration::from_secs(86_400)).is_ok());
        assert!(validate_frequency(Duration::from_millis(999)).is_err());
        assert!(validate_frequency(Duration::from_secs(86_401)).is_err());

        assert!(validate_timeout(Duration::from_millis(100)).is_ok());
        assert!(validate_timeout(Duration::from_millis(99)).is_err());
        assert!(validate_timeout(Duration::from_secs(301)).is_err());
    }

    #[test]
    fn test_spec_validation() {
        let mut valid = spec();
        valid.method = "POST".to_string();
        valid.headers = vec![("Authorization".to_string(), "Bearer abc".to_string())];
        valid.body = Some(RequestBody { content_type: "text/plain".to_string(), data: b"hi".to_vec() });
        assert!(validate_monitor_spec(&valid).is_ok());

        let mut lowercase = spec();
        lowercase.method = "get".to_string();
        assert!(matches!(
            validate_monitor_spec(&lowercase),
            Err(ValidationError::UnsupportedMethod(_))
        ));

        let mut bad_header = spec();
        bad_header.headers = vec![("bad header".to_string(), "x".to_string())];
        assert!(matches!(validate_monitor_spec(&bad_header), Err(ValidationError::InvalidHeader(_))));

        let mut crowded = spec();
        crowded.headers = (0..51).map(|i| (format!("x-h{i}"), "v".to_string())).collect();
        assert_eq!(validate_monitor_spec(&crowded), Err(ValidationError::TooManyHeaders(51)));

        let mut heavy = spec();
        heavy.body = Some(RequestBody {
            content_type: "application/octet-stream".to_string(),
            data: vec![0; MAX_BODY_BYTES + 1],
        });
        assert!(matches!(validate_monitor_spec(&heavy), Err(ValidationError::BodyTooLarge(_))));
    }

    #[test]
    fn test_broken_assertion_is_rejected_with_index() {
        let mut broken = spec();
        broken.assertions = vec![
            AssertionRule::new(AssertionSource::StatusCode, None, Operator::Equal, json!(200)),
            AssertionRule::new(AssertionSource::RawBody, None, Operator::NotContains, json!("")),
        ];

        let error = validate_monitor_spec(&broken).unwrap_err();
        match error {
            ValidationError::Assertion(rule_error) => assert_eq!(rule_error.index(), Some(1)),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
