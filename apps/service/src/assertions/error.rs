use thiserror::Error;

use super::{AssertionSource, Operator};

/// A rule that cannot be evaluated as configured
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    #[error("{0} rules take no property, got {1:?}")]
    UnexpectedProperty(AssertionSource, String),

    #[error("{0} rules require a property")]
    MissingProperty(AssertionSource),

    #[error("unknown {0} property {1:?}")]
    UnknownProperty(AssertionSource, String),

    #[error("operator {1} is not supported for {0} rules")]
    UnsupportedOperator(AssertionSource, Operator),

    #[error("operator {operator} expects {expected}, got {found}")]
    InvalidTarget { operator: Operator, expected: &'static str, found: String },

    #[error("{0} assertions are not implemented")]
    NotImplemented(AssertionSource),

    #[error("rule {index}: {error}")]
    AtIndex { index: usize, error: Box<RuleError> },
}

impl RuleError {
    /// Attach the position of the offending rule
    pub(crate) fn at(self, index: usize) -> Self {
        match self {
            RuleError::AtIndex { .. } => self,
            error => RuleError::AtIndex { index, error: Box::new(error) },
        }
    }

    /// Position of the offending rule, when known
    pub fn index(&self) -> Option<usize> {
        match self {
            RuleError::AtIndex { index, .. } => Some(*index),
            _ => None,
        }
    }
}
