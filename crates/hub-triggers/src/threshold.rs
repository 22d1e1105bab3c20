//! Threshold predicates
//!
//! A threshold compares the value read from a control payload against a
//! configured operand. Numbers and numeric strings compare numerically;
//! everything else falls back to equality.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operator of a threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Equal
    #[default]
    #[serde(alias = "==")]
    Eq,
    /// Not equal
    #[serde(alias = "!=")]
    Ne,
    /// Greater than
    #[serde(alias = ">")]
    Gt,
    /// Greater than or equal
    #[serde(alias = ">=")]
    Gte,
    /// Less than
    #[serde(alias = "<")]
    Lt,
    /// Less than or equal
    #[serde(alias = "<=")]
    Lte,
    /// Value is present
    #[serde(alias = "exists")]
    Ex,
}

/// A single threshold: `{comparison: gt, value: 50}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub comparison: Comparison,

    #[serde(default)]
    pub value: Value,
}

impl Threshold {
    /// Create a new threshold
    pub fn new(comparison: Comparison, value: impl Into<Value>) -> Self {
        Self {
            comparison,
            value: value.into(),
        }
    }

    /// Test a payload value against this threshold
    pub fn matches(&self, value: &Value) -> bool {
        match self.comparison {
            Comparison::Ex => !value.is_null(),
            Comparison::Eq => values_equal(value, &self.value),
            Comparison::Ne => !values_equal(value, &self.value),
            Comparison::Gt | Comparison::Gte | Comparison::Lt | Comparison::Lte => {
                let (Some(lhs), Some(rhs)) = (as_number(value), as_number(&self.value)) else {
                    return false;
                };
                match self.comparison {
                    Comparison::Gt => lhs > rhs,
                    Comparison::Gte => lhs >= rhs,
                    Comparison::Lt => lhs < rhs,
                    _ => lhs <= rhs,
                }
            }
        }
    }
}

/// Evaluate a list of thresholds: every threshold must pass
///
/// An absent value or an empty threshold list never matches.
pub fn evaluate_thresholds(thresholds: &[Threshold], value: Option<&Value>) -> bool {
    let Some(value) = value else {
        return false;
    };
    !thresholds.is_empty() && thresholds.iter().all(|t| t.matches(value))
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (as_number(lhs), as_number(rhs)) {
        (Some(a), Some(b)) => a == b,
        _ => lhs == rhs,
    }
}
