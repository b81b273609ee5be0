//! Field/operator/value predicate evaluation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{loosely_equal, resolve_path, to_f64, to_text};

static NULL: Value = Value::Null;

/// Condition operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    /// Equality check (numbers compare numerically).
    #[default]
    Equals,
    /// Inequality check.
    NotEquals,
    /// String containment via string coercion. Array fields are the
    /// exception: they test for an equal element, so `["vip"]` does not
    /// contain `"vi"`.
    Contains,
    /// Numeric greater than.
    GreaterThan,
    /// Numeric less than.
    LessThan,
    /// Field is present and not null.
    Exists,
}

/// A single predicate against a dot-path field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    /// Dot-separated field path.
    pub field: String,

    /// Operator.
    #[serde(default)]
    pub operator: Operator,

    /// Right-hand side value (ignored by `exists`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(field: impl Into<String>, operator: Operator, value: Option<Value>) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }
}

/// Evaluates AND-combined condition lists against arbitrary JSON data.
///
/// There is no OR combinator; callers needing alternatives use separate
/// condition steps.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator;

impl ConditionEvaluator {
    /// Create a new condition evaluator.
    pub fn new() -> Self {
        Self
    }

    /// Evaluate all conditions (AND logic). An empty list is true.
    pub fn evaluate(&self, conditions: &[Condition], data: &Value) -> bool {
        conditions
            .iter()
            .all(|condition| self.evaluate_condition(condition, data))
    }

    /// Evaluate a single condition.
    pub fn evaluate_condition(&self, condition: &Condition, data: &Value) -> bool {
        let field = resolve_path(data, &condition.field);
        let expected = condition.value.as_ref().unwrap_or(&NULL);

        match condition.operator {
            Operator::Exists => field.is_some_and(|v| !v.is_null()),
            Operator::Equals => field.is_some_and(|v| loosely_equal(v, expected)),
            Operator::NotEquals => !field.is_some_and(|v| loosely_equal(v, expected)),
            Operator::Contains => match field {
                Some(Value::Array(items)) => items.iter().any(|item| loosely_equal(item, expected)),
                Some(v) if !v.is_null() => to_text(v).contains(&to_text(expected)),
                _ => false,
            },
            Operator::GreaterThan => compare_numeric(field, expected, |a, b| a > b),
            Operator::LessThan => compare_numeric(field, expected, |a, b| a < b),
        }
    }
}

/// Compare two values numerically; anything not coercible compares false.
fn compare_numeric<F>(left: Option<&Value>, right: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (left.and_then(to_f64), to_f64(right)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}
