//! Condition-based filtering.

use serde_json::Value;

use crate::condition::{Condition, ConditionEvaluator};

/// Keep array elements that satisfy `conditions`.
///
/// A single value is returned as-is when it matches, `null` otherwise.
pub fn filter(data: &Value, conditions: &[Condition]) -> Value {
    let evaluator = ConditionEvaluator::new();
    match data {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| evaluator.evaluate(conditions, item))
                .cloned()
                .collect(),
        ),
        other if evaluator.evaluate(conditions, other) => other.clone(),
        _ => Value::Null,
    }
}
