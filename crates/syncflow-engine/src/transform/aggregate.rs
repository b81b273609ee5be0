//! Numeric aggregation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::value::{number, resolve_defined, to_f64};

/// Aggregation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateOp {
    Sum,
    Average,
    Count,
    Min,
    Max,
}

/// Aggregate `field` over the elements of `data`.
///
/// Elements whose field is absent or null are ignored. `count` counts the
/// remaining elements; the numeric operations use the values that coerce to
/// numbers. Over an empty set `sum` is 0 and `average`, `min`, `max` are null.
pub fn aggregate(data: &Value, field: &str, operation: AggregateOp) -> Value {
    let items: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let defined: Vec<&Value> = items
        .into_iter()
        .filter_map(|item| resolve_defined(item, field))
        .collect();

    if operation == AggregateOp::Count {
        return Value::from(defined.len());
    }

    let values: Vec<f64> = defined.into_iter().filter_map(to_f64).collect();

    match operation {
        AggregateOp::Sum => number(values.iter().sum()),
        AggregateOp::Average if values.is_empty() => Value::Null,
        AggregateOp::Average => number(values.iter().sum::<f64>() / values.len() as f64),
        AggregateOp::Min => values.iter().copied().reduce(f64::min).map(number).unwrap_or(Value::Null),
        AggregateOp::Max => values.iter().copied().reduce(f64::max).map(number).unwrap_or(Value::Null),
        AggregateOp::Count => unreachable!("count handled above"),
    }
}
