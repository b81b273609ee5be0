//! Pure data transformations used by `data_transform` steps.
//!
//! Every transform accepts either a single object or an array of objects:
//! - `map` - Project fields from (possibly nested) source paths
//! - `filter` - Keep elements matching a condition list
//! - `aggregate` - Sum/average/count/min/max over a numeric field
//! - `format` - Render as JSON, CSV or a `{{ field }}` template

mod aggregate;
mod filter;
mod format;
mod map;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::EngineResult;

pub use self::aggregate::{aggregate, AggregateOp};
pub use self::filter::filter;
pub use self::format::{apply_template, format, to_csv, OutputFormat};
pub use self::map::{map, FieldMapping};

/// Transform configuration, tagged by `type`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformConfig {
    /// Target field -> source path, in output order.
    Map { mapping: FieldMapping },
    /// Keep elements satisfying all conditions.
    Filter {
        #[serde(default)]
        conditions: Vec<Condition>,
    },
    /// Reduce a numeric field.
    Aggregate { field: String, operation: AggregateOp },
    /// Render to text.
    Format {
        format: OutputFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        template: Option<String>,
    },
}

impl TransformConfig {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformConfig::Map { .. } => "map",
            TransformConfig::Filter { .. } => "filter",
            TransformConfig::Aggregate { .. } => "aggregate",
            TransformConfig::Format { .. } => "format",
        }
    }

    /// Apply the transform to `data`.
    pub fn apply(&self, data: &Value) -> EngineResult<Value> {
        match self {
            TransformConfig::Map { mapping } => Ok(map(data, mapping)),
            TransformConfig::Filter { conditions } => Ok(filter(data, conditions)),
            TransformConfig::Aggregate { field, operation } => {
                Ok(aggregate(data, field, *operation))
            }
            TransformConfig::Format { format: output, template } => {
                format(data, *output, template.as_deref()).map(Value::String)
            }
        }
    }
}
