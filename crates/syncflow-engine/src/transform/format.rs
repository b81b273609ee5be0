//! Output formatting: JSON, CSV and placeholder templates.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::value::{resolve_defined, to_text};

/// Output format for `format` transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Json,
    Csv,
    Template,
}

/// Render `data` in the requested format.
pub fn format(data: &Value, output: OutputFormat, template: Option<&str>) -> EngineResult<String> {
    match output {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(data)?),
        OutputFormat::Csv => Ok(to_csv(data)),
        OutputFormat::Template => {
            let template = template.ok_or_else(|| {
                EngineError::Configuration("template format requires a 'template' string".to_string())
            })?;
            Ok(match data {
                Value::Array(items) => items
                    .iter()
                    .map(|item| apply_template(item, template))
                    .collect::<Vec<_>>()
                    .join("\n"),
                other => apply_template(other, template),
            })
        }
    }
}

/// Render records as CSV.
///
/// The header comes from the first record's keys. Values containing a comma,
/// quote or newline are quoted with embedded quotes doubled.
pub fn to_csv(data: &Value) -> String {
    let rows: Vec<&Value> = match data {
        Value::Array(items) => items.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    };

    let headers: Vec<String> = match rows.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        _ => return String::new(),
    };

    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        headers
            .iter()
            .map(|h| escape_csv(h))
            .collect::<Vec<_>>()
            .join(","),
    );

    for row in rows {
        let line = headers
            .iter()
            .map(|h| row.get(h).map(|v| escape_csv(&to_text(v))).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(",");
        lines.push(line);
    }

    lines.join("\n")
}

fn escape_csv(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n' | '\r')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").expect("static placeholder regex"))
}

/// Replace `{{ path }}` placeholders with values looked up in `data`.
///
/// Placeholders whose path is missing or null stay in the output verbatim.
pub fn apply_template(data: &Value, template: &str) -> String {
    placeholder_regex()
        .replace_all(template, |caps: &regex::Captures<'_>| {
            match resolve_defined(data, &caps[1]) {
                Some(value) => to_text(value),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
