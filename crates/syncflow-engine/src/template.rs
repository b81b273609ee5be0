//! Rendering of `{{ ... }}` references inside step configs.
//!
//! Step configs for api_call, webhook and notification steps may reference the
//! workflow context (`{{ input.id }}`, `{{ steps.fetch.records | length }}`).
//! Strings that consist of a single expression evaluate to the native JSON
//! value; mixed strings render to text.

use std::collections::HashMap;
use std::sync::OnceLock;

use minijinja::{Environment, Value};
use regex::Regex;

use crate::error::EngineError;

/// Template engine with Jinja2-compatible syntax.
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new template engine with custom filters.
    pub fn new() -> Self {
        let mut env = Environment::new();

        env.add_filter("tojson", filter_tojson);
        env.add_filter("default", filter_default);
        env.add_filter("d", filter_default);
        env.add_filter("length", filter_length);

        Self { env }
    }

    /// Render a template string with the given context.
    pub fn render(
        &self,
        template: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<String, EngineError> {
        let tmpl = self.env.template_from_str(template)?;
        tmpl.render(context_to_value(context))
            .map_err(|e| EngineError::Template(e.to_string()))
    }

    /// Evaluate a bare expression (no braces) to a JSON value.
    pub fn eval(
        &self,
        expression: &str,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError> {
        let expr = self.env.compile_expression(expression)?;
        let value = expr.eval(context_to_value(context))?;
        Ok(serde_json::to_value(&value)?)
    }

    /// Check if a string contains template syntax.
    pub fn is_template(s: &str) -> bool {
        s.contains("{{") || s.contains("{%")
    }

    /// Render every templated string inside a JSON value.
    pub fn render_value(
        &self,
        value: &serde_json::Value,
        context: &HashMap<String, serde_json::Value>,
    ) -> Result<serde_json::Value, EngineError> {
        match value {
            serde_json::Value::String(s) if Self::is_template(s) => {
                if let Some(expression) = single_expression(s) {
                    return self.eval(expression, context);
                }
                Ok(serde_json::Value::String(self.render(s, context)?))
            }
            serde_json::Value::Object(obj) => {
                let mut result = serde_json::Map::new();
                for (k, v) in obj {
                    result.insert(k.clone(), self.render_value(v, context)?);
                }
                Ok(serde_json::Value::Object(result))
            }
            serde_json::Value::Array(arr) => {
                let result: Result<Vec<_>, _> = arr
                    .iter()
                    .map(|v| self.render_value(v, context))
                    .collect();
                Ok(serde_json::Value::Array(result?))
            }
            _ => Ok(value.clone()),
        }
    }
}

impl Default for TemplateEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Return the inner expression when `s` is exactly one `{{ ... }}` block.
fn single_expression(s: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\s*\{\{(.*)\}\}\s*$").expect("static expression regex"));
    let inner = re.captures(s)?.get(1)?.as_str();
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

fn context_to_value(context: &HashMap<String, serde_json::Value>) -> Value {
    let json = serde_json::Value::Object(
        context
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    );
    Value::from_serialize(&json)
}

fn filter_tojson(value: Value) -> Result<String, minijinja::Error> {
    Ok(serde_json::to_string(&value).unwrap_or_else(|_| "null".to_string()))
}

fn filter_default(value: Value, default: Option<Value>) -> Value {
    if value.is_undefined() || value.is_none() {
        default.unwrap_or_else(|| Value::from(""))
    } else {
        value
    }
}

fn filter_length(value: Value) -> Result<Value, minijinja::Error> {
    match value.kind() {
        minijinja::value::ValueKind::String => Ok(Value::from(value.to_string().chars().count())),
        minijinja::value::ValueKind::Seq | minijinja::value::ValueKind::Map => {
            Ok(Value::from(value.len().unwrap_or(0)))
        }
        _ => Ok(Value::from(0)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> HashMap<String, serde_json::Value> {
        let mut ctx = HashMap::new();
        ctx.insert("input".to_string(), json!({"id": 42, "name": "Ada", "tags": ["a", "b"]}));
        ctx
    }

    #[test]
    fn test_render_mixed_string() {
        let engine = TemplateEngine::new();
        let result = engine.render("Hello, {{ input.name }}!", &ctx()).unwrap();
        assert_eq!(result, "Hello, Ada!");
    }

    #[test]
    fn test_single_expression_keeps_type() {
        let engine = TemplateEngine::new();
        let value = json!({
            "id": "{{ input.id }}",
            "record": "{{ input }}",
            "count": "{{ input.tags | length }}",
            "label": "user-{{ input.id }}",
            "plain": 7
        });
        let result = engine.render_value(&value, &ctx()).unwrap();
        assert_eq!(result["id"], json!(42));
        assert_eq!(result["record"]["name"], json!("Ada"));
        assert_eq!(result["count"], json!(2));
        assert_eq!(result["label"], json!("user-42"));
        assert_eq!(result["plain"], json!(7));
    }

    #[test]
    fn test_undefined_expression_is_null() {
        let engine = TemplateEngine::new();
        let result = engine.render_value(&json!("{{ input.missing }}"), &ctx()).unwrap();
        assert_eq!(result, serde_json::Value::Null);
    }

    #[test]
    fn test_single_expression_detection() {
        assert_eq!(single_expression("{{ a.b }}"), Some("a.b"));
        assert_eq!(single_expression("{{ a }} and {{ b }}"), None);
        assert_eq!(single_expression("x {{ a }}"), None);
    }

    #[test]
    fn test_default_filter() {
        let engine = TemplateEngine::new();
        let result = engine.render("{{ input.missing | default('n/a') }}", &ctx()).unwrap();
        assert_eq!(result, "n/a");
    }
}
