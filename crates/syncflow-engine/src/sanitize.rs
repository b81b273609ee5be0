//! Redaction of provider credentials.
//!
//! Integration configs carry API keys and bot tokens. Anything that ends up in
//! an event payload, a log line or CLI output goes through
//! [`sanitize_sensitive_data`] first.

use serde_json::{Map, Value};

/// Redaction placeholder.
pub const REDACTED: &str = "[REDACTED]";

/// Key fragments that mark a field as secret (lowercase, `-` normalized to `_`).
static SENSITIVE_KEYS: &[&str] = &[
    "password",
    "secret",
    "token",
    "api_key",
    "apikey",
    "authorization",
    "credential",
    "private_key",
    "signing_key",
    "webhook_secret",
    "client_secret",
    "cookie",
];

/// Value prefixes issued by the supported providers.
static SENSITIVE_PREFIXES: &[&str] = &[
    "bearer ",
    "basic ",
    "xoxb-",
    "xoxp-",
    "xapp-",
    "sk_live_",
    "sk_test_",
    "rk_live_",
    "rk_test_",
    "whsec_",
    "secret_",
    "ntn_",
];

/// Maximum nesting depth walked before values are copied unchanged.
const MAX_DEPTH: usize = 20;

fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_lowercase().replace('-', "_");
    SENSITIVE_KEYS.iter().any(|fragment| key.contains(fragment))
}

fn is_sensitive_value(value: &str) -> bool {
    let lower = value.to_lowercase();
    if SENSITIVE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return true;
    }

    // Airtable personal access tokens: "pat" + id + "." + secret
    if value.starts_with("pat") && value.len() > 40 && value.contains('.') {
        return true;
    }

    // JWT (header.payload.signature)
    value.starts_with("eyJ") && value.matches('.').count() == 2 && value.len() > 50
}

/// Return a copy of `value` with secret-looking keys and values redacted.
pub fn sanitize_sensitive_data(value: &Value) -> Value {
    sanitize_recursive(value, 0)
}

fn sanitize_recursive(value: &Value, depth: usize) -> Value {
    if depth >= MAX_DEPTH {
        return value.clone();
    }

    match value {
        Value::Object(map) => {
            let mut result = Map::new();
            for (key, val) in map {
                let sanitized = if is_sensitive_key(key) && !val.is_null() {
                    Value::String(REDACTED.to_string())
                } else {
                    sanitize_recursive(val, depth + 1)
                };
                result.insert(key.clone(), sanitized);
            }
            Value::Object(result)
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_recursive(item, depth + 1))
                .collect(),
        ),
        Value::String(s) if is_sensitive_value(s) => Value::String(REDACTED.to_string()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sanitize_provider_config() {
        let config = json!({
            "api_key": "keyABC",
            "base_id": "appXYZ",
            "bot_token": "xoxb-123",
            "secret_key": "sk_test_abc",
            "base_url": "http://localhost:9000"
        });
        let result = sanitize_sensitive_data(&config);
        assert_eq!(result["api_key"], REDACTED);
        assert_eq!(result["bot_token"], REDACTED);
        assert_eq!(result["secret_key"], REDACTED);
        assert_eq!(result["base_id"], "appXYZ");
        assert_eq!(result["base_url"], "http://localhost:9000");
    }

    #[test]
    fn test_sanitize_values_by_prefix() {
        let data = json!({"headers": {"X-Debug": "Bearer abc"}, "note": "xoxp-999", "plain": "hello"});
        let result = sanitize_sensitive_data(&data);
        assert_eq!(result["headers"]["X-Debug"], REDACTED);
        assert_eq!(result["note"], REDACTED);
        assert_eq!(result["plain"], "hello");
    }

    #[test]
    fn test_sanitize_arrays_and_scalars() {
        let data = json!([{"token": "t1", "count": 3}, 7, true, null]);
        let result = sanitize_sensitive_data(&data);
        assert_eq!(result, json!([{"token": REDACTED, "count": 3}, 7, true, null]));
    }

    #[test]
    fn test_author_is_not_sensitive() {
        let data = json!({"author": "ada", "token": null});
        assert_eq!(sanitize_sensitive_data(&data), data);
    }
}
