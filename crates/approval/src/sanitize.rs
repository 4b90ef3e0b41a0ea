use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn secret_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(authorization|api[-_]?key|token|secret|password|cookie|credential)").unwrap()
    })
}

/// Recursively redacts keys that look like secret material, then
/// truncates the serialized result to `char_limit` characters (§4.E).
pub fn sanitize_preview(input: &Value, char_limit: usize) -> String {
    let redacted = redact(input, 0);
    let serialized = serde_json::to_string(&redacted).unwrap_or_default();
    truncate(&serialized, char_limit)
}

fn redact(value: &Value, depth: usize) -> Value {
    // serde_json::Value is a tree (no back-references), so true cycles
    // cannot occur; the depth guard only protects against pathological
    // input depth.
    if depth > 64 {
        return Value::String("[too deep]".into());
    }
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                if secret_key_pattern().is_match(k) {
                    out.insert(k.clone(), Value::String("[redacted]".into()));
                } else {
                    out.insert(k.clone(), redact(v, depth + 1));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact(v, depth + 1)).collect())
        }
        other => other.clone(),
    }
}

fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let truncated: String = s.chars().take(limit).collect();
    let omitted = s.chars().count() - limit;
    format!("{truncated}... truncated {omitted} chars")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_secret_looking_keys() {
        let input = json!({"title": "A", "Authorization": "Bearer xyz", "nested": {"api_key": "abc"}});
        let out = sanitize_preview(&input, 1000);
        assert!(out.contains("\"title\":\"A\""));
        assert!(!out.contains("xyz"));
        assert!(!out.contains("abc"));
        assert!(out.contains("[redacted]"));
    }

    #[test]
    fn truncates_long_previews() {
        let input = json!({"title": "x".repeat(50)});
        let out = sanitize_preview(&input, 10);
        assert!(out.contains("truncated"));
    }
}
