use regex::Regex;
use serde_json::Value;

pub const SENTINEL: &str = "[REDACTED]";

/// Replace every match of any pattern in `text` with [`SENTINEL`]. Returns
/// whether anything was redacted.
pub fn redact_patterns(text: &str, patterns: &[Regex]) -> (String, bool) {
    let mut out = text.to_string();
    let mut redacted = false;
    for pattern in patterns {
        if pattern.is_match(&out) {
            redacted = true;
            out = pattern.replace_all(&out, SENTINEL).into_owned();
        }
    }
    (out, redacted)
}

/// Recursively redact object fields whose name matches one of `paths`,
/// wherever they occur in the payload (§4.5: "structured field names
/// redacted wherever they appear").
pub fn redact_paths(value: &Value, paths: &[String]) -> (Value, bool) {
    let mut redacted = false;
    let out = redact_paths_inner(value, paths, &mut redacted);
    (out, redacted)
}

fn redact_paths_inner(value: &Value, paths: &[String], redacted: &mut bool) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, val) in map {
                if paths.iter().any(|p| p == key) {
                    out.insert(key.clone(), Value::String(SENTINEL.to_string()));
                    *redacted = true;
                } else {
                    out.insert(key.clone(), redact_paths_inner(val, paths, redacted));
                }
            }
            Value::Object(out)
        },
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact_paths_inner(v, paths, redacted)).collect())
        },
        other => other.clone(),
    }
}
