//! Variable scope resolution (§4.8). A string value starting with `$`
//! resolves by direct variable lookup; `${...}` patterns inside a larger
//! string are substituted before send. Unknown references resolve to
//! undefined rather than erroring.

use std::collections::HashMap;

use serde_json::Value;

/// Resolves a bare `$name` reference, or returns the literal value
/// unchanged if it doesn't start with `$`.
pub fn resolve_value(variables: &HashMap<String, Value>, raw: &str) -> Value {
    raw.strip_prefix('$')
        .and_then(|name| variables.get(name).cloned())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

/// Substitutes every `${name}` or `${name.path}` occurrence in `template`
/// with the referenced variable, dot-path resolved, stringified. Unknown
/// references are replaced with an empty string.
pub fn substitute(variables: &HashMap<String, Value>, template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let path = &after[..end];
        out.push_str(&stringify(lookup_path(variables, path)));
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}

fn lookup_path<'a>(variables: &'a HashMap<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let root = parts.next()?;
    let mut cursor = variables.get(root)?;
    for segment in parts {
        cursor = cursor.as_object()?.get(segment)?;
    }
    Some(cursor)
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
