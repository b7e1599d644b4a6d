/// Expression resolution for node parameters
///
/// String parameters may embed `{{ ... }}` markers. The inner text is evaluated against a
/// deliberately small vocabulary:
/// - `$json` / `$json.a.b`           - the current input item
/// - `$parameter` / `$parameter.a.b` - the node's own parameters
/// - `true`, `false`, `null`, `undefined`, numbers, 'single' or "double" quoted strings
///
/// Anything else is returned as literal text. A parameter that is exactly one marker is
/// re-parsed as JSON after substitution, so `"{{ $json.user }}"` yields the object itself.

use serde_json::{Map, Value};

/// Values an expression can read from
#[derive(Debug, Clone, Copy)]
pub struct ExpressionScope<'a> {
    pub json: &'a Value,
    pub parameters: &'a Value,
}

/// Resolve every string inside `value`, recursing into arrays and objects
pub fn resolve_value(value: &Value, scope: &ExpressionScope<'_>) -> Value {
    match value {
        Value::String(text) => resolve_string(text, scope),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, scope)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_value(v, scope)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Resolve the markers in one string parameter
pub fn resolve_string(text: &str, scope: &ExpressionScope<'_>) -> Value {
    if !text.contains("{{") {
        return Value::String(text.to_string());
    }

    if let Some(inner) = whole_marker(text) {
        return match evaluate(inner, scope) {
            Ok(None) => Value::Null,
            Ok(Some(value)) => {
                let rendered = render(&value);
                serde_json::from_str(&rendered).unwrap_or(Value::String(rendered))
            }
            Err(reason) => {
                tracing::warn!("⚠️ Expression '{}' could not be evaluated: {}", inner.trim(), reason);
                Value::String(text.to_string())
            }
        };
    }

    let mut output = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let close = open + 2 + close;
        let inner = &rest[open + 2..close];

        output.push_str(&rest[..open]);
        match evaluate(inner, scope) {
            Ok(Some(value)) => output.push_str(&render(&value)),
            Ok(None) => {}
            Err(reason) => {
                tracing::warn!("⚠️ Expression '{}' could not be evaluated: {}", inner.trim(), reason);
                output.push_str(&rest[open..close + 2]);
            }
        }
        rest = &rest[close + 2..];
    }
    output.push_str(rest);

    Value::String(output)
}

/// Inner text when `text` is exactly one `{{ ... }}` marker
fn whole_marker(text: &str) -> Option<&str> {
    let inner = text.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner)
}

/// Evaluate one marker body; `Ok(None)` means the value is absent
fn evaluate(expr: &str, scope: &ExpressionScope<'_>) -> Result<Option<Value>, String> {
    let expr = expr.trim();

    if let Some(path) = reference_path(expr, "$json") {
        return read(scope.json, path);
    }
    if let Some(path) = reference_path(expr, "$parameter") {
        return read(scope.parameters, path);
    }

    match expr {
        "true" => return Ok(Some(Value::Bool(true))),
        "false" => return Ok(Some(Value::Bool(false))),
        "null" => return Ok(Some(Value::Null)),
        "undefined" => return Ok(None),
        _ => {}
    }

    if let Ok(int) = expr.parse::<i64>() {
        return Ok(Some(Value::from(int)));
    }
    if let Ok(float) = expr.parse::<f64>() {
        if float.is_finite() {
            return Ok(serde_json::Number::from_f64(float).map(Value::Number));
        }
    }

    for quote in ['\'', '"'] {
        if expr.len() >= 2 && expr.starts_with(quote) && expr.ends_with(quote) {
            return Ok(Some(Value::String(expr[1..expr.len() - 1].to_string())));
        }
    }

    Ok(Some(Value::String(expr.to_string())))
}

/// `Some("")` for the bare root, `Some("a.b")` for a dotted path, `None` if not this root
fn reference_path<'e>(expr: &'e str, root: &str) -> Option<&'e str> {
    let rest = expr.strip_prefix(root)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('.')
    }
}

fn read(root: &Value, path: &str) -> Result<Option<Value>, String> {
    if path.is_empty() {
        return Ok(Some(root.clone()));
    }
    if path.split('.').any(str::is_empty) {
        return Err(format!("empty segment in path '{}'", path));
    }
    Ok(get_path(root, path).cloned())
}

/// Text form used when a value is substituted into a larger string
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Read a dot-separated path; numeric segments index into arrays
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `value` at a dot-separated path, creating intermediate objects as needed
pub fn set_path(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let (last, parents) = match segments.split_last() {
        Some(split) => split,
        None => return,
    };

    let mut current = root;
    for segment in parents {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope<'a>(json: &'a Value, parameters: &'a Value) -> ExpressionScope<'a> {
        ExpressionScope { json, parameters }
    }

    #[test]
    fn test_embedded_marker_is_stringified() {
        let data = json!({ "a": { "b": 5 } });
        let params = json!({});
        let value = resolve_string("value is {{ $json.a.b }}", &scope(&data, &params));
        assert_eq!(value, json!("value is 5"));
    }

    #[test]
    fn test_whole_marker_keeps_structure() {
        let data = json!({ "a": { "b": 5 } });
        let params = json!({});
        let value = resolve_string("{{ $json.a }}", &scope(&data, &params));
        assert_eq!(value, json!({ "b": 5 }));
    }

    #[test]
    fn test_whole_marker_reparses_text() {
        let data = json!({ "n": "42", "word": "hello" });
        let params = json!({});
        assert_eq!(resolve_string("{{ $json.n }}", &scope(&data, &params)), json!(42));
        assert_eq!(resolve_string("{{ $json.word }}", &scope(&data, &params)), json!("hello"));
    }

    #[test]
    fn test_literals_and_parameters() {
        let data = json!({});
        let params = json!({ "limit": 10, "nested": { "name": "x" } });
        let s = scope(&data, &params);

        assert_eq!(resolve_string("{{ true }}", &s), json!(true));
        assert_eq!(resolve_string("{{ null }}", &s), Value::Null);
        assert_eq!(resolve_string("{{ undefined }}", &s), Value::Null);
        assert_eq!(resolve_string("{{ 2.5 }}", &s), json!(2.5));
        assert_eq!(resolve_string("{{ 'quoted' }}", &s), json!("quoted"));
        assert_eq!(resolve_string("max {{ $parameter.limit }}", &s), json!("max 10"));
        assert_eq!(resolve_string("{{ $parameter.nested }}", &s), json!({ "name": "x" }));
        assert_eq!(resolve_string("{{ something else }}", &s), json!("something else"));
    }

    #[test]
    fn test_missing_path_renders_empty() {
        let data = json!({});
        let params = json!({});
        assert_eq!(resolve_string("a{{ $json.missing }}b", &scope(&data, &params)), json!("ab"));
    }

    #[test]
    fn test_bad_path_keeps_raw_marker() {
        let data = json!({ "a": 1 });
        let params = json!({});
        assert_eq!(
            resolve_string("x {{ $json..a }}", &scope(&data, &params)),
            json!("x {{ $json..a }}")
        );
    }

    #[test]
    fn test_unterminated_marker_is_literal() {
        let data = json!({});
        let params = json!({});
        assert_eq!(resolve_string("open {{ $json", &scope(&data, &params)), json!("open {{ $json"));
    }

    #[test]
    fn test_resolve_value_recurses() {
        let data = json!({ "id": 7 });
        let params = json!({});
        let value = resolve_value(&json!({ "list": ["{{ $json.id }}", 1] }), &scope(&data, &params));
        assert_eq!(value, json!({ "list": [7, 1] }));
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut root = json!({ "keep": true, "scalar": 1 });
        set_path(&mut root, "user.address.city", json!("Oslo"));
        set_path(&mut root, "scalar.inner", json!(2));

        assert_eq!(
            root,
            json!({ "keep": true, "scalar": { "inner": 2 }, "user": { "address": { "city": "Oslo" } } })
        );
    }

    #[test]
    fn test_get_path_indexes_arrays() {
        let root = json!({ "items": [{ "id": 1 }, { "id": 2 }] });
        assert_eq!(get_path(&root, "items.1.id"), Some(&json!(2)));
        assert_eq!(get_path(&root, "items.9.id"), None);
    }
}
