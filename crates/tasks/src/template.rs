//! `${key}` placeholder resolution against a workflow context.
//!
//! A reference is `${name}` or `${name.path.to.field}`. Path segments walk
//! into objects by key and into arrays by index; the pseudo-field `length`
//! yields the size of an array, object, or string. References that cannot
//! be resolved are left in place untouched.

use serde_json::Value;

use crate::Context;

/// Replace every resolvable `${...}` reference inside `input`.
///
/// String values are inserted verbatim, everything else as compact JSON.
pub fn render(input: &str, ctx: &Context) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            // Unterminated reference: keep the remainder as-is.
            out.push_str(&rest[start..]);
            return out;
        };

        let expr = &after[..end];
        match lookup(expr, ctx) {
            Some(Value::String(s)) => out.push_str(&s),
            Some(other) => out.push_str(&other.to_string()),
            None => {
                out.push_str("${");
                out.push_str(expr);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

/// Resolve a configuration value that may be a single context reference.
///
/// When `value` is a string consisting of exactly one `${...}` reference,
/// the referenced context value is returned as-is (or `Null` when missing),
/// preserving its JSON type. Any other value is returned unchanged.
pub fn resolve_value(value: &Value, ctx: &Context) -> Value {
    match value.as_str().and_then(single_reference) {
        Some(expr) => lookup(expr, ctx).unwrap_or(Value::Null),
        None => value.clone(),
    }
}

/// Recursively render every string inside a JSON configuration.
///
/// Every string stays a string, including one that is a single reference
/// to a number or an object. Fields that want the referenced value's own
/// type go through [`resolve_value`] instead.
pub fn render_value(value: &Value, ctx: &Context) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Look up a dotted reference such as `fetch_result.json.items.0`.
pub fn lookup(expr: &str, ctx: &Context) -> Option<Value> {
    let expr = expr.trim();

    // Whole-key match first so keys containing dots still resolve.
    if let Some(v) = ctx.get(expr) {
        return Some(v.clone());
    }

    let mut segments = expr.split('.');
    let mut current = ctx.get(segments.next()?)?.clone();
    for segment in segments {
        current = step(&current, segment)?;
    }
    Some(current)
}

fn step(value: &Value, segment: &str) -> Option<Value> {
    match value {
        Value::Object(map) => match map.get(segment) {
            Some(v) => Some(v.clone()),
            None if segment == "length" => Some(Value::from(map.len())),
            None => None,
        },
        Value::Array(items) if segment == "length" => Some(Value::from(items.len())),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i).cloned()),
        Value::String(s) if segment == "length" => Some(Value::from(s.chars().count())),
        _ => None,
    }
}

/// True when `s` is exactly one `${...}` reference and nothing else.
pub fn is_reference(s: &str) -> bool {
    single_reference(s).is_some()
}

fn single_reference(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains("${") || inner.contains('}') {
        return None;
    }
    Some(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Context {
        json!({
            "name": "world",
            "count": 3,
            "fetch_result": { "body": "ok", "json": [1, 2, 3] },
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[test]
    fn renders_plain_and_nested_references() {
        let out = render("hello ${name}, body=${fetch_result.body}", &ctx());
        assert_eq!(out, "hello world, body=ok");
    }

    #[test]
    fn non_string_values_render_as_json() {
        assert_eq!(render("n=${count}", &ctx()), "n=3");
        assert_eq!(render("${fetch_result.json}", &ctx()), "[1,2,3]");
    }

    #[test]
    fn length_pseudo_field() {
        assert_eq!(render("${fetch_result.json.length} items", &ctx()), "3 items");
        assert_eq!(render("${name.length}", &ctx()), "5");
    }

    #[test]
    fn unknown_and_unterminated_references_are_left_alone() {
        assert_eq!(render("a ${missing} b", &ctx()), "a ${missing} b");
        assert_eq!(render("tail ${name", &ctx()), "tail ${name");
    }

    #[test]
    fn resolve_value_keeps_type_for_single_reference() {
        assert_eq!(resolve_value(&json!("${count}"), &ctx()), json!(3));
        assert_eq!(resolve_value(&json!("${nope}"), &ctx()), Value::Null);
        assert_eq!(resolve_value(&json!("x ${count}"), &ctx()), json!("x ${count}"));
    }

    #[test]
    fn render_value_walks_nested_config() {
        let config = json!({
            "message": "hi ${name}",
            "items": "${fetch_result.json}",
            "nested": [{ "path": "/tmp/${name}.txt" }],
            "keep": 7,
        });
        let out = render_value(&config, &ctx());
        assert_eq!(out["message"], "hi world");
        assert_eq!(out["items"], "[1,2,3]");
        assert_eq!(out["nested"][0]["path"], "/tmp/world.txt");
        assert_eq!(out["keep"], 7);
    }

    #[test]
    fn render_value_stringifies_single_references() {
        let out = render_value(&json!({ "n": "${count}", "obj": "${fetch_result}" }), &ctx());
        assert_eq!(out["n"], "3");
        assert_eq!(out["obj"], r#"{"body":"ok","json":[1,2,3]}"#);
    }

    #[test]
    fn is_reference_requires_the_whole_string() {
        assert!(is_reference("${count}"));
        assert!(is_reference("${fetch_result.json}"));
        assert!(!is_reference("n=${count}"));
        assert!(!is_reference("${a}${b}"));
    }
}
