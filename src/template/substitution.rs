//! Variable substitution engine for templates
//!
//! Placeholders are written `{{ path }}` where `path` is a dotted lookup into
//! the JSON context (`visitor.name`, `hosts.0.email`).

use serde_json::Value;

/// Resolve a dotted path against a JSON context
pub fn lookup<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(context, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Declared variables that are absent (or null) in the context
pub fn missing_variables(required: &[String], context: &Value) -> Vec<String> {
    required
        .iter()
        .filter(|path| matches!(lookup(context, path.trim()), None | Some(Value::Null)))
        .cloned()
        .collect()
}

/// Substitute `{{ path }}` placeholders in a string pattern.
///
/// Unresolvable placeholders are left verbatim. With `escape` set, every
/// substituted value is HTML-escaped.
pub fn substitute_string(pattern: &str, context: &Value, escape: bool) -> String {
    let mut result = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(open) = rest.find("{{") {
        result.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];

        let Some(close) = after_open.find("}}") else {
            // Unclosed placeholder, keep the remainder as-is
            result.push_str(&rest[open..]);
            return result;
        };

        let path = after_open[..close].trim();
        let placeholder = &rest[open..open + 2 + close + 2];

        match lookup(context, path).filter(|_| !path.is_empty()) {
            Some(value) => {
                let rendered = value_to_string(value);
                if escape {
                    result.push_str(&escape_html(&rendered));
                } else {
                    result.push_str(&rendered);
                }
            }
            None => result.push_str(placeholder),
        }

        rest = &after_open[close + 2..];
    }

    result.push_str(rest);
    result
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        // For arrays and objects, use JSON representation
        _ => value.to_string(),
    }
}

/// Escape the five HTML-significant characters
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
