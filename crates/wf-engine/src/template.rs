//! Templated string expansion
//!
//! Expands `{{ dotted.path }}` tokens against the session context. Pure and
//! tolerant: missing or null paths resolve to the empty string, which is
//! what flow authors expect from half-filled contexts.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_$.\[\]]+)\s*\}\}").expect("valid token regex"))
}

/// One step of a dotted path: an object key or an array index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Split `a.b[0].c` into its segments. Empty segments are dropped.
pub fn parse_path(path: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let mut rest = part;
        while let Some(open) = rest.find('[') {
            let key = &rest[..open];
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            }
            match rest[open + 1..].find(']') {
                Some(close) => {
                    let idx = &rest[open + 1..open + 1 + close];
                    if let Ok(index) = idx.parse::<usize>() {
                        segments.push(Segment::Index(index));
                    } else if !idx.is_empty() {
                        segments.push(Segment::Key(idx.to_string()));
                    }
                    rest = &rest[open + 1 + close + 1..];
                }
                None => {
                    rest = "";
                }
            }
        }
        if !rest.is_empty() {
            segments.push(Segment::Key(rest.to_string()));
        }
    }
    segments
}

/// Resolve a dotted path against the context, left to right.
///
/// A leading `context.` segment is accepted and skipped so template authors
/// can write either `{{ name }}` or `{{ context.name }}`.
pub fn resolve_path<'a>(context: &'a Value, path: &str) -> Option<&'a Value> {
    let mut segments = parse_path(path);
    if let Some(Segment::Key(first)) = segments.first() {
        if first == "context" && segments.len() > 1 {
            segments.remove(0);
        }
    }

    let mut current = context;
    for segment in &segments {
        current = match segment {
            Segment::Key(key) => current.get(key.as_str())?,
            Segment::Index(index) => current.get(*index)?,
        };
    }
    Some(current)
}

/// Write a value at a dotted path, creating intermediate objects as needed.
/// Used by `assign` nodes and `api` result storage.
pub fn set_path(context: &mut Value, path: &str, value: Value) {
    let segments = parse_path(path);
    if segments.is_empty() {
        return;
    }

    if !context.is_object() {
        *context = Value::Object(serde_json::Map::new());
    }

    let mut current = context;
    for (i, segment) in segments.iter().enumerate() {
        let key = match segment {
            Segment::Key(key) => key.clone(),
            Segment::Index(index) => index.to_string(),
        };

        let map = current.as_object_mut().expect("cursor is an object");
        if i == segments.len() - 1 {
            map.insert(key, value);
            return;
        }

        let slot = map.entry(key).or_insert_with(|| Value::Object(serde_json::Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(serde_json::Map::new());
        }
        current = slot;
    }
}

/// Render a resolved value the way a chat message should show it.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Expand every `{{ path }}` token in `text` against `context`.
pub fn expand(text: &str, context: &Value) -> String {
    token_regex()
        .replace_all(text, |captures: &regex::Captures<'_>| {
            let path = captures.get(1).map(|m| m.as_str()).unwrap_or("");
            resolve_path(context, path).map(stringify).unwrap_or_default()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_expand_simple_token() {
        let context = json!({ "triggerMessage": "Hola" });
        assert_eq!(expand("hola {{ triggerMessage }}", &context), "hola Hola");
    }

    #[test]
    fn test_expand_nested_and_indexed_paths() {
        let context = json!({
            "user": { "name": "Ana", "orders": [ { "id": "A-1" }, { "id": "A-2" } ] }
        });
        assert_eq!(expand("{{ user.name }}: {{ user.orders[1].id }}", &context), "Ana: A-2");
    }

    #[test]
    fn test_expand_missing_and_null_resolve_empty() {
        let context = json!({ "known": null });
        assert_eq!(expand("[{{ missing.path }}][{{ known }}]", &context), "[][]");
    }

    #[test]
    fn test_expand_stringifies_primitives() {
        let context = json!({ "n": 5, "ok": true });
        assert_eq!(expand("{{ n }} {{ ok }}", &context), "5 true");
    }

    #[test]
    fn test_expand_accepts_context_prefix() {
        let context = json!({ "name": "Ana" });
        assert_eq!(expand("{{ context.name }}", &context), "Ana");
    }

    #[test]
    fn test_expand_leaves_no_tokens_behind() {
        let context = json!({ "a": 1 });
        let out = expand("{{ a }} {{ b }} {{ c.d[0] }}", &context);
        assert!(!out.contains("{{"));
    }

    #[test]
    fn test_expand_is_referentially_transparent() {
        let context = json!({ "a": "x" });
        assert_eq!(expand("{{ a }}!", &context), expand("{{ a }}!", &context));
    }

    #[test]
    fn test_set_path_creates_intermediates() {
        let mut context = json!({});
        set_path(&mut context, "user.address.city", json!("Córdoba"));
        assert_eq!(context["user"]["address"]["city"], "Córdoba");
    }

    #[test]
    fn test_set_path_overwrites_scalars_on_the_way() {
        let mut context = json!({ "user": "flat" });
        set_path(&mut context, "user.name", json!("Ana"));
        assert_eq!(context["user"]["name"], "Ana");
    }

    #[test]
    fn test_set_path_plain_key() {
        let mut context = json!({});
        set_path(&mut context, "n", json!("5"));
        assert_eq!(context["n"], "5");
    }
}
