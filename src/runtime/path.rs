/// Dotted-path lookup and prompt templating
///
/// Paths address prior node results: the first segment is a node id, the
/// rest walk mappings by key and sequences by index ("fetch.data.items.0").

use serde_json::Value;
use std::collections::BTreeMap;

use crate::runtime::error::{EngineError, EngineResult};
use crate::workflow::types::ExecutionState;

/// Walk `segments` into `value`; `None` as soon as a segment is missing
pub fn lookup<'a>(value: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let Some((head, rest)) = segments.split_first() else {
        return Some(value);
    };

    let next = match value {
        Value::Object(map) => map.get(*head),
        Value::Array(items) => head.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }?;

    lookup(next, rest)
}

/// Resolve a dotted path against the node-results mapping
pub fn resolve<'a>(results: &'a BTreeMap<String, Value>, path: &str) -> EngineResult<&'a Value> {
    let segments: Vec<&str> = path.split('.').map(str::trim).collect();
    let (node_id, rest) = segments
        .split_first()
        .filter(|(head, _)| !head.is_empty())
        .ok_or_else(|| EngineError::Configuration(format!("empty extraction path '{path}'")))?;

    let root = results
        .get(*node_id)
        .ok_or_else(|| EngineError::Data(format!("no result for node '{node_id}' (path '{path}')")))?;

    lookup(root, rest).ok_or_else(|| EngineError::Data(format!("path '{path}' not found in prior results")))
}

/// Render a value as prompt/output text; strings are taken verbatim
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute `{{...}}` placeholders from the execution state
///
/// `{{input}}` and `{{output}}` read the current strings; anything else is a
/// result path. An unterminated `{{` is copied through as-is.
pub fn render_template(template: &str, state: &ExecutionState) -> EngineResult<String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        rendered.push_str(&rest[..start]);

        let key = rest[start + 2..start + 2 + len].trim();
        match key {
            "input" => rendered.push_str(&state.input),
            "output" => rendered.push_str(state.current_output.as_deref().unwrap_or_default()),
            path => rendered.push_str(&to_text(resolve(&state.node_results, path)?)),
        }

        rest = &rest[start + 2 + len + 2..];
    }

    rendered.push_str(rest);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn results() -> BTreeMap<String, Value> {
        let mut results = BTreeMap::new();
        results.insert(
            "fetch".to_string(),
            json!({"data": {"items": [{"title": "first"}, {"title": "second"}]}, "ok": true}),
        );
        results.insert("summary".to_string(), json!("short text"));
        results
    }

    #[test]
    fn test_nested_lookup() {
        let results = results();
        assert_eq!(resolve(&results, "fetch.data.items.1.title").unwrap(), &json!("second"));
        assert_eq!(resolve(&results, "fetch.ok").unwrap(), &json!(true));
        assert_eq!(resolve(&results, "summary").unwrap(), &json!("short text"));
    }

    #[test]
    fn test_missing_segments_are_data_errors() {
        let results = results();
        for path in ["fetch.data.items.5.title", "fetch.missing", "summary.len", "nope.x"] {
            let err = resolve(&results, path).unwrap_err();
            assert_eq!(err.kind(), "data", "path {path}");
        }
        assert_eq!(resolve(&results, "").unwrap_err().kind(), "configuration");
    }

    #[test]
    fn test_render_template() {
        let mut state = ExecutionState::new("hello");
        state.current_output = Some("prev".into());
        state.node_results = results();

        let out = render_template("{{input}} / {{ output }} / {{fetch.data.items.0.title}}", &state).unwrap();
        assert_eq!(out, "hello / prev / first");

        assert_eq!(render_template("open {{input", &state).unwrap(), "open {{input");
        assert_eq!(render_template("{{fetch.ok}}", &state).unwrap(), "true");
        assert!(render_template("{{nothing.here}}", &state).is_err());
    }
}
