// src/normalize/generic.rs
use serde_json::Value;

use super::{BodyLines, Rendered};

fn render_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => v.to_string(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string_pretty(v).unwrap_or_else(|_| v.to_string())
        }
    }
}

/// Top-level keys as `key: value`; nested values as pretty JSON.
fn render_body(payload: &Value) -> String {
    let Some(obj) = payload.as_object() else {
        return render_value(payload);
    };
    let mut body = BodyLines::default();
    for (key, value) in obj {
        let rendered = render_value(value);
        if value.is_array() || value.is_object() {
            body.raw(format!("{key}:\n{rendered}"));
        } else {
            body.raw(format!("{key}: {rendered}"));
        }
    }
    body.finish()
}

pub(crate) fn render(payload: &Value) -> Rendered {
    let title = ["title", "subject", "event"]
        .iter()
        .find_map(|k| payload.get(*k).and_then(Value::as_str))
        .map(|t| format!("Webhook: {}", t.trim()))
        .unwrap_or_else(|| "Webhook received".to_string());
    let mut out = Rendered {
        title,
        body: render_body(payload),
        ..Default::default()
    };
    out.meta("provider", "Generic");
    out
}

/// For provider payloads whose shape was not recognized.
pub(crate) fn render_fallback(provider: &str, kind: &str, payload: &Value) -> Rendered {
    tracing::debug!(provider, kind, "unrecognized payload shape, rendering generically");
    let mut out = Rendered {
        title: format!("{provider} {kind} event"),
        body: render_body(payload),
        ..Default::default()
    };
    out.meta("provider", provider);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn renders_scalars_inline_and_nested_pretty() {
        let r = render(&json!({"status": "up", "count": 3, "tags": ["a"]}));
        assert_eq!(r.title, "Webhook received");
        assert!(r.body.contains("status: up"));
        assert!(r.body.contains("count: 3"));
        assert!(r.body.contains("tags:\n[\n  \"a\"\n]"));
    }

    #[test]
    fn title_key_is_used() {
        let r = render(&json!({"title": "Backup done"}));
        assert_eq!(r.title, "Webhook: Backup done");
    }

    #[test]
    fn non_object_payload_rendered_whole() {
        let r = render(&json!([1, 2]));
        assert_eq!(r.body, "[\n  1,\n  2\n]");
    }
}
