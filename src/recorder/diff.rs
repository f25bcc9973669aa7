//! Turns engine diff payloads into plain unified-diff text.
//!
//! Accepted shapes, matching what modules report:
//! - a result carrying `diff`, which is one diff dict or a list of them,
//!   skipped when the result reports `changed: false`;
//! - a looped result carrying `results`, where each sub-result contributes
//!   only when it is `changed` and has a non-empty `diff`;
//! - a bare diff dict or list.
//!
//! A diff dict holds `before`/`after` (with optional `*_header`), or
//! `prepared` text, or one of the binary/size markers.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as JsonValue;
use similar::TextDiff;

use super::status::payload_changed;

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b[@-Z\\-_]")
        .expect("Invalid ANSI escape regex")
});

/// Removes ANSI escape sequences and stray control characters, keeping
/// newlines and tabs.
pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE
        .replace_all(text, "")
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

/// Extracts a diff from a result payload, or `None` if nothing qualifies.
pub fn extract_diff(payload: &JsonValue) -> Option<String> {
    let text = if let Some(results) = payload.get("results").and_then(JsonValue::as_array) {
        let parts: Vec<String> = results
            .iter()
            .filter(|res| payload_changed(res))
            .filter_map(|res| res.get("diff"))
            .filter(|diff| !is_empty(diff))
            .map(render_diff)
            .filter(|s| !s.is_empty())
            .collect();
        parts.join("\n")
    } else if let Some(diff) = payload.get("diff") {
        // a result that says it changed nothing carries no diff worth showing
        let unchanged = payload.get("changed").and_then(JsonValue::as_bool) == Some(false);
        if unchanged || is_empty(diff) {
            return None;
        }
        render_diff(diff)
    } else {
        render_diff(payload)
    };

    let cleaned = strip_ansi(&text);
    if cleaned.trim().is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

fn is_empty(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    }
}

fn render_diff(diff: &JsonValue) -> String {
    match diff {
        JsonValue::Array(items) => items
            .iter()
            .map(render_diff)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        JsonValue::Object(_) => render_diff_dict(diff),
        JsonValue::String(s) => s.clone(),
        _ => String::new(),
    }
}

fn render_diff_dict(diff: &JsonValue) -> String {
    let mut out = String::new();

    for (flag, message) in [
        ("dst_binary", "diff skipped: destination file appears to be binary\n"),
        ("src_binary", "diff skipped: source file appears to be binary\n"),
    ] {
        if diff.get(flag).is_some_and(truthy) {
            out.push_str(message);
        }
    }
    for (flag, what) in [("dst_larger", "destination"), ("src_larger", "source")] {
        if let Some(limit) = diff.get(flag).filter(|v| truthy(v)) {
            out.push_str(&format!(
                "diff skipped: {what} file size is greater than {limit}\n"
            ));
        }
    }

    if let (Some(before), Some(after)) = (diff.get("before"), diff.get("after")) {
        let before = as_text(before);
        let after = as_text(after);
        if before != after {
            let before_header = header(diff, "before_header", "before");
            let after_header = header(diff, "after_header", "after");
            let text_diff = TextDiff::from_lines(before.as_str(), after.as_str());
            let unified = text_diff
                .unified_diff()
                .context_radius(10)
                .header(&before_header, &after_header)
                .to_string();
            out.push_str(&unified);
        }
    }

    if let Some(prepared) = diff.get("prepared").and_then(JsonValue::as_str) {
        out.push_str(prepared);
    }

    out
}

fn header(diff: &JsonValue, key: &str, label: &str) -> String {
    match diff.get(key).and_then(JsonValue::as_str) {
        Some(h) => format!("{label}: {h}"),
        None => label.to_string(),
    }
}

fn as_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => String::new(),
        other => serde_json::to_string_pretty(other).unwrap_or_default() + "\n",
    }
}

fn truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Bool(b) => *b,
        JsonValue::Null => false,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        _ => true,
    }
}
