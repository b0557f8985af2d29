//! Text shaping for content fed back into the model's context window.

use serde_json::ser::{PrettyFormatter, Serializer};
use serde::Serialize;

use stepwise_contracts::callable::CallableResult;

/// Default cap for call results and console output.
pub const MAX_LENGTH_TRUNCATE_CONTENT: usize = 2000;

const BYTE_UNITS: &[&str] = &["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Controls how call results are rendered into the console block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatOptions {
    /// Pretty-print JSON (two-space indent) instead of compact.
    pub indented: bool,
    pub call_result_max_length: usize,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indented: true,
            call_result_max_length: MAX_LENGTH_TRUNCATE_CONTENT,
        }
    }
}

fn head(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn tail(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

/// Keep the first and last halves of `content`, with a notice between them.
pub fn truncate_content(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        return content.to_string();
    }
    let half = max_length / 2;
    format!(
        "{}\n\n-- Content has been truncated to be below {max_length} characters --\n\n{}",
        head(content, half),
        tail(content, half)
    )
}

/// Keep the first `max_length` characters.
pub fn truncate_content_tail(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        return content.to_string();
    }
    format!("{} ... (truncated)", head(content, max_length))
}

/// Human-readable byte size: `0 Bytes`, `512 Bytes`, `1.5 KB`, `2 MB`.
pub fn format_bytes(bytes: usize) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let bytes = bytes as f64;
    let exponent = ((bytes.ln() / 1024f64.ln()).floor() as usize).min(BYTE_UNITS.len() - 1);
    let scaled = format!("{:.2}", bytes / 1024f64.powi(exponent as i32));
    let scaled = scaled.trim_end_matches('0').trim_end_matches('.');
    format!("{scaled} {}", BYTE_UNITS[exponent])
}

/// Compact JSON with object keys sorted at every level.
pub fn stable_stringify(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Array(items) => {
            let inner: Vec<String> = items.iter().map(stable_stringify).collect();
            format!("[{}]", inner.join(","))
        }
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let inner: Vec<String> = keys
                .into_iter()
                .map(|key| {
                    format!(
                        "{}:{}",
                        serde_json::Value::String(key.clone()),
                        stable_stringify(&map[key.as_str()])
                    )
                })
                .collect();
            format!("{{{}}}", inner.join(","))
        }
        scalar => scalar.to_string(),
    }
}

/// Serialize `value` compactly, or pretty-printed with the given indent.
pub fn stringify_with_indent(value: &serde_json::Value, indent: Option<&str>) -> String {
    let Some(indent) = indent else {
        return value.to_string();
    };
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, PrettyFormatter::with_indent(indent.as_bytes()));
    if value.serialize(&mut serializer).is_err() {
        return value.to_string();
    }
    String::from_utf8(out).unwrap_or_else(|_| value.to_string())
}

fn format_call(variable: Option<&str>, call: &CallableResult, options: &FormatOptions) -> String {
    let max = options.call_result_max_length;
    let (marker, content) = match &call.return_value_summary {
        Some(summary) => (String::new(), truncate_content_tail(summary, max)),
        None => {
            let json = stringify_with_indent(&call.return_value, options.indented.then_some("  "));
            if json.chars().count() > max {
                let half = max / 2;
                (
                    format!("(Truncated. Full size is {})", format_bytes(json.len())),
                    format!("{}\n...\n{}", head(&json, half), tail(&json, half)),
                )
            } else {
                (String::new(), json)
            }
        }
    };
    let assignment = variable.map(|name| format!("{name} = ")).unwrap_or_default();
    format!("// {} -> {marker}\n{assignment}{content}", call.callable)
}

/// Render the call-result block appended to a script's console output.
///
/// `variables[i]` is the variable that captured `calls[i]`'s value, if any.
pub fn format_script_call_results(
    variables: &[Option<&str>],
    calls: &[CallableResult],
    options: &FormatOptions,
) -> String {
    calls
        .iter()
        .enumerate()
        .map(|(index, call)| format_call(variables.get(index).copied().flatten(), call, options))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn truncate_content_keeps_head_and_tail() {
        let content = "a".repeat(10) + &"b".repeat(10);
        let truncated = truncate_content(&content, 10);
        assert_eq!(
            truncated,
            "aaaaa\n\n-- Content has been truncated to be below 10 characters --\n\nbbbbb"
        );
        assert_eq!(truncate_content("short", 10), "short");
    }

    #[test]
    fn truncate_tail_appends_notice() {
        assert_eq!(truncate_content_tail("abcdef", 3), "abc ... (truncated)");
        assert_eq!(truncate_content_tail("abc", 3), "abc");
    }

    #[test]
    fn formats_bytes_with_trimmed_decimals() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1024 * 1024), "1 MB");
        assert_eq!(format_bytes(1234), "1.21 KB");
    }

    #[test]
    fn stable_stringify_sorts_keys_recursively() {
        let value = json!({"b": 1, "a": {"d": [2, {"z": 0, "y": 1}], "c": null}});
        assert_eq!(
            stable_stringify(&value),
            r#"{"a":{"c":null,"d":[2,{"y":1,"z":0}]},"b":1}"#
        );
    }

    #[test]
    fn custom_indent_is_honoured() {
        let value = json!({"a": [1]});
        assert_eq!(
            stringify_with_indent(&value, Some("    ")),
            "{\n    \"a\": [\n        1\n    ]\n}"
        );
        assert_eq!(stringify_with_indent(&value, None), r#"{"a":[1]}"#);
    }

    // ── call results ─────────────────────────────────────────────────────────

    #[test]
    fn labels_calls_with_variables() {
        let calls = vec![
            CallableResult::new("testFn", json!({"key": "value"})),
            CallableResult::new("other", json!(1)),
        ];
        let formatted = format_script_call_results(
            &[Some("testVar"), None],
            &calls,
            &FormatOptions::default(),
        );
        assert_eq!(
            formatted,
            "// testFn -> \ntestVar = {\n  \"key\": \"value\"\n}\n\n// other -> \n1"
        );
    }

    #[test]
    fn compact_mode_skips_indentation() {
        let calls = vec![CallableResult::new("f", json!({"a": [1, 2]}))];
        let options = FormatOptions {
            indented: false,
            call_result_max_length: 2000,
        };
        assert_eq!(
            format_script_call_results(&[None], &calls, &options),
            "// f -> \n{\"a\":[1,2]}"
        );
    }

    #[test]
    fn summary_wins_over_json() {
        let calls = vec![CallableResult::new("search", json!({"huge": "payload"}))
            .with_summary(Some("3 results".to_string()))];
        assert_eq!(
            format_script_call_results(&[Some("r")], &calls, &FormatOptions::default()),
            "// search -> \nr = 3 results"
        );
    }

    #[test]
    fn oversized_results_get_exactly_one_marker() {
        let payload = "x".repeat(5000);
        let calls = vec![CallableResult::new("big", json!(payload))];
        let options = FormatOptions {
            indented: true,
            call_result_max_length: 100,
        };
        let formatted = format_script_call_results(&[None], &calls, &options);
        assert_eq!(formatted.matches("(Truncated. Full size is").count(), 1);
        assert!(formatted.contains("(Truncated. Full size is 4.88 KB)"));
        let header = "// big -> (Truncated. Full size is 4.88 KB)\n";
        assert!(formatted.starts_with(header));
        assert_eq!(formatted.len() - header.len(), 100 + "\n...\n".len());
    }
}
