//! Recovery of JSON from model output.
//!
//! Models asked for JSON still wrap it in code fences, surround it with
//! prose, or get cut off at the output token limit. Recovery tries, in order:
//! the fence-stripped text as-is, a structurally repaired copy, the outermost
//! `{ ... }` fragment, and a repaired copy of that fragment.

use serde_json::Value;

/// Recover a JSON value from raw model output.
///
/// # Errors
/// Returns the parse error of the first attempt when every step fails.
pub fn recover_json(raw: &str) -> Result<Value, String> {
    let text = strip_markdown_fences(raw);

    let first_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Ok(value) = serde_json::from_str::<Value>(&repair_json(text)) {
        tracing::debug!("model output recovered by structural repair");
        return Ok(value);
    }

    if let Some(fragment) = extract_json_fragment(text, '{', '}') {
        if let Ok(value) = serde_json::from_str::<Value>(fragment) {
            tracing::debug!("model output recovered from embedded object");
            return Ok(value);
        }
        if let Ok(value) = serde_json::from_str::<Value>(&repair_json(fragment)) {
            tracing::debug!("model output recovered from repaired embedded object");
            return Ok(value);
        }
    }

    Err(first_error.to_string())
}

/// Strip markdown code fences from a response
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        return trimmed;
    };
    let clean = clean.trim();
    clean.strip_suffix("```").unwrap_or(clean).trim()
}

/// Extract a JSON fragment between matching delimiters
fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start < end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Best-effort structural repair.
///
/// Handles leading prose, trailing commas, stray or mismatched closers, raw
/// control characters inside strings, trailing content after the top-level
/// value, and output truncated mid-string, mid-literal or mid-member.
pub fn repair_json(input: &str) -> String {
    let start = input.find(['{', '[']).unwrap_or(0);
    let input = &input[start..];

    let mut out = String::with_capacity(input.len() + 16);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    let mut string_start: Option<usize> = None;

    for c in input.chars() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' => {
                    out.push(c);
                    in_string = false;
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                string_start = Some(out.len());
                out.push(c);
                in_string = true;
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if !closers.contains(&c) {
                    continue;
                }
                while let Some(expected) = closers.pop() {
                    close_container(&mut out, expected);
                    if expected == c {
                        break;
                    }
                }
                if closers.is_empty() {
                    return out;
                }
            }
            c if c.is_control() && !matches!(c, '\n' | '\r' | '\t') => {}
            c => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        drop_partial_unicode_escape(&mut out);
        out.push('"');
    }

    complete_tail(&mut out, closers.last().copied(), string_start);

    while let Some(closer) = closers.pop() {
        close_container(&mut out, closer);
    }
    out
}

fn trim_end_in_place(out: &mut String) {
    let len = out.trim_end().len();
    out.truncate(len);
}

fn close_container(out: &mut String, closer: char) {
    trim_end_in_place(out);
    if out.ends_with(',') {
        out.pop();
    } else if out.ends_with(':') {
        out.push_str("null");
    }
    out.push(closer);
}

/// A string cut off in the middle of `\uXXXX` must lose the partial escape.
fn drop_partial_unicode_escape(out: &mut String) {
    let tail_start = out.len().saturating_sub(6);
    let Some(tail) = out.get(tail_start..) else {
        return;
    };
    if let Some(pos) = tail.rfind("\\u") {
        let hex = &tail[pos + 2..];
        if hex.len() < 4 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
            out.truncate(tail_start + pos);
        }
    }
}

/// Finish whatever member or element the text was cut off in.
fn complete_tail(out: &mut String, innermost: Option<char>, string_start: Option<usize>) {
    loop {
        trim_end_in_place(out);
        let Some(last) = out.chars().last() else {
            return;
        };
        match last {
            ',' => {
                out.pop();
            }
            ':' => {
                out.push_str("null");
                return;
            }
            '"' => {
                if innermost == Some('}') && string_start.is_some_and(|s| is_object_key(out, s)) {
                    out.push_str(":null");
                }
                return;
            }
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '+') => {
                let token_start = out
                    .rfind(|ch: char| !(ch.is_ascii_alphanumeric() || matches!(ch, '.' | '-' | '+')))
                    .map_or(0, |i| i + 1);
                let token = out[token_start..].to_string();

                if token.starts_with(|ch: char| ch.is_ascii_digit() || ch == '-') {
                    let kept = token.trim_end_matches(['.', '-', '+', 'e', 'E']);
                    out.truncate(token_start + kept.len());
                    if kept.is_empty() {
                        continue;
                    }
                    return;
                }

                if let Some(literal) = ["true", "false", "null"]
                    .into_iter()
                    .find(|lit| lit.starts_with(token.as_str()))
                {
                    out.truncate(token_start);
                    out.push_str(literal);
                }
                return;
            }
            _ => return,
        }
    }
}

/// Whether the string starting at `string_start` sits in key position.
fn is_object_key(out: &str, string_start: usize) -> bool {
    out[..string_start]
        .trim_end()
        .chars()
        .last()
        .is_some_and(|c| c == '{' || c == ',')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clean_json_passes_through() {
        assert_eq!(recover_json(r#"{"a": 1}"#).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"Overall\": {\"Score\": 7}}\n```";
        assert_eq!(recover_json(raw).unwrap(), json!({"Overall": {"Score": 7}}));

        let raw = "```\n[1, 2]\n```";
        assert_eq!(recover_json(raw).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_trailing_commas() {
        assert_eq!(
            recover_json(r#"{"a": [1, 2,], "b": 3,}"#).unwrap(),
            json!({"a": [1, 2], "b": 3})
        );
    }

    #[test]
    fn test_truncated_inside_string() {
        assert_eq!(
            recover_json(r#"{"Issue": "Low contrast on the hero ban"#).unwrap(),
            json!({"Issue": "Low contrast on the hero ban"})
        );
    }

    #[test]
    fn test_truncated_after_key() {
        assert_eq!(
            recover_json(r#"{"a": 1, "b""#).unwrap(),
            json!({"a": 1, "b": null})
        );
        assert_eq!(
            recover_json(r#"{"a": 1, "b":"#).unwrap(),
            json!({"a": 1, "b": null})
        );
    }

    #[test]
    fn test_truncated_nested_containers() {
        assert_eq!(
            recover_json(r#"{"Top5": [{"Issue": "x", "Score": 4}, {"Issue": "y""#).unwrap(),
            json!({"Top5": [{"Issue": "x", "Score": 4}, {"Issue": "y"}]})
        );
    }

    #[test]
    fn test_truncated_literals_and_numbers() {
        assert_eq!(recover_json(r#"{"ok": tr"#).unwrap(), json!({"ok": true}));
        assert_eq!(recover_json(r#"{"n": nu"#).unwrap(), json!({"n": null}));
        assert_eq!(recover_json(r#"{"x": 12."#).unwrap(), json!({"x": 12}));
        assert_eq!(recover_json(r#"[1, -"#).unwrap(), json!([1]));
    }

    #[test]
    fn test_stray_and_mismatched_closers() {
        assert_eq!(recover_json(r#"{"a": 1}}"#).unwrap(), json!({"a": 1}));
        assert_eq!(recover_json(r#"{"a": [1, 2}"#).unwrap(), json!({"a": [1, 2]}));
    }

    #[test]
    fn test_raw_newline_in_string() {
        assert_eq!(
            recover_json("{\"a\": \"line one\nline two\"}").unwrap(),
            json!({"a": "line one\nline two"})
        );
    }

    #[test]
    fn test_prose_around_object() {
        let raw = "Here is the analysis you asked for:\n{\"Score\": 8}\nLet me know if you need more.";
        assert_eq!(recover_json(raw).unwrap(), json!({"Score": 8}));
    }

    #[test]
    fn test_truncated_escape() {
        assert_eq!(
            recover_json(r#"{"a": "caf\u00"#).unwrap(),
            json!({"a": "caf"})
        );
        assert_eq!(recover_json(r#"{"a": "x\"#).unwrap(), json!({"a": "x"}));
    }

    #[test]
    fn test_unrecoverable() {
        assert!(recover_json("I'm sorry, I can't help with that.").is_err());
        assert!(recover_json("").is_err());
    }

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(strip_markdown_fences("  ```json {} ```  "), "{}");
        assert_eq!(strip_markdown_fences("{}"), "{}");
    }
}
