//! Robust JSON extraction from model output.
//!
//! Models wrap JSON in markdown fences, preamble text, or emit literal
//! newlines inside string values. This is a pure function: it never panics
//! and never raises through the caller.

use serde_json::Value;

/// Extract the JSON object embedded in `text`.
///
/// Strategy, in order:
/// 1. strip a ```json ...``` fence if present
/// 2. direct parse
/// 3. outermost `{ ... }` brace-balanced region
/// 4. retry the region with literal newlines inside strings escaped
pub fn extract_json(text: &str) -> Result<Value, String> {
    let cleaned = strip_fences(text.trim());

    if let Ok(v) = serde_json::from_str::<Value>(cleaned) {
        if v.is_object() {
            return Ok(v);
        }
    }

    let Some(candidate) = outermost_braces(cleaned) else {
        return Err(format!(
            "no JSON object found in response (first 120 chars: {:?})",
            &text.chars().take(120).collect::<String>()
        ));
    };

    if let Ok(v) = serde_json::from_str::<Value>(candidate) {
        return Ok(v);
    }

    let sanitized = escape_literal_newlines(candidate);
    serde_json::from_str::<Value>(&sanitized).map_err(|e| {
        format!(
            "unparseable JSON region ({e}); first 120 chars: {:?}",
            &candidate.chars().take(120).collect::<String>()
        )
    })
}

/// Drop a leading markdown code fence (with optional `json` tag) and its
/// closing fence. Returns the inner text, or the input unchanged.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // skip the language tag up to the first newline
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    match body.rfind("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Locate the outermost brace-balanced `{ ... }` region, brace counting
/// while skipping braces inside string literals.
fn outermost_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    // unbalanced: fall back to the widest `{ .. }` span
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Replace literal newlines that occur inside string values with `\n`.
fn escape_literal_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                _ => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_parse() {
        let v = extract_json(r#"{"a": 1}"#).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_fenced_json() {
        let v = extract_json("```json\n{\"ok\": true}\n```").unwrap();
        assert_eq!(v["ok"], true);
    }

    #[test]
    fn test_fenced_without_language_tag() {
        let v = extract_json("```\n{\"x\": \"y\"}\n```").unwrap();
        assert_eq!(v["x"], "y");
    }

    #[test]
    fn test_preamble_and_trailer() {
        let v = extract_json("Here is the analysis:\n{\"score\": 0.9}\nHope that helps!").unwrap();
        assert_eq!(v["score"], 0.9);
    }

    #[test]
    fn test_nested_braces_and_strings() {
        let raw = r#"noise {"outer": {"inner": "has } brace"}, "n": 2} tail"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["outer"]["inner"], "has } brace");
        assert_eq!(v["n"], 2);
    }

    #[test]
    fn test_literal_newline_inside_string() {
        let raw = "{\"narrative\": \"line one\nline two\"}";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["narrative"], "line one\nline two");
    }

    #[test]
    fn test_garbage_is_an_error_not_a_panic() {
        assert!(extract_json("total nonsense").is_err());
        assert!(extract_json("").is_err());
        assert!(extract_json("[1, 2, 3]").is_err());
    }
}
