//! JSON extraction and repair for model output.
//!
//! Models wrap JSON in markdown fences, prepend commentary, and emit
//! trailing commas. The local repair pass handles those before the
//! gateway spends a follow-up call on it.

use serde_json::Value;

/// Slice out the first balanced JSON object in model output.
///
/// Walks the text once, tracking brace depth and string/escape state.
/// Code fences and surrounding prose need no special casing: anything
/// before the first `{` and after its matching `}` is ignored.
pub fn extract_json_object(text: &str) -> &str {
    let Some(open) = text.find('{') else {
        return text.trim();
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, byte) in text.as_bytes()[open..].iter().enumerate() {
        match byte {
            _ if escaped => escaped = false,
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return &text[open..=open + offset];
                }
            }
            _ => {}
        }
    }

    // Never balanced; take the widest brace span and let the parser
    // report what is wrong with it.
    match text.rfind('}') {
        Some(close) if close > open => &text[open..=close],
        _ => text[open..].trim(),
    }
}

/// Fix the common syntax issues models produce: trailing commas before a
/// closing brace/bracket and smart quotes.
pub fn repair_common_issues(json: &str) -> String {
    let mut repaired = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\u{201c}' | '\u{201d}' => repaired.push('"'),
            ',' => {
                // Drop a comma whose next non-whitespace char closes a scope
                let mut lookahead = chars.clone();
                let mut next_significant = None;
                for n in lookahead.by_ref() {
                    if !n.is_whitespace() {
                        next_significant = Some(n);
                        break;
                    }
                }
                if matches!(next_significant, Some('}') | Some(']')) {
                    continue;
                }
                repaired.push(c);
            }
            _ => repaired.push(c),
        }
    }

    repaired
}

/// Parse model output into a JSON object, applying extraction and local
/// repair. Returns a description of the failure when both passes fail.
pub fn parse_with_repair(raw: &str) -> Result<Value, String> {
    let extracted = extract_json_object(raw);
    if let Ok(value) = serde_json::from_str::<Value>(extracted) {
        if value.is_object() {
            return Ok(value);
        }
        return Err(format!("expected a JSON object, got {value}"));
    }

    let repaired = repair_common_issues(extracted);
    match serde_json::from_str::<Value>(&repaired) {
        Ok(value) if value.is_object() => Ok(value),
        Ok(value) => Err(format!("expected a JSON object, got {value}")),
        Err(e) => Err(format!("JSON parse error after repair: {e}")),
    }
}
