use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

/// Assignment prefixes that commonly carry hydration/state payloads:
/// `window.__FOO__ = {...}` (also `self.`/`globalThis.`) and declaration
/// forms `var|let|const name = {...}`.
static ASSIGNMENT_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:window|self|globalThis)\.__[A-Za-z0-9_]+\s*=|\b(?:var|let|const)\s+[A-Za-z_$][A-Za-z0-9_$]*\s*=",
    )
    .unwrap()
});

/// Extract JSON object/array literals assigned in a script body.
///
/// The literal is recovered with a character-level balanced-delimiter scan,
/// not a script parser; anything that fails to parse as JSON is skipped.
pub fn iter_assigned_json_blobs(script_body: &str) -> Vec<Value> {
    let mut payloads = Vec::new();
    let mut idx = 0;

    while idx < script_body.len() {
        let Some(found) = ASSIGNMENT_PREFIX_RE.find_at(script_body, idx) else {
            break;
        };
        let Some(json_start) = next_json_start(script_body, found.end()) else {
            idx = found.end();
            continue;
        };

        let (extracted, end_idx) = extract_balanced_json(script_body, json_start);
        if let Some(extracted) = extracted {
            match serde_json::from_str(extracted) {
                Ok(payload) => payloads.push(payload),
                Err(error) => {
                    debug!(%error, "Skipping unparsable assigned object literal");
                }
            }
        }
        idx = end_idx;
    }

    payloads
}

/// Byte offset of the next `{` or `[` after `start_idx`, unless a statement
/// terminator comes first.
fn next_json_start(text: &str, start_idx: usize) -> Option<usize> {
    for (offset, byte) in text.as_bytes()[start_idx..].iter().enumerate() {
        match byte {
            b'{' | b'[' => return Some(start_idx + offset),
            b';' => return None,
            _ => {}
        }
    }
    None
}

/// Scan from an opening delimiter to its balanced close, skipping string
/// contents and escapes. Returns the spanned slice and the index after it.
fn extract_balanced_json(text: &str, start_idx: usize) -> (Option<&str>, usize) {
    let bytes = text.as_bytes();
    let opening = bytes[start_idx];
    let closing = if opening == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start_idx..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }

        match byte {
            b'"' => in_string = true,
            b if b == opening => depth += 1,
            b if b == closing => {
                depth -= 1;
                if depth == 0 {
                    let end = start_idx + offset + 1;
                    return (Some(&text[start_idx..end]), end);
                }
            }
            _ => {}
        }
    }

    (None, text.len())
}
