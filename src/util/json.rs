//! Best-effort JSON repair for model output.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::error::{Result, StrideError};

/// Parses model text into JSON, tolerating the usual model mistakes.
pub trait JsonParser: Send + Sync {
    /// Parse `text`. Empty input yields `default` when one is supplied.
    fn parse(&self, text: &str, default: Option<Value>) -> Result<Value>;
}

/// Parser that strips code fences and surrounding prose, drops trailing
/// commas, escapes raw control characters inside strings and closes
/// unterminated strings, arrays and objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct RepairJsonParser;

impl JsonParser for RepairJsonParser {
    fn parse(&self, text: &str, default: Option<Value>) -> Result<Value> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return default.ok_or_else(|| StrideError::Parse("empty JSON input".into()));
        }

        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return Ok(value);
        }

        let mut last_error = None;
        for body in candidate_bodies(trimmed) {
            let Some(repaired) = repair_json(body) else {
                continue;
            };
            match serde_json::from_str::<Value>(&repaired) {
                Ok(value) => {
                    tracing::debug!(original_len = trimmed.len(), "repaired malformed JSON");
                    return Ok(value);
                }
                Err(e) => last_error = Some(e),
            }
        }

        default.ok_or_else(|| match last_error {
            Some(e) => StrideError::Parse(format!("{e}: {trimmed}")),
            None => StrideError::Parse(format!("no JSON found in: {trimmed}")),
        })
    }
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*(?:```|$)").expect("valid fence pattern")
    })
}

/// Body of the first code fence, when that body is JSON.
fn strip_fence(text: &str) -> Option<&str> {
    let body = fence_regex().captures(text)?.get(1)?.as_str();
    body.starts_with(['{', '[']).then_some(body)
}

/// Texts to try repairing, in order. Text that opens with JSON or a fence is
/// scanned whole so fences quoted inside string values survive. Prose gets
/// its fence body tried first.
fn candidate_bodies(text: &str) -> impl Iterator<Item = &str> {
    let fence = strip_fence(text);
    let order = if text.starts_with(['{', '[']) || text.starts_with("```") {
        [Some(text), fence]
    } else {
        [fence, Some(text)]
    };
    order.into_iter().flatten()
}

/// Rewrite `body` into something `serde_json` can read. Returns `None` when no
/// object or array start is present.
fn repair_json(body: &str) -> Option<String> {
    let start = body.find(&['{', '['][..])?;

    let mut out = String::with_capacity(body.len() + 8);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in body[start..].chars() {
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
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if stack.last() != Some(&c) {
                    continue;
                }
                drop_trailing_comma(&mut out);
                stack.pop();
                out.push(c);
                if stack.is_empty() {
                    break;
                }
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }

    let tail = out.trim_end().len();
    out.truncate(tail);
    if out.ends_with(':') {
        out.push_str("null");
    }

    while let Some(close) = stack.pop() {
        drop_trailing_comma(&mut out);
        out.push(close);
    }

    Some(out)
}

fn drop_trailing_comma(out: &mut String) {
    let tail = out.trim_end().len();
    out.truncate(tail);
    if out.ends_with(',') {
        out.pop();
    }
}
