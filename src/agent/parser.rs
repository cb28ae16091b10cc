//! Tolerant parsing of free-form LLM output.
//!
//! Models wrap structured answers in code fences, `<think>` blocks, and
//! stray prose. Extraction is layered: strict JSON first, then fenced
//! code blocks, then tag stripping, then regex spans, and finally the raw
//! text as-is. The first layer that succeeds wins.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// One recognisable directive in a ReAct turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ReactDirective {
    /// A thought with no action; the loop continues.
    Thought(String),
    /// A tool invocation.
    Action {
        tool: String,
        args: Map<String, Value>,
    },
    /// Terminal answer.
    FinalAnswer(String),
    /// No recognisable pattern; the raw text is treated as the answer.
    Raw(String),
}

fn think_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").unwrap())
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").unwrap())
}

fn final_answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)final\s+answer\s*[:：]\s*(.*)").unwrap())
}

fn action_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*\**action\**\s*[:：]\s*([A-Za-z0-9_\-]+)\s*\(").unwrap())
}

fn thought_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)\**thought\**\s*[:：]\s*(.*?)(?:\r?\n\s*\**(?:action|observation|final\s+answer)\**\s*[:：]|\z)")
            .unwrap()
    })
}

/// Remove `<think>…</think>` wrappers.
pub fn strip_think_tags(text: &str) -> String {
    think_re().replace_all(text, "").trim().to_string()
}

/// Extract the first fenced code block, preferring a `json`-tagged fence.
pub fn extract_fenced_block(text: &str) -> Option<String> {
    fence_re()
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Find the first balanced `{…}` object in the text, string-aware.
fn first_balanced_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract a JSON value from free-form output.
///
/// Layers: strict parse of the whole text, fenced block, `<think>` strip
/// followed by a balanced-brace scan. Returns `None` when no layer yields
/// valid JSON.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    if let Some(block) = extract_fenced_block(text) {
        if let Ok(value) = serde_json::from_str::<Value>(&block) {
            return Some(value);
        }
        if let Some(candidate) = first_balanced_object(&block) {
            if let Ok(value) = serde_json::from_str::<Value>(candidate) {
                return Some(value);
            }
        }
    }

    let stripped = strip_think_tags(text);
    if let Some(candidate) = first_balanced_object(&stripped) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }

    None
}

/// Parse an argument list from `tool(...)` syntax.
///
/// Accepts a JSON object, `key=value` pairs (values parsed as JSON scalars
/// where possible), a single bare value bound to `"input"`, or nothing.
pub fn parse_action_args(raw: &str) -> Map<String, Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Map::new();
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(raw) {
        return map;
    }

    if raw.contains('=') {
        let mut map = Map::new();
        for pair in split_top_level(raw) {
            let Some((key, value)) = pair.split_once('=') else {
                continue;
            };
            let key = key.trim().to_string();
            let value = value.trim();
            let parsed = serde_json::from_str::<Value>(value)
                .unwrap_or_else(|_| Value::String(value.trim_matches(|c| c == '"' || c == '\'').to_string()));
            map.insert(key, parsed);
        }
        return map;
    }

    let mut map = Map::new();
    let value = serde_json::from_str::<Value>(raw)
        .unwrap_or_else(|_| Value::String(raw.trim_matches(|c| c == '"' || c == '\'').to_string()));
    map.insert("input".to_string(), value);
    map
}

/// Split on commas that are not nested in brackets, braces, or strings.
fn split_top_level(raw: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in raw.char_indices() {
        match c {
            '"' | '\'' => in_string = !in_string,
            '[' | '{' | '(' if !in_string => depth += 1,
            ']' | '}' | ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&raw[start..]);
    parts
}

/// Scan a balanced parenthesized span starting at `open` (the index of
/// `'('`). Returns the contents between the parens.
fn balanced_paren_span(text: &str, open: usize) -> Option<&str> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[open..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'(' if !in_string => depth += 1,
            b')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[open + 1..open + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the `Thought:` span, if present.
pub fn extract_thought(text: &str) -> Option<String> {
    thought_re()
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Classify one ReAct turn.
///
/// Recognition order: final answer, action, thought; anything else is
/// returned raw. `<think>` wrappers are stripped first, and a fenced JSON
/// tool call (`{"tool": …, "args": …}`) is honored before the regex spans.
pub fn parse_react_turn(text: &str) -> ReactDirective {
    let text = strip_think_tags(text);

    // A fenced JSON tool call wins over prose markers.
    if let Some(value) = extract_json(&text) {
        if let Some(obj) = value.as_object() {
            if let Some(tool) = obj.get("tool").and_then(Value::as_str) {
                let args = obj
                    .get("args")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                return ReactDirective::Action {
                    tool: tool.to_string(),
                    args,
                };
            }
        }
    }

    if let Some(captures) = final_answer_re().captures(&text) {
        let answer = captures[1].trim();
        let answer = extract_fenced_block(answer).unwrap_or_else(|| answer.to_string());
        return ReactDirective::FinalAnswer(answer);
    }

    if let Some(captures) = action_re().captures(&text) {
        let tool = captures[1].to_string();
        let open = captures.get(0).unwrap().end() - 1;
        let raw_args = balanced_paren_span(&text, open).unwrap_or("");
        return ReactDirective::Action {
            tool,
            args: parse_action_args(raw_args),
        };
    }

    if let Some(thought) = extract_thought(&text) {
        return ReactDirective::Thought(thought);
    }

    ReactDirective::Raw(text)
}

/// Extract the value following a `Label:` marker, up to end of line.
pub fn extract_labeled_line(text: &str, label: &str) -> Option<String> {
    let pattern = format!(r"(?im)^\s*\**{}\**\s*[:：]\s*(.+)$", regex::escape(label));
    Regex::new(&pattern)
        .ok()?
        .captures(text)
        .map(|c| c[1].trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Extract a confidence value in `[0, 1]`.
pub fn extract_confidence(text: &str) -> Option<f64> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)confidence\s*[:：]?\s*([01]?\.\d+|[01](?:\.0+)?)").unwrap()
    });
    re.captures(text)
        .and_then(|c| c[1].parse::<f64>().ok())
        .map(|v| v.clamp(0.0, 1.0))
}
