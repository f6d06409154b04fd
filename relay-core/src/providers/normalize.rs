//! Response normalization
//!
//! Raw backend text goes through three steps before it reaches the caller:
//! reasoning spans are removed, `<tool_call>` blocks become structured tool
//! calls, and the content is cut to the host's message length. Running the
//! normalizer on its own output changes nothing.

use crate::config::NormalizerConfig;
use crate::protocol::ToolCall;
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

const REASONING_TAGS: &str = "think|thinking|thought|reasoning";

fn pattern(cell: &'static OnceLock<Regex>, source: impl FnOnce() -> String) -> &'static Regex {
    cell.get_or_init(|| Regex::new(&source()).unwrap_or_else(|_| unreachable!("static pattern")))
}

fn reasoning_span() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, || {
        format!(
            r"(?is)<\s*(?:{tags})\s*>.*?<\s*/\s*(?:{tags})\s*>",
            tags = REASONING_TAGS
        )
    })
}

fn reasoning_open() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, || format!(r"(?i)<\s*(?:{})\s*>", REASONING_TAGS))
}

fn reasoning_close() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, || format!(r"(?i)<\s*/\s*(?:{})\s*>", REASONING_TAGS))
}

fn tool_call_block() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, || r"(?is)<tool_call>(.*?)</tool_call>".to_string())
}

fn blank_runs() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    pattern(&CELL, || r"\n{3,}".to_string())
}

/// Output of one normalization pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizedText {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub truncated: bool,
}

/// Turns raw backend text into caller-ready content
#[derive(Debug, Clone)]
pub struct Normalizer {
    max_message_chars: usize,
    truncation_marker: String,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::from(&NormalizerConfig::default())
    }
}

impl From<&NormalizerConfig> for Normalizer {
    fn from(config: &NormalizerConfig) -> Self {
        Self {
            max_message_chars: config.max_message_chars,
            truncation_marker: config.truncation_marker.clone(),
        }
    }
}

impl Normalizer {
    pub fn new(max_message_chars: usize, truncation_marker: impl Into<String>) -> Self {
        Self {
            max_message_chars,
            truncation_marker: truncation_marker.into(),
        }
    }

    pub fn max_message_chars(&self) -> usize {
        self.max_message_chars
    }

    /// Normalize raw text; extracted tool calls are numbered from `call_0`
    pub fn normalize(&self, raw: &str) -> NormalizedText {
        self.normalize_from(raw, 0)
    }

    /// Normalize raw text, numbering extracted tool calls after `first_id` existing ones
    pub fn normalize_from(&self, raw: &str, first_id: usize) -> NormalizedText {
        let mut text = raw.to_string();
        let mut tool_calls = Vec::new();

        // Removing one construct can splice a new one together, so run to a fixpoint
        loop {
            text = strip_reasoning(&text);
            let extracted = extract_tool_calls(&mut text, first_id + tool_calls.len());
            if extracted.is_empty() {
                break;
            }
            tool_calls.extend(extracted);
        }

        let content = tidy(&text);
        let (content, truncated) = self.truncate(content);

        NormalizedText {
            content,
            tool_calls,
            truncated,
        }
    }

    fn truncate(&self, content: String) -> (String, bool) {
        if content.chars().count() <= self.max_message_chars {
            return (content, false);
        }

        let keep = self
            .max_message_chars
            .saturating_sub(self.truncation_marker.chars().count());
        let mut cut: String = content.chars().take(keep).collect();
        cut.truncate(cut.trim_end().len());
        cut.push_str(&self.truncation_marker);
        (cut, true)
    }
}

/// Remove reasoning spans until no delimiter is left
fn strip_reasoning(input: &str) -> String {
    let mut text = input.to_string();
    loop {
        let without_spans = reasoning_span().replace_all(&text, "");
        if without_spans.len() != text.len() {
            text = without_spans.into_owned();
            continue;
        }

        // An opener with no closer hides everything after it
        if let Some(open) = reasoning_open().find(&text) {
            text.truncate(open.start());
            continue;
        }

        let without_closers = reasoning_close().replace_all(&text, "");
        if without_closers.len() != text.len() {
            text = without_closers.into_owned();
            continue;
        }

        return text;
    }
}

/// Pull valid `<tool_call>` blocks out of `text`; invalid ones stay verbatim
fn extract_tool_calls(text: &mut String, first_id: usize) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut remaining = String::with_capacity(text.len());
    let mut last = 0;

    for captures in tool_call_block().captures_iter(text.as_str()) {
        let (Some(block), Some(body)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        if let Some(call) = parse_tool_call(body.as_str(), first_id + calls.len()) {
            remaining.push_str(&text[last..block.start()]);
            last = block.end();
            calls.push(call);
        }
    }

    if !calls.is_empty() {
        remaining.push_str(&text[last..]);
        *text = remaining;
    }
    calls
}

fn parse_tool_call(body: &str, index: usize) -> Option<ToolCall> {
    let json: Value = serde_json::from_str(body.trim()).ok()?;
    let object = json.as_object()?;
    let name = object.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }

    let arguments = match object.get("arguments") {
        None | Some(Value::Null) => "{}".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(value @ Value::Object(_)) => value.to_string(),
        Some(_) => return None,
    };

    Some(ToolCall {
        id: format!("call_{}", index),
        name: name.to_string(),
        arguments,
    })
}

fn tidy(text: &str) -> String {
    blank_runs().replace_all(text, "\n\n").trim().to_string()
}
