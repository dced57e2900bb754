//! Incremental parser for the completion event stream.
//!
//! Each `data:` frame carries a JSON patch `{"p": <path>, "v": <value>}`.
//! The only state carried between frames is [`ParseState`], which the
//! caller threads through explicitly so concurrent streams never share it.

use bytes::{Buf, BytesMut};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

pub const DONE_MARKER: &str = "[DONE]";
const UNKNOWN_ERROR: &str = "Unknown error";

static FRAGMENT_CONTENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^response/fragments/-?\d+/content$").expect("fragment content regex"));
static FRAGMENT_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^response/fragments/-?\d+/status$").expect("fragment status regex"));

const IGNORED_PATH_MARKERS: [&str; 5] = [
    "quasi_status",
    "elapsed_secs",
    "token_usage",
    "pending_fragment",
    "conversation_mode",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FragmentType {
    #[default]
    Plain,
    Reasoning,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseState {
    pub current: FragmentType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentFragment {
    pub text: String,
    pub kind: FragmentType,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOutcome {
    pub parsed: bool,
    pub stop: bool,
    pub fragments: Vec<ContentFragment>,
    pub error_message: Option<String>,
    pub state: ParseState,
}

impl ParseOutcome {
    fn skipped(state: ParseState) -> Self {
        Self { parsed: false, stop: false, fragments: Vec::new(), error_message: None, state }
    }
    fn noop(state: ParseState) -> Self {
        Self { parsed: true, ..Self::skipped(state) }
    }
    fn stop(state: ParseState, error_message: Option<String>) -> Self {
        Self { stop: true, error_message, ..Self::noop(state) }
    }
    fn fragment(state: ParseState, text: String, kind: FragmentType) -> Self {
        Self { fragments: vec![ContentFragment { text, kind }], ..Self::noop(state) }
    }
}

/// `None` from a handler means the value had an unusable shape.
type Handler = fn(&str, Option<&Value>, ParseState) -> Option<ParseOutcome>;

struct Rule {
    matches: fn(&str) -> bool,
    handle: Handler,
}

// First match wins; order matters.
static RULES: [Rule; 7] = [
    Rule { matches: is_ignored, handle: ignore },
    Rule { matches: |p| p == "response/error_msg", handle: on_error },
    Rule { matches: |p| p == "response/status", handle: on_status },
    Rule { matches: |p| FRAGMENT_STATUS.is_match(p), handle: ignore },
    Rule { matches: |p| p == "response/thinking_content", handle: on_thinking },
    Rule { matches: |p| p == "response/content", handle: on_content },
    Rule { matches: |p| FRAGMENT_CONTENT.is_match(p), handle: on_fragment },
];

pub fn parse_event(data: &str, state: ParseState) -> ParseOutcome {
    if data == DONE_MARKER {
        return ParseOutcome::stop(state, None);
    }
    let obj = match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(obj)) => obj,
        Ok(_) => return ParseOutcome::skipped(state),
        Err(e) => {
            warn!(target:"providers::deepseek_web","unparseable stream event: {}", e);
            return ParseOutcome::skipped(state);
        }
    };
    let Some(path) = obj.get("p").and_then(Value::as_str) else {
        return ParseOutcome::skipped(state);
    };
    let value = obj.get("v");

    let outcome = match RULES.iter().find(|r| (r.matches)(path)) {
        Some(rule) => (rule.handle)(path, value, state),
        None => {
            debug!(target:"providers::deepseek_web","unhandled stream path: {}", path);
            Some(ParseOutcome::noop(state))
        }
    };
    outcome.unwrap_or_else(|| {
        warn!(target:"providers::deepseek_web","unexpected value shape at {}", path);
        ParseOutcome::skipped(state)
    })
}

fn is_ignored(path: &str) -> bool {
    IGNORED_PATH_MARKERS.iter().any(|m| path.contains(m))
}

fn ignore(_: &str, _: Option<&Value>, state: ParseState) -> Option<ParseOutcome> {
    Some(ParseOutcome::noop(state))
}

fn on_error(_: &str, v: Option<&Value>, state: ParseState) -> Option<ParseOutcome> {
    let msg = value_text(v)?.unwrap_or_else(|| UNKNOWN_ERROR.to_string());
    Some(ParseOutcome::stop(state, Some(msg)))
}

fn on_status(_: &str, v: Option<&Value>, state: ParseState) -> Option<ParseOutcome> {
    match value_text(v)?.as_deref() {
        Some("FINISHED") => Some(ParseOutcome::stop(state, None)),
        _ => Some(ParseOutcome::noop(state)),
    }
}

fn on_thinking(_: &str, v: Option<&Value>, _: ParseState) -> Option<ParseOutcome> {
    let state = ParseState { current: FragmentType::Reasoning };
    let text = value_text(v)?.unwrap_or_default();
    Some(ParseOutcome::fragment(state, text, FragmentType::Reasoning))
}

fn on_content(_: &str, v: Option<&Value>, _: ParseState) -> Option<ParseOutcome> {
    let state = ParseState { current: FragmentType::Plain };
    let text = value_text(v)?.unwrap_or_default();
    Some(ParseOutcome::fragment(state, text, FragmentType::Plain))
}

fn on_fragment(_: &str, v: Option<&Value>, state: ParseState) -> Option<ParseOutcome> {
    let text = value_text(v)?.unwrap_or_default();
    Some(ParseOutcome::fragment(state, text, state.current))
}

/// Scalar text of a value. Outer `None` rejects arrays and objects.
fn value_text(v: Option<&Value>) -> Option<Option<String>> {
    match v {
        None | Some(Value::Null) => Some(None),
        Some(Value::String(s)) => Some(Some(s.clone())),
        Some(Value::Number(n)) => Some(Some(n.to_string())),
        Some(Value::Bool(b)) => Some(Some(b.to_string())),
        Some(Value::Array(_) | Value::Object(_)) => None,
    }
}

/// Payload of a `data:` line, or `None` for anything else.
pub fn data_payload(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("data:")?;
    Some(rest.strip_prefix(' ').unwrap_or(rest).trim())
}

/// Splits a chunked body into lines; bytes after the last newline wait for more input.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let pos = twoway::find_bytes(&self.buf, b"\n")?;
        let line = self.buf.split_to(pos);
        self.buf.advance(1);
        Some(decode_line(&line))
    }

    /// Remaining partial line once the body has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let line = self.buf.split();
        Some(decode_line(&line))
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}
