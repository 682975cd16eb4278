//! GRBL Response Parser
//!
//! Turns one raw firmware line into a [`LineEvent`]. Matchers are tried in a
//! fixed order and the first one that accepts the line wins:
//!
//! 1. status report `<...>`
//! 2. `ok`
//! 3. `error:<n>`
//! 4. `ALARM:<n>`
//! 5. parser state `[GC:...]`
//! 6. coordinate parameters `[G54:...]`
//! 7. settings `$n=v`
//! 8. bracketed feedback `[MSG:...]`
//! 9. startup banner
//!
//! Anything else is [`LineEvent::Unrecognized`].

use super::error_decoder::{decode_alarm, decode_error};
use super::status_parser::StatusParser;
use crate::firmware::event::{FeedbackKind, LineEvent};
use cncstream_core::ParserState;
use regex::Regex;
use std::sync::OnceLock;

/// Matcher for the settings shape understood by a dialect
pub(crate) type SettingsMatcher = fn(&str) -> Option<LineEvent>;

static PARAMETERS_REGEX: OnceLock<Regex> = OnceLock::new();
static SETTINGS_REGEX: OnceLock<Regex> = OnceLock::new();
static STARTUP_REGEX: OnceLock<Regex> = OnceLock::new();
static MODAL_WORD_REGEX: OnceLock<Regex> = OnceLock::new();

fn parameters_regex() -> &'static Regex {
    PARAMETERS_REGEX.get_or_init(|| {
        Regex::new(r"^\[(G54|G55|G56|G57|G58|G59|G28|G30|G92|TLO|PRB):(.+)\]$")
            .expect("invalid parameters regex")
    })
}

fn settings_regex() -> &'static Regex {
    SETTINGS_REGEX
        .get_or_init(|| Regex::new(r"^\$(\d+|N\d+)=(.*)$").expect("invalid settings regex"))
}

fn startup_regex() -> &'static Regex {
    STARTUP_REGEX.get_or_init(|| {
        Regex::new(r"^([a-zA-Z0-9]+)\s+((?:\d+\.){1,2}\d+[a-zA-Z0-9\-\.]*)([^\[]*\[[^\]]+\].*)$")
            .expect("invalid startup regex")
    })
}

fn modal_word_regex() -> &'static Regex {
    MODAL_WORD_REGEX
        .get_or_init(|| Regex::new(r"^[GMTFS]-?[\d.]+$").expect("invalid modal word regex"))
}

/// Parse one line with the Grbl grammar
pub fn parse_line(line: &str) -> LineEvent {
    parse_with(line, parse_setting)
}

/// Parse one line, delegating the settings shape to `settings`
pub(crate) fn parse_with(line: &str, settings: SettingsMatcher) -> LineEvent {
    let line = line.trim();

    if let Some(body) = line.strip_prefix('<').and_then(|l| l.strip_suffix('>')) {
        if let Some(report) = StatusParser::parse(body) {
            return LineEvent::Status(report);
        }
    }

    if line == "ok" {
        return LineEvent::Ok;
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "error:") {
        let (code, message) = code_and_message(rest, decode_error);
        return LineEvent::Error { code, message };
    }

    if let Some(rest) = strip_prefix_ignore_case(line, "alarm:") {
        let (code, message) = code_and_message(rest, decode_alarm);
        return LineEvent::Alarm { code, message };
    }

    if let Some(state) = parse_parser_state(line) {
        return LineEvent::ParserState(state);
    }

    if let Some(caps) = parameters_regex().captures(line) {
        return LineEvent::Parameters {
            name: caps[1].to_string(),
            value: caps[2].to_string(),
        };
    }

    if let Some(event) = settings(line) {
        return event;
    }

    if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
        return parse_feedback(inner);
    }

    if let Some(caps) = startup_regex().captures(line) {
        let message = caps[3].trim();
        return LineEvent::Startup {
            firmware: caps[1].to_string(),
            version: caps[2].to_string(),
            message: (!message.is_empty()).then(|| message.to_string()),
        };
    }

    LineEvent::Unrecognized {
        raw: line.to_string(),
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        line.get(prefix.len()..)
    } else {
        None
    }
}

/// Numeric code with its decoded text, or the 0.9 textual form with no code
fn code_and_message(rest: &str, decode: fn(u32) -> Option<&'static str>) -> (Option<u32>, String) {
    let rest = rest.trim();
    match rest.parse::<u32>() {
        Ok(code) => (Some(code), decode(code).unwrap_or_default().to_string()),
        Err(_) => (None, rest.to_string()),
    }
}

fn parse_parser_state(line: &str) -> Option<ParserState> {
    let inner = line.strip_prefix('[')?.strip_suffix(']')?;
    let words: Vec<&str> = match inner.strip_prefix("GC:") {
        Some(body) => body.split_whitespace().collect(),
        None => {
            // 0.9 reports the bare word list, e.g. `[G0 G54 G17 G21 G90 G94 M0 M5 M9 T0 F0. S0.]`
            let words: Vec<&str> = inner.split_whitespace().collect();
            let looks_modal = words.first().is_some_and(|w| w.starts_with('G'))
                && words.iter().all(|w| modal_word_regex().is_match(w));
            if !looks_modal {
                return None;
            }
            words
        }
    };

    let mut state = ParserState::default();
    for word in words {
        let (letter, value) = word.split_at(1);
        match letter {
            "T" => state.tool = value.parse().ok(),
            "F" => state.feedrate = value.parse().ok(),
            "S" => state.spindle = value.parse().ok(),
            _ => {
                if !state.modal.assign(word) {
                    tracing::trace!("Parser state word {} is not in a modal group", word);
                }
            }
        }
    }
    Some(state)
}

/// Grbl settings: `$0=10`, `$N0=G21`, with an optional `(description)` suffix
pub(crate) fn parse_setting(line: &str) -> Option<LineEvent> {
    let caps = settings_regex().captures(line)?;
    Some(setting_event(&caps[1], &caps[2]))
}

/// Build a settings event, splitting off a trailing parenthesised description
pub(crate) fn setting_event(name: &str, rest: &str) -> LineEvent {
    let rest = rest.trim();
    let (value, description) = match rest.split_once(char::is_whitespace) {
        Some((value, tail)) => {
            let tail = tail.trim();
            match tail.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
                Some(description) => (value, Some(description.to_string())),
                None => (rest, None),
            }
        }
        None => (rest, None),
    };

    LineEvent::Settings {
        name: format!("${}", name),
        value: value.to_string(),
        description,
    }
}

fn parse_feedback(inner: &str) -> LineEvent {
    let (kind, message) = match inner.split_once(':') {
        Some(("MSG", rest)) => (FeedbackKind::Message, rest),
        Some(("VER", rest)) => (FeedbackKind::Version, rest),
        Some(("OPT", rest)) => (FeedbackKind::Options, rest),
        Some(("HLP", rest)) => (FeedbackKind::Help, rest),
        Some(("echo", rest)) => (FeedbackKind::Echo, rest),
        _ => (FeedbackKind::Plain, inner),
    };
    LineEvent::Feedback {
        kind,
        message: message.trim().to_string(),
    }
}
