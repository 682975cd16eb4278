//! Line pipeline shared by the feeder and the sender
//!
//! Every line taken off a queue goes through [`Pipeline::process`]:
//!
//! - comments are stripped
//! - `%` directives are interpreted (`%msg`, `%wait`, `%name = expr`)
//! - `[expr]` substitutions are evaluated against the line's context
//! - program pause (`M0`, `M1`) and tool change (`M6`) codes are detected

use cncstream_core::{Context, HoldReason, Value};
use cncstream_settings::ToolChangePolicy;
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Dwell used by `%wait` without an argument, in seconds
pub const DEFAULT_WAIT_SECONDS: f64 = 0.5;

static COMMENT_REGEX: OnceLock<Regex> = OnceLock::new();
static M_CODE_REGEX: OnceLock<Regex> = OnceLock::new();

fn comment_regex() -> &'static Regex {
    COMMENT_REGEX
        .get_or_init(|| Regex::new(r"\s*\([^)]*\)|\s*;.*").expect("invalid comment regex"))
}

fn m_code_regex() -> &'static Regex {
    M_CODE_REGEX.get_or_init(|| Regex::new(r"[Mm]\s*0*(\d+)").expect("invalid M code regex"))
}

/// Where substitution values come from
///
/// Implemented by the controller, which owns the user globals and the machine
/// snapshot.
pub trait Environment {
    /// Full evaluation context for a line captured with `captured`
    fn context(&self, captured: &Context) -> Context;

    /// Store the results of a `%name = expr` directive
    fn assign(&mut self, values: Vec<(String, Value)>);
}

/// Result of processing one raw line
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Processed {
    /// Text to write, `None` when the line produces no output
    pub line: Option<String>,
    /// Hold to place on the channel after writing `line`
    pub hold: Option<HoldReason>,
    /// A manual tool change was requested
    pub tool_change: bool,
}

/// Stateful line processor; remembers the pending `%msg`
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    policy: ToolChangePolicy,
    pending_message: Option<String>,
}

impl Pipeline {
    pub fn new(policy: ToolChangePolicy) -> Self {
        Self {
            policy,
            pending_message: None,
        }
    }

    pub fn set_policy(&mut self, policy: ToolChangePolicy) {
        self.policy = policy;
    }

    /// Forget the pending message
    pub fn reset(&mut self) {
        self.pending_message = None;
    }

    pub fn pending_message(&self) -> Option<&str> {
        self.pending_message.as_deref()
    }

    /// Process one raw line
    pub fn process(
        &mut self,
        raw: &str,
        captured: &Context,
        env: &mut dyn Environment,
    ) -> Processed {
        let trimmed = raw.trim();
        if let Some(directive) = trimmed.strip_prefix('%') {
            let directive = directive.split(';').next().unwrap_or_default().trim();
            return self.directive(directive, captured, env);
        }

        let line = comment_regex().replace_all(trimmed, "").trim().to_string();
        if line.is_empty() {
            return Processed::default();
        }

        let context = env.context(captured);
        let line = match context.translate(&line) {
            Ok(translated) => translated.trim().to_string(),
            Err(e) => {
                tracing::warn!("Substitution failed for '{}': {}", line, e);
                line
            }
        };
        if line.is_empty() {
            return Processed::default();
        }

        self.scan_codes(line)
    }

    fn directive(
        &mut self,
        directive: &str,
        captured: &Context,
        env: &mut dyn Environment,
    ) -> Processed {
        let (keyword, rest) = match directive.split_once(char::is_whitespace) {
            Some((keyword, rest)) => (keyword, rest.trim()),
            None => (directive, ""),
        };

        match keyword {
            "" => Processed::default(),
            "msg" => {
                self.pending_message = Some(rest.to_string());
                Processed::default()
            }
            "wait" => {
                let seconds = if rest.is_empty() {
                    DEFAULT_WAIT_SECONDS
                } else {
                    let context = env.context(captured);
                    match context
                        .translate(rest)
                        .ok()
                        .and_then(|text| text.trim().parse::<f64>().ok())
                    {
                        Some(seconds) if seconds >= 0.0 => seconds,
                        _ => {
                            tracing::warn!("Invalid wait duration '{}', using default", rest);
                            DEFAULT_WAIT_SECONDS
                        }
                    }
                };
                Processed {
                    line: Some(format!("G4 P{:.3}", seconds)),
                    hold: Some(HoldReason::Wait { seconds }),
                    tool_change: false,
                }
            }
            _ => {
                let context = env.context(captured);
                match context.assign(directive) {
                    Ok(values) => env.assign(values),
                    Err(e) => tracing::warn!("Ignoring directive '%{}': {}", directive, e),
                }
                Processed::default()
            }
        }
    }

    fn scan_codes(&mut self, line: String) -> Processed {
        let mut pause: Option<String> = None;
        let mut tool_change = false;
        for caps in m_code_regex().captures_iter(&line) {
            match &caps[1] {
                "0" | "1" if pause.is_none() => pause = Some(format!("M{}", &caps[1])),
                "6" => tool_change = true,
                _ => {}
            }
        }

        if tool_change && self.policy != ToolChangePolicy::Forward {
            let commented = m_code_regex()
                .replace_all(&line, |caps: &Captures| {
                    if &caps[1] == "6" {
                        "(M6)".to_string()
                    } else {
                        caps[0].to_string()
                    }
                })
                .into_owned();
            let message = self.pending_message.take().unwrap_or_else(|| line.clone());
            return Processed {
                line: Some(commented),
                hold: Some(HoldReason::ToolChange {
                    code: "M6".to_string(),
                    message,
                }),
                tool_change: self.policy == ToolChangePolicy::Manual,
            };
        }

        if let Some(code) = pause {
            let message = self.pending_message.take().unwrap_or_else(|| line.clone());
            return Processed {
                line: Some(line),
                hold: Some(HoldReason::ProgramPause { code, message }),
                tool_change: false,
            };
        }

        Processed {
            line: Some(line),
            hold: None,
            tool_change: false,
        }
    }
}
