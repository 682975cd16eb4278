//! Line events produced by a dialect grammar
//!
//! One raw line from the firmware maps to exactly one [`LineEvent`].

use cncstream_core::{ActiveState, AxisVector, BufferCounters, Overrides, ParserState};
use serde::{Deserialize, Serialize};

/// Fields of one status report, as reported
///
/// Positions are `None` when the report did not carry them; the runner
/// fills them in from the last known offset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub active_state: ActiveState,
    pub sub_state: Option<u8>,
    pub mpos: Option<AxisVector>,
    pub wpos: Option<AxisVector>,
    pub wco: Option<AxisVector>,
    pub buffer: Option<BufferCounters>,
    pub line: Option<u32>,
    pub feedrate: Option<f64>,
    pub spindle: Option<f64>,
    pub overrides: Option<Overrides>,
    pub pins: Option<String>,
    pub accessory: Option<String>,
}

/// Kind of bracketed feedback line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackKind {
    /// `[MSG:...]`
    Message,
    /// `[VER:...]`
    Version,
    /// `[OPT:...]`
    Options,
    /// `[HLP:...]`
    Help,
    /// `[echo:...]`
    Echo,
    /// Any other bracketed text
    Plain,
}

/// One parsed firmware line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum LineEvent {
    Status(StatusReport),
    Ok,
    /// `error:<n>`; `code` is `None` for the textual 0.9 form
    Error { code: Option<u32>, message: String },
    /// `ALARM:<n>`; `code` is `None` for the textual 0.9 form
    Alarm { code: Option<u32>, message: String },
    ParserState(ParserState),
    /// Coordinate parameter such as `[G54:0.000,0.000,0.000]`
    Parameters { name: String, value: String },
    /// `$name=value` with an optional trailing description
    Settings {
        name: String,
        value: String,
        description: Option<String>,
    },
    /// Startup banner, e.g. `Grbl 1.1h ['$' for help]`
    Startup {
        firmware: String,
        version: String,
        message: Option<String>,
    },
    Feedback { kind: FeedbackKind, message: String },
    Unrecognized { raw: String },
}

impl LineEvent {
    /// Event name used in log output
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Ok => "ok",
            Self::Error { .. } => "error",
            Self::Alarm { .. } => "alarm",
            Self::ParserState(_) => "parserstate",
            Self::Parameters { .. } => "parameters",
            Self::Settings { .. } => "settings",
            Self::Startup { .. } => "startup",
            Self::Feedback { .. } => "feedback",
            Self::Unrecognized { .. } => "others",
        }
    }

    /// True for `ok` and `error`, which acknowledge one buffered line
    pub fn is_acknowledgement(&self) -> bool {
        matches!(self, Self::Ok | Self::Error { .. })
    }
}
