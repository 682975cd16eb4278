//! Status types for the feeder, sender and workflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level workflow state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    #[default]
    Idle,
    Running,
    Paused,
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Why a channel is held
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum HoldReason {
    /// Program pause code (`M0`, `M1`)
    ProgramPause {
        code: String,
        /// Pending `%msg` text, or the source line
        message: String,
    },
    /// Tool change code (`M6`)
    ToolChange { code: String, message: String },
    /// `%wait` dwell in flight
    Wait { seconds: f64 },
    /// Firmware error while streaming
    Error { code: Option<u32>, message: String },
    /// Firmware alarm
    Alarm { code: Option<u32>, message: String },
    /// Explicit pause or feed hold from a subscriber
    User,
}

impl HoldReason {
    /// Short text shown to operators
    pub fn message(&self) -> String {
        match self {
            Self::ProgramPause { message, .. } | Self::ToolChange { message, .. } => {
                message.clone()
            }
            Self::Wait { seconds } => format!("Waiting {:.3}s", seconds),
            Self::Error { code: Some(code), message } => format!("error:{} {}", code, message),
            Self::Error { code: None, message } => format!("error: {}", message),
            Self::Alarm { code: Some(code), message } => format!("ALARM:{} {}", code, message),
            Self::Alarm { code: None, message } => format!("ALARM: {}", message),
            Self::User => "Paused".to_string(),
        }
    }
}

/// Origin of a line written to the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteSource {
    /// Raw write from a subscriber
    Client,
    /// Issued by the controller itself (polling, realtime commands)
    Server,
    /// Interactive feeder line
    Feeder,
    /// Program sender line
    Sender,
}

impl fmt::Display for WriteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
            Self::Feeder => write!(f, "feeder"),
            Self::Sender => write!(f, "sender"),
        }
    }
}

/// Feeder status snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FeederStatus {
    pub hold: bool,
    pub hold_reason: Option<HoldReason>,
    /// Lines waiting to be written
    pub queue: usize,
    /// A written line awaits its acknowledgement
    pub pending: bool,
}

/// Sender lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderState {
    /// No program loaded
    #[default]
    Empty,
    /// Program loaded, nothing sent since the last rewind
    Loaded,
    Sending,
    Holding,
    /// Every line acknowledged
    Finished,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::Loaded => "loaded",
            Self::Sending => "sending",
            Self::Holding => "holding",
            Self::Finished => "finished",
        };
        write!(f, "{}", s)
    }
}

/// Sender status snapshot
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SenderStatus {
    pub state: SenderState,
    pub name: String,
    /// Program size in bytes
    pub size: usize,
    /// Number of lines
    pub total: usize,
    pub sent: usize,
    pub received: usize,
    pub hold: bool,
    pub hold_reason: Option<HoldReason>,
    /// Admission limit in bytes
    pub buffer_size: usize,
    /// Bytes written but not yet acknowledged
    pub data_length: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SenderStatus {
    /// Milliseconds between start and finish (or now, while streaming)
    pub fn elapsed_ms(&self) -> Option<i64> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some((end - start).num_milliseconds())
    }
}
