//! Event type definitions for the controller bus.
//!
//! Every event a controller publishes to its subscribers. Events are
//! cloneable and serializable so they can be relayed or logged as JSON.

use serde::{Deserialize, Serialize};

use crate::data::{
    FeederStatus, FirmwareSettings, MachineState, SenderStatus, WorkflowState, WriteSource,
};

/// Root event enum for everything a controller publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ControllerEvent {
    /// Transport opened and the controller attached to it
    ConnectionOpened {
        port: String,
        baud_rate: u32,
        dialect: String,
    },
    /// Transport closed; the controller is gone
    ConnectionClosed { port: String },
    /// Transport failure
    ConnectionError { port: String, message: String },
    /// One line read from the firmware, for terminal echo
    SerialRead { line: String },
    /// Data written to the firmware, tagged with its origin
    SerialWrite { data: String, source: WriteSource },
    /// Status, parser state and parameters changed
    ControllerState { dialect: String, state: MachineState },
    /// Firmware settings changed
    ControllerSettings {
        dialect: String,
        settings: FirmwareSettings,
    },
    /// Workflow state changed
    WorkflowState { state: WorkflowState },
    SenderStatus(SenderStatus),
    FeederStatus(FeederStatus),
    /// A program was loaded into the sender
    ProgramLoaded {
        name: String,
        size: usize,
        total: usize,
    },
    ProgramUnloaded,
    /// A command verb was carried out
    Task { name: String },
    /// Prompt surfaced when a channel holds with a pending message
    Message { message: String },
    /// Unknown verb, refused write or similar
    Error { message: String },
}

impl ControllerEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            Self::ConnectionOpened { .. }
            | Self::ConnectionClosed { .. }
            | Self::ConnectionError { .. } => EventCategory::Connection,
            Self::SerialRead { .. } | Self::SerialWrite { .. } => EventCategory::Serial,
            Self::ControllerState { .. } | Self::ControllerSettings { .. } => {
                EventCategory::Machine
            }
            Self::WorkflowState { .. }
            | Self::ProgramLoaded { .. }
            | Self::ProgramUnloaded
            | Self::Task { .. }
            | Self::Message { .. } => EventCategory::Workflow,
            Self::SenderStatus(_) | Self::FeederStatus(_) => EventCategory::Channel,
            Self::Error { .. } => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            Self::ConnectionOpened {
                port,
                baud_rate,
                dialect,
            } => format!("Opened {} at {} baud ({})", port, baud_rate, dialect),
            Self::ConnectionClosed { port } => format!("Closed {}", port),
            Self::ConnectionError { port, message } => format!("{}: {}", port, message),
            Self::SerialRead { line } => format!("< {}", line),
            Self::SerialWrite { data, source } => {
                format!("> {} [{}]", data.trim_end(), source)
            }
            Self::ControllerState { state, .. } => {
                format!("State: {}", state.status.active_state)
            }
            Self::ControllerSettings { settings, .. } => {
                format!("Settings: {} values", settings.values.len())
            }
            Self::WorkflowState { state } => format!("Workflow: {}", state),
            Self::SenderStatus(s) => {
                format!("Sender {}: {}/{} acked {}", s.state, s.sent, s.total, s.received)
            }
            Self::FeederStatus(s) => format!("Feeder: {} queued, hold={}", s.queue, s.hold),
            Self::ProgramLoaded { name, total, .. } => {
                format!("Loaded '{}' ({} lines)", name, total)
            }
            Self::ProgramUnloaded => "Program unloaded".to_string(),
            Self::Task { name } => format!("Task: {}", name),
            Self::Message { message } => format!("Message: {}", message),
            Self::Error { message } => format!("Error: {}", message),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Transport lifecycle
    Connection,
    /// Raw line echo
    Serial,
    /// Machine state and settings
    Machine,
    /// Workflow state, program and task events
    Workflow,
    /// Feeder and sender status
    Channel,
    /// Error and diagnostic events
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Serial => write!(f, "Serial"),
            EventCategory::Machine => write!(f, "Machine"),
            EventCategory::Workflow => write!(f, "Workflow"),
            EventCategory::Channel => write!(f, "Channel"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}
