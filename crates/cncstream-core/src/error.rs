//! Error handling for cncstream
//!
//! - [`ControllerError`]: command dispatch, workflow and alarm lock refusals
//! - [`GcodeError`]: programs, macros and expression evaluation
//! - [`ConnectionError`]: the byte transport underneath a controller
//!
//! All error types use `thiserror`. Controller and G-code errors are
//! `Clone + PartialEq` so they can travel in replies and be asserted on.

use thiserror::Error;

/// Refusals and failures of the per-connection controller
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// Nothing can be written, the transport is closed
    #[error("Transport unavailable: {port}")]
    TransportUnavailable { port: String },

    /// Workflow cannot move from `current` via `requested`
    #[error("Invalid workflow transition from {current} via {requested}")]
    InvalidStateTransition { current: String, requested: String },

    /// Buffered writes other than unlock/homing are refused in alarm
    #[error("Alarm lock active, {command} refused")]
    AlarmLock { command: String },

    #[error("Command rejected: {reason}")]
    CommandRejected { reason: String },

    #[error("Unknown command: {verb}")]
    UnknownCommand { verb: String },

    #[error("Invalid arguments for {verb}: {reason}")]
    InvalidArguments { verb: String, reason: String },
}

/// Program, macro and substitution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GcodeError {
    #[error("Program '{name}' is empty")]
    EmptyProgram { name: String },

    /// Expression text could not be tokenized or parsed
    #[error("Invalid expression '{expression}': {reason}")]
    InvalidExpression { expression: String, reason: String },

    /// Expression parsed but referenced an unknown name or divided by zero
    #[error("Cannot evaluate '{expression}': {reason}")]
    Evaluation { expression: String, reason: String },

    /// Neither a macro id nor a macro name matched
    #[error("Macro {id} not found")]
    MacroNotFound { id: String },
}

/// Transport errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("Port not found: {port}")]
    PortNotFound { port: String },

    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen { port: String, reason: String },

    #[error("Connection lost: {reason}")]
    ConnectionLost { reason: String },

    #[error("Serial port error: {reason}")]
    SerialError { reason: String },

    #[error("I/O error: {reason}")]
    IoError { reason: String },
}

/// Unified error for public APIs that can fail in more than one layer
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Gcode(#[from] GcodeError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True for transport failures, including writes refused on a closed port
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Controller(ControllerError::TransportUnavailable { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
