//! # cncstream Core
//!
//! Core types and utilities for cncstream.
//! Provides the error taxonomy, the machine data model, the per-controller
//! subscriber bus and the immutable expression context used by line
//! substitution.

pub mod context;
pub mod data;
pub mod error;
pub mod event_bus;
pub mod units;

pub use context::{Context, Value};

pub use data::{
    ActiveState, Axis, AxisVector, BufferCounters, FeederStatus, FirmwareSettings, HoldReason,
    MachineSnapshot, MachineState, ModalState, Overrides, ParserState, Reading, SenderState,
    SenderStatus, StatusSnapshot, WorkflowState, WriteSource,
};

pub use error::{ConnectionError, ControllerError, Error, GcodeError, Result};

// Re-export the bus for convenience
pub use event_bus::{ControllerBus, ControllerEvent, EventCategory, EventFilter, SubscriptionId};

pub use units::Units;
