//! # cncstream Communication
//!
//! Everything between a serial port and the controller's subscribers:
//!
//! - [`firmware`]: per-dialect line grammars, realtime bytes and settings tables
//! - [`Runner`]: folds parsed lines into the machine snapshot
//! - [`Feeder`] and [`Sender`]: the interactive queue and the program streamer
//! - [`Workflow`]: program run state
//! - [`Controller`]: one orchestrator per open port, plus its tokio driver
//! - [`transport`]: serial and in-memory byte transports

pub mod command;
pub mod controller;
pub mod feeder;
pub mod firmware;
pub mod pipeline;
pub mod runner;
pub mod sender;
pub mod toolchange;
pub mod transport;
pub mod workflow;

pub use command::Command;
pub use controller::{
    spawn, AckLedger, AckOrigin, Controller, ControllerHandle, ControllerMessage, Subscription,
};
pub use feeder::{Feeder, FeederLine};
pub use firmware::{Dialect, FeedbackKind, LineEvent, RapidOverride, RealtimeCommands, StatusReport};
pub use pipeline::{Environment, Pipeline, Processed};
pub use runner::{Runner, RunnerUpdate};
pub use sender::{Sender, SenderBatch};
pub use toolchange::tool_change_program;
pub use transport::{
    list_ports, MockTransport, SerialPortInfo, SerialTransport, Transport, TransportEvent,
};
pub use workflow::{Transition, Workflow};
