//! # cncstream
//!
//! Machine control runtime for Grbl-family CNC controllers:
//! - Line grammar for Grbl 1.1, grblHAL and FluidNC
//! - Interactive feeder for ad-hoc commands and macros
//! - Character-counting program sender with hold and rewind
//! - Workflow arbitration between the feeder and the sender
//!
//! ## Architecture
//!
//! cncstream is organized as a workspace with multiple crates:
//!
//! 1. **cncstream-core** - Machine data model, expression context, errors, subscriber bus
//! 2. **cncstream-settings** - Configuration file, macros, tool change policy
//! 3. **cncstream-communication** - Transports, dialects, feeder, sender, workflow, controller
//! 4. **cncstream** - Terminal front end that integrates all crates

pub use cncstream_communication::{
    list_ports, spawn, Command, Controller, ControllerHandle, Dialect, Feeder, LineEvent,
    MockTransport, Runner, Sender, SerialPortInfo, SerialTransport, Transport, TransportEvent,
    Workflow,
};

pub use cncstream_core::{
    Context, ControllerBus, ControllerError, ControllerEvent, Error, EventCategory, EventFilter,
    MachineState, Result, Value, WorkflowState,
};

pub use cncstream_settings::{Config, FirmwareDialect, StreamingProtocol, ToolChangePolicy};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Initialize logging with the default configuration
///
/// Log lines go to stderr so that stdout stays free for controller events.
/// `RUST_LOG` overrides the default `info` level.
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_names(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}
