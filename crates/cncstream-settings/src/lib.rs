//! cncstream Settings Crate
//!
//! Configuration consumed by the controller: connection defaults, polling and
//! flow-control tuning, tool-change policy and stored macros.

pub mod config;
pub mod error;

pub use config::{
    Config, ConnectionSettings, ControllerSettings, FirmwareDialect, MacroDefinition,
    MachinePoint, ProbeStrategy, StreamingProtocol, ToolChangePolicy, ToolChangeSettings,
};
pub use error::{SettingsError, SettingsResult};
