//! Configuration for cncstream
//!
//! Provides configuration file handling and validation.
//! Supports JSON and TOML file formats.
//!
//! Configuration is organized into logical sections:
//! - Connection settings (port, baud rate, firmware dialect)
//! - Controller tuning (polling, staleness windows, flow control)
//! - Tool change policy and probe coordinates
//! - Stored macros

use crate::error::{SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Firmware dialect spoken on the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FirmwareDialect {
    #[default]
    Grbl,
    GrblHal,
    FluidNc,
}

impl std::fmt::Display for FirmwareDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Grbl => write!(f, "grbl"),
            Self::GrblHal => write!(f, "grblhal"),
            Self::FluidNc => write!(f, "fluidnc"),
        }
    }
}

impl std::str::FromStr for FirmwareDialect {
    type Err = SettingsError;

    fn from_str(s: &str) -> SettingsResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "grbl" => Ok(Self::Grbl),
            "grblhal" => Ok(Self::GrblHal),
            "fluidnc" => Ok(Self::FluidNc),
            other => Err(SettingsError::invalid(
                "connection.dialect",
                format!("unknown dialect '{}'", other),
            )),
        }
    }
}

/// Connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Serial port path
    pub port: String,
    /// Baud rate for serial connections
    pub baud_rate: u32,
    pub dialect: FirmwareDialect,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115200,
            dialect: FirmwareDialect::Grbl,
        }
    }
}

/// How program lines are metered into the firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingProtocol {
    /// Keep the receive buffer as full as its capacity allows
    #[default]
    CharCounting,
    /// One line in flight at a time
    SendResponse,
}

/// Controller tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Polling tick
    pub poll_interval_ms: u64,
    /// A status query with no reply for this long is re-issued
    pub status_query_tolerance_ms: u64,
    /// A parser state query with no reply for this long is re-issued
    pub parser_state_tolerance_ms: u64,
    /// Idle time required after the last acknowledgement before a program
    /// is declared finished
    pub finish_debounce_ms: u64,
    /// Bytes held back from the firmware receive buffer
    pub buffer_margin: usize,
    pub streaming_protocol: StreamingProtocol,
    /// Delay before the first status query after opening
    pub init_delay_ms: u64,
    /// Delay between feed hold and soft reset on a forced stop
    pub force_stop_delay_ms: u64,
    /// Keep streaming when the firmware reports `error:<n>`
    pub ignore_errors: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            status_query_tolerance_ms: 5000,
            parser_state_tolerance_ms: 10000,
            finish_debounce_ms: 500,
            buffer_margin: 8,
            streaming_protocol: StreamingProtocol::CharCounting,
            init_delay_ms: 500,
            force_stop_delay_ms: 500,
            ignore_errors: false,
        }
    }
}

/// What to do when a program requests a tool change (`M6`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChangePolicy {
    /// Comment the code out and hold
    #[default]
    Ignore,
    /// Pass the code through to the firmware
    Forward,
    /// Comment the code out, hold, and run the tool change sequence
    Manual,
}

/// How the new tool is measured after a manual change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStrategy {
    /// Set the work Z origin from a touch plate (`G10 L20`)
    #[default]
    Wcs,
    /// Apply a tool length offset against a stored reference (`G43.1`)
    Tlo,
    /// Run user-supplied probe lines
    Custom,
}

/// A machine-coordinate position
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MachinePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MachinePoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Tool change settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolChangeSettings {
    pub policy: ToolChangePolicy,
    pub strategy: ProbeStrategy,
    /// Maximum probe travel (positive, downwards)
    pub probe_distance: f64,
    pub probe_feedrate: f64,
    /// Lift after a successful probe
    pub retract_distance: f64,
    pub touch_plate_height: f64,
    /// Probed machine Z of the reference tool, for the `tlo` strategy
    pub reference_z: f64,
    /// Probe lines for the `custom` strategy
    pub custom_probe: Vec<String>,
    /// Where the operator swaps the tool
    pub change_position: MachinePoint,
    /// Where probing starts
    pub probe_position: MachinePoint,
}

impl Default for ToolChangeSettings {
    fn default() -> Self {
        Self {
            policy: ToolChangePolicy::Ignore,
            strategy: ProbeStrategy::Wcs,
            probe_distance: 30.0,
            probe_feedrate: 20.0,
            retract_distance: 2.0,
            touch_plate_height: 10.0,
            reference_z: 0.0,
            custom_probe: Vec::new(),
            change_position: MachinePoint::new(0.0, 0.0, -10.0),
            probe_position: MachinePoint::new(0.0, 0.0, -10.0),
        }
    }
}

/// A stored macro
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDefinition {
    pub id: Uuid,
    pub name: String,
    /// G-code text, may contain `%` directives and `[...]` expressions
    pub content: String,
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionSettings,
    pub controller: ControllerSettings,
    pub tool_change: ToolChangeSettings,
    pub macros: Vec<MacroDefinition>,
}

enum Format {
    Json,
    Toml,
}

fn format_of(path: &Path) -> SettingsResult<Format> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => Ok(Format::Json),
        Some("toml") => Ok(Format::Toml),
        other => Err(SettingsError::UnsupportedFormat(
            other.unwrap_or("<none>").to_string(),
        )),
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Platform config location (`<config dir>/cncstream/config.toml`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("cncstream").join("config.toml"))
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = format_of(path)?;
        let content = std::fs::read_to_string(path)?;
        let config: Self = match format {
            Format::Json => serde_json::from_str(&content)?,
            Format::Toml => toml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;
        let content = match format_of(path)? {
            Format::Json => serde_json::to_string_pretty(self)?,
            Format::Toml => toml::to_string_pretty(self)?,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> SettingsResult<()> {
        if self.connection.baud_rate == 0 {
            return Err(SettingsError::invalid("connection.baud_rate", "must be > 0"));
        }

        let controller = &self.controller;
        for (key, value) in [
            ("controller.poll_interval_ms", controller.poll_interval_ms),
            (
                "controller.status_query_tolerance_ms",
                controller.status_query_tolerance_ms,
            ),
            (
                "controller.parser_state_tolerance_ms",
                controller.parser_state_tolerance_ms,
            ),
        ] {
            if value == 0 {
                return Err(SettingsError::invalid(key, "must be > 0"));
            }
        }

        let tool_change = &self.tool_change;
        if tool_change.probe_feedrate <= 0.0 {
            return Err(SettingsError::invalid("tool_change.probe_feedrate", "must be > 0"));
        }
        if tool_change.probe_distance <= 0.0 {
            return Err(SettingsError::invalid("tool_change.probe_distance", "must be > 0"));
        }
        if tool_change.strategy == ProbeStrategy::Custom && tool_change.custom_probe.is_empty() {
            return Err(SettingsError::invalid(
                "tool_change.custom_probe",
                "custom strategy needs probe lines",
            ));
        }

        let mut seen = HashSet::new();
        for definition in &self.macros {
            if !seen.insert(definition.id) {
                return Err(SettingsError::invalid(
                    "macros",
                    format!("duplicate macro id {}", definition.id),
                ));
            }
        }

        Ok(())
    }

    /// Store a new macro and return its id
    pub fn add_macro(&mut self, name: impl Into<String>, content: impl Into<String>) -> Uuid {
        let id = Uuid::new_v4();
        self.macros.push(MacroDefinition {
            id,
            name: name.into(),
            content: content.into(),
        });
        id
    }

    /// Find a macro by id, or by name when `key` is not a uuid
    pub fn find_macro(&self, key: &str) -> Option<&MacroDefinition> {
        match Uuid::parse_str(key) {
            Ok(id) => self.macros.iter().find(|m| m.id == id),
            Err(_) => self.macros.iter().find(|m| m.name == key),
        }
    }
}
