//! Firmware dialects
//!
//! One [`Dialect`] descriptor per firmware family. The controller engine is
//! generic over the descriptor: adding a firmware means adding a descriptor
//! (grammar, realtime bytes, settings table), not another controller.

pub mod event;
pub mod fluidnc;
pub mod grbl;
pub mod realtime;
pub mod settings;

pub use event::{FeedbackKind, LineEvent, StatusReport};
pub use realtime::{OverrideBytes, RapidOverride, RealtimeCommands};
pub use settings::{find_setting, SettingDescriptor, FLUIDNC_SETTINGS, GRBL_SETTINGS};

use cncstream_settings::FirmwareDialect;
use std::fmt;

/// Line grammar of a dialect
pub type Grammar = fn(&str) -> LineEvent;

/// Parameters the generic controller needs to speak one firmware family
#[derive(Clone, Copy)]
pub struct Dialect {
    pub kind: FirmwareDialect,
    pub name: &'static str,
    pub grammar: Grammar,
    pub realtime: RealtimeCommands,
    pub settings: &'static [SettingDescriptor],
    /// Default serial receive buffer size in bytes
    pub rx_buffer_size: usize,
    /// Lines sent after every startup banner
    pub init_commands: &'static [&'static str],
}

impl Dialect {
    pub const GRBL: Dialect = Dialect {
        kind: FirmwareDialect::Grbl,
        name: "Grbl",
        grammar: grbl::parse_line,
        realtime: RealtimeCommands::GRBL,
        settings: GRBL_SETTINGS,
        rx_buffer_size: 128,
        init_commands: &["$$", "$I"],
    };

    pub const GRBLHAL: Dialect = Dialect {
        kind: FirmwareDialect::GrblHal,
        name: "grblHAL",
        grammar: grbl::parse_line,
        realtime: RealtimeCommands::GRBL,
        settings: GRBL_SETTINGS,
        rx_buffer_size: 1024,
        init_commands: &["$$", "$I"],
    };

    pub const FLUIDNC: Dialect = Dialect {
        kind: FirmwareDialect::FluidNc,
        name: "FluidNC",
        grammar: fluidnc::parse_line,
        realtime: RealtimeCommands::GRBL,
        settings: FLUIDNC_SETTINGS,
        rx_buffer_size: 256,
        init_commands: &["$I", "$$", "$Config/Filename"],
    };

    pub fn for_kind(kind: FirmwareDialect) -> &'static Dialect {
        match kind {
            FirmwareDialect::Grbl => &Self::GRBL,
            FirmwareDialect::GrblHal => &Self::GRBLHAL,
            FirmwareDialect::FluidNc => &Self::FLUIDNC,
        }
    }

    /// Parse one raw line
    pub fn parse(&self, line: &str) -> LineEvent {
        (self.grammar)(line)
    }

    /// Describe a setting, falling back to the Grbl table for numbered settings
    pub fn describe_setting(&self, name: &str) -> Option<&'static SettingDescriptor> {
        find_setting(self.settings, name).or_else(|| find_setting(GRBL_SETTINGS, name))
    }
}

impl fmt::Debug for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dialect")
            .field("kind", &self.kind)
            .field("rx_buffer_size", &self.rx_buffer_size)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
