//! Firmware settings tables
//!
//! Human-readable descriptions used to annotate `$name=value` echo lines.

use serde::Serialize;

/// Description of one firmware setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SettingDescriptor {
    /// Setting name including the `$` prefix
    pub name: &'static str,
    pub description: &'static str,
    /// Unit label, empty when the value is unitless
    pub units: &'static str,
}

impl SettingDescriptor {
    const fn new(name: &'static str, description: &'static str, units: &'static str) -> Self {
        Self {
            name,
            description,
            units,
        }
    }

    /// Annotate a reported value, e.g. `$0=10 (Step pulse time, microseconds)`
    pub fn annotate(&self, value: &str) -> String {
        if self.units.is_empty() {
            format!("{}={} ({})", self.name, value, self.description)
        } else {
            format!(
                "{}={} ({}, {})",
                self.name, value, self.description, self.units
            )
        }
    }
}

/// Look up a setting by name
pub fn find_setting(
    table: &'static [SettingDescriptor],
    name: &str,
) -> Option<&'static SettingDescriptor> {
    table.iter().find(|s| s.name == name)
}

/// Grbl 1.1 settings (shared by grblHAL)
pub const GRBL_SETTINGS: &[SettingDescriptor] = &[
    SettingDescriptor::new("$0", "Step pulse time", "microseconds"),
    SettingDescriptor::new("$1", "Step idle delay", "milliseconds"),
    SettingDescriptor::new("$2", "Step pulse invert", "mask"),
    SettingDescriptor::new("$3", "Step direction invert", "mask"),
    SettingDescriptor::new("$4", "Invert step enable pin", "boolean"),
    SettingDescriptor::new("$5", "Invert limit pins", "boolean"),
    SettingDescriptor::new("$6", "Invert probe pin", "boolean"),
    SettingDescriptor::new("$10", "Status report options", "mask"),
    SettingDescriptor::new("$11", "Junction deviation", "millimeters"),
    SettingDescriptor::new("$12", "Arc tolerance", "millimeters"),
    SettingDescriptor::new("$13", "Report in inches", "boolean"),
    SettingDescriptor::new("$20", "Soft limits enable", "boolean"),
    SettingDescriptor::new("$21", "Hard limits enable", "boolean"),
    SettingDescriptor::new("$22", "Homing cycle enable", "boolean"),
    SettingDescriptor::new("$23", "Homing direction invert", "mask"),
    SettingDescriptor::new("$24", "Homing locate feed rate", "mm/min"),
    SettingDescriptor::new("$25", "Homing search seek rate", "mm/min"),
    SettingDescriptor::new("$26", "Homing switch debounce delay", "milliseconds"),
    SettingDescriptor::new("$27", "Homing switch pull-off distance", "millimeters"),
    SettingDescriptor::new("$30", "Maximum spindle speed", "RPM"),
    SettingDescriptor::new("$31", "Minimum spindle speed", "RPM"),
    SettingDescriptor::new("$32", "Laser-mode enable", "boolean"),
    SettingDescriptor::new("$100", "X-axis travel resolution", "step/mm"),
    SettingDescriptor::new("$101", "Y-axis travel resolution", "step/mm"),
    SettingDescriptor::new("$102", "Z-axis travel resolution", "step/mm"),
    SettingDescriptor::new("$110", "X-axis maximum rate", "mm/min"),
    SettingDescriptor::new("$111", "Y-axis maximum rate", "mm/min"),
    SettingDescriptor::new("$112", "Z-axis maximum rate", "mm/min"),
    SettingDescriptor::new("$120", "X-axis acceleration", "mm/sec^2"),
    SettingDescriptor::new("$121", "Y-axis acceleration", "mm/sec^2"),
    SettingDescriptor::new("$122", "Z-axis acceleration", "mm/sec^2"),
    SettingDescriptor::new("$130", "X-axis maximum travel", "millimeters"),
    SettingDescriptor::new("$131", "Y-axis maximum travel", "millimeters"),
    SettingDescriptor::new("$132", "Z-axis maximum travel", "millimeters"),
];

/// FluidNC settings reported by name
pub const FLUIDNC_SETTINGS: &[SettingDescriptor] = &[
    SettingDescriptor::new("$Config/Filename", "Active configuration file", ""),
    SettingDescriptor::new("$Report/Interval", "Automatic status report interval", "milliseconds"),
    SettingDescriptor::new("$Message/Level", "Message verbosity", ""),
    SettingDescriptor::new("$Start/Message", "Startup message", ""),
    SettingDescriptor::new("$Firmware/Build", "Firmware build", ""),
    SettingDescriptor::new("$HTTP/Enable", "Web server enable", "boolean"),
    SettingDescriptor::new("$Hostname", "Network host name", ""),
];
