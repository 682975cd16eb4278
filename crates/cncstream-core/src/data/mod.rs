//! Data models for positions, machine state and channel status
//!
//! This module provides:
//! - Axis readings that keep the decimal precision the firmware reported
//! - Six-axis vectors with per-axis presence (X, Y, Z, A, B, C)
//! - Firmware active state
//! - Machine snapshot folded by the runner
//! - Status types for the feeder, sender and workflow

pub mod channel;
pub mod snapshot;

pub use channel::{
    FeederStatus, HoldReason, SenderState, SenderStatus, WorkflowState, WriteSource,
};
pub use snapshot::{
    BufferCounters, FirmwareSettings, MachineSnapshot, MachineState, ModalState, Overrides,
    ParserState, StatusSnapshot,
};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    /// X-axis
    X,
    /// Y-axis
    Y,
    /// Z-axis
    Z,
    /// A-axis (rotational around X)
    A,
    /// B-axis (rotational around Y)
    B,
    /// C-axis (rotational around Z)
    C,
}

impl Axis {
    /// All axes in report order
    pub const ALL: [Axis; 6] = [Axis::X, Axis::Y, Axis::Z, Axis::A, Axis::B, Axis::C];

    fn index(self) -> usize {
        self as usize
    }

    /// Lowercase letter used in context variable names (`posx`, `mposz`)
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'x',
            Axis::Y => 'y',
            Axis::Z => 'z',
            Axis::A => 'a',
            Axis::B => 'b',
            Axis::C => 'c',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter().to_ascii_uppercase())
    }
}

/// A numeric reading together with the number of decimals it was reported with
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Parsed value
    pub value: f64,
    /// Digits after the decimal point in the source text
    pub precision: u8,
}

impl Reading {
    /// Create a reading, rounding `value` to `precision` decimals
    pub fn rounded(value: f64, precision: u8) -> Self {
        let scale = 10f64.powi(precision as i32);
        let mut value = (value * scale).round() / scale;
        if value == 0.0 {
            // avoid "-0.000"
            value = 0.0;
        }
        Self { value, precision }
    }

    /// Parse a textual reading such as `"-12.340"`
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let value = text.parse::<f64>().ok()?;
        if !value.is_finite() {
            return None;
        }
        let precision = text
            .split_once('.')
            .map(|(_, frac)| frac.chars().take_while(|c| c.is_ascii_digit()).count())
            .unwrap_or(0);
        Some(Self {
            value,
            precision: precision.min(u8::MAX as usize) as u8,
        })
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.*}", self.precision as usize, self.value)
    }
}

/// Six-axis vector where each axis may be absent from a report
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisVector([Option<Reading>; 6]);

impl AxisVector {
    /// Parse a comma separated list of readings, assigned to X, Y, Z, A, B, C in order
    pub fn parse(text: &str) -> Option<Self> {
        let mut vector = Self::default();
        for (axis, part) in Axis::ALL.iter().zip(text.split(',')) {
            vector.set(*axis, Reading::parse(part)?);
        }
        if vector.is_empty() {
            return None;
        }
        Some(vector)
    }

    /// Reading for one axis
    pub fn get(&self, axis: Axis) -> Option<Reading> {
        self.0[axis.index()]
    }

    /// Value for one axis, if present
    pub fn value(&self, axis: Axis) -> Option<f64> {
        self.get(axis).map(|r| r.value)
    }

    /// Replace the reading for one axis
    pub fn set(&mut self, axis: Axis, reading: Reading) {
        self.0[axis.index()] = Some(reading);
    }

    /// Axes present in this vector, in report order
    pub fn iter(&self) -> impl Iterator<Item = (Axis, Reading)> + '_ {
        Axis::ALL
            .iter()
            .filter_map(move |axis| self.get(*axis).map(|r| (*axis, r)))
    }

    /// True when no axis is present
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

impl fmt::Display for AxisVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(_, r)| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Firmware-reported machine state (first field of a status report)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveState {
    /// Connected and idle, ready for commands
    Idle,
    /// Executing motion
    Run,
    /// Feed hold in progress or complete
    Hold,
    /// Jogging
    Jog,
    /// Alarm (requires unlock or homing)
    Alarm,
    /// Safety door open
    Door,
    /// Check mode (dry run)
    Check,
    /// Homing cycle in progress
    Home,
    /// Sleeping
    Sleep,
    /// Tool change (grblHAL)
    Tool,
    /// Not reported yet, or unknown to this build
    #[default]
    Unknown,
}

impl ActiveState {
    /// Map the textual state of a status report
    pub fn from_report(state: &str) -> Self {
        match state {
            "Idle" => Self::Idle,
            "Run" => Self::Run,
            "Hold" => Self::Hold,
            "Jog" => Self::Jog,
            "Alarm" => Self::Alarm,
            "Door" => Self::Door,
            "Check" => Self::Check,
            "Home" => Self::Home,
            "Sleep" => Self::Sleep,
            "Tool" => Self::Tool,
            unknown => {
                tracing::warn!("Unknown active state '{}'", unknown);
                Self::Unknown
            }
        }
    }
}

impl fmt::Display for ActiveState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Run => "Run",
            Self::Hold => "Hold",
            Self::Jog => "Jog",
            Self::Alarm => "Alarm",
            Self::Door => "Door",
            Self::Check => "Check",
            Self::Home => "Home",
            Self::Sleep => "Sleep",
            Self::Tool => "Tool",
            Self::Unknown => "Unknown",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_keeps_precision() {
        let r = Reading::parse("-12.340").unwrap();
        assert_eq!(r.value, -12.34);
        assert_eq!(r.precision, 3);
        assert_eq!(r.to_string(), "-12.340");

        let r = Reading::parse("5").unwrap();
        assert_eq!(r.precision, 0);
        assert!(Reading::parse("abc").is_none());
    }

    #[test]
    fn test_rounded_normalises_negative_zero() {
        let r = Reading::rounded(-0.0004, 3);
        assert_eq!(r.to_string(), "0.000");
        assert_eq!(Reading::rounded(1.23456, 2).to_string(), "1.23");
    }

    #[test]
    fn test_axis_vector_parse() {
        let v = AxisVector::parse("1.000,2.000,3.000,4.0").unwrap();
        assert_eq!(v.value(Axis::X), Some(1.0));
        assert_eq!(v.value(Axis::A), Some(4.0));
        assert_eq!(v.value(Axis::B), None);
        assert_eq!(v.to_string(), "1.000,2.000,3.000,4.0");
        assert!(AxisVector::parse("1.0,x,3").is_none());
    }

    #[test]
    fn test_active_state() {
        assert_eq!(ActiveState::from_report("Alarm"), ActiveState::Alarm);
        assert_eq!(ActiveState::from_report("Bogus"), ActiveState::Unknown);
        assert_eq!(ActiveState::Hold.to_string(), "Hold");
    }
}
