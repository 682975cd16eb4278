//! Realtime command bytes
//!
//! Realtime commands are single bytes the firmware acts on immediately,
//! bypassing the line buffer. They are never counted against the receive
//! buffer and never acknowledged.

use serde::Serialize;

/// Override byte set for one override (feed or spindle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverrideBytes {
    /// Back to 100%
    pub reset: u8,
    pub coarse_plus: u8,
    pub coarse_minus: u8,
    pub fine_plus: u8,
    pub fine_minus: u8,
}

impl OverrideBytes {
    /// Bytes that move the override by `delta` percent; zero resets it.
    ///
    /// Deltas are decomposed into 10% steps followed by 1% steps.
    pub fn sequence(&self, delta: i32) -> Vec<u8> {
        if delta == 0 {
            return vec![self.reset];
        }
        let (coarse, fine) = if delta > 0 {
            (self.coarse_plus, self.fine_plus)
        } else {
            (self.coarse_minus, self.fine_minus)
        };
        let magnitude = delta.unsigned_abs() as usize;
        let mut bytes = vec![coarse; magnitude / 10];
        bytes.extend(std::iter::repeat_n(fine, magnitude % 10));
        bytes
    }
}

/// Rapid override levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RapidOverride {
    /// 100%
    Full,
    /// 50%
    Medium,
    /// 25%
    Low,
}

impl RapidOverride {
    /// Map a percentage to a level; only 100, 50 and 25 exist
    pub fn from_percent(percent: i64) -> Option<Self> {
        match percent {
            100 => Some(Self::Full),
            50 => Some(Self::Medium),
            25 => Some(Self::Low),
            _ => None,
        }
    }
}

/// Realtime byte set of a dialect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RealtimeCommands {
    pub status_query: u8,
    pub cycle_start: u8,
    pub feed_hold: u8,
    pub soft_reset: u8,
    pub jog_cancel: u8,
    pub feed_override: OverrideBytes,
    pub spindle_override: OverrideBytes,
    /// 100%, 50%, 25%
    pub rapid_override: [u8; 3],
}

impl RealtimeCommands {
    /// Grbl 1.1 byte set, shared by grblHAL and FluidNC
    pub const GRBL: Self = Self {
        status_query: b'?',
        cycle_start: b'~',
        feed_hold: b'!',
        soft_reset: 0x18,
        jog_cancel: 0x85,
        feed_override: OverrideBytes {
            reset: 0x90,
            coarse_plus: 0x91,
            coarse_minus: 0x92,
            fine_plus: 0x93,
            fine_minus: 0x94,
        },
        spindle_override: OverrideBytes {
            reset: 0x99,
            coarse_plus: 0x9A,
            coarse_minus: 0x9B,
            fine_plus: 0x9C,
            fine_minus: 0x9D,
        },
        rapid_override: [0x95, 0x96, 0x97],
    };

    pub fn rapid(&self, level: RapidOverride) -> u8 {
        match level {
            RapidOverride::Full => self.rapid_override[0],
            RapidOverride::Medium => self.rapid_override[1],
            RapidOverride::Low => self.rapid_override[2],
        }
    }

    /// True when `data` is exactly one realtime byte
    pub fn is_realtime(&self, data: &[u8]) -> bool {
        match data {
            [byte] => {
                *byte >= 0x80
                    || [
                        self.status_query,
                        self.cycle_start,
                        self.feed_hold,
                        self.soft_reset,
                    ]
                    .contains(byte)
            }
            _ => false,
        }
    }
}
