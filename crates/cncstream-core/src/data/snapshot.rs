//! Machine snapshot folded from firmware lines

use super::{ActiveState, Axis, AxisVector, Reading};
use crate::units::Units;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Planner and serial receive buffer counters
///
/// Grbl 1.1 reports free space (`Bf:`); 0.9 reports occupancy (`Buf:`, `RX:`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BufferCounters {
    /// Free planner blocks
    pub planner: Option<u32>,
    /// Free bytes in the serial receive buffer
    pub rx: Option<u32>,
    /// Planner blocks in use
    pub planner_used: Option<u32>,
    /// Bytes waiting in the serial receive buffer
    pub rx_used: Option<u32>,
}

/// Override percentages (feed, rapid, spindle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overrides {
    pub feed: u16,
    pub rapid: u16,
    pub spindle: u16,
}

impl Default for Overrides {
    fn default() -> Self {
        Self {
            feed: 100,
            rapid: 100,
            spindle: 100,
        }
    }
}

/// Content of the most recent status report
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub active_state: ActiveState,
    /// Sub-state code, e.g. `Hold:0`
    pub sub_state: Option<u8>,
    pub mpos: AxisVector,
    pub wpos: AxisVector,
    /// Work coordinate offset as last reported or derived
    pub wco: AxisVector,
    pub buffer: Option<BufferCounters>,
    /// Line number currently executing (`Ln:`)
    pub line: Option<u32>,
    pub feedrate: Option<f64>,
    pub spindle: Option<f64>,
    pub overrides: Option<Overrides>,
    /// Input pin state letters (`Pn:`)
    pub pins: Option<String>,
    /// Accessory state letters (`A:`)
    pub accessory: Option<String>,
}

impl StatusSnapshot {
    /// Fill in whichever of mpos/wpos is missing using `wco`, or derive `wco`
    /// when both positions are present.
    ///
    /// Derived values are rounded to the precision of their source reading.
    pub fn reconcile_positions(&mut self) {
        for axis in Axis::ALL {
            let m = self.mpos.get(axis);
            let w = self.wpos.get(axis);
            let o = self.wco.get(axis);
            match (m, w, o) {
                (Some(m), None, Some(o)) => {
                    self.wpos.set(axis, Reading::rounded(m.value - o.value, m.precision));
                }
                (None, Some(w), Some(o)) => {
                    self.mpos.set(axis, Reading::rounded(w.value + o.value, w.precision));
                }
                (Some(m), Some(w), _) => {
                    let precision = m.precision.max(w.precision);
                    self.wco.set(axis, Reading::rounded(m.value - w.value, precision));
                }
                _ => {}
            }
        }
    }
}

/// Modal groups from a parser state report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ModalState {
    /// G0, G1, G2, G3, G38.x, G80
    pub motion: Option<String>,
    /// G54..G59
    pub wcs: Option<String>,
    /// G17, G18, G19
    pub plane: Option<String>,
    /// G20, G21
    pub units: Option<String>,
    /// G90, G91
    pub distance: Option<String>,
    /// G93, G94
    pub feedrate: Option<String>,
    /// M0, M1, M2, M30
    pub program: Option<String>,
    /// M3, M4, M5
    pub spindle: Option<String>,
    /// M7, M8, M9 (M7 and M8 may both be active)
    pub coolant: Vec<String>,
}

impl ModalState {
    /// Place one modal word into its group. Returns false for words outside any group.
    pub fn assign(&mut self, word: &str) -> bool {
        let slot = match word {
            "G0" | "G1" | "G2" | "G3" | "G38.2" | "G38.3" | "G38.4" | "G38.5" | "G80" => {
                &mut self.motion
            }
            "G54" | "G55" | "G56" | "G57" | "G58" | "G59" => &mut self.wcs,
            "G17" | "G18" | "G19" => &mut self.plane,
            "G20" | "G21" => &mut self.units,
            "G90" | "G91" => &mut self.distance,
            "G93" | "G94" => &mut self.feedrate,
            "M0" | "M1" | "M2" | "M30" => &mut self.program,
            "M3" | "M4" | "M5" => &mut self.spindle,
            "M7" | "M8" => {
                if !self.coolant.iter().any(|c| c == word) {
                    self.coolant.push(word.to_string());
                }
                return true;
            }
            "M9" => {
                self.coolant = vec![word.to_string()];
                return true;
            }
            _ => return false,
        };
        *slot = Some(word.to_string());
        true
    }

    /// Look up a group by name, as used by `modal.<group>` context keys
    pub fn group(&self, name: &str) -> Option<String> {
        match name {
            "motion" => self.motion.clone(),
            "wcs" => self.wcs.clone(),
            "plane" => self.plane.clone(),
            "units" => self.units.clone(),
            "distance" => self.distance.clone(),
            "feedrate" => self.feedrate.clone(),
            "program" => self.program.clone(),
            "spindle" => self.spindle.clone(),
            "coolant" => {
                if self.coolant.is_empty() {
                    None
                } else {
                    Some(self.coolant.join(" "))
                }
            }
            _ => None,
        }
    }

    /// Group names accepted by [`ModalState::group`]
    pub const GROUPS: [&'static str; 9] = [
        "motion", "wcs", "plane", "units", "distance", "feedrate", "program", "spindle", "coolant",
    ];
}

/// Parser state report (`$G`)
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParserState {
    pub modal: ModalState,
    pub tool: Option<u32>,
    pub feedrate: Option<f64>,
    pub spindle: Option<f64>,
}

/// Status, parser state and coordinate parameters
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineState {
    pub status: StatusSnapshot,
    pub parser_state: ParserState,
    /// Coordinate parameters keyed by name (`G54`, `TLO`, `PRB`)
    pub parameters: BTreeMap<String, String>,
}

impl MachineState {
    /// Last probe result in machine coordinates
    pub fn probe(&self) -> Option<AxisVector> {
        let raw = self.parameters.get("PRB")?;
        let coords = raw.split(':').next()?;
        AxisVector::parse(coords)
    }
}

/// Firmware settings and identity
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FirmwareSettings {
    /// Version from the startup banner
    pub version: Option<String>,
    /// Build info from `[VER:...]`
    pub build: Option<String>,
    /// Compile options from `[OPT:...]`
    pub options: Option<String>,
    /// Raw `$name=value` pairs
    pub values: BTreeMap<String, String>,
    /// Derived from the report-inches setting
    pub report_units: Units,
    /// Active configuration file (FluidNC)
    pub config_name: Option<String>,
}

/// Everything the runner knows about the machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub state: MachineState,
    pub settings: FirmwareSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconcile_derives_wpos_from_wco() {
        let mut status = StatusSnapshot {
            mpos: AxisVector::parse("10.000,5.000,0.000").unwrap(),
            wco: AxisVector::parse("2.500,1.000,0.000").unwrap(),
            ..Default::default()
        };
        status.reconcile_positions();
        assert_eq!(status.wpos.to_string(), "7.500,4.000,0.000");
    }

    #[test]
    fn test_reconcile_derives_wco_when_both_present() {
        let mut status = StatusSnapshot {
            mpos: AxisVector::parse("0.000,0.000,0.000").unwrap(),
            wpos: AxisVector::parse("1.000,0.000,0.000").unwrap(),
            ..Default::default()
        };
        status.reconcile_positions();
        assert_eq!(status.wco.to_string(), "-1.000,0.000,0.000");
    }

    #[test]
    fn test_modal_assign() {
        let mut modal = ModalState::default();
        for word in ["G0", "G54", "G17", "G21", "G90", "G94", "M5", "M7", "M8"] {
            assert!(modal.assign(word));
        }
        assert!(!modal.assign("G43.1"));
        assert_eq!(modal.group("coolant").as_deref(), Some("M7 M8"));
        modal.assign("M9");
        assert_eq!(modal.coolant, vec!["M9".to_string()]);
        assert_eq!(modal.group("wcs").as_deref(), Some("G54"));
    }

    #[test]
    fn test_probe_parameter() {
        let mut state = MachineState::default();
        state
            .parameters
            .insert("PRB".to_string(), "1.000,2.000,-3.500:1".to_string());
        assert_eq!(state.probe().unwrap().value(Axis::Z), Some(-3.5));
    }
}
