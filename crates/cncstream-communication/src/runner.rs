//! Runner
//!
//! Folds [`LineEvent`]s into a [`MachineSnapshot`]. The runner is dialect
//! agnostic; it only ever sees events produced by a grammar.

use crate::firmware::{FeedbackKind, LineEvent, StatusReport};
use cncstream_core::{
    ActiveState, Axis, FirmwareSettings, MachineSnapshot, MachineState, StatusSnapshot, Units,
};

/// Which parts of the snapshot an event changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunnerUpdate {
    /// Status, parser state or parameters changed
    pub state: bool,
    /// Firmware settings or identity changed
    pub settings: bool,
}

impl RunnerUpdate {
    pub fn any(&self) -> bool {
        self.state || self.settings
    }
}

/// Machine state aggregator
#[derive(Debug, Clone, Default)]
pub struct Runner {
    snapshot: MachineSnapshot,
}

impl Runner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> &MachineSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> &MachineState {
        &self.snapshot.state
    }

    pub fn settings(&self) -> &FirmwareSettings {
        &self.snapshot.settings
    }

    pub fn active_state(&self) -> ActiveState {
        self.snapshot.state.status.active_state
    }

    pub fn is_alarm(&self) -> bool {
        self.active_state() == ActiveState::Alarm
    }

    /// Forget everything, as after a closed connection
    pub fn reset(&mut self) {
        self.snapshot = MachineSnapshot::default();
    }

    /// Fold one event into the snapshot
    pub fn apply(&mut self, event: &LineEvent) -> RunnerUpdate {
        let state = &mut self.snapshot.state;
        let settings = &mut self.snapshot.settings;

        match event {
            LineEvent::Status(report) => {
                let next = merge_status(&state.status, report);
                let changed = next != state.status;
                if changed {
                    state.status = next;
                }
                RunnerUpdate {
                    state: changed,
                    settings: false,
                }
            }
            LineEvent::Alarm { .. } => {
                let changed = state.status.active_state != ActiveState::Alarm;
                state.status.active_state = ActiveState::Alarm;
                RunnerUpdate {
                    state: changed,
                    settings: false,
                }
            }
            LineEvent::ParserState(parser_state) => {
                let changed = state.parser_state != *parser_state;
                if changed {
                    state.parser_state = parser_state.clone();
                }
                RunnerUpdate {
                    state: changed,
                    settings: false,
                }
            }
            LineEvent::Parameters { name, value } => {
                let previous = state.parameters.insert(name.clone(), value.clone());
                RunnerUpdate {
                    state: previous.as_ref() != Some(value),
                    settings: false,
                }
            }
            LineEvent::Settings { name, value, .. } => {
                let before = settings.clone();
                settings.values.insert(name.clone(), value.clone());
                match name.as_str() {
                    "$13" => settings.report_units = Units::from_report_setting(value),
                    "$Config/Filename" => settings.config_name = Some(value.clone()),
                    _ => {}
                }
                RunnerUpdate {
                    state: false,
                    settings: *settings != before,
                }
            }
            LineEvent::Startup { version, .. } => {
                // The firmware reinitialised: nothing cached is trustworthy any more
                tracing::info!("Firmware restarted, version {}", version);
                self.snapshot = MachineSnapshot::default();
                self.snapshot.settings.version = Some(version.clone());
                RunnerUpdate {
                    state: true,
                    settings: true,
                }
            }
            LineEvent::Feedback { kind, message } => {
                let slot = match kind {
                    FeedbackKind::Version => &mut settings.build,
                    FeedbackKind::Options => &mut settings.options,
                    _ => return RunnerUpdate::default(),
                };
                let changed = slot.as_deref() != Some(message.as_str());
                *slot = Some(message.clone());
                RunnerUpdate {
                    state: false,
                    settings: changed,
                }
            }
            LineEvent::Ok | LineEvent::Error { .. } | LineEvent::Unrecognized { .. } => {
                RunnerUpdate::default()
            }
        }
    }
}

/// Merge a report into the previous status.
///
/// Fields a report may omit (offset, overrides, buffer, feed) carry over from
/// the previous status. A position reported alone is paired with the offset,
/// or with the previous opposite position when no offset is known yet.
fn merge_status(prev: &StatusSnapshot, report: &StatusReport) -> StatusSnapshot {
    let mut next = StatusSnapshot {
        active_state: report.active_state,
        sub_state: report.sub_state,
        mpos: report.mpos.unwrap_or_default(),
        wpos: report.wpos.unwrap_or_default(),
        wco: report.wco.unwrap_or(prev.wco),
        buffer: report.buffer.or(prev.buffer),
        line: report.line,
        feedrate: report.feedrate.or(prev.feedrate),
        spindle: report.spindle.or(prev.spindle),
        overrides: report.overrides.or(prev.overrides),
        pins: report.pins.clone(),
        accessory: report.accessory.clone(),
    };

    for axis in Axis::ALL {
        if next.wco.get(axis).is_some() {
            continue;
        }
        match (next.mpos.get(axis), next.wpos.get(axis)) {
            (Some(_), None) => {
                if let Some(w) = prev.wpos.get(axis) {
                    next.wpos.set(axis, w);
                }
            }
            (None, Some(_)) => {
                if let Some(m) = prev.mpos.get(axis) {
                    next.mpos.set(axis, m);
                }
            }
            _ => {}
        }
    }

    next.reconcile_positions();
    next
}
