//! GRBL Status Report Parsing
//!
//! Parses the body of a `<...>` status report into a [`StatusReport`].
//! Both the 1.1 pipe-delimited form and the 0.9 comma-delimited form are
//! accepted:
//!
//! ```text
//! <Idle|MPos:0.000,0.000,0.000|FS:0,0|WCO:0.000,0.000,0.000>
//! <Idle,MPos:0.000,0.000,0.000,WPos:0.000,0.000,0.000,Buf:0,RX:0>
//! ```

use super::super::event::StatusReport;
use cncstream_core::{ActiveState, AxisVector, BufferCounters, Overrides};
use regex::Regex;
use std::sync::OnceLock;

static LEGACY_FIELD_REGEX: OnceLock<Regex> = OnceLock::new();

fn legacy_field_regex() -> &'static Regex {
    LEGACY_FIELD_REGEX.get_or_init(|| {
        Regex::new(r"([A-Za-z]+):([^A-Za-z]*)").expect("invalid legacy status field regex")
    })
}

/// Status report parser
pub struct StatusParser;

impl StatusParser {
    /// Split a report body into its state and `key:value` fields
    fn fields(body: &str) -> (&str, Vec<(&str, &str)>) {
        if body.contains('|') {
            let mut parts = body.split('|');
            let state = parts.next().unwrap_or_default();
            let fields = parts.filter_map(|part| part.split_once(':')).collect();
            return (state, fields);
        }

        // 0.9: commas separate both fields and coordinates
        let (state, rest) = body.split_once(',').unwrap_or((body, ""));
        let fields = legacy_field_regex()
            .captures_iter(rest)
            .filter_map(|caps| {
                let key = caps.get(1)?.as_str();
                let value = caps.get(2)?.as_str().trim_end_matches(',');
                Some((key, value))
            })
            .collect();
        (state, fields)
    }

    /// Extract a numeric list such as `100,100,100`
    fn numbers<T: std::str::FromStr>(value: &str) -> Vec<T> {
        value
            .split(',')
            .filter_map(|s| s.trim().parse::<T>().ok())
            .collect()
    }

    /// Parse a status report body (without the angle brackets)
    pub fn parse(body: &str) -> Option<StatusReport> {
        let (state, fields) = Self::fields(body);
        let state = state.trim();
        if state.is_empty() {
            return None;
        }

        let (name, sub_state) = match state.split_once(':') {
            Some((name, sub)) => (name, sub.parse::<u8>().ok()),
            None => (state, None),
        };

        let mut report = StatusReport {
            active_state: ActiveState::from_report(name),
            sub_state,
            ..Default::default()
        };

        for (key, value) in fields {
            match key {
                "MPos" => report.mpos = AxisVector::parse(value),
                "WPos" => report.wpos = AxisVector::parse(value),
                "WCO" => report.wco = AxisVector::parse(value),
                "Bf" => {
                    let counts: Vec<u32> = Self::numbers(value);
                    report.buffer = Some(BufferCounters {
                        planner: counts.first().copied(),
                        rx: counts.get(1).copied(),
                        ..Default::default()
                    });
                }
                "Buf" => {
                    let buffer = report.buffer.get_or_insert_with(Default::default);
                    buffer.planner_used = value.trim().parse().ok();
                }
                "RX" => {
                    let buffer = report.buffer.get_or_insert_with(Default::default);
                    buffer.rx_used = value.trim().parse().ok();
                }
                "Ln" => report.line = value.trim().parse().ok(),
                "F" => report.feedrate = value.trim().parse().ok(),
                "FS" => {
                    let values: Vec<f64> = Self::numbers(value);
                    report.feedrate = values.first().copied();
                    report.spindle = values.get(1).copied();
                }
                "Ov" => {
                    let values: Vec<u16> = Self::numbers(value);
                    if let [feed, rapid, spindle] = values[..] {
                        report.overrides = Some(Overrides {
                            feed,
                            rapid,
                            spindle,
                        });
                    }
                }
                "Pn" => report.pins = Some(value.to_string()),
                "A" => report.accessory = Some(value.to_string()),
                other => tracing::trace!("Ignoring status field {}", other),
            }
        }

        Some(report)
    }
}
