//! Controller commands
//!
//! Subscribers submit `verb` + JSON arguments. [`Command::parse`] turns that
//! pair into a closed enum so the controller can dispatch with an exhaustive
//! match. Arguments are positional: a non-array value counts as a single
//! argument.

use crate::firmware::RapidOverride;
use cncstream_core::{Axis, Context, ControllerError};
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `gcode:load [name, text, context?]`
    Load {
        name: String,
        text: String,
        context: Context,
    },
    /// `gcode:unload`
    Unload,
    /// `gcode:start`
    Start,
    /// `gcode:stop [{force}]`
    Stop { force: bool },
    /// `gcode:pause`
    Pause,
    /// `gcode:resume`
    Resume,
    FeedHold,
    CycleStart,
    /// User-requested `?`, reply echoed to the terminal
    StatusReport,
    Homing,
    Sleep,
    Unlock,
    Reset,
    /// Percent delta; zero resets to 100%
    FeedOverride(i32),
    SpindleOverride(i32),
    RapidOverride(RapidOverride),
    /// `gcode [text | lines, context?]` through the feeder
    Gcode { lines: Vec<String>, context: Context },
    FeederStart,
    FeederStop,
    /// `jog [{x, y, z, a, b, c, feedrate}]`, relative millimetres
    Jog {
        distances: Vec<(Axis, f64)>,
        feedrate: f64,
    },
    JogCancel,
    /// `macro:run [id, context?]`, id or name
    MacroRun { id: String, context: Context },
    /// `macro:load [id, context?]` loads the macro as the program
    MacroLoad { id: String, context: Context },
    ToolChange,
    /// `lasertest:on [power, duration_ms, max_spindle]`
    LaserTestOn {
        power: f64,
        duration_ms: u64,
        max_spindle: f64,
    },
    LaserTestOff,
    /// `write [data]`, raw client write
    Write { data: String },
}

/// Verbs kept for older clients, with their replacements
const DEPRECATED: [(&str, &str); 4] = [
    ("start", "gcode:start"),
    ("stop", "gcode:stop"),
    ("pause", "gcode:pause"),
    ("resume", "gcode:resume"),
];

struct Args<'a> {
    verb: &'a str,
    values: Vec<&'a Json>,
}

impl<'a> Args<'a> {
    fn new(verb: &'a str, args: &'a Json) -> Self {
        let values = match args {
            Json::Null => Vec::new(),
            Json::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        Self { verb, values }
    }

    fn invalid(&self, reason: impl Into<String>) -> ControllerError {
        ControllerError::InvalidArguments {
            verb: self.verb.to_string(),
            reason: reason.into(),
        }
    }

    fn get(&self, index: usize) -> Option<&'a Json> {
        self.values.get(index).copied().filter(|v| !v.is_null())
    }

    fn string(&self, index: usize, name: &str) -> Result<String, ControllerError> {
        match self.get(index) {
            Some(Json::String(s)) => Ok(s.clone()),
            Some(Json::Number(n)) => Ok(n.to_string()),
            _ => Err(self.invalid(format!("missing {}", name))),
        }
    }

    fn number(&self, index: usize, name: &str) -> Result<f64, ControllerError> {
        match self.get(index) {
            Some(Json::Number(n)) => n.as_f64().ok_or_else(|| self.invalid(name.to_string())),
            Some(Json::String(s)) => s
                .trim()
                .parse()
                .map_err(|_| self.invalid(format!("{} is not a number", name))),
            _ => Err(self.invalid(format!("missing {}", name))),
        }
    }

    fn number_or(&self, index: usize, name: &str, default: f64) -> Result<f64, ControllerError> {
        if self.get(index).is_none() {
            return Ok(default);
        }
        self.number(index, name)
    }

    fn context(&self, index: usize) -> Context {
        self.get(index).map(Context::from_json).unwrap_or_default()
    }
}

impl Command {
    /// Parse a verb and its arguments
    pub fn parse(verb: &str, args: &Json) -> Result<Self, ControllerError> {
        if let Some((old, new)) = DEPRECATED.iter().find(|(old, _)| *old == verb) {
            tracing::warn!("Command '{}' is deprecated, use '{}'", old, new);
            return Self::parse(new, args);
        }

        let a = Args::new(verb, args);
        let command = match verb {
            "gcode:load" => Self::Load {
                name: a.string(0, "name")?,
                text: a.string(1, "text")?,
                context: a.context(2),
            },
            "gcode:unload" => Self::Unload,
            "gcode:start" => Self::Start,
            "gcode:stop" => {
                let force = a
                    .get(0)
                    .and_then(|v| v.get("force"))
                    .and_then(Json::as_bool)
                    .unwrap_or(false);
                Self::Stop { force }
            }
            "gcode:pause" => Self::Pause,
            "gcode:resume" => Self::Resume,
            "feedhold" => Self::FeedHold,
            "cyclestart" => Self::CycleStart,
            "statusreport" => Self::StatusReport,
            "homing" => Self::Homing,
            "sleep" => Self::Sleep,
            "unlock" => Self::Unlock,
            "reset" => Self::Reset,
            "feedOverride" => Self::FeedOverride(a.number_or(0, "delta", 0.0)?.round() as i32),
            "spindleOverride" => {
                Self::SpindleOverride(a.number_or(0, "delta", 0.0)?.round() as i32)
            }
            "rapidOverride" => {
                let level = a.number_or(0, "level", 100.0)?.round() as i64;
                let level = RapidOverride::from_percent(level)
                    .ok_or_else(|| a.invalid(format!("rapid override {}% is not 100, 50 or 25", level)))?;
                Self::RapidOverride(level)
            }
            "gcode" => {
                let lines = match a.get(0) {
                    Some(Json::String(text)) => text.lines().map(str::to_string).collect(),
                    Some(Json::Array(items)) => items
                        .iter()
                        .filter_map(Json::as_str)
                        .flat_map(|text| text.lines())
                        .map(str::to_string)
                        .collect(),
                    _ => return Err(a.invalid("missing G-code text")),
                };
                Self::Gcode {
                    lines,
                    context: a.context(1),
                }
            }
            "feeder:start" => Self::FeederStart,
            "feeder:stop" => Self::FeederStop,
            "jog" => {
                let params = a.get(0).ok_or_else(|| a.invalid("missing jog parameters"))?;
                let distances: Vec<(Axis, f64)> = Axis::ALL
                    .iter()
                    .filter_map(|axis| {
                        let key = axis.letter().to_string();
                        params.get(&key).and_then(Json::as_f64).map(|d| (*axis, d))
                    })
                    .collect();
                if distances.is_empty() {
                    return Err(a.invalid("no axis to jog"));
                }
                let feedrate = params
                    .get("feedrate")
                    .and_then(Json::as_f64)
                    .filter(|f| *f > 0.0)
                    .ok_or_else(|| a.invalid("missing feedrate"))?;
                Self::Jog {
                    distances,
                    feedrate,
                }
            }
            "jog:cancel" => Self::JogCancel,
            "macro:run" => Self::MacroRun {
                id: a.string(0, "macro id")?,
                context: a.context(1),
            },
            "macro:load" => Self::MacroLoad {
                id: a.string(0, "macro id")?,
                context: a.context(1),
            },
            "toolchange" => Self::ToolChange,
            "lasertest:on" => Self::LaserTestOn {
                power: a.number_or(0, "power", 0.0)?.clamp(0.0, 100.0),
                duration_ms: a.number_or(1, "duration", 0.0)?.max(0.0) as u64,
                max_spindle: a.number_or(2, "max spindle", 1000.0)?,
            },
            "lasertest:off" => Self::LaserTestOff,
            "write" => Self::Write {
                data: a.string(0, "data")?,
            },
            other => {
                return Err(ControllerError::UnknownCommand {
                    verb: other.to_string(),
                })
            }
        };
        Ok(command)
    }

    /// Canonical verb, as used for task events
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Load { .. } => "gcode:load",
            Self::Unload => "gcode:unload",
            Self::Start => "gcode:start",
            Self::Stop { .. } => "gcode:stop",
            Self::Pause => "gcode:pause",
            Self::Resume => "gcode:resume",
            Self::FeedHold => "feedhold",
            Self::CycleStart => "cyclestart",
            Self::StatusReport => "statusreport",
            Self::Homing => "homing",
            Self::Sleep => "sleep",
            Self::Unlock => "unlock",
            Self::Reset => "reset",
            Self::FeedOverride(_) => "feedOverride",
            Self::SpindleOverride(_) => "spindleOverride",
            Self::RapidOverride(_) => "rapidOverride",
            Self::Gcode { .. } => "gcode",
            Self::FeederStart => "feeder:start",
            Self::FeederStop => "feeder:stop",
            Self::Jog { .. } => "jog",
            Self::JogCancel => "jog:cancel",
            Self::MacroRun { .. } => "macro:run",
            Self::MacroLoad { .. } => "macro:load",
            Self::ToolChange => "toolchange",
            Self::LaserTestOn { .. } => "lasertest:on",
            Self::LaserTestOff => "lasertest:off",
            Self::Write { .. } => "write",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_load() {
        let command = Command::parse("gcode:load", &json!(["part.nc", "G0 X1\nG0 X2", {"depth": 2}]))
            .unwrap();
        match command {
            Command::Load { name, text, context } => {
                assert_eq!(name, "part.nc");
                assert_eq!(text.lines().count(), 2);
                assert_eq!(context.get("depth").and_then(|v| v.number()), Some(2.0));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_single_argument_is_wrapped() {
        assert_eq!(
            Command::parse("feedOverride", &json!(10)).unwrap(),
            Command::FeedOverride(10)
        );
        assert_eq!(
            Command::parse("gcode", &json!("G0 X1\nG0 Y1")).unwrap(),
            Command::Gcode {
                lines: vec!["G0 X1".to_string(), "G0 Y1".to_string()],
                context: Context::new()
            }
        );
    }

    #[test]
    fn test_stop_force_flag() {
        assert_eq!(
            Command::parse("gcode:stop", &json!([{"force": true}])).unwrap(),
            Command::Stop { force: true }
        );
        assert_eq!(
            Command::parse("gcode:stop", &Json::Null).unwrap(),
            Command::Stop { force: false }
        );
    }

    #[test]
    fn test_deprecated_alias() {
        assert_eq!(Command::parse("start", &Json::Null).unwrap(), Command::Start);
        assert_eq!(Command::parse("start", &Json::Null).unwrap().verb(), "gcode:start");
    }

    #[test]
    fn test_jog() {
        let command = Command::parse("jog", &json!([{"x": 1.5, "z": -0.5, "feedrate": 600}])).unwrap();
        assert_eq!(
            command,
            Command::Jog {
                distances: vec![(Axis::X, 1.5), (Axis::Z, -0.5)],
                feedrate: 600.0
            }
        );
        assert!(Command::parse("jog", &json!([{"feedrate": 600}])).is_err());
    }

    #[test]
    fn test_rejections() {
        assert_eq!(
            Command::parse("selfdestruct", &Json::Null),
            Err(ControllerError::UnknownCommand {
                verb: "selfdestruct".to_string()
            })
        );
        assert!(matches!(
            Command::parse("rapidOverride", &json!([75])),
            Err(ControllerError::InvalidArguments { .. })
        ));
        assert!(matches!(
            Command::parse("gcode:load", &json!(["only-a-name"])),
            Err(ControllerError::InvalidArguments { .. })
        ));
    }
}
