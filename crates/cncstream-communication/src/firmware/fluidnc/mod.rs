//! FluidNC protocol support
//!
//! FluidNC speaks the Grbl grammar but reports its YAML-backed settings by
//! path, e.g. `$Config/Filename=config.yaml` or `$/axes/x/steps_per_mm=80`.

use super::event::LineEvent;
use super::grbl::response_parser::{parse_setting, parse_with, setting_event};
use regex::Regex;
use std::sync::OnceLock;

static PATH_SETTING_REGEX: OnceLock<Regex> = OnceLock::new();

fn path_setting_regex() -> &'static Regex {
    PATH_SETTING_REGEX.get_or_init(|| {
        Regex::new(r"^\$([A-Za-z/][A-Za-z0-9_/\-]*)=(.*)$").expect("invalid FluidNC setting regex")
    })
}

/// Parse one line with the FluidNC grammar
pub fn parse_line(line: &str) -> LineEvent {
    parse_with(line, parse_fluidnc_setting)
}

fn parse_fluidnc_setting(line: &str) -> Option<LineEvent> {
    if let Some(event) = parse_setting(line) {
        return Some(event);
    }
    let caps = path_setting_regex().captures(line)?;
    Some(setting_event(&caps[1], &caps[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::event::FeedbackKind;

    #[test]
    fn test_path_settings() {
        assert_eq!(
            parse_line("$Config/Filename=config.yaml"),
            LineEvent::Settings {
                name: "$Config/Filename".to_string(),
                value: "config.yaml".to_string(),
                description: None,
            }
        );
        assert_eq!(
            parse_line("$/axes/x/steps_per_mm=80.000"),
            LineEvent::Settings {
                name: "$/axes/x/steps_per_mm".to_string(),
                value: "80.000".to_string(),
                description: None,
            }
        );
        assert!(matches!(parse_line("$10=1"), LineEvent::Settings { .. }));
    }

    #[test]
    fn test_leveled_message() {
        assert_eq!(
            parse_line("[MSG:INFO: Connecting to STA SSID:shop]"),
            LineEvent::Feedback {
                kind: FeedbackKind::Message,
                message: "INFO: Connecting to STA SSID:shop".to_string(),
            }
        );
    }

    #[test]
    fn test_banner() {
        assert!(matches!(
            parse_line("Grbl 3.7 [FluidNC v3.7.8 (wifi) '$' for help]"),
            LineEvent::Startup { ref version, .. } if version == "3.7"
        ));
    }
}
