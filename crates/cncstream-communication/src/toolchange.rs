//! Manual tool change sequence
//!
//! Generates the G-code run through the feeder when a program requests a
//! tool change under the manual policy. The sequence relies on the
//! pipeline's `%` directives and `[expr]` substitution to save and restore
//! the machine state around the change.

use cncstream_settings::{MachinePoint, ProbeStrategy, ToolChangeSettings};

fn rapid_machine(point: &MachinePoint) -> [String; 2] {
    [
        format!("G53 G0 Z{:.3}", point.z),
        format!("G53 G0 X{:.3} Y{:.3}", point.x, point.y),
    ]
}

/// Lines of the tool change program for `settings`
pub fn tool_change_program(settings: &ToolChangeSettings) -> Vec<String> {
    let mut lines: Vec<String> = vec![
        // Let buffered motion finish
        "%wait".to_string(),
        "%_tc_units = modal.units, _tc_distance = modal.distance".to_string(),
        "%_tc_spindle = modal.spindle, _tc_speed = spindle".to_string(),
        "%_tc_x = mposx, _tc_y = mposy, _tc_z = mposz".to_string(),
        "M5".to_string(),
        "G21".to_string(),
        "G90".to_string(),
    ];

    lines.extend(rapid_machine(&settings.change_position));
    lines.push("%msg Change the tool, then resume".to_string());
    lines.push("M0".to_string());

    // Probe position: XY at the current (safe) height first, then down
    let probe = &settings.probe_position;
    lines.push(format!("G53 G0 X{:.3} Y{:.3}", probe.x, probe.y));
    lines.push(format!("G53 G0 Z{:.3}", probe.z));
    lines.push("G91".to_string());
    lines.push(format!(
        "G38.2 Z-{:.3} F{:.3}",
        settings.probe_distance, settings.probe_feedrate
    ));
    lines.push("G90".to_string());

    match settings.strategy {
        ProbeStrategy::Wcs => {
            lines.push(format!("G10 L20 P0 Z{:.3}", settings.touch_plate_height));
        }
        ProbeStrategy::Tlo => {
            lines.push(format!("G43.1 Z[prbz - {:.3}]", settings.reference_z));
        }
        ProbeStrategy::Custom => lines.extend(settings.custom_probe.iter().cloned()),
    }

    lines.push("G91".to_string());
    lines.push(format!("G0 Z{:.3}", settings.retract_distance));
    lines.push("G90".to_string());

    // Back to where the program stopped, then restore modal state
    lines.push(format!("G53 G0 Z{:.3}", settings.change_position.z));
    lines.push("G53 G0 X[_tc_x] Y[_tc_y]".to_string());
    lines.push("G53 G0 Z[_tc_z]".to_string());
    lines.push("[_tc_units] [_tc_distance]".to_string());
    lines.push("[_tc_spindle] S[_tc_speed]".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wcs_sequence() {
        let settings = ToolChangeSettings::default();
        let lines = tool_change_program(&settings);
        assert_eq!(lines[0], "%wait");
        assert!(lines.contains(&"G53 G0 Z-10.000".to_string()));
        assert!(lines.contains(&"G38.2 Z-30.000 F20.000".to_string()));
        assert!(lines.contains(&"G10 L20 P0 Z10.000".to_string()));
        assert_eq!(lines.last().map(String::as_str), Some("[_tc_spindle] S[_tc_speed]"));

        let pause = lines.iter().position(|l| l == "M0").unwrap();
        let probe = lines.iter().position(|l| l.starts_with("G38.2")).unwrap();
        assert!(pause < probe);
    }

    #[test]
    fn test_tlo_and_custom_strategies() {
        let settings = ToolChangeSettings {
            strategy: ProbeStrategy::Tlo,
            reference_z: -42.5,
            ..Default::default()
        };
        assert!(tool_change_program(&settings).contains(&"G43.1 Z[prbz - -42.500]".to_string()));

        let settings = ToolChangeSettings {
            strategy: ProbeStrategy::Custom,
            custom_probe: vec!["G38.2 Z-5 F10".to_string(), "G10 L20 P0 Z0".to_string()],
            ..Default::default()
        };
        let lines = tool_change_program(&settings);
        assert!(lines.contains(&"G38.2 Z-5 F10".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("G10 L20 P0 Z10")));
    }
}
