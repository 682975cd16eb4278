// Line grammar tests
// One raw firmware line maps to exactly one event, for every dialect.

use cncstream_communication::{Dialect, FeedbackKind, LineEvent};
use cncstream_core::ActiveState;
use proptest::prelude::*;

const DIALECTS: [Dialect; 3] = [Dialect::GRBL, Dialect::GRBLHAL, Dialect::FLUIDNC];

#[test]
fn test_shared_lines_parse_alike() {
    let lines = [
        "ok",
        "error:20",
        "ALARM:2",
        "<Hold:0|MPos:1.000,2.000,3.000|Bf:15,128|FS:0,0|Ov:100,100,100>",
        "[GC:G1 G54 G17 G21 G91 G94 M3 M8 T1 F500 S12000]",
        "[G92:0.000,0.000,0.000]",
        "[VER:1.1h.20190825:]",
        "$110=5000.000",
    ];
    for line in lines {
        let grbl = Dialect::GRBL.parse(line);
        assert!(!matches!(grbl, LineEvent::Unrecognized { .. }), "{}", line);
        for dialect in &DIALECTS[1..] {
            assert_eq!(dialect.parse(line), grbl, "{} as {}", line, dialect);
        }
    }
}

#[test]
fn test_status_report_forms() {
    match Dialect::GRBL.parse("<Hold:0|MPos:1.000,2.000,3.000|Bf:15,128|FS:0,0|Ov:100,100,100>") {
        LineEvent::Status(report) => {
            assert_eq!(report.active_state, ActiveState::Hold);
            assert_eq!(report.sub_state, Some(0));
            assert_eq!(report.buffer.and_then(|b| b.rx), Some(128));
            assert_eq!(report.mpos.map(|p| p.to_string()).as_deref(), Some("1.000,2.000,3.000"));
            assert!(report.wpos.is_none());
        }
        other => panic!("unexpected {:?}", other),
    }

    match Dialect::GRBL.parse("<Idle,MPos:5.529,0.560,7.000,WPos:1.529,-5.440,-0.000,Buf:0,RX:3>") {
        LineEvent::Status(report) => {
            assert_eq!(report.active_state, ActiveState::Idle);
            assert_eq!(report.buffer.and_then(|b| b.rx_used), Some(3));
            assert_eq!(report.buffer.and_then(|b| b.rx), None);
            assert!(report.wpos.is_some());
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_banners() {
    for (line, firmware, version) in [
        ("Grbl 1.1h ['$' for help]", "Grbl", "1.1h"),
        ("GrblHAL 1.1f ['$' or '$HELP' for help]", "GrblHAL", "1.1f"),
        ("Grbl 3.7 [FluidNC v3.7.8 (wifi) '$' for help]", "Grbl", "3.7"),
    ] {
        match Dialect::GRBL.parse(line) {
            LineEvent::Startup {
                firmware: f,
                version: v,
                ..
            } => {
                assert_eq!(f, firmware);
                assert_eq!(v, version);
            }
            other => panic!("{} parsed as {:?}", line, other),
        }
    }
}

#[test]
fn test_feedback_kinds() {
    let cases = [
        ("[MSG:Reset to continue]", FeedbackKind::Message),
        ("[OPT:V,15,128]", FeedbackKind::Options),
        ("[HLP:$$ $# $G $I $N $x=val $Nx=line $J=line $SLP $C $X $H ~ ! ? ctrl-x]", FeedbackKind::Help),
        ("[echo:G0X1]", FeedbackKind::Echo),
    ];
    for (line, kind) in cases {
        assert!(
            matches!(Dialect::GRBL.parse(line), LineEvent::Feedback { kind: k, .. } if k == kind),
            "{}",
            line
        );
    }
}

#[test]
fn test_dialect_specific_settings() {
    let line = "$Report/Interval=250";
    assert!(matches!(Dialect::GRBL.parse(line), LineEvent::Unrecognized { .. }));
    assert!(matches!(Dialect::GRBLHAL.parse(line), LineEvent::Unrecognized { .. }));
    assert!(matches!(Dialect::FLUIDNC.parse(line), LineEvent::Settings { .. }));
}

proptest! {
    #[test]
    fn prop_numbered_errors(code in 1u32..200) {
        let line = format!("error:{}", code);
        match Dialect::GRBL.parse(&line) {
            LineEvent::Error { code: parsed, .. } => prop_assert_eq!(parsed, Some(code)),
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn prop_any_line_has_one_event(line in "[ -~]{0,80}") {
        for dialect in &DIALECTS {
            let first = dialect.parse(&line);
            prop_assert_eq!(dialect.parse(&line), first);
        }
    }

    #[test]
    fn prop_coordinate_parameters(
        name in prop::sample::select(vec!["G54", "G55", "G59", "G28", "G30", "G92", "TLO"]),
        x in -1000.0f64..1000.0,
        y in -1000.0f64..1000.0,
    ) {
        let value = format!("{:.3},{:.3},0.000", x, y);
        let line = format!("[{}:{}]", name, value);
        prop_assert_eq!(
            Dialect::GRBL.parse(&line),
            LineEvent::Parameters { name: name.to_string(), value }
        );
    }
}
