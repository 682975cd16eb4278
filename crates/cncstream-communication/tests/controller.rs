// Controller scenarios
// Drives a controller over the in-memory transport with an explicit clock.

use cncstream_communication::{Controller, MockTransport};
use cncstream_core::{
    ControllerError, ControllerEvent, EventFilter, HoldReason, SenderState, Value, WorkflowState,
    WriteSource,
};
use cncstream_settings::{Config, StreamingProtocol, ToolChangePolicy};
use serde_json::{json, Value as Json};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;

const BANNER: &str = "Grbl 1.1h ['$' for help]";
const IDLE: &str = "<Idle|MPos:0.000,0.000,0.000|FS:0,0>";

struct Rig {
    controller: Controller<MockTransport>,
    transport: MockTransport,
    events: UnboundedReceiver<ControllerEvent>,
    now: Instant,
}

impl Rig {
    fn new(config: Config) -> Self {
        let transport = MockTransport::new("/dev/ttyMOCK");
        let mut controller = Controller::new(transport.clone(), config);
        let (_, events) = controller.attach(EventFilter::All);
        let now = Instant::now();
        controller.open(now);
        controller.handle_line(BANNER, now);
        let mut rig = Self {
            controller,
            transport,
            events,
            now,
        };
        rig.drain();
        rig
    }

    fn grbl() -> Self {
        Self::new(Config::default())
    }

    fn line(&mut self, line: &str) {
        self.controller.handle_line(line, self.now);
    }

    fn ok(&mut self, times: usize) {
        for _ in 0..times {
            self.line("ok");
        }
    }

    fn tick(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.controller.tick(self.now);
    }

    fn command(&mut self, verb: &str, args: Json) -> Result<(), ControllerError> {
        self.controller.submit(verb, &args, self.now)
    }

    fn drain(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    fn serial_reads(&mut self) -> Vec<String> {
        self.drain()
            .into_iter()
            .filter_map(|event| match event {
                ControllerEvent::SerialRead { line } => Some(line),
                _ => None,
            })
            .collect()
    }
}

fn program(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("G1 X{} F100", i))
        .collect::<Vec<_>>()
        .join("\n")
}

fn drain(rx: &mut UnboundedReceiver<ControllerEvent>) -> Vec<ControllerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[test]
fn test_program_finishes_after_idle_debounce() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["ten.nc", program(10)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    assert_eq!(rig.transport.lines().len(), 10);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);

    rig.ok(10);
    assert_eq!(rig.controller.sender().state(), SenderState::Finished);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);

    rig.line(IDLE);
    rig.tick(200);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);

    rig.tick(400);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Idle);
    assert_eq!(rig.controller.sender().state(), SenderState::Loaded);
    assert!(rig.drain().contains(&ControllerEvent::WorkflowState {
        state: WorkflowState::Idle
    }));
}

#[test]
fn test_finish_waits_while_machine_moves() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["two.nc", program(2)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    rig.ok(2);

    rig.line("<Run|MPos:1.000,0.000,0.000|FS:100,0>");
    rig.tick(1000);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);

    rig.line("<Idle|MPos:2.000,0.000,0.000|FS:0,0>");
    rig.tick(300);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);
    rig.tick(300);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Idle);
}

#[test]
fn test_late_subscriber_receives_snapshot() {
    let mut rig = Rig::grbl();
    let (_, mut early) = rig.controller.attach(EventFilter::All);
    rig.command("gcode:load", json!(["a.nc", "G0 X1\nG0 X2"])).unwrap();

    let (_, mut late) = rig.controller.attach(EventFilter::All);
    let snapshot = drain(&mut late);
    assert!(snapshot.iter().any(|event| matches!(
        event,
        ControllerEvent::SenderStatus(status) if status.state == SenderState::Loaded && status.total == 2
    )));
    assert!(snapshot
        .iter()
        .any(|event| matches!(event, ControllerEvent::ControllerState { .. })));
    assert!(!snapshot
        .iter()
        .any(|event| matches!(event, ControllerEvent::ProgramLoaded { .. })));

    assert!(drain(&mut early)
        .iter()
        .any(|event| matches!(event, ControllerEvent::ProgramLoaded { total: 2, .. })));

    rig.line("[MSG:Caution: Unlocked]");
    let message = ControllerEvent::SerialRead {
        line: "[MSG:Caution: Unlocked]".to_string(),
    };
    assert!(drain(&mut early).contains(&message));
    assert!(drain(&mut late).contains(&message));
}

#[test]
fn test_streaming_error_pauses_workflow() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["three.nc", program(3)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    rig.drain();

    rig.line("error:9");
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Paused);
    assert!(matches!(
        rig.controller.sender().hold_reason(),
        Some(HoldReason::Error { code: Some(9), .. })
    ));

    let reads = rig.serial_reads();
    assert!(reads.contains(&"error:9 (G-code locked out during alarm or jog state.)".to_string()));
    assert!(reads.contains(&"> G1 X0 F100 (line=1)".to_string()));
}

#[test]
fn test_streaming_error_ignored_when_configured() {
    let mut config = Config::default();
    config.controller.ignore_errors = true;
    let mut rig = Rig::new(config);
    rig.command("gcode:load", json!(["three.nc", program(3)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();

    rig.line("error:9");
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);
    rig.ok(2);
    assert_eq!(rig.controller.sender().state(), SenderState::Finished);
}

#[test]
fn test_wait_directive_holds_until_dwell_is_acknowledged() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["wait.nc", "G0 X1\n%wait 2\nG0 X2"]))
        .unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    assert_eq!(rig.transport.lines(), vec!["G0 X1", "G4 P2.000"]);

    rig.ok(1);
    assert_eq!(rig.transport.lines().len(), 2);
    rig.ok(1);
    assert_eq!(rig.transport.lines(), vec!["G0 X1", "G4 P2.000", "G0 X2"]);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);
}

#[test]
fn test_stop_and_start_rewinds() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["five.nc", program(5)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    rig.ok(2);
    assert_eq!(rig.controller.sender().received(), 2);

    rig.command("gcode:stop", Json::Null).unwrap();
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Idle);
    assert_eq!(rig.controller.sender().sent(), 0);
    assert_eq!(rig.controller.sender().state(), SenderState::Loaded);

    rig.command("gcode:start", Json::Null).unwrap();
    let first = rig
        .transport
        .lines()
        .iter()
        .filter(|line| *line == "G1 X0 F100")
        .count();
    assert_eq!(first, 2);

    // Acknowledgements for the abandoned lines do not count
    rig.ok(3);
    assert_eq!(rig.controller.sender().received(), 0);
    rig.ok(5);
    assert_eq!(rig.controller.sender().state(), SenderState::Finished);
}

#[test]
fn test_alarm_refuses_buffered_writes() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["a.nc", "G0 X1"])).unwrap();
    rig.line("ALARM:1");
    assert!(rig.controller.runner().is_alarm());

    let result = rig.command("gcode", json!("G0 X1"));
    assert_eq!(
        result,
        Err(ControllerError::AlarmLock {
            command: "G0 X1".to_string()
        })
    );
    assert!(rig
        .drain()
        .iter()
        .any(|event| matches!(event, ControllerEvent::Error { .. })));
    assert_eq!(rig.controller.feeder().queue_len(), 0);
    assert!(matches!(
        rig.command("gcode:start", Json::Null),
        Err(ControllerError::AlarmLock { .. })
    ));
    // A batch with an unlock is refused as a whole
    assert!(rig.command("gcode", json!("$X\nG0 X2")).is_err());
    assert_eq!(rig.controller.feeder().queue_len(), 0);

    // Raw writes and unlock are still accepted
    rig.command("write", json!("$$")).unwrap();
    rig.command("unlock", Json::Null).unwrap();
    assert_eq!(rig.transport.lines(), vec!["$$", "$X"]);

    // The refused move never runs once the alarm clears
    rig.ok(2);
    rig.line(IDLE);
    assert_eq!(rig.transport.lines(), vec!["$$", "$X"]);

    rig.command("gcode", json!("G0 X1")).unwrap();
    assert_eq!(rig.transport.lines(), vec!["$$", "$X", "G0 X1"]);
}

#[test]
fn test_alarm_drops_queued_feeder_lines() {
    let mut rig = Rig::grbl();
    rig.command("gcode", json!("G0 X1\nG0 X2")).unwrap();
    assert_eq!(rig.transport.lines(), vec!["G0 X1"]);

    rig.line("ALARM:1");
    assert_eq!(rig.controller.feeder().queue_len(), 0);
    assert!(rig.controller.feeder().is_pending());

    rig.command("gcode", json!("$X")).unwrap();
    rig.ok(1);
    assert_eq!(rig.transport.lines(), vec!["G0 X1", "$X"]);
    rig.ok(1);
    rig.line(IDLE);
    assert_eq!(rig.transport.lines(), vec!["G0 X1", "$X"]);
    assert!(rig.controller.feeder().is_drained());
}

#[test]
fn test_failed_feeder_write_keeps_line_queued() {
    let mut rig = Rig::grbl();
    rig.transport.fail_writes(true);
    rig.command("gcode", json!("G0 X1\nG0 X2")).unwrap();

    assert!(rig.transport.lines().is_empty());
    assert!(!rig.controller.feeder().is_pending());
    assert_eq!(rig.controller.feeder().queue_len(), 2);
    assert!(rig.controller.ledger().is_empty());
    assert!(rig
        .drain()
        .iter()
        .any(|event| matches!(event, ControllerEvent::ConnectionError { .. })));

    rig.transport.fail_writes(false);
    rig.command("gcode", json!("G0 X3")).unwrap();
    assert_eq!(rig.transport.lines(), vec!["G0 X1"]);
    rig.ok(2);
    assert_eq!(rig.transport.lines(), vec!["G0 X1", "G0 X2", "G0 X3"]);
}

#[test]
fn test_failed_program_write_counts_nothing() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["three.nc", program(3)])).unwrap();
    rig.transport.fail_writes(true);
    rig.command("gcode:start", Json::Null).unwrap();

    let sender = rig.controller.sender();
    assert_eq!((sender.sent(), sender.data_length(), sender.outstanding()), (0, 0, 0));
    assert!(rig.controller.ledger().is_empty());
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);

    rig.transport.fail_writes(false);
    rig.line(IDLE);
    assert_eq!(rig.transport.lines().len(), 3);
    let sender = rig.controller.sender();
    assert_eq!((sender.sent(), sender.outstanding()), (3, 3));
    rig.ok(3);
    assert_eq!(rig.controller.sender().state(), SenderState::Finished);
}

#[test]
fn test_client_lines_wait_for_buffer_space_while_running() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["long.nc", program(20)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    // Ten 11-byte lines fill 110 of 120 bytes
    assert_eq!(rig.transport.lines().len(), 10);

    rig.command("write", json!("G0 X10 Y10 Z10 F500")).unwrap();
    assert_eq!(rig.transport.lines().len(), 10);

    rig.ok(1);
    let lines = rig.transport.lines();
    assert_eq!(lines.len(), 11);
    assert_eq!(lines[10], "G0 X10 Y10 Z10 F500");
    assert!(rig.drain().contains(&ControllerEvent::SerialWrite {
        data: "G0 X10 Y10 Z10 F500".to_string(),
        source: WriteSource::Client,
    }));
}

#[test]
fn test_buffer_size_tuned_from_reported_rx() {
    let mut rig = Rig::grbl();
    assert_eq!(rig.controller.sender().buffer_size(), 120);

    rig.line("<Idle|MPos:0.000,0.000,0.000|Bf:15,1023|FS:0,0>");
    assert_eq!(rig.controller.sender().buffer_size(), 1015);

    // Never narrowed
    rig.line("<Idle|MPos:0.000,0.000,0.000|Bf:15,127|FS:0,0>");
    assert_eq!(rig.controller.sender().buffer_size(), 1015);

    // Not while anything is outstanding
    rig.command("gcode", json!("G0 X1")).unwrap();
    rig.line("<Idle|MPos:0.000,0.000,0.000|Bf:15,2047|FS:0,0>");
    assert_eq!(rig.controller.sender().buffer_size(), 1015);
}

#[test]
fn test_buffer_size_not_tuned_for_send_response() {
    let mut config = Config::default();
    config.controller.streaming_protocol = StreamingProtocol::SendResponse;
    let mut rig = Rig::new(config);
    rig.line("<Idle|MPos:0.000,0.000,0.000|Bf:15,1023|FS:0,0>");
    assert_eq!(rig.controller.sender().buffer_size(), 120);
}

#[test]
fn test_feeder_suspended_while_running() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["three.nc", program(3)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();

    rig.command("gcode", json!("G0 Z5")).unwrap();
    assert!(!rig.transport.lines().contains(&"G0 Z5".to_string()));

    rig.command("gcode:stop", Json::Null).unwrap();
    assert_eq!(rig.transport.lines().last().map(String::as_str), Some("G0 Z5"));
}

#[test]
fn test_program_pause_and_resume() {
    let mut rig = Rig::grbl();
    rig.command(
        "gcode:load",
        json!(["flip.nc", "%msg Flip the part\nM0\nG0 X1"]),
    )
    .unwrap();
    rig.command("gcode:start", Json::Null).unwrap();

    assert_eq!(rig.transport.lines(), vec!["M0"]);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Paused);
    assert!(rig.drain().contains(&ControllerEvent::Message {
        message: "Flip the part".to_string()
    }));

    rig.command("gcode:resume", Json::Null).unwrap();
    assert_eq!(rig.transport.realtime(), vec![b'~']);
    assert_eq!(rig.transport.lines(), vec!["M0", "G0 X1"]);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);
}

#[test]
fn test_manual_tool_change_runs_through_feeder() {
    let mut config = Config::default();
    config.tool_change.policy = ToolChangePolicy::Manual;
    let mut rig = Rig::new(config);
    rig.line("<Idle|MPos:1.000,2.000,3.000|FS:0,0>");

    rig.command("gcode:load", json!(["tool.nc", "M6 T1\nG0 X1"])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Paused);
    assert_eq!(rig.transport.lines(), vec!["(M6) T1", "G4 P0.500"]);

    // Sender line, then the dwell that opens the sequence
    rig.ok(2);
    assert_eq!(rig.transport.lines().last().map(String::as_str), Some("M5"));
    assert_eq!(
        rig.controller.globals().get("_tc_x").and_then(Value::number),
        Some(1.0)
    );
    assert_eq!(
        rig.controller.globals().get("_tc_units"),
        Some(&Value::Text(String::new()))
    );
}

#[test]
fn test_resume_finishes_tool_change_before_program() {
    let mut config = Config::default();
    config.tool_change.policy = ToolChangePolicy::Manual;
    let mut rig = Rig::new(config);
    rig.line("<Idle|MPos:1.000,2.000,3.000|FS:0,0>");
    rig.command("gcode:load", json!(["tool.nc", "M6 T1\nG0 X1"])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();

    // Acknowledge up to the prompt that asks for the tool
    for _ in 0..20 {
        if rig.transport.lines().last().map(String::as_str) == Some("M0") {
            break;
        }
        rig.ok(1);
    }
    rig.ok(1);
    assert!(rig.controller.feeder().is_held());
    assert!(rig.controller.feeder().queue_len() > 0);
    let written = rig.transport.lines().len();

    // Resume runs the rest of the tool change first; the program stays paused
    rig.command("gcode:resume", Json::Null).unwrap();
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Paused);
    let lines = rig.transport.lines();
    assert_eq!(lines.len(), written + 1);
    assert!(lines[written].starts_with("G53 G0 X"));

    for _ in 0..40 {
        if rig.controller.workflow_state() == WorkflowState::Running {
            break;
        }
        assert!(!rig.transport.lines().contains(&"G0 X1".to_string()));
        rig.ok(1);
    }
    let lines = rig.transport.lines();
    assert!(lines.iter().any(|line| line.starts_with("G38.2")));
    assert_eq!(lines.last().map(String::as_str), Some("G0 X1"));
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Running);
    assert!(rig.controller.feeder().is_drained());
}

#[test]
fn test_status_echo_only_when_requested() {
    let mut rig = Rig::grbl();
    rig.line(IDLE);
    assert!(rig.serial_reads().is_empty());

    rig.command("statusreport", Json::Null).unwrap();
    assert_eq!(rig.transport.realtime(), vec![b'?']);
    rig.line(IDLE);
    assert_eq!(rig.serial_reads(), vec![IDLE.to_string()]);

    rig.line(IDLE);
    assert!(rig.serial_reads().is_empty());
}

#[test]
fn test_polling_keeps_one_query_outstanding() {
    let mut rig = Rig::grbl();
    rig.tick(500);
    let queries = |rig: &Rig| {
        rig.transport
            .realtime()
            .iter()
            .filter(|byte| **byte == b'?')
            .count()
    };
    assert_eq!(queries(&rig), 1);
    assert_eq!(rig.transport.lines(), vec!["$$", "$I", "$G"]);

    rig.tick(250);
    assert_eq!(queries(&rig), 1);

    rig.line(IDLE);
    rig.tick(250);
    assert_eq!(queries(&rig), 2);

    // Poll replies stay off the terminal
    rig.drain();
    rig.ok(2);
    rig.line("[GC:G0 G54 G17 G21 G90 G94 M5 M9 T0 F0 S0]");
    rig.ok(1);
    assert_eq!(rig.serial_reads(), vec!["ok".to_string(), "ok".to_string()]);
    assert_eq!(
        rig.controller.state().parser_state.modal.units.as_deref(),
        Some("G21")
    );
}

#[test]
fn test_jog_goes_through_feeder() {
    let mut rig = Rig::grbl();
    rig.command("jog", json!([{"x": 1.5, "feedrate": 600}])).unwrap();
    assert_eq!(rig.transport.lines(), vec!["$J=G91 G21 X1.5 F600"]);
    assert!(rig.drain().contains(&ControllerEvent::SerialWrite {
        data: "$J=G91 G21 X1.5 F600".to_string(),
        source: WriteSource::Feeder
    }));

    rig.command("jog:cancel", Json::Null).unwrap();
    assert_eq!(rig.transport.realtime(), vec![0x85]);
}

#[test]
fn test_laser_test_sequence() {
    let mut rig = Rig::grbl();
    rig.command("lasertest:on", json!([50, 1000, 1000])).unwrap();
    assert_eq!(rig.transport.lines(), vec!["G1F1"]);
    rig.ok(3);
    assert_eq!(rig.transport.lines(), vec!["G1F1", "M3S500", "G4P1", "M5S0"]);
}

#[test]
fn test_forced_stop_while_running_resets_after_delay() {
    let mut rig = Rig::grbl();
    rig.line("<Run|MPos:0.000,0.000,0.000|FS:500,0>");
    rig.command("gcode:stop", json!([{"force": true}])).unwrap();
    assert_eq!(rig.transport.realtime(), vec![b'!']);

    rig.now += Duration::from_millis(500);
    rig.controller.run_deferred(rig.now);
    assert!(rig.transport.realtime().contains(&0x18));
}

#[test]
fn test_forced_stop_while_idle_resets_immediately() {
    let mut rig = Rig::grbl();
    rig.line(IDLE);
    rig.command("gcode:stop", json!([{"force": true}])).unwrap();
    assert_eq!(rig.transport.realtime(), vec![0x18]);
}

#[test]
fn test_overrides_write_realtime_bytes() {
    let mut rig = Rig::grbl();
    rig.command("feedOverride", json!(11)).unwrap();
    rig.command("spindleOverride", json!(0)).unwrap();
    rig.command("rapidOverride", json!(25)).unwrap();
    assert_eq!(rig.transport.realtime(), vec![0x91, 0x93, 0x99, 0x97]);
}

#[test]
fn test_closed_transport_drops_feed() {
    let mut rig = Rig::grbl();
    rig.transport.disconnect();
    assert!(matches!(
        rig.command("gcode", json!("G0 X1")),
        Err(ControllerError::TransportUnavailable { .. })
    ));
    assert_eq!(rig.controller.feeder().queue_len(), 0);
}

#[test]
fn test_settings_echo_is_annotated() {
    let mut rig = Rig::grbl();
    rig.line("$0=10");
    let events = rig.drain();
    assert!(events.contains(&ControllerEvent::SerialRead {
        line: "$0=10 (Step pulse time, microseconds)".to_string()
    }));
    assert!(events
        .iter()
        .any(|event| matches!(event, ControllerEvent::ControllerSettings { .. })));
}

#[test]
fn test_unknown_command_is_reported() {
    let mut rig = Rig::grbl();
    assert!(matches!(
        rig.command("selfdestruct", Json::Null),
        Err(ControllerError::UnknownCommand { .. })
    ));
    assert!(rig
        .drain()
        .iter()
        .any(|event| matches!(event, ControllerEvent::Error { .. })));
}

#[test]
fn test_macro_run_by_name() {
    let mut config = Config::default();
    config.add_macro("park", "G53 G0 Z-1\nG53 G0 X0 Y0");
    let mut rig = Rig::new(config);

    rig.command("macro:run", json!(["park"])).unwrap();
    assert_eq!(rig.transport.lines(), vec!["G53 G0 Z-1"]);
    rig.ok(1);
    assert_eq!(rig.transport.lines(), vec!["G53 G0 Z-1", "G53 G0 X0 Y0"]);

    assert!(matches!(
        rig.command("macro:run", json!(["missing"])),
        Err(ControllerError::CommandRejected { .. })
    ));
}

#[test]
fn test_restart_during_run_stops_workflow() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["three.nc", program(3)])).unwrap();
    rig.command("gcode:start", Json::Null).unwrap();
    rig.line(BANNER);
    assert_eq!(rig.controller.workflow_state(), WorkflowState::Idle);
    assert!(rig.controller.ledger().is_empty());
}

#[test]
fn test_close_publishes_and_unloads() {
    let mut rig = Rig::grbl();
    rig.command("gcode:load", json!(["a.nc", "G0 X1"])).unwrap();
    rig.controller.close(None);
    assert!(!rig.controller.sender().is_loaded());
    assert!(rig.drain().contains(&ControllerEvent::ConnectionClosed {
        port: "/dev/ttyMOCK".to_string()
    }));
}
