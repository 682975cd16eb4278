// Runner property tests
// Work position always equals machine position minus the work offset.

use cncstream_communication::{Dialect, Runner};
use cncstream_core::Axis;
use proptest::prelude::*;

fn coordinate() -> impl Strategy<Value = f64> {
    (-500_000i64..500_000).prop_map(|thousandths| thousandths as f64 / 1000.0)
}

fn triple() -> impl Strategy<Value = [f64; 3]> {
    [coordinate(), coordinate(), coordinate()]
}

fn csv(values: &[f64; 3]) -> String {
    values
        .iter()
        .map(|v| format!("{:.3}", v))
        .collect::<Vec<_>>()
        .join(",")
}

fn assert_consistent(runner: &Runner) {
    let status = &runner.state().status;
    for axis in [Axis::X, Axis::Y, Axis::Z] {
        let m = status.mpos.value(axis).unwrap();
        let w = status.wpos.value(axis).unwrap();
        let o = status.wco.value(axis).unwrap();
        assert!((w - (m - o)).abs() < 1e-6, "{}: {} != {} - {}", axis, w, m, o);
    }
}

proptest! {
    #[test]
    fn prop_wpos_from_mpos_and_offset(mpos in triple(), wco in triple()) {
        let mut runner = Runner::new();
        let line = format!("<Idle|MPos:{}|FS:0,0|WCO:{}>", csv(&mpos), csv(&wco));
        runner.apply(&Dialect::GRBL.parse(&line));
        assert_consistent(&runner);
    }

    #[test]
    fn prop_offset_survives_reports_without_it(
        wco in triple(),
        moves in prop::collection::vec(triple(), 1..8),
    ) {
        let mut runner = Runner::new();
        runner.apply(&Dialect::GRBL.parse(&format!(
            "<Idle|MPos:0.000,0.000,0.000|FS:0,0|WCO:{}>",
            csv(&wco)
        )));
        for mpos in &moves {
            runner.apply(&Dialect::GRBL.parse(&format!("<Run|MPos:{}|FS:100,0>", csv(mpos))));
            assert_consistent(&runner);
        }
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let expected = wco[axis as usize];
            let actual = runner.state().status.wco.value(axis).unwrap();
            prop_assert!((actual - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn prop_mpos_from_wpos_and_offset(wpos in triple(), wco in triple()) {
        let mut runner = Runner::new();
        let line = format!("<Idle|WPos:{}|FS:0,0|WCO:{}>", csv(&wpos), csv(&wco));
        runner.apply(&Dialect::GRBL.parse(&line));
        assert_consistent(&runner);
    }
}
