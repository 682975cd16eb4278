//! Substitution environment backed by the machine snapshot
//!
//! Keys available to `[expr]` substitution, layered so that later layers win:
//!
//! 1. the line's captured context
//! 2. user globals, as `name` and `global.name`
//! 3. machine values: `mposx`..`mposc`, `posx`..`posc`, `modal.<group>`,
//!    `tool`, `feedrate`, `spindle`, `prbx`..`prbz`

use crate::pipeline::Environment;
use cncstream_core::{Axis, Context, MachineState, ModalState, Value};

pub(crate) struct MachineEnvironment<'a> {
    pub globals: &'a mut Context,
    pub state: &'a MachineState,
}

impl MachineEnvironment<'_> {
    fn machine_context(&self) -> Context {
        let status = &self.state.status;
        let parser = &self.state.parser_state;
        let mut context = Context::new();

        for axis in Axis::ALL {
            if let Some(value) = status.mpos.value(axis) {
                context = context.with(format!("mpos{}", axis.letter()), value);
            }
            if let Some(value) = status.wpos.value(axis) {
                context = context.with(format!("pos{}", axis.letter()), value);
            }
        }

        // Modal keys always exist so saved state can be restored verbatim
        for group in ModalState::GROUPS {
            let value = parser.modal.group(group).unwrap_or_default();
            context = context.with(format!("modal.{}", group), Value::Text(value));
        }

        context = context
            .with("tool", parser.tool.map(f64::from).unwrap_or(0.0))
            .with("feedrate", parser.feedrate.unwrap_or(0.0))
            .with("spindle", parser.spindle.unwrap_or(0.0));

        if let Some(probe) = self.state.probe() {
            for axis in [Axis::X, Axis::Y, Axis::Z] {
                if let Some(value) = probe.value(axis) {
                    context = context.with(format!("prb{}", axis.letter()), value);
                }
            }
        }
        context
    }
}

impl Environment for MachineEnvironment<'_> {
    fn context(&self, captured: &Context) -> Context {
        captured
            .merged(self.globals)
            .merged(&self.machine_context())
    }

    fn assign(&mut self, values: Vec<(String, Value)>) {
        for (name, value) in values {
            tracing::debug!("Global {} = {}", name, value);
            *self.globals = std::mem::take(self.globals)
                .with(format!("global.{}", name), value.clone())
                .with(name, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cncstream_core::AxisVector;

    #[test]
    fn test_machine_values_win() {
        let mut state = MachineState::default();
        state.status.mpos = AxisVector::parse("1.000,2.000,3.000").unwrap();
        state.status.wpos = AxisVector::parse("0.500,2.000,3.000").unwrap();
        state.parser_state.modal.units = Some("G21".to_string());
        state.parser_state.tool = Some(4);
        state
            .parameters
            .insert("PRB".to_string(), "1.000,2.000,-7.250:1".to_string());

        let mut globals = Context::new().with("posx", 99.0).with("depth", 2.0);
        let env = MachineEnvironment {
            globals: &mut globals,
            state: &state,
        };
        let context = env.context(&Context::new().with("depth", 1.0));

        assert_eq!(context.get("posx").and_then(Value::number), Some(0.5));
        assert_eq!(context.get("mposz").and_then(Value::number), Some(3.0));
        assert_eq!(context.get("depth").and_then(Value::number), Some(2.0));
        assert_eq!(context.get("modal.units"), Some(&Value::Text("G21".to_string())));
        assert_eq!(context.get("modal.wcs"), Some(&Value::Text(String::new())));
        assert_eq!(context.get("tool").and_then(Value::number), Some(4.0));
        assert_eq!(context.get("prbz").and_then(Value::number), Some(-7.25));
    }

    #[test]
    fn test_assign_writes_both_names() {
        let state = MachineState::default();
        let mut globals = Context::new();
        let mut env = MachineEnvironment {
            globals: &mut globals,
            state: &state,
        };
        env.assign(vec![("depth".to_string(), Value::Number(3.0))]);
        assert_eq!(globals.get("depth").and_then(Value::number), Some(3.0));
        assert_eq!(globals.get("global.depth").and_then(Value::number), Some(3.0));
    }
}
