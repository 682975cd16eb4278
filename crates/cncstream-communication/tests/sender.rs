// Sender property tests
// Character counting never overfills the firmware buffer, and the counters
// stay ordered whatever the interleaving of admissions and acknowledgements.

use cncstream_communication::{Environment, Sender};
use cncstream_core::{Context, SenderState, Value};
use cncstream_settings::StreamingProtocol;
use proptest::prelude::*;

#[derive(Default)]
struct Plain {
    globals: Context,
}

impl Environment for Plain {
    fn context(&self, captured: &Context) -> Context {
        captured.merged(&self.globals)
    }

    fn assign(&mut self, values: Vec<(String, Value)>) {
        for (name, value) in values {
            self.globals = std::mem::take(&mut self.globals).with(name, value);
        }
    }
}

fn program(widths: &[usize]) -> String {
    widths
        .iter()
        .map(|width| format!("G1 X{}", "1".repeat(*width)))
        .collect::<Vec<_>>()
        .join("\n")
}

proptest! {
    #[test]
    fn prop_buffer_never_overfilled(
        widths in prop::collection::vec(1usize..50, 1..40),
        buffer_size in 64usize..256,
        reserved in 0usize..8,
        ops in prop::collection::vec(any::<bool>(), 0..200),
    ) {
        let mut sender = Sender::new(StreamingProtocol::CharCounting, buffer_size);
        let mut env = Plain::default();
        sender.load("prop.nc", &program(&widths), Context::new()).unwrap();

        for admit in ops {
            if admit {
                let batch = sender.next(&mut env, reserved);
                prop_assert!(batch.hold.is_none());
            } else {
                sender.ack();
            }
            prop_assert!(sender.data_length() + reserved <= buffer_size || sender.outstanding() == 0);
            prop_assert!(sender.data_length() <= buffer_size);
            prop_assert!(sender.received() <= sender.sent());
            prop_assert!(sender.sent() <= sender.total());
        }
    }

    #[test]
    fn prop_drains_to_finished(
        widths in prop::collection::vec(1usize..50, 1..40),
        buffer_size in 64usize..256,
    ) {
        let mut sender = Sender::new(StreamingProtocol::CharCounting, buffer_size);
        let mut env = Plain::default();
        sender.load("prop.nc", &program(&widths), Context::new()).unwrap();

        let mut rounds = 0;
        while sender.state() != SenderState::Finished {
            sender.next(&mut env, 0);
            prop_assert!(sender.outstanding() > 0);
            while sender.ack() {}
            rounds += 1;
            prop_assert!(rounds <= widths.len());
        }
        prop_assert_eq!(sender.received(), widths.len());
    }

    #[test]
    fn prop_send_response_keeps_one_line_in_flight(
        widths in prop::collection::vec(1usize..50, 1..20),
        ops in prop::collection::vec(any::<bool>(), 0..100),
    ) {
        let mut sender = Sender::new(StreamingProtocol::SendResponse, 120);
        let mut env = Plain::default();
        sender.load("prop.nc", &program(&widths), Context::new()).unwrap();

        for admit in ops {
            if admit {
                sender.next(&mut env, 0);
            } else {
                sender.ack();
            }
            prop_assert!(sender.outstanding() <= 1);
        }
    }
}
