//! In-memory transport
//!
//! Records every write and can be closed from the outside, so controller
//! behaviour can be exercised without hardware.

use super::Transport;
use cncstream_core::ConnectionError;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockState {
    open: bool,
    /// Writes fail while the port still reports open
    failing: bool,
    writes: Vec<Vec<u8>>,
}

/// Cloneable handle; clones share the same recorded writes
#[derive(Debug, Clone)]
pub struct MockTransport {
    port: String,
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            state: Arc::new(Mutex::new(MockState {
                open: true,
                ..Default::default()
            })),
        }
    }

    /// Every write as text, in order
    pub fn writes(&self) -> Vec<String> {
        self.state
            .lock()
            .writes
            .iter()
            .map(|w| String::from_utf8_lossy(w).into_owned())
            .collect()
    }

    /// Buffered lines written, without terminators; realtime bytes are left out
    pub fn lines(&self) -> Vec<String> {
        self.writes()
            .into_iter()
            .filter_map(|w| w.strip_suffix('\n').map(str::to_string))
            .collect()
    }

    /// Raw bytes of single-byte writes
    pub fn realtime(&self) -> Vec<u8> {
        self.state
            .lock()
            .writes
            .iter()
            .filter_map(|w| match w.as_slice() {
                [byte] => Some(*byte),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded writes
    pub fn take_writes(&self) -> Vec<String> {
        let writes = self.writes();
        self.state.lock().writes.clear();
        writes
    }

    /// Make writes fail (or succeed again) without closing the port
    pub fn fail_writes(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Drop the link as if the cable were pulled
    pub fn disconnect(&self) {
        self.state.lock().open = false;
    }
}

impl Transport for MockTransport {
    fn port(&self) -> &str {
        &self.port
    }

    fn is_open(&self) -> bool {
        self.state.lock().open
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        if !state.open {
            return Err(ConnectionError::ConnectionLost {
                reason: format!("{} is closed", self.port),
            });
        }
        if state.failing {
            return Err(ConnectionError::SerialError {
                reason: format!("write to {} failed", self.port),
            });
        }
        state.writes.push(data.to_vec());
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().open = false;
    }
}
