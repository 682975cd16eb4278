//! Acknowledgement ledger
//!
//! Every buffered line written to the firmware is recorded here in write
//! order. The firmware acknowledges lines strictly in order, so each `ok` or
//! `error` belongs to the oldest entry.

use std::collections::VecDeque;

/// Who wrote a buffered line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOrigin {
    Sender,
    Feeder,
    /// Raw `write` from a subscriber
    Client,
    /// Controller-issued line (`$H`, `$X`, init commands)
    Server,
    /// Poll for the parser state (`$G`)
    ParserStateQuery,
    /// Written by the sender before it was rewound; the acknowledgement is dropped
    Orphaned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub origin: AckOrigin,
    /// Bytes including the line terminator
    pub length: usize,
    pub line: String,
}

#[derive(Debug, Default)]
pub struct AckLedger {
    entries: VecDeque<LedgerEntry>,
}

impl AckLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, origin: AckOrigin, line: &str) {
        self.entries.push_back(LedgerEntry {
            origin,
            length: line.len() + 1,
            line: line.to_string(),
        });
    }

    /// Entry acknowledged by the next `ok`/`error`
    pub fn pop(&mut self) -> Option<LedgerEntry> {
        self.entries.pop_front()
    }

    /// Bytes occupied in the firmware buffer by lines the sender does not track
    pub fn reserved_bytes(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.origin != AckOrigin::Sender)
            .map(|e| e.length)
            .sum()
    }

    /// Detach in-flight sender lines after a rewind. They still occupy the
    /// firmware buffer until acknowledged.
    pub fn orphan_sender(&mut self) {
        for entry in self.entries.iter_mut().filter(|e| e.origin == AckOrigin::Sender) {
            entry.origin = AckOrigin::Orphaned;
        }
    }

    /// Firmware buffer was flushed (soft reset or restart)
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            tracing::debug!("Dropping {} unacknowledged lines", self.entries.len());
        }
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_in_order_and_reserves_foreign_bytes() {
        let mut ledger = AckLedger::new();
        ledger.push(AckOrigin::Sender, "G1 X1");
        ledger.push(AckOrigin::ParserStateQuery, "$G");
        ledger.push(AckOrigin::Feeder, "G0 Z5");
        assert_eq!(ledger.reserved_bytes(), 3 + 6);

        assert_eq!(ledger.pop().unwrap().origin, AckOrigin::Sender);
        assert_eq!(ledger.pop().unwrap().origin, AckOrigin::ParserStateQuery);
        assert_eq!(ledger.len(), 1);
        ledger.clear();
        assert!(ledger.pop().is_none());
    }

    #[test]
    fn test_orphaned_lines_stay_reserved() {
        let mut ledger = AckLedger::new();
        ledger.push(AckOrigin::Sender, "G1 X1");
        assert_eq!(ledger.reserved_bytes(), 0);
        ledger.orphan_sender();
        assert_eq!(ledger.reserved_bytes(), 6);
        assert_eq!(ledger.pop().unwrap().origin, AckOrigin::Orphaned);
    }
}
