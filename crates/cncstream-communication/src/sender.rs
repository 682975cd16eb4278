//! Sender
//!
//! Streams a loaded program using character-counting flow control: the sum
//! of the lengths of written but unacknowledged lines never exceeds
//! `buffer_size`.
//!
//! ```text
//! Empty -> Loaded -> Sending <-> Holding -> Finished -> (rewind) -> Loaded
//! ```

use crate::pipeline::{Environment, Pipeline, Processed};
use chrono::{DateTime, Utc};
use cncstream_core::{Context, GcodeError, HoldReason, SenderState, SenderStatus};
use cncstream_settings::{StreamingProtocol, ToolChangePolicy};
use std::collections::VecDeque;

/// Admission limit used before the firmware reports its receive buffer
pub const DEFAULT_BUFFER_SIZE: usize = 120;

/// Lines admitted by one call to [`Sender::next`]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SenderBatch {
    pub lines: Vec<String>,
    /// Hold placed by the last admitted line, or by an oversized line
    pub hold: Option<HoldReason>,
    pub tool_change: bool,
}

/// A written line awaiting its acknowledgement
#[derive(Debug, Clone, Copy)]
struct InFlight {
    length: usize,
    /// Acknowledgement releases a `%wait` hold
    releases_wait: bool,
}

/// A processed line that did not fit yet
#[derive(Debug, Clone)]
struct Waiting {
    line: String,
    hold: Option<HoldReason>,
    tool_change: bool,
}

#[derive(Debug)]
pub struct Sender {
    protocol: StreamingProtocol,
    name: String,
    lines: Vec<String>,
    context: Context,
    size: usize,
    sent: usize,
    received: usize,
    hold: bool,
    hold_reason: Option<HoldReason>,
    buffer_size: usize,
    data_length: usize,
    in_flight: VecDeque<InFlight>,
    waiting: Option<Waiting>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    pipeline: Pipeline,
}

impl Default for Sender {
    fn default() -> Self {
        Self::new(StreamingProtocol::default(), DEFAULT_BUFFER_SIZE)
    }
}

impl Sender {
    pub fn new(protocol: StreamingProtocol, buffer_size: usize) -> Self {
        Self {
            protocol,
            name: String::new(),
            lines: Vec::new(),
            context: Context::new(),
            size: 0,
            sent: 0,
            received: 0,
            hold: false,
            hold_reason: None,
            buffer_size,
            data_length: 0,
            in_flight: VecDeque::new(),
            waiting: None,
            started_at: None,
            finished_at: None,
            pipeline: Pipeline::default(),
        }
    }

    pub fn set_tool_change_policy(&mut self, policy: ToolChangePolicy) {
        self.pipeline.set_policy(policy);
    }

    pub fn protocol(&self) -> StreamingProtocol {
        self.protocol
    }

    /// Load a program, replacing any previous one
    pub fn load(&mut self, name: &str, text: &str, context: Context) -> Result<(), GcodeError> {
        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        if lines.is_empty() {
            return Err(GcodeError::EmptyProgram {
                name: name.to_string(),
            });
        }

        self.name = name.to_string();
        self.size = text.len();
        self.lines = lines;
        self.context = context;
        self.rewind();
        tracing::info!(
            "Loaded program '{}': {} lines, {} bytes",
            self.name,
            self.lines.len(),
            self.size
        );
        Ok(())
    }

    pub fn unload(&mut self) {
        self.name.clear();
        self.lines.clear();
        self.size = 0;
        self.context = Context::new();
        self.rewind();
    }

    /// Back to the first line; counters, holds and in-flight bookkeeping are cleared
    pub fn rewind(&mut self) {
        self.sent = 0;
        self.received = 0;
        self.data_length = 0;
        self.in_flight.clear();
        self.waiting = None;
        self.hold = false;
        self.hold_reason = None;
        self.started_at = None;
        self.finished_at = None;
        self.pipeline.reset();
    }

    pub fn hold(&mut self, reason: HoldReason) {
        tracing::debug!("Sender hold: {}", reason.message());
        self.hold = true;
        self.hold_reason = Some(reason);
    }

    pub fn unhold(&mut self) {
        self.hold = false;
        self.hold_reason = None;
    }

    /// Next line that fits the buffer, processed but not yet counted.
    ///
    /// `reserved` is the number of bytes other writers currently occupy in
    /// the firmware buffer. Returns `Err` with the hold it placed when the
    /// line can never fit. The line stays parked until [`Sender::commit`].
    pub fn candidate(
        &mut self,
        env: &mut dyn Environment,
        reserved: usize,
    ) -> Result<Option<String>, HoldReason> {
        if self.lines.is_empty() || self.hold {
            return Ok(None);
        }

        if self.waiting.is_none() {
            loop {
                let Some(raw) = self.lines.get(self.sent).cloned() else {
                    self.check_finished();
                    return Ok(None);
                };
                let Processed {
                    line,
                    hold,
                    tool_change,
                } = self.pipeline.process(&raw, &self.context, env);
                match line {
                    Some(line) => {
                        self.waiting = Some(Waiting {
                            line,
                            hold,
                            tool_change,
                        });
                        break;
                    }
                    None => {
                        // Nothing to write: count it as sent and acknowledged
                        self.sent += 1;
                        self.received += 1;
                    }
                }
            }
        }

        let Some(line) = self.waiting.as_ref().map(|w| w.line.clone()) else {
            return Ok(None);
        };
        let length = line.len() + 1;
        if self.protocol == StreamingProtocol::CharCounting && length > self.buffer_size {
            let reason = HoldReason::Error {
                code: None,
                message: format!(
                    "Line {} is {} bytes, larger than the {} byte buffer",
                    self.sent + 1,
                    length,
                    self.buffer_size
                ),
            };
            self.hold(reason.clone());
            return Err(reason);
        }

        let admit = match self.protocol {
            StreamingProtocol::CharCounting => {
                self.data_length + reserved + length <= self.buffer_size
            }
            StreamingProtocol::SendResponse => self.in_flight.is_empty() && reserved == 0,
        };
        Ok(admit.then_some(line))
    }

    /// Count the candidate as written. Returns the hold it places and whether
    /// it requested a tool change.
    pub fn commit(&mut self) -> Option<(HoldReason, bool)> {
        let candidate = self.waiting.take()?;
        if self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        let length = candidate.line.len() + 1;
        self.sent += 1;
        self.data_length += length;
        self.in_flight.push_back(InFlight {
            length,
            releases_wait: matches!(candidate.hold, Some(HoldReason::Wait { .. })),
        });
        tracing::debug!(
            sent = self.sent,
            received = self.received,
            data_length = self.data_length,
            "Sender admitted '{}'",
            candidate.line
        );

        let reason = candidate.hold?;
        self.hold(reason.clone());
        Some((reason, candidate.tool_change))
    }

    /// Admit and commit as many lines as the buffer allows
    pub fn next(&mut self, env: &mut dyn Environment, reserved: usize) -> SenderBatch {
        let mut batch = SenderBatch::default();
        loop {
            match self.candidate(env, reserved) {
                Ok(Some(line)) => batch.lines.push(line),
                Ok(None) => break,
                Err(reason) => {
                    batch.hold = Some(reason);
                    break;
                }
            }
            if let Some((reason, tool_change)) = self.commit() {
                batch.hold = Some(reason);
                batch.tool_change = tool_change;
                break;
            }
        }
        batch
    }

    /// Account for one acknowledged line. Returns false when nothing was in flight.
    pub fn ack(&mut self) -> bool {
        let Some(entry) = self.in_flight.pop_front() else {
            tracing::debug!("Sender acknowledgement with nothing in flight");
            return false;
        };
        self.data_length = self.data_length.saturating_sub(entry.length);
        self.received += 1;
        if entry.releases_wait && matches!(self.hold_reason, Some(HoldReason::Wait { .. })) {
            self.unhold();
        }
        self.check_finished();
        true
    }

    fn check_finished(&mut self) {
        if self.finished_at.is_none() && !self.lines.is_empty() && self.received >= self.lines.len()
        {
            self.finished_at = Some(Utc::now());
            tracing::info!("Program '{}' fully acknowledged", self.name);
        }
    }

    /// Widen the admission limit; never narrows it
    pub fn raise_buffer_size(&mut self, size: usize) -> bool {
        if size > self.buffer_size {
            tracing::info!(
                "Sender buffer size raised from {} to {} bytes",
                self.buffer_size,
                size
            );
            self.buffer_size = size;
            true
        } else {
            false
        }
    }

    pub fn state(&self) -> SenderState {
        if self.lines.is_empty() {
            SenderState::Empty
        } else if self.finished_at.is_some() {
            SenderState::Finished
        } else if self.hold {
            SenderState::Holding
        } else if self.started_at.is_some() {
            SenderState::Sending
        } else {
            SenderState::Loaded
        }
    }

    pub fn is_loaded(&self) -> bool {
        !self.lines.is_empty()
    }

    pub fn is_held(&self) -> bool {
        self.hold
    }

    pub fn hold_reason(&self) -> Option<&HoldReason> {
        self.hold_reason.as_ref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn total(&self) -> usize {
        self.lines.len()
    }

    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn data_length(&self) -> usize {
        self.data_length
    }

    /// Lines written and still awaiting acknowledgement
    pub fn outstanding(&self) -> usize {
        self.in_flight.len()
    }

    pub fn status(&self) -> SenderStatus {
        SenderStatus {
            state: self.state(),
            name: self.name.clone(),
            size: self.size,
            total: self.lines.len(),
            sent: self.sent,
            received: self.received,
            hold: self.hold,
            hold_reason: self.hold_reason.clone(),
            buffer_size: self.buffer_size,
            data_length: self.data_length,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}
