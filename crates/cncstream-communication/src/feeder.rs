//! Feeder
//!
//! Queue of interactive lines (typed G-code, jogs, macros) that runs
//! independently of any loaded program. One line is written at a time; the
//! next is taken only after the previous one is acknowledged.
//!
//! Writing is two-step: [`Feeder::prepare`] processes the next line and
//! parks it, [`Feeder::commit`] marks it written. A line whose write fails is
//! never committed and is offered again by the next `prepare`.

use crate::pipeline::{Environment, Pipeline};
use cncstream_core::{Context, FeederStatus, HoldReason};
use cncstream_settings::ToolChangePolicy;
use std::collections::VecDeque;

/// A queued line with the context it was fed with
#[derive(Debug, Clone, PartialEq)]
pub struct FeederEntry {
    pub line: String,
    pub context: Context,
}

/// A processed line ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct FeederLine {
    pub line: String,
    /// Hold placed on the feeder by this line
    pub hold: Option<HoldReason>,
    pub tool_change: bool,
}

#[derive(Debug, Default)]
pub struct Feeder {
    queue: VecDeque<FeederEntry>,
    /// Processed line waiting for a successful write
    ready: Option<FeederLine>,
    pending: bool,
    hold: bool,
    hold_reason: Option<HoldReason>,
    pipeline: Pipeline,
}

impl Feeder {
    pub fn new(policy: ToolChangePolicy) -> Self {
        Self {
            pipeline: Pipeline::new(policy),
            ..Default::default()
        }
    }

    pub fn set_tool_change_policy(&mut self, policy: ToolChangePolicy) {
        self.pipeline.set_policy(policy);
    }

    /// Queue lines; each entry keeps its own copy of `context`
    pub fn feed<I, S>(&mut self, lines: I, context: &Context)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queue.extend(lines.into_iter().map(|line| FeederEntry {
            line: line.into(),
            context: context.clone(),
        }));
    }

    /// Process queued lines up to the next one to write, without taking it
    pub fn prepare(&mut self, env: &mut dyn Environment) -> Option<&FeederLine> {
        if self.hold || self.pending {
            return None;
        }

        if self.ready.is_none() {
            while let Some(entry) = self.queue.pop_front() {
                let processed = self.pipeline.process(&entry.line, &entry.context, env);
                if let Some(line) = processed.line {
                    self.ready = Some(FeederLine {
                        line,
                        hold: processed.hold,
                        tool_change: processed.tool_change,
                    });
                    break;
                }
            }
        }
        self.ready.as_ref()
    }

    /// Mark the prepared line as written
    pub fn commit(&mut self) -> Option<FeederLine> {
        let line = self.ready.take()?;
        self.pending = true;
        if let Some(reason) = &line.hold {
            self.hold(reason.clone());
        }
        Some(line)
    }

    /// Take the next line to write, if the feeder may write now
    pub fn next(&mut self, env: &mut dyn Environment) -> Option<FeederLine> {
        self.prepare(env)?;
        self.commit()
    }

    /// Acknowledge the pending line; releases a `%wait` hold
    pub fn ack(&mut self) {
        self.pending = false;
        if matches!(self.hold_reason, Some(HoldReason::Wait { .. })) {
            self.unhold();
        }
    }

    pub fn hold(&mut self, reason: HoldReason) {
        tracing::debug!("Feeder hold: {}", reason.message());
        self.hold = true;
        self.hold_reason = Some(reason);
    }

    pub fn unhold(&mut self) {
        self.hold = false;
        self.hold_reason = None;
    }

    /// Drop lines not yet written and any hold; a line in flight stays pending
    pub fn discard(&mut self) {
        self.queue.clear();
        self.ready = None;
        self.pipeline.reset();
        self.unhold();
    }

    /// Drop queued lines and clear hold and pending flags
    pub fn reset(&mut self) {
        self.discard();
        self.pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn is_held(&self) -> bool {
        self.hold
    }

    pub fn hold_reason(&self) -> Option<&HoldReason> {
        self.hold_reason.as_ref()
    }

    /// Text of the next line to write: the prepared line, else the raw queued one
    pub fn front(&self) -> Option<&str> {
        match &self.ready {
            Some(ready) => Some(ready.line.as_str()),
            None => self.queue.front().map(|entry| entry.line.as_str()),
        }
    }

    /// Lines not yet written
    pub fn queue_len(&self) -> usize {
        self.queue.len() + usize::from(self.ready.is_some())
    }

    /// Nothing left to write and nothing awaiting acknowledgement
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.ready.is_none() && !self.pending
    }

    pub fn status(&self) -> FeederStatus {
        FeederStatus {
            hold: self.hold,
            hold_reason: self.hold_reason.clone(),
            queue: self.queue_len(),
            pending: self.pending,
        }
    }
}
