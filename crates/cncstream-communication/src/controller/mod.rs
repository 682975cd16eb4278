//! Controller
//!
//! One controller per open port. It owns the transport, folds firmware lines
//! through the [`Runner`], schedules writes from the [`Feeder`] and the
//! [`Sender`] under the [`Workflow`], and fans events out on its
//! [`ControllerBus`].
//!
//! All methods are synchronous and take the current time; [`driver::spawn`]
//! runs a controller on a tokio task and feeds it lines, commands and timer
//! ticks.
//!
//! ## Scheduling
//!
//! - While the workflow is `Running` only the sender writes. The feeder is
//!   suspended until the workflow pauses or stops.
//! - Buffered lines are recorded in the [`AckLedger`]; every `ok`/`error`
//!   is routed to the writer of the oldest outstanding line.
//! - Bytes occupied by feeder, client and poll lines are reserved out of the
//!   sender's character-counting budget. Raw client lines written during a
//!   program wait until they fit.
//! - Feeder and sender lines are committed only after the transport accepts
//!   them, so a failed write leaves both where they were.

mod driver;
mod environment;
mod ledger;
mod polling;

pub use driver::{spawn, ControllerHandle, ControllerMessage, Subscription};
pub use ledger::{AckLedger, AckOrigin, LedgerEntry};
pub use polling::Polling;

use crate::command::Command;
use crate::feeder::Feeder;
use crate::firmware::grbl::{format_alarm, format_error};
use crate::firmware::{Dialect, LineEvent};
use crate::runner::Runner;
use crate::sender::Sender;
use crate::toolchange::tool_change_program;
use crate::transport::Transport;
use crate::workflow::Workflow;
use cncstream_core::{
    ActiveState, AxisVector, ConnectionError, Context, ControllerBus, ControllerError,
    ControllerEvent, EventFilter, FeederStatus, GcodeError, HoldReason, MachineState, SenderState,
    SenderStatus, SubscriptionId, Value, WorkflowState, WriteSource,
};
use cncstream_settings::{Config, MacroDefinition, StreamingProtocol};
use environment::MachineEnvironment;
use serde_json::Value as Json;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Timer continuations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    /// First `?` after the port opens
    InitialStatusQuery,
    /// Dialect init lines after a startup banner
    InitCommands,
    /// Second half of a forced stop
    SoftReset,
}

/// Manual tool change run through the feeder while the program is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ToolChange {
    Queued,
    /// Resume requested; the program continues once the feeder drains
    Resuming,
}

/// Idle observation while waiting to declare a program finished
#[derive(Debug, Clone, Copy)]
struct FinishWatch {
    since: Instant,
    wpos: AxisVector,
}

/// Last values published, for change detection
#[derive(Debug, Clone)]
struct Published {
    workflow: WorkflowState,
    feeder: FeederStatus,
    sender: SenderStatus,
}

/// Lines accepted while the firmware is in alarm
fn is_unlock(line: &str) -> bool {
    let line = line.trim_start().to_ascii_uppercase();
    line.starts_with("$X") || line.starts_with("$H")
}

/// Printable form of a realtime byte for terminal echo
fn realtime_label(byte: u8) -> String {
    if byte.is_ascii_graphic() {
        (byte as char).to_string()
    } else {
        format!("0x{:02X}", byte)
    }
}

fn rejected(reason: impl ToString) -> ControllerError {
    ControllerError::CommandRejected {
        reason: reason.to_string(),
    }
}

pub struct Controller<T: Transport> {
    transport: T,
    dialect: &'static Dialect,
    config: Config,
    bus: ControllerBus,
    runner: Runner,
    feeder: Feeder,
    sender: Sender,
    workflow: Workflow,
    ledger: AckLedger,
    polling: Polling,
    globals: Context,
    /// Raw lines from subscribers not yet written
    client_lines: VecDeque<String>,
    tool_change: Option<ToolChange>,
    /// Firmware has announced itself (banner or status report)
    ready: bool,
    echo_status: bool,
    echo_parser_state: bool,
    finish: Option<FinishWatch>,
    deferred: Vec<(Instant, Deferred)>,
    published: Published,
}

impl<T: Transport> Controller<T> {
    pub fn new(transport: T, config: Config) -> Self {
        let dialect = Dialect::for_kind(config.connection.dialect);
        let settings = &config.controller;
        let buffer_size = dialect.rx_buffer_size.saturating_sub(settings.buffer_margin);

        let mut sender = Sender::new(settings.streaming_protocol, buffer_size);
        sender.set_tool_change_policy(config.tool_change.policy);
        let feeder = Feeder::new(config.tool_change.policy);
        let polling = Polling::new(
            Duration::from_millis(settings.status_query_tolerance_ms),
            Duration::from_millis(settings.parser_state_tolerance_ms),
        );
        let published = Published {
            workflow: WorkflowState::Idle,
            feeder: feeder.status(),
            sender: sender.status(),
        };

        Self {
            transport,
            dialect,
            config,
            bus: ControllerBus::new(),
            runner: Runner::new(),
            feeder,
            sender,
            workflow: Workflow::new(),
            ledger: AckLedger::new(),
            polling,
            globals: Context::new(),
            client_lines: VecDeque::new(),
            tool_change: None,
            ready: false,
            echo_status: false,
            echo_parser_state: false,
            finish: None,
            deferred: Vec::new(),
            published,
        }
    }

    pub fn dialect(&self) -> &'static Dialect {
        self.dialect
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn bus(&self) -> &ControllerBus {
        &self.bus
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn port(&self) -> &str {
        self.transport.port()
    }

    pub fn runner(&self) -> &Runner {
        &self.runner
    }

    pub fn state(&self) -> &MachineState {
        self.runner.state()
    }

    pub fn feeder(&self) -> &Feeder {
        &self.feeder
    }

    pub fn sender(&self) -> &Sender {
        &self.sender
    }

    pub fn workflow_state(&self) -> WorkflowState {
        self.workflow.state()
    }

    pub fn ledger(&self) -> &AckLedger {
        &self.ledger
    }

    /// User globals set by `%name = expr`
    pub fn globals(&self) -> &Context {
        &self.globals
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Earliest pending timer, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deferred.iter().map(|(at, _)| *at).min()
    }

    // Lifecycle

    /// Announce the connection and schedule the first status query
    pub fn open(&mut self, now: Instant) {
        tracing::info!(
            "Controller opened on {} ({}, {} baud)",
            self.port(),
            self.dialect,
            self.config.connection.baud_rate
        );
        self.publish(ControllerEvent::ConnectionOpened {
            port: self.port().to_string(),
            baud_rate: self.config.connection.baud_rate,
            dialect: self.dialect.name.to_string(),
        });
        let delay = Duration::from_millis(self.config.controller.init_delay_ms);
        self.schedule(now + delay, Deferred::InitialStatusQuery);
    }

    /// Tear down; `reason` is set when the link failed
    pub fn close(&mut self, reason: Option<String>) {
        let port = self.port().to_string();
        if let Some(message) = reason {
            tracing::warn!("Connection to {} lost: {}", port, message);
            self.publish(ControllerEvent::ConnectionError {
                port: port.clone(),
                message,
            });
        }
        self.transport.close();
        self.deferred.clear();
        self.ledger.clear();
        self.polling.reset();
        self.ready = false;
        self.finish = None;
        self.workflow.stop();
        self.feeder.reset();
        self.client_lines.clear();
        self.tool_change = None;
        self.sender.unload();
        self.emit_changes();
        tracing::info!("Controller on {} closed", port);
        self.publish(ControllerEvent::ConnectionClosed { port });
    }

    // Subscribers

    /// Attach a channel subscriber; it immediately receives the current snapshot
    pub fn attach(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (id, rx) = self.bus.channel(filter);
        self.send_snapshot(id);
        (id, rx)
    }

    /// Attach a handler subscriber; it immediately receives the current snapshot
    pub fn attach_handler<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ControllerEvent) + Send + Sync + 'static,
    {
        let id = self.bus.subscribe(filter, handler);
        self.send_snapshot(id);
        id
    }

    pub fn detach(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    fn send_snapshot(&self, id: SubscriptionId) {
        let mut events = Vec::with_capacity(6);
        if self.transport.is_open() {
            events.push(ControllerEvent::ConnectionOpened {
                port: self.port().to_string(),
                baud_rate: self.config.connection.baud_rate,
                dialect: self.dialect.name.to_string(),
            });
        }
        events.push(self.state_event());
        events.push(self.settings_event());
        events.push(ControllerEvent::WorkflowState {
            state: self.workflow.state(),
        });
        events.push(ControllerEvent::SenderStatus(self.sender.status()));
        events.push(ControllerEvent::FeederStatus(self.feeder.status()));
        for event in &events {
            self.bus.send_to(id, event);
        }
    }

    fn publish(&self, event: ControllerEvent) {
        self.bus.publish(&event);
    }

    fn echo(&self, line: impl Into<String>) {
        self.publish(ControllerEvent::SerialRead { line: line.into() });
    }

    fn state_event(&self) -> ControllerEvent {
        ControllerEvent::ControllerState {
            dialect: self.dialect.name.to_string(),
            state: self.runner.state().clone(),
        }
    }

    fn settings_event(&self) -> ControllerEvent {
        ControllerEvent::ControllerSettings {
            dialect: self.dialect.name.to_string(),
            settings: self.runner.settings().clone(),
        }
    }

    /// Publish status events for whatever changed since the last call
    fn emit_changes(&mut self) {
        let workflow = self.workflow.state();
        if workflow != self.published.workflow {
            self.published.workflow = workflow;
            self.publish(ControllerEvent::WorkflowState { state: workflow });
        }
        let sender = self.sender.status();
        if sender != self.published.sender {
            self.published.sender = sender.clone();
            self.publish(ControllerEvent::SenderStatus(sender));
        }
        let feeder = self.feeder.status();
        if feeder != self.published.feeder {
            self.published.feeder = feeder.clone();
            self.publish(ControllerEvent::FeederStatus(feeder));
        }
    }

    // Inbound

    /// Process one line read from the firmware
    pub fn handle_line(&mut self, raw: &str, now: Instant) {
        let line = raw.trim();
        if line.is_empty() {
            return;
        }
        let event = self.dialect.parse(line);
        tracing::trace!("<< {} ({})", line, event.name());
        let update = self.runner.apply(&event);

        match &event {
            LineEvent::Status(report) => {
                self.ready = true;
                self.polling.status_received();
                if std::mem::take(&mut self.echo_status) {
                    self.echo(line);
                }
                if let Some(rx) = report.buffer.and_then(|b| b.rx) {
                    self.auto_tune(rx as usize);
                }
            }
            LineEvent::Ok => self.acknowledge(line, None),
            LineEvent::Error { code, message } => {
                self.acknowledge(line, Some((*code, message.clone())))
            }
            LineEvent::Alarm { code, message } => {
                self.echo(format_alarm(*code, message));
                self.discard_queued("alarm");
                if self.workflow.is_running() {
                    self.pause(HoldReason::Alarm {
                        code: *code,
                        message: message.clone(),
                    });
                }
            }
            LineEvent::ParserState(_) => {
                self.polling.parser_state_received();
                if std::mem::take(&mut self.echo_parser_state) {
                    self.echo(line);
                }
            }
            LineEvent::Settings {
                name,
                value,
                description,
            } => {
                let text = match (description, self.dialect.describe_setting(name)) {
                    (None, Some(descriptor)) => descriptor.annotate(value),
                    _ => line.to_string(),
                };
                self.echo(text);
            }
            LineEvent::Startup { .. } => {
                self.echo(line);
                self.on_startup(now);
            }
            _ => self.echo(line),
        }

        if update.state {
            self.publish(self.state_event());
        }
        if update.settings {
            self.publish(self.settings_event());
        }

        self.check_finished(now);
        self.advance();
        self.emit_changes();
    }

    /// Route an `ok`/`error` to the writer of the oldest outstanding line
    fn acknowledge(&mut self, line: &str, error: Option<(Option<u32>, String)>) {
        let reply = match &error {
            Some((code, message)) => format_error(*code, message),
            None => "ok".to_string(),
        };
        let Some(entry) = self.ledger.pop() else {
            tracing::debug!("'{}' with nothing outstanding", line);
            self.echo(reply);
            return;
        };

        match entry.origin {
            AckOrigin::Sender => {
                self.sender.ack();
                let Some((code, message)) = error else {
                    return;
                };
                self.echo(reply);
                self.echo(format!(
                    "> {} (line={})",
                    entry.line,
                    self.sender.received()
                ));
                if self.config.controller.ignore_errors {
                    tracing::warn!("Ignoring error on '{}': {}", entry.line, message);
                } else {
                    tracing::error!("Program stopped on '{}': {}", entry.line, message);
                    self.pause(HoldReason::Error { code, message });
                }
            }
            AckOrigin::Feeder => {
                self.feeder.ack();
                self.echo(reply);
            }
            AckOrigin::ParserStateQuery => {
                self.polling.parser_state_received();
                if error.is_some() {
                    self.echo(reply);
                }
            }
            AckOrigin::Orphaned => {}
            AckOrigin::Client | AckOrigin::Server => self.echo(reply),
        }
    }

    fn on_startup(&mut self, now: Instant) {
        tracing::info!("{} started on {}", self.dialect, self.port());
        self.ready = true;
        self.ledger.clear();
        self.polling.reset();
        self.deferred.retain(|(_, action)| *action != Deferred::InitCommands);
        if !self.workflow.is_idle() {
            tracing::warn!(
                "Firmware restarted while the workflow was {}, stopping",
                self.workflow.state()
            );
            self.stop_workflow();
        }
        self.feeder.reset();
        self.client_lines.clear();
        let delay = Duration::from_millis(self.config.controller.init_delay_ms);
        self.schedule(now + delay, Deferred::InitCommands);
    }

    /// Widen the sender buffer to what the firmware reports as free
    fn auto_tune(&mut self, rx: usize) {
        if !self.workflow.is_idle()
            || self.sender.protocol() != StreamingProtocol::CharCounting
            || self.sender.outstanding() > 0
            || !self.ledger.is_empty()
        {
            return;
        }
        let size = rx.saturating_sub(self.config.controller.buffer_margin);
        self.sender.raise_buffer_size(size);
    }

    /// Declare the program finished once the machine has settled
    fn check_finished(&mut self, now: Instant) {
        if !self.workflow.is_running() || self.sender.state() != SenderState::Finished {
            self.finish = None;
            return;
        }
        let status = &self.runner.state().status;
        let idle = status.active_state == ActiveState::Idle;
        let wpos = status.wpos;

        let since = match &self.finish {
            Some(watch) if idle && watch.wpos == wpos => watch.since,
            _ => {
                self.finish = Some(FinishWatch { since: now, wpos });
                return;
            }
        };
        let debounce = Duration::from_millis(self.config.controller.finish_debounce_ms);
        if now.saturating_duration_since(since) >= debounce {
            tracing::info!("Program '{}' finished", self.sender.name());
            self.stop_workflow();
        }
    }

    // Timers

    fn schedule(&mut self, at: Instant, action: Deferred) {
        self.deferred.push((at, action));
    }

    /// Run timers that are due
    pub fn run_deferred(&mut self, now: Instant) {
        let (due, later): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|(at, _)| *at <= now);
        self.deferred = later;
        if due.is_empty() {
            return;
        }

        for (_, action) in due {
            tracing::debug!("Running deferred {:?}", action);
            match action {
                Deferred::InitialStatusQuery => {
                    if self.polling.query_status(now) {
                        self.write_realtime(self.dialect.realtime.status_query, None);
                    }
                }
                Deferred::InitCommands => {
                    let commands = self.dialect.init_commands;
                    for command in commands {
                        self.write_line(command, AckOrigin::Server, Some(WriteSource::Server));
                    }
                }
                Deferred::SoftReset => self.soft_reset(),
            }
        }
        self.advance();
        self.emit_changes();
    }

    /// Periodic work: timers, polling and finish detection
    pub fn tick(&mut self, now: Instant) {
        self.run_deferred(now);
        if !self.ready || !self.transport.is_open() {
            return;
        }
        if self.polling.query_status(now) {
            self.write_realtime(self.dialect.realtime.status_query, None);
        }
        // $G is a buffered line; keep it out of a running program's budget
        if !self.workflow.is_running() && self.polling.query_parser_state(now) {
            self.write_line("$G", AckOrigin::ParserStateQuery, None);
        }
        self.check_finished(now);
        self.advance();
        self.emit_changes();
    }

    // Outbound

    fn write_line(&mut self, line: &str, origin: AckOrigin, echo: Option<WriteSource>) -> bool {
        let data = format!("{}\n", line);
        match self.transport.write(data.as_bytes()) {
            Ok(()) => {
                tracing::trace!(">> {}", line);
                self.ledger.push(origin, line);
                if let Some(source) = echo {
                    self.publish(ControllerEvent::SerialWrite {
                        data: line.to_string(),
                        source,
                    });
                }
                true
            }
            Err(e) => {
                self.write_failed(e);
                false
            }
        }
    }

    fn write_realtime(&mut self, byte: u8, echo: Option<WriteSource>) -> bool {
        match self.transport.write(&[byte]) {
            Ok(()) => {
                if let Some(source) = echo {
                    self.publish(ControllerEvent::SerialWrite {
                        data: realtime_label(byte),
                        source,
                    });
                }
                true
            }
            Err(e) => {
                self.write_failed(e);
                false
            }
        }
    }

    fn write_failed(&self, error: ConnectionError) {
        tracing::error!("Write to {} failed: {}", self.port(), error);
        self.publish(ControllerEvent::ConnectionError {
            port: self.port().to_string(),
            message: error.to_string(),
        });
    }

    fn require_open(&self) -> Result<(), ControllerError> {
        if self.transport.is_open() {
            Ok(())
        } else {
            Err(ControllerError::TransportUnavailable {
                port: self.port().to_string(),
            })
        }
    }

    /// Let the sender or the feeder write whatever they may write now
    fn advance(&mut self) {
        if !self.transport.is_open() {
            return;
        }
        self.flush_client_lines();
        if self.workflow.is_running() {
            self.advance_sender();
        }
        if !self.workflow.is_running() {
            self.advance_feeder();
            if self.tool_change == Some(ToolChange::Resuming) && self.feeder.is_drained() {
                tracing::info!("Tool change complete, resuming '{}'", self.sender.name());
                self.resume_program();
                self.advance_sender();
            }
        }
    }

    fn advance_sender(&mut self) {
        if self.runner.is_alarm() {
            return;
        }
        loop {
            let reserved = self.ledger.reserved_bytes();
            let mut env = MachineEnvironment {
                globals: &mut self.globals,
                state: self.runner.state(),
            };
            let line = match self.sender.candidate(&mut env, reserved) {
                Ok(Some(line)) => line,
                Ok(None) => return,
                Err(reason) => {
                    self.pause(reason);
                    return;
                }
            };

            if !self.write_line(&line, AckOrigin::Sender, None) {
                return;
            }
            if let Some((reason, tool_change)) = self.sender.commit() {
                if !matches!(reason, HoldReason::Wait { .. }) {
                    self.pause(reason);
                }
                if tool_change {
                    self.feed_tool_change();
                    self.tool_change = Some(ToolChange::Queued);
                }
                return;
            }
        }
    }

    fn advance_feeder(&mut self) {
        if self.runner.is_alarm() && !self.feeder.front().is_some_and(is_unlock) {
            return;
        }
        let mut env = MachineEnvironment {
            globals: &mut self.globals,
            state: self.runner.state(),
        };
        let Some(line) = self.feeder.prepare(&mut env).map(|next| next.line.clone()) else {
            return;
        };

        if !self.write_line(&line, AckOrigin::Feeder, Some(WriteSource::Feeder)) {
            return;
        }
        let Some(next) = self.feeder.commit() else {
            return;
        };
        if let Some(reason) = &next.hold {
            if !matches!(reason, HoldReason::Wait { .. }) {
                self.publish(ControllerEvent::Message {
                    message: reason.message(),
                });
            }
        }
        if next.tool_change {
            self.feeder.unhold();
            self.feed_tool_change();
        }
    }

    /// Write queued client lines; during a program only what fits the buffer
    fn flush_client_lines(&mut self) {
        while let Some(line) = self.client_lines.front() {
            if self.workflow.is_running() {
                let used = self.ledger.reserved_bytes() + self.sender.data_length();
                if used > 0 && used + line.len() + 1 > self.sender.buffer_size() {
                    tracing::debug!("Client line '{}' waits for buffer space", line);
                    return;
                }
            }
            let line = line.clone();
            if !self.write_line(&line, AckOrigin::Client, Some(WriteSource::Client)) {
                return;
            }
            self.client_lines.pop_front();
        }
    }

    /// Drop lines not yet written by the feeder or a client
    fn discard_queued(&mut self, cause: &str) {
        let dropped = self.feeder.queue_len() + self.client_lines.len();
        if dropped > 0 {
            tracing::warn!("Dropping {} queued lines after {}", dropped, cause);
        }
        self.feeder.discard();
        self.client_lines.clear();
        self.tool_change = None;
    }

    fn feed_tool_change(&mut self) {
        let program = tool_change_program(&self.config.tool_change);
        tracing::info!("Queueing tool change sequence ({} lines)", program.len());
        self.feeder.feed(program, &Context::new());
    }

    /// Pause the workflow and hold the sender with `reason`
    fn pause(&mut self, reason: HoldReason) {
        if self.workflow.pause() {
            tracing::info!("Workflow paused: {}", reason.message());
        }
        if !matches!(reason, HoldReason::User | HoldReason::Wait { .. }) {
            self.publish(ControllerEvent::Message {
                message: reason.message(),
            });
        }
        self.sender.hold(reason);
    }

    /// Continue a paused program; the feeder's queue is dropped
    fn resume_program(&mut self) {
        self.tool_change = None;
        self.workflow.resume();
        self.feeder.reset();
        self.sender.unhold();
    }

    fn stop_workflow(&mut self) {
        self.workflow.stop();
        self.sender.rewind();
        self.ledger.orphan_sender();
        self.finish = None;
        self.tool_change = None;
    }

    /// Soft reset: the firmware drops everything it has buffered
    fn soft_reset(&mut self) {
        if self.write_realtime(self.dialect.realtime.soft_reset, Some(WriteSource::Server)) {
            self.ledger.clear();
            self.feeder.reset();
            self.client_lines.clear();
            self.tool_change = None;
        }
    }

    /// Queue lines on the feeder and start writing them.
    ///
    /// In alarm only unlock and homing lines are accepted; anything else
    /// refuses the whole batch and nothing is queued.
    fn feed(&mut self, lines: Vec<String>, context: &Context) -> Result<(), ControllerError> {
        self.require_open()?;
        if self.runner.is_alarm() {
            let locked = lines
                .iter()
                .map(|line| line.trim())
                .find(|line| !line.is_empty() && !is_unlock(line));
            if let Some(line) = locked {
                return Err(ControllerError::AlarmLock {
                    command: line.to_string(),
                });
            }
        }
        self.feeder.feed(lines, context);
        self.advance();
        Ok(())
    }

    fn load(&mut self, name: &str, text: &str, context: Context) -> Result<(), ControllerError> {
        self.stop_workflow();
        self.sender.load(name, text, context).map_err(rejected)?;
        let status = self.sender.status();
        tracing::info!("Loaded '{}' ({} lines)", status.name, status.total);
        self.publish(ControllerEvent::ProgramLoaded {
            name: status.name,
            size: status.size,
            total: status.total,
        });
        Ok(())
    }

    // Commands

    /// Parse and run a subscriber command
    pub fn submit(&mut self, verb: &str, args: &Json, now: Instant) -> Result<(), ControllerError> {
        match Command::parse(verb, args) {
            Ok(command) => self.execute(command, now),
            Err(e) => {
                tracing::warn!("Rejected command '{}': {}", verb, e);
                self.publish(ControllerEvent::Error {
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Run a command; success is announced as a task event
    pub fn execute(&mut self, command: Command, now: Instant) -> Result<(), ControllerError> {
        let verb = command.verb();
        tracing::debug!("Command {}", verb);
        let result = self.dispatch(command, now);
        match &result {
            Ok(()) => {
                self.publish(ControllerEvent::Task {
                    name: verb.to_string(),
                });
                self.advance();
            }
            Err(e) => {
                tracing::warn!("Command {} failed: {}", verb, e);
                self.publish(ControllerEvent::Error {
                    message: e.to_string(),
                });
            }
        }
        self.emit_changes();
        result
    }

    fn dispatch(&mut self, command: Command, now: Instant) -> Result<(), ControllerError> {
        let realtime = self.dialect.realtime;
        match command {
            Command::Load {
                name,
                text,
                context,
            } => self.load(&name, &text, context)?,
            Command::Unload => {
                self.stop_workflow();
                self.sender.unload();
                self.publish(ControllerEvent::ProgramUnloaded);
            }
            Command::Start => {
                self.require_open()?;
                if !self.sender.is_loaded() {
                    return Err(rejected("no program loaded"));
                }
                if self.runner.is_alarm() {
                    return Err(ControllerError::AlarmLock {
                        command: "gcode:start".to_string(),
                    });
                }
                if !self.workflow.start() {
                    tracing::debug!("Start ignored, workflow is {}", self.workflow.state());
                    return Ok(());
                }
                self.sender.rewind();
                self.feeder.reset();
                self.finish = None;
                self.advance();
            }
            Command::Stop { force } => {
                if force {
                    self.require_open()?;
                    if self.runner.active_state() == ActiveState::Run {
                        self.write_realtime(realtime.feed_hold, Some(WriteSource::Server));
                        let delay = Duration::from_millis(self.config.controller.force_stop_delay_ms);
                        self.schedule(now + delay, Deferred::SoftReset);
                    } else {
                        self.soft_reset();
                    }
                }
                self.stop_workflow();
            }
            Command::Pause => {
                if self.workflow.is_running() {
                    self.require_open()?;
                    self.write_realtime(realtime.feed_hold, Some(WriteSource::Server));
                    self.pause(HoldReason::User);
                }
            }
            Command::Resume => {
                if self.workflow.is_paused() {
                    self.require_open()?;
                    self.write_realtime(realtime.cycle_start, Some(WriteSource::Server));
                    if self.tool_change.is_some() && !self.feeder.is_drained() {
                        // Remaining tool change lines run before the program continues
                        tracing::info!("Finishing tool change before resuming");
                        self.tool_change = Some(ToolChange::Resuming);
                        self.feeder.unhold();
                    } else {
                        self.resume_program();
                    }
                    self.advance();
                }
            }
            Command::FeedHold => {
                self.require_open()?;
                self.write_realtime(realtime.feed_hold, Some(WriteSource::Server));
            }
            Command::CycleStart => {
                self.require_open()?;
                self.write_realtime(realtime.cycle_start, Some(WriteSource::Server));
            }
            Command::StatusReport => {
                self.require_open()?;
                self.echo_status = true;
                self.write_realtime(realtime.status_query, Some(WriteSource::Server));
            }
            Command::Homing => self.server_line("$H")?,
            Command::Sleep => self.server_line("$SLP")?,
            Command::Unlock => self.server_line("$X")?,
            Command::Reset => {
                self.require_open()?;
                self.stop_workflow();
                self.soft_reset();
            }
            Command::FeedOverride(delta) => {
                self.require_open()?;
                for byte in realtime.feed_override.sequence(delta) {
                    self.write_realtime(byte, Some(WriteSource::Server));
                }
            }
            Command::SpindleOverride(delta) => {
                self.require_open()?;
                for byte in realtime.spindle_override.sequence(delta) {
                    self.write_realtime(byte, Some(WriteSource::Server));
                }
            }
            Command::RapidOverride(level) => {
                self.require_open()?;
                self.write_realtime(realtime.rapid(level), Some(WriteSource::Server));
            }
            Command::Gcode { lines, context } => self.feed(lines, &context)?,
            Command::FeederStart => {
                self.require_open()?;
                if !self.workflow.is_running() {
                    self.write_realtime(realtime.cycle_start, Some(WriteSource::Server));
                    self.feeder.unhold();
                    self.advance();
                }
            }
            Command::FeederStop => {
                self.feeder.reset();
                self.tool_change = None;
            }
            Command::Jog {
                distances,
                feedrate,
            } => {
                let axes: Vec<String> = distances
                    .iter()
                    .map(|(axis, distance)| format!("{}{}", axis, Value::Number(*distance)))
                    .collect();
                let line = format!(
                    "$J=G91 G21 {} F{}",
                    axes.join(" "),
                    Value::Number(feedrate)
                );
                self.feed(vec![line], &Context::new())?;
            }
            Command::JogCancel => {
                self.require_open()?;
                self.write_realtime(realtime.jog_cancel, Some(WriteSource::Server));
            }
            Command::MacroRun { id, context } => {
                let content = self.find_macro(&id)?.content.clone();
                self.feed(content.lines().map(str::to_string).collect(), &context)?;
            }
            Command::MacroLoad { id, context } => {
                let definition = self.find_macro(&id)?;
                let (name, content) = (definition.name.clone(), definition.content.clone());
                self.load(&name, &content, context)?;
            }
            Command::ToolChange => {
                let program = tool_change_program(&self.config.tool_change);
                self.feed(program, &Context::new())?;
            }
            Command::LaserTestOn {
                power,
                duration_ms,
                max_spindle,
            } => {
                let mut lines = vec![
                    "G1F1".to_string(),
                    format!("M3S{}", Value::Number(max_spindle * power / 100.0)),
                ];
                if duration_ms > 0 {
                    lines.push(format!("G4P{}", Value::Number(duration_ms as f64 / 1000.0)));
                    lines.push("M5S0".to_string());
                }
                self.feed(lines, &Context::new())?;
            }
            Command::LaserTestOff => self.feed(vec!["M5S0".to_string()], &Context::new())?,
            Command::Write { data } => self.client_write(&data)?,
        }
        Ok(())
    }

    fn find_macro(&self, id: &str) -> Result<&MacroDefinition, ControllerError> {
        self.config
            .find_macro(id)
            .ok_or_else(|| rejected(GcodeError::MacroNotFound { id: id.to_string() }))
    }

    fn server_line(&mut self, line: &str) -> Result<(), ControllerError> {
        self.require_open()?;
        self.write_line(line, AckOrigin::Server, Some(WriteSource::Server));
        Ok(())
    }

    /// Raw write from a subscriber; allowed in any state, queued behind a
    /// running program's buffer use
    fn client_write(&mut self, data: &str) -> Result<(), ControllerError> {
        self.require_open()?;

        let mut chars = data.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if let Ok(byte) = u8::try_from(u32::from(c)) {
                if self.dialect.realtime.is_realtime(&[byte]) {
                    if byte == self.dialect.realtime.status_query {
                        self.echo_status = true;
                    }
                    self.write_realtime(byte, Some(WriteSource::Client));
                    return Ok(());
                }
            }
        }

        for line in data.lines().map(str::trim).filter(|line| !line.is_empty()) {
            if line.eq_ignore_ascii_case("$G") {
                self.echo_parser_state = true;
            }
            self.client_lines.push_back(line.to_string());
        }
        self.advance();
        Ok(())
    }
}
