//! Controller task
//!
//! [`spawn`] moves a [`Controller`] onto a tokio task. The task owns the
//! controller exclusively; everything else talks to it through a
//! [`ControllerHandle`]. One loop iteration handles exactly one of:
//!
//! - a message from a handle (command, attach, detach, close)
//! - a line from the transport reader
//! - the polling interval
//! - the earliest deferred timer

use super::Controller;
use crate::transport::{Transport, TransportEvent};
use cncstream_core::{
    ControllerBus, ControllerError, ControllerEvent, EventFilter, SubscriptionId,
};
use serde_json::Value as Json;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

const MESSAGE_QUEUE_CAPACITY: usize = 64;

pub type Subscription = (SubscriptionId, mpsc::UnboundedReceiver<ControllerEvent>);

/// Requests accepted by the controller task
#[derive(Debug)]
pub enum ControllerMessage {
    Command {
        verb: String,
        args: Json,
        reply: Option<oneshot::Sender<Result<(), ControllerError>>>,
    },
    Attach {
        filter: EventFilter,
        reply: oneshot::Sender<Subscription>,
    },
    Detach(SubscriptionId),
    Close,
}

/// Handle to a running controller task
#[derive(Debug)]
pub struct ControllerHandle {
    port: String,
    tx: mpsc::Sender<ControllerMessage>,
    bus: ControllerBus,
    task: JoinHandle<()>,
}

impl ControllerHandle {
    pub fn port(&self) -> &str {
        &self.port
    }

    /// The controller's bus, for handler subscriptions that do not need a snapshot
    pub fn bus(&self) -> &ControllerBus {
        &self.bus
    }

    fn gone(&self) -> ControllerError {
        ControllerError::TransportUnavailable {
            port: self.port.clone(),
        }
    }

    async fn send(&self, message: ControllerMessage) -> Result<(), ControllerError> {
        self.tx.send(message).await.map_err(|_| self.gone())
    }

    /// Submit a command and wait for its outcome
    pub async fn command(&self, verb: &str, args: Json) -> Result<(), ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerMessage::Command {
            verb: verb.to_string(),
            args,
            reply: Some(reply),
        })
        .await?;
        rx.await.map_err(|_| self.gone())?
    }

    /// Submit a command without waiting; failures are still published on the bus
    pub async fn submit(&self, verb: &str, args: Json) -> Result<(), ControllerError> {
        self.send(ControllerMessage::Command {
            verb: verb.to_string(),
            args,
            reply: None,
        })
        .await
    }

    /// Attach a subscriber; the receiver starts with the current snapshot
    pub async fn attach(&self, filter: EventFilter) -> Result<Subscription, ControllerError> {
        let (reply, rx) = oneshot::channel();
        self.send(ControllerMessage::Attach { filter, reply }).await?;
        rx.await.map_err(|_| self.gone())
    }

    pub async fn detach(&self, id: SubscriptionId) -> Result<(), ControllerError> {
        self.send(ControllerMessage::Detach(id)).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Close the transport and wait for the task to end
    pub async fn close(self) {
        if self.tx.send(ControllerMessage::Close).await.is_err() {
            tracing::debug!("Controller task for {} already stopped", self.port);
        }
        if let Err(e) = self.task.await {
            tracing::error!("Controller task for {} failed: {}", self.port, e);
        }
    }
}

/// Run `controller` on a new task, reading inbound lines from `lines`
pub fn spawn<T>(
    mut controller: Controller<T>,
    mut lines: mpsc::Receiver<TransportEvent>,
) -> ControllerHandle
where
    T: Transport + 'static,
{
    let (tx, mut rx) = mpsc::channel(MESSAGE_QUEUE_CAPACITY);
    let port = controller.port().to_string();
    let bus = controller.bus().clone();
    let poll_interval = Duration::from_millis(controller.config().controller.poll_interval_ms.max(1));

    let task = tokio::spawn(async move {
        let mut interval = time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        controller.open(Instant::now());

        loop {
            let deadline = controller.next_deadline();
            tokio::select! {
                message = rx.recv() => match message {
                    Some(ControllerMessage::Command { verb, args, reply }) => {
                        let result = controller.submit(&verb, &args, Instant::now());
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    Some(ControllerMessage::Attach { filter, reply }) => {
                        let subscription = controller.attach(filter);
                        let _ = reply.send(subscription);
                    }
                    Some(ControllerMessage::Detach(id)) => {
                        controller.detach(id);
                    }
                    Some(ControllerMessage::Close) | None => {
                        controller.close(None);
                        break;
                    }
                },
                event = lines.recv() => match event {
                    Some(TransportEvent::Line(line)) => controller.handle_line(&line, Instant::now()),
                    Some(TransportEvent::Closed(reason)) => {
                        controller.close(reason);
                        break;
                    }
                    None => {
                        controller.close(Some("reader stopped".to_string()));
                        break;
                    }
                },
                _ = interval.tick() => controller.tick(Instant::now()),
                _ = time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    controller.run_deferred(Instant::now());
                }
            }
        }
        tracing::debug!("Controller task for {} finished", controller.port());
    });

    ControllerHandle {
        port,
        tx,
        bus,
        task,
    }
}
