//! Controller bus implementation.
//!
//! One bus per controller. Subscribers are kept in attach order so every
//! broadcast reaches them in the same deterministic sequence.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::{ControllerEvent, EventCategory};

/// Subscription handle for detaching from a bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    /// Create a new unique subscription ID
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event types
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &ControllerEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

/// Type alias for event handler functions
type EventHandler = Box<dyn Fn(&ControllerEvent) + Send + Sync>;

enum Sink {
    Handler(EventHandler),
    Channel(mpsc::UnboundedSender<ControllerEvent>),
}

impl Sink {
    /// Returns false once the receiving side is gone
    fn deliver(&self, event: &ControllerEvent) -> bool {
        match self {
            Sink::Handler(handler) => {
                handler(event);
                true
            }
            Sink::Channel(tx) => tx.send(event.clone()).is_ok(),
        }
    }
}

struct Subscriber {
    id: SubscriptionId,
    filter: EventFilter,
    sink: Sink,
}

/// Per-controller subscriber registry
#[derive(Clone, Default)]
pub struct ControllerBus {
    subscribers: Arc<RwLock<Vec<Subscriber>>>,
}

impl ControllerBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with a synchronous handler
    ///
    /// The handler runs on the controller task, so it should return quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(&ControllerEvent) + Send + Sync + 'static,
    {
        self.attach(filter, Sink::Handler(Box::new(handler)))
    }

    /// Subscribe with an unbounded channel, for consumers on other tasks
    pub fn channel(
        &self,
        filter: EventFilter,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<ControllerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (self.attach(filter, Sink::Channel(tx)), rx)
    }

    fn attach(&self, filter: EventFilter, sink: Sink) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.subscribers.write().push(Subscriber { id, filter, sink });
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Detach a subscriber
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        let removed = subscribers.len() != before;
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Deliver an event to every matching subscriber, in attach order
    ///
    /// Returns the number of subscribers that received it. Channel
    /// subscribers whose receiver was dropped are detached.
    pub fn publish(&self, event: &ControllerEvent) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read();
            for subscriber in subscribers.iter() {
                if !subscriber.filter.matches(event) {
                    continue;
                }
                if subscriber.sink.deliver(event) {
                    delivered += 1;
                } else {
                    closed.push(subscriber.id);
                }
            }
        }
        for id in closed {
            self.unsubscribe(id);
        }
        delivered
    }

    /// Deliver an event to one subscriber only
    ///
    /// Used to bring a late joiner up to date. Returns false if the
    /// subscriber is unknown, filtered the event out, or has gone away.
    pub fn send_to(&self, id: SubscriptionId, event: &ControllerEvent) -> bool {
        let subscribers = self.subscribers.read();
        subscribers
            .iter()
            .find(|s| s.id == id)
            .filter(|s| s.filter.matches(event))
            .is_some_and(|s| s.sink.deliver(event))
    }

    /// Get the number of active subscriptions
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Detach everyone
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }
}

impl std::fmt::Debug for ControllerBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn message(text: &str) -> ControllerEvent {
        ControllerEvent::Message {
            message: text.to_string(),
        }
    }

    #[test]
    fn test_publish_in_attach_order() {
        let bus = ControllerBus::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let log = log.clone();
            bus.subscribe(EventFilter::All, move |_| log.lock().push(name));
        }
        assert_eq!(bus.publish(&message("hi")), 3);
        assert_eq!(*log.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_filter_and_send_to() {
        let bus = ControllerBus::new();
        let errors = Arc::new(Mutex::new(0));
        let counter = errors.clone();
        let id = bus.subscribe(
            EventFilter::Categories(vec![EventCategory::Error]),
            move |_| *counter.lock() += 1,
        );
        bus.publish(&message("ignored"));
        let error = ControllerEvent::Error {
            message: "boom".to_string(),
        };
        assert!(bus.send_to(id, &error));
        assert!(!bus.send_to(id, &message("filtered")));
        assert_eq!(*errors.lock(), 1);
    }

    #[tokio::test]
    async fn test_channel_subscriber_and_drop() {
        let bus = ControllerBus::new();
        let (_id, mut rx) = bus.channel(EventFilter::All);
        bus.publish(&message("one"));
        assert_eq!(rx.recv().await, Some(message("one")));

        drop(rx);
        assert_eq!(bus.publish(&message("two")), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
