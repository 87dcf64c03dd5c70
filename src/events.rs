//! Platform events raised by the webhook listener.
//!
//! [`WebhookHandler`](crate::webhook::WebhookHandler) publishes one
//! `aistudio:webhook` event per accepted delivery; the `serve` command
//! subscribes to log them.

use serde_json::Value;
use tokio::sync::broadcast;

use crate::consts::WEBHOOK_EVENT;

const EVENT_BUS_CAPACITY: usize = 64;

/// Payload of the `aistudio:webhook` event.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    /// The webhook body as received, plus a `callbackExecuted` flag.
    pub payload: Value,
    pub callback_executed: bool,
}

impl WebhookEvent {
    pub fn new(mut payload: Value, callback_executed: bool) -> Self {
        if let Value::Object(map) = &mut payload {
            map.insert("callbackExecuted".to_string(), Value::Bool(callback_executed));
        }
        Self {
            payload,
            callback_executed,
        }
    }

    pub fn task_id(&self) -> Option<&str> {
        self.payload.get("taskId").and_then(Value::as_str)
    }
}

/// Everything published on the bus.
#[derive(Debug, Clone)]
pub enum Event {
    /// A delivery passed secret verification and was processed.
    Webhook(WebhookEvent),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::Webhook(_) => WEBHOOK_EVENT,
        }
    }
}

/// Fan-out of [`Event`]s to any number of listeners. Slow listeners lag
/// and lose the oldest events rather than blocking the webhook path.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: broadcast::Sender::new(capacity),
        }
    }

    /// Publish `event`; returns how many listeners were reached. Publishing
    /// with nobody listening is not an error.
    pub fn emit(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    /// Listen for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_BUS_CAPACITY)
    }
}
